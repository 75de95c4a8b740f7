//! # isodict Testkit
//!
//! Test utilities for isodict.
//!
//! This crate provides:
//! - Fixtures for dictionaries and paired contexts
//! - Property-based test generators using proptest
//! - Threaded stress helpers
//! - Tracing setup for tests and benches
//!
//! ## Usage
//!
//! ```
//! use isodict_testkit::prelude::*;
//!
//! init_tracing();
//! let (mut a, mut b) = context_pair::<String>();
//! a.add_or_update("k", "v".to_string()).unwrap();
//! a.commit().unwrap();
//! assert_eq!(b.get("k").unwrap().as_deref(), Some("v"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;
pub mod trace;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use crate::trace::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
pub use trace::*;
