//! # isodict Core
//!
//! An in-process key-value store with snapshot-isolated transactions.
//!
//! This crate provides:
//! - A logical [`Clock`] that orders every write and every commit
//! - [`Transaction`]s with a private snapshot and a buffered [`WriteLog`]
//! - The [`SelectiveRelease`] intention lock manager
//! - The [`IsolatedStore`], which commits write logs atomically and lets
//!   open transactions catch up lazily with later commits
//! - The [`DictionaryContext`] unit of work, the usual entry point
//!
//! ## Usage
//!
//! ```
//! use isodict_core::{DictionaryContext, IsolatedDictionary, StoreConfig};
//! use std::sync::Arc;
//!
//! let dict = Arc::new(IsolatedDictionary::<u32>::new(StoreConfig::default()));
//!
//! let mut a = DictionaryContext::new(Arc::clone(&dict));
//! a.declare_intent(["stock"], false)?;
//! a.add_or_update("stock", 12)?;
//! a.commit()?;
//!
//! let mut b = DictionaryContext::new(dict);
//! assert_eq!(b.get("stock")?, Some(12));
//! # Ok::<(), isodict_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod context;
mod dictionary;
mod error;
mod lock;
mod registry;
mod store;
mod transaction;
mod types;

pub use clock::Clock;
pub use config::StoreConfig;
pub use context::{ContextState, DictionaryContext};
pub use dictionary::IsolatedDictionary;
pub use error::{CoreError, CoreResult};
pub use lock::{Acquisition, IntentionLock, LockScope, SelectiveRelease};
pub use registry::StoreRegistry;
pub use store::{CommitFeed, CommittedLog, IsolatedStore};
pub use transaction::{Transaction, WriteKind, WriteLog, WriteOperation};
pub use types::{Intent, Timestamp, TransactionId};
