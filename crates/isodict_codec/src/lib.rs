//! # isodict Codec
//!
//! Deep-copy primitives for isodict.
//!
//! Values never move between the committed store and a transaction by
//! reference. This crate provides the pluggable cloner used at those
//! boundaries:
//!
//! - [`CborCloner`] copies through a CBOR round trip (any serde type)
//! - [`CloneCloner`] bypasses serialization for primitive-like types
//!
//! It also exposes the CBOR helpers used to ship committed logs between
//! replicas.
//!
//! ## Usage
//!
//! ```
//! use isodict_codec::{CborCloner, ValueCloner};
//!
//! let original = vec![String::from("a"), String::from("b")];
//! let mut copy = CborCloner.deep_clone(&original).unwrap();
//! copy.push(String::from("c"));
//! assert_eq!(original.len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cloner;
mod error;

pub use cloner::{from_cbor, to_cbor, CborCloner, CloneCloner, SharedCloner, ValueCloner};
pub use error::{CodecError, CodecResult};
