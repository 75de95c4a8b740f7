//! # isodict Replication
//!
//! Ships committed logs from a leader dictionary to follower dictionaries.
//!
//! This crate provides:
//! - The [`LogTransport`] and [`LogReceiver`] seams
//! - A [`LoopbackTransport`] that exercises the CBOR wire path in process
//! - A [`MockTransport`] for tests
//! - The [`Replicator`], which drives either role
//!
//! ## Key Invariants
//!
//! - Logs are shipped in commit order
//! - A follower applies each log at most once
//! - A follower applies a log atomically with respect to its local
//!   transactions
//!
//! Electing a leader is left to the caller; a replicator only consumes
//! the role it is given.
//!
//! ## Usage
//!
//! ```
//! use isodict_core::{DictionaryContext, IsolatedDictionary, StoreConfig};
//! use isodict_replication::{LoopbackTransport, ReplicationConfig, Replicator};
//! use std::sync::Arc;
//!
//! let leader = Arc::new(IsolatedDictionary::<u32>::new(StoreConfig::default()));
//! let follower = Arc::new(IsolatedDictionary::<u32>::new(StoreConfig::default()));
//!
//! let transport = LoopbackTransport::new();
//! transport.attach(follower.clone());
//! let replicator = Replicator::new(ReplicationConfig::leader(), Arc::clone(&leader), transport);
//!
//! let mut ctx = DictionaryContext::new(leader);
//! ctx.add_or_update("stock", 12)?;
//! ctx.commit()?;
//! replicator.pump()?;
//!
//! let mut reader = DictionaryContext::new(follower);
//! assert_eq!(reader.get("stock")?, Some(12));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod replicator;
mod transport;

pub use config::{ReplicationConfig, ReplicationRole};
pub use error::{ReplicationError, ReplicationResult};
pub use replicator::{ReplicationStats, Replicator};
pub use transport::{LogReceiver, LogTransport, LoopbackTransport, MockTransport};
