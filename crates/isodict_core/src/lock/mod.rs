//! Intention locking.
//!
//! Every transaction presents an [`IntentionLock`] (its key scope and
//! read/write intent) before it touches the store. [`SelectiveRelease`]
//! decides which requests may proceed together and parks the rest.

mod intention;
mod selective;

pub use intention::{IntentionLock, LockScope};
pub use selective::{Acquisition, SelectiveRelease};
