//! Core type definitions for isodict.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a transaction.
///
/// Generated randomly by each context when a unit of work starts and never
/// reused afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Creates a fresh, random transaction ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// A reading of the logical clock.
///
/// Timestamps order every write operation and every commit. They are
/// never derived from wall-clock time.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The timestamp that precedes every tick of the clock.
    pub const ZERO: Self = Self(0);

    /// Creates a timestamp from a raw counter value.
    #[must_use]
    pub const fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Returns the raw counter value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t:{}", self.0)
    }
}

/// What a transaction intends to do with the keys it locks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    /// Shared access; compatible with other readers.
    Read,
    /// Exclusive access.
    #[default]
    Write,
    /// No intent held. Only meaningful for the whole-store slot of the
    /// lock manager.
    None,
}

impl Intent {
    /// Returns the intent for a `read_only` flag.
    #[must_use]
    pub const fn from_read_only(read_only: bool) -> Self {
        if read_only {
            Self::Read
        } else {
            Self::Write
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Read => f.write_str("read"),
            Intent::Write => f.write_str("write"),
            Intent::None => f.write_str("none"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_ids_are_unique() {
        let a = TransactionId::new();
        let b = TransactionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn transaction_id_display() {
        let id = TransactionId::from_uuid(Uuid::nil());
        assert_eq!(id.to_string(), "txn:00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn timestamp_ordering() {
        assert!(Timestamp::new(1) < Timestamp::new(2));
        assert_eq!(Timestamp::ZERO, Timestamp::default());
        assert_eq!(format!("{}", Timestamp::new(7)), "t:7");
    }

    #[test]
    fn intent_from_read_only() {
        assert_eq!(Intent::from_read_only(true), Intent::Read);
        assert_eq!(Intent::from_read_only(false), Intent::Write);
        assert_eq!(Intent::default(), Intent::Write);
    }
}
