//! Buffered write operations.

use crate::types::Timestamp;
use isodict_codec::{CodecResult, ValueCloner};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The mutation a write operation performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteKind<V> {
    /// Insert the value, replacing any existing one.
    AddOrUpdate(V),
    /// Delete the key.
    Remove,
}

/// A single buffered mutation, stamped with the logical clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOperation<V> {
    key: String,
    timestamp: Timestamp,
    kind: WriteKind<V>,
}

impl<V> WriteOperation<V> {
    /// Creates an add-or-update operation.
    pub fn add_or_update(key: impl Into<String>, value: V, timestamp: Timestamp) -> Self {
        Self {
            key: key.into(),
            timestamp,
            kind: WriteKind::AddOrUpdate(value),
        }
    }

    /// Creates a remove operation.
    pub fn remove(key: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            key: key.into(),
            timestamp,
            kind: WriteKind::Remove,
        }
    }

    /// Returns the key this operation targets.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the logical time the operation was issued.
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Returns the mutation.
    #[must_use]
    pub fn kind(&self) -> &WriteKind<V> {
        &self.kind
    }

    /// Returns the written value, or `None` for a removal.
    #[must_use]
    pub fn value(&self) -> Option<&V> {
        match &self.kind {
            WriteKind::AddOrUpdate(value) => Some(value),
            WriteKind::Remove => None,
        }
    }

    /// Returns true if this operation removes its key.
    #[must_use]
    pub fn is_remove(&self) -> bool {
        matches!(self.kind, WriteKind::Remove)
    }

    /// Returns a copy whose value shares nothing with this one.
    pub fn clone_with(&self, cloner: &dyn ValueCloner<V>) -> CodecResult<Self> {
        let kind = match &self.kind {
            WriteKind::AddOrUpdate(value) => WriteKind::AddOrUpdate(cloner.deep_clone(value)?),
            WriteKind::Remove => WriteKind::Remove,
        };
        Ok(Self {
            key: self.key.clone(),
            timestamp: self.timestamp,
            kind,
        })
    }

    /// Applies this operation to a map, consuming it.
    pub fn apply_to(self, map: &mut HashMap<String, V>) {
        match self.kind {
            WriteKind::AddOrUpdate(value) => {
                map.insert(self.key, value);
            }
            WriteKind::Remove => {
                map.remove(&self.key);
            }
        }
    }
}

/// Pending mutations of one transaction, at most one per key.
///
/// A later operation on a key replaces the earlier one (last write wins).
/// Iteration in log order follows the operations' timestamps.
#[derive(Debug)]
pub struct WriteLog<V> {
    operations: HashMap<String, WriteOperation<V>>,
}

impl<V> WriteLog<V> {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    /// Upserts an operation, returning the one it replaced.
    pub fn upsert(&mut self, operation: WriteOperation<V>) -> Option<WriteOperation<V>> {
        self.operations.insert(operation.key.clone(), operation)
    }

    /// Returns the pending operation for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&WriteOperation<V>> {
        self.operations.get(key)
    }

    /// Returns the operations in log order.
    #[must_use]
    pub fn ordered(&self) -> Vec<&WriteOperation<V>> {
        let mut ops: Vec<_> = self.operations.values().collect();
        ops.sort_by_key(|op| op.timestamp);
        ops
    }

    /// Iterates over the operations in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &WriteOperation<V>> {
        self.operations.values()
    }

    /// Returns the number of pending operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Discards every pending operation.
    pub fn clear(&mut self) {
        self.operations.clear();
    }
}

impl<V> Default for WriteLog<V> {
    fn default() -> Self {
        Self::new()
    }
}
