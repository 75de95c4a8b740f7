//! Transaction state.

use crate::clock::Clock;
use crate::lock::LockScope;
use crate::transaction::operation::{WriteKind, WriteLog, WriteOperation};
use crate::types::{Timestamp, TransactionId};
use isodict_codec::{CodecResult, ValueCloner};
use std::collections::HashMap;

/// An open unit of work.
///
/// A transaction reads from a private snapshot of the committed map and
/// buffers its writes in a [`WriteLog`]. Nothing it does is visible to
/// other transactions until the store commits it.
#[derive(Debug)]
pub struct Transaction<V> {
    /// Transaction ID.
    id: TransactionId,
    /// Keys this transaction may observe.
    scope: LockScope,
    /// Clock reading when the snapshot was taken.
    created_at: Timestamp,
    /// Latest commit already merged into this transaction.
    synced_through: Timestamp,
    /// Private copy of the committed map, restricted to `scope`.
    snapshot: HashMap<String, V>,
    /// Pending writes.
    writes: WriteLog<V>,
}

impl<V> Transaction<V> {
    /// Creates a transaction over an already deep-copied snapshot.
    ///
    /// `synced_through` is the commit time of the newest commit the
    /// snapshot already contains.
    pub(crate) fn new(
        id: TransactionId,
        scope: LockScope,
        snapshot: HashMap<String, V>,
        created_at: Timestamp,
        synced_through: Timestamp,
    ) -> Self {
        Self {
            id,
            scope,
            created_at,
            synced_through,
            snapshot,
            writes: WriteLog::new(),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the snapshot scope.
    #[must_use]
    pub fn scope(&self) -> &LockScope {
        &self.scope
    }

    /// Returns the clock reading at which the snapshot was taken.
    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Returns the commit time up to which this transaction is caught up.
    #[must_use]
    pub fn synced_through(&self) -> Timestamp {
        self.synced_through
    }

    /// Reads a key, preferring pending writes over the snapshot.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        match self.writes.get(key) {
            Some(op) => op.value(),
            None => self.snapshot.get(key),
        }
    }

    /// Buffers an add-or-update and returns its timestamp.
    pub fn add_or_update(&mut self, key: impl Into<String>, value: V, clock: &Clock) -> Timestamp {
        let ts = clock.tick();
        self.writes.upsert(WriteOperation::add_or_update(key, value, ts));
        ts
    }

    /// Buffers a removal and returns its timestamp.
    pub fn remove(&mut self, key: impl Into<String>, clock: &Clock) -> Timestamp {
        let ts = clock.tick();
        self.writes.upsert(WriteOperation::remove(key, ts));
        ts
    }

    /// Returns the pending operations in log order.
    #[must_use]
    pub fn operations(&self) -> Vec<&WriteOperation<V>> {
        self.writes.ordered()
    }

    /// Returns the number of pending operations.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Returns the values of pending add-or-update operations, in log order.
    #[must_use]
    pub fn tracked(&self) -> Vec<&V> {
        self.writes
            .ordered()
            .into_iter()
            .filter_map(WriteOperation::value)
            .collect()
    }

    /// Returns the number of keys visible to this transaction.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut len = self.snapshot.len();
        for op in self.writes.iter() {
            let in_snapshot = self.snapshot.contains_key(op.key());
            match op.kind() {
                WriteKind::AddOrUpdate(_) if !in_snapshot => len += 1,
                WriteKind::Remove if in_snapshot => len -= 1,
                _ => {}
            }
        }
        len
    }

    /// Returns true if no key is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns every visible entry, ordered by key.
    #[must_use]
    pub fn entries(&self) -> Vec<(&str, &V)> {
        let mut entries: Vec<(&str, &V)> = self
            .snapshot
            .iter()
            .filter(|(key, _)| self.writes.get(key).is_none())
            .map(|(key, value)| (key.as_str(), value))
            .chain(
                self.writes
                    .iter()
                    .filter_map(|op| op.value().map(|value| (op.key(), value))),
            )
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// Merges operations committed by another transaction at `commit_time`.
    ///
    /// Logs at or below the current horizon were already merged and are
    /// skipped. An incoming operation survives if its key is in scope and it
    /// is newer than this transaction's pending operation on that key. Keys
    /// without a pending operation are caught up in the snapshot, so a later
    /// commit of this transaction never re-applies them. Surviving values
    /// are deep-copied before anything changes; returns how many were merged.
    pub fn sync(
        &mut self,
        incoming: &[WriteOperation<V>],
        commit_time: Timestamp,
        cloner: &dyn ValueCloner<V>,
    ) -> CodecResult<usize> {
        if commit_time <= self.synced_through {
            return Ok(0);
        }

        let mut accepted = Vec::new();
        for op in incoming {
            if !self.scope.covers(op.key()) {
                continue;
            }
            let newer = self
                .writes
                .get(op.key())
                .map_or(true, |pending| op.timestamp() > pending.timestamp());
            if newer {
                accepted.push(op.clone_with(cloner)?);
            }
        }

        let merged = accepted.len();
        for op in accepted {
            if self.writes.get(op.key()).is_some() {
                self.writes.upsert(op);
            } else {
                op.apply_to(&mut self.snapshot);
            }
        }
        self.synced_through = commit_time;

        tracing::trace!(
            txn = %self.id,
            %commit_time,
            merged,
            "resynced transaction"
        );
        Ok(merged)
    }

    /// Replaces the snapshot wholesale, keeping pending writes.
    pub(crate) fn resnapshot(&mut self, snapshot: HashMap<String, V>, at: Timestamp) {
        self.snapshot = snapshot;
        self.synced_through = at;
    }

    /// Discards every pending write.
    pub fn clear(&mut self) {
        self.writes.clear();
    }
}
