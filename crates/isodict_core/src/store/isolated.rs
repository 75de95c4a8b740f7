//! The isolated store.

use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::lock::LockScope;
use crate::store::feed::{CommitFeed, CommittedLog};
use crate::transaction::{Transaction, WriteOperation};
use crate::types::{Timestamp, TransactionId};
use isodict_codec::{CborCloner, SharedCloner, ValueCloner};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// The committed map and the commit time of the newest commit it contains.
struct Committed<V> {
    map: HashMap<String, V>,
    last_commit: Timestamp,
}

type SharedTransaction<V> = Arc<Mutex<Transaction<V>>>;

/// Owns the committed key-value map and every open transaction over it.
///
/// The store provides:
/// - point-in-time (optionally key-scoped) snapshots per transaction
/// - atomic application of a transaction's write log on commit
/// - lazy catch-up of open transactions with later commits
/// - a [`CommitFeed`] of committed logs for replication
///
/// ## Locking
///
/// The store does not arbitrate between transactions. Callers hold the
/// transaction's intention lock around [`IsolatedStore::save_changes`];
/// `IsolatedDictionary` does this for them.
///
/// Values cross into and out of the committed map only through the
/// store's [`ValueCloner`], so no caller can reach a value another
/// transaction can see.
pub struct IsolatedStore<V> {
    config: StoreConfig,
    clock: &'static Clock,
    cloner: SharedCloner<V>,
    /// Committed state. Written only by commits.
    committed: RwLock<Committed<V>>,
    /// Open transactions.
    transactions: RwLock<HashMap<TransactionId, SharedTransaction<V>>>,
    /// Committed logs, retained for catch-up and replication.
    feed: CommitFeed<V>,
}

impl<V> IsolatedStore<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates an empty store that deep-copies values through CBOR.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self::with_cloner(config, Arc::new(CborCloner))
    }
}

impl<V> IsolatedStore<V>
where
    V: Send + Sync + 'static,
{
    /// Creates an empty store with a custom cloner.
    #[must_use]
    pub fn with_cloner(config: StoreConfig, cloner: SharedCloner<V>) -> Self {
        let feed = CommitFeed::with_max_history(config.commit_history);
        Self {
            config,
            clock: Clock::global(),
            cloner,
            committed: RwLock::new(Committed {
                map: HashMap::new(),
                last_commit: Timestamp::ZERO,
            }),
            transactions: RwLock::new(HashMap::new()),
            feed,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the clock that stamps this store's operations.
    #[must_use]
    pub fn clock(&self) -> &'static Clock {
        self.clock
    }

    /// Returns the value cloner.
    #[must_use]
    pub fn cloner(&self) -> &SharedCloner<V> {
        &self.cloner
    }

    fn snapshot_of(
        &self,
        map: &HashMap<String, V>,
        scope: &LockScope,
    ) -> CoreResult<HashMap<String, V>> {
        let copy = |(key, value): (&String, &V)| -> CoreResult<(String, V)> {
            Ok((key.clone(), self.cloner.deep_clone(value)?))
        };
        match scope.keys() {
            None => map.iter().map(copy).collect(),
            Some(keys) => keys
                .iter()
                .filter_map(|key| map.get_key_value(key))
                .map(copy)
                .collect(),
        }
    }

    /// Opens a transaction for `id` unless one is already open.
    ///
    /// The snapshot covers `scope` and is deep-copied from the committed
    /// map. Returns true if a transaction was created.
    pub fn ensure_transaction(&self, id: TransactionId, scope: &LockScope) -> CoreResult<bool> {
        if self.transactions.read().contains_key(&id) {
            return Ok(false);
        }

        let committed = self.committed.read();
        let snapshot = self.snapshot_of(&committed.map, scope)?;
        let created_at = self.clock.tick();
        let txn = Transaction::new(
            id,
            scope.clone(),
            snapshot,
            created_at,
            committed.last_commit,
        );

        let mut transactions = self.transactions.write();
        if transactions.contains_key(&id) {
            return Ok(false);
        }
        transactions.insert(id, Arc::new(Mutex::new(txn)));
        drop(transactions);
        drop(committed);

        tracing::trace!(txn = %id, %created_at, "transaction opened");
        Ok(true)
    }

    fn transaction(&self, id: &TransactionId) -> CoreResult<SharedTransaction<V>> {
        self.transactions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(*id))
    }

    /// Reads a key as seen by the transaction.
    pub fn get(&self, key: &str, id: TransactionId) -> CoreResult<Option<V>> {
        let txn = self.transaction(&id)?;
        let txn = txn.lock();
        Ok(txn
            .get(key)
            .map(|value| self.cloner.deep_clone(value))
            .transpose()?)
    }

    /// Buffers an add-or-update in the transaction.
    pub fn add_or_update(
        &self,
        key: impl Into<String>,
        value: V,
        id: TransactionId,
    ) -> CoreResult<Timestamp> {
        let txn = self.transaction(&id)?;
        let ts = txn.lock().add_or_update(key, value, self.clock);
        Ok(ts)
    }

    /// Buffers several add-or-updates, in iteration order.
    ///
    /// Returns the number of operations buffered.
    pub fn add_or_update_range<I>(&self, items: I, id: TransactionId) -> CoreResult<usize>
    where
        I: IntoIterator<Item = (String, V)>,
    {
        let txn = self.transaction(&id)?;
        let mut txn = txn.lock();
        let mut buffered = 0;
        for (key, value) in items {
            txn.add_or_update(key, value, self.clock);
            buffered += 1;
        }
        Ok(buffered)
    }

    /// Buffers a removal in the transaction.
    pub fn remove(&self, key: impl Into<String>, id: TransactionId) -> CoreResult<Timestamp> {
        let txn = self.transaction(&id)?;
        let ts = txn.lock().remove(key, self.clock);
        Ok(ts)
    }

    /// Counts the keys visible to the transaction.
    pub fn count(&self, id: TransactionId) -> CoreResult<usize> {
        Ok(self.transaction(&id)?.lock().len())
    }

    /// Returns every entry visible to the transaction, ordered by key.
    pub fn get_all(&self, id: TransactionId) -> CoreResult<Vec<(String, V)>> {
        let txn = self.transaction(&id)?;
        let txn = txn.lock();
        txn.entries()
            .into_iter()
            .map(|(key, value)| Ok((key.to_string(), self.cloner.deep_clone(value)?)))
            .collect()
    }

    /// Returns copies of the values the transaction has added or updated.
    pub fn tracked_entities(&self, id: TransactionId) -> CoreResult<Vec<V>> {
        let txn = self.transaction(&id)?;
        let txn = txn.lock();
        txn.tracked()
            .into_iter()
            .map(|value| Ok(self.cloner.deep_clone(value)?))
            .collect()
    }

    /// Commits the transaction.
    ///
    /// Every value is copied before the committed map is touched, so a
    /// failure leaves both the map and the transaction unchanged. On success
    /// the operations are applied in log order under a fresh commit time,
    /// the log is published on the feed, and the transaction is discarded.
    ///
    /// Returns `None` if no transaction is open for `id`, or if it buffered
    /// no writes. A write-free transaction is discarded without taking a
    /// commit time or publishing a log. The caller must hold the
    /// transaction's intention lock.
    pub fn save_changes(&self, id: TransactionId) -> CoreResult<Option<Arc<CommittedLog<V>>>> {
        let Some(shared) = self.transactions.read().get(&id).cloned() else {
            return Ok(None);
        };

        let log = {
            let txn = shared.lock();
            if txn.write_count() == 0 {
                drop(txn);
                self.transactions.write().remove(&id);
                tracing::trace!(txn = %id, "write-free transaction closed without a commit");
                return Ok(None);
            }
            let (applied, recorded) = self
                .prepare(txn.operations().into_iter())
                .map_err(|err| CoreError::commit_failed(id, err.to_string()))?;

            let mut committed = self.committed.write();
            let commit_time = self.clock.tick();
            for op in applied {
                op.apply_to(&mut committed.map);
            }
            committed.last_commit = commit_time;
            let log = self.feed.emit(CommittedLog::new(id, commit_time, recorded));
            drop(committed);

            tracing::debug!(txn = %id, ops = log.len(), %commit_time, "transaction committed");
            log
        };

        self.transactions.write().remove(&id);
        Ok(Some(log))
    }

    /// Copies operations twice: once for the committed map and once for
    /// the published log.
    fn prepare<'a, I>(
        &self,
        ops: I,
    ) -> CoreResult<(Vec<WriteOperation<V>>, Vec<WriteOperation<V>>)>
    where
        I: Iterator<Item = &'a WriteOperation<V>>,
        V: 'a,
    {
        let cloner: &dyn ValueCloner<V> = self.cloner.as_ref();
        let mut applied = Vec::new();
        let mut recorded = Vec::new();
        for op in ops {
            applied.push(op.clone_with(cloner)?);
            recorded.push(op.clone_with(cloner)?);
        }
        Ok((applied, recorded))
    }

    /// Discards the transaction without touching the committed map.
    ///
    /// Returns false if no transaction was open for `id`.
    pub fn undo_changes(&self, id: TransactionId) -> bool {
        let Some(shared) = self.transactions.write().remove(&id) else {
            return false;
        };
        let mut txn = shared.lock();
        let discarded = txn.write_count();
        txn.clear();
        tracing::trace!(txn = %id, discarded, "transaction rolled back");
        true
    }

    /// Catches the transaction up with every commit it has not seen.
    ///
    /// Retained logs are merged oldest first. A transaction that has fallen
    /// behind the retained history re-snapshots its scope instead, keeping
    /// its pending writes. Returns the number of merged operations, or the
    /// size of the new snapshot.
    pub fn resync(&self, id: TransactionId) -> CoreResult<usize> {
        let shared = self.transaction(&id)?;
        let mut txn = shared.lock();

        if let Some(logs) = self.feed.since(txn.synced_through()) {
            let mut merged = 0;
            for log in logs {
                merged += txn.sync(log.operations(), log.commit_time(), self.cloner.as_ref())?;
            }
            return Ok(merged);
        }

        let committed = self.committed.read();
        let snapshot = self.snapshot_of(&committed.map, txn.scope())?;
        let size = snapshot.len();
        txn.resnapshot(snapshot, committed.last_commit);
        tracing::debug!(
            txn = %id,
            through = %committed.last_commit,
            "transaction fell behind commit history, re-snapshotted"
        );
        Ok(size)
    }

    /// Applies a log committed by another replica.
    ///
    /// Logs not newer than the last applied commit are ignored and return
    /// false. Applied logs advance the clock and are published on this
    /// store's feed, so open transactions pick them up lazily.
    pub fn apply_committed(&self, log: &CommittedLog<V>) -> CoreResult<bool> {
        let id = log.transaction_id();
        let (applied, recorded) = self
            .prepare(log.operations().iter())
            .map_err(|err| CoreError::commit_failed(id, err.to_string()))?;

        let mut committed = self.committed.write();
        if log.commit_time() <= committed.last_commit {
            tracing::trace!(txn = %id, commit_time = %log.commit_time(), "stale log ignored");
            return Ok(false);
        }
        for op in applied {
            op.apply_to(&mut committed.map);
        }
        committed.last_commit = log.commit_time();
        self.clock.observe(log.commit_time());
        self.feed.emit(CommittedLog::new(id, log.commit_time(), recorded));
        drop(committed);

        tracing::debug!(
            txn = %id,
            ops = log.len(),
            commit_time = %log.commit_time(),
            "replicated log applied"
        );
        Ok(true)
    }

    /// Subscribes to committed logs.
    pub fn subscribe(&self) -> Receiver<Arc<CommittedLog<V>>> {
        self.feed.subscribe()
    }

    /// Returns retained logs committed after `cursor`, up to `limit`.
    #[must_use]
    pub fn poll(&self, cursor: Timestamp, limit: usize) -> Vec<Arc<CommittedLog<V>>> {
        self.feed.poll(cursor, limit)
    }

    /// Returns the most recent committed log.
    #[must_use]
    pub fn last_committed(&self) -> Option<Arc<CommittedLog<V>>> {
        self.feed.latest()
    }

    /// Returns the commit time of the newest commit applied.
    #[must_use]
    pub fn last_commit_time(&self) -> Timestamp {
        self.committed.read().last_commit
    }

    /// Returns the commit feed.
    #[must_use]
    pub fn feed(&self) -> &CommitFeed<V> {
        &self.feed
    }

    /// Returns the number of committed keys.
    #[must_use]
    pub fn committed_len(&self) -> usize {
        self.committed.read().map.len()
    }

    /// Returns true if a transaction is open for `id`.
    #[must_use]
    pub fn contains_transaction(&self, id: &TransactionId) -> bool {
        self.transactions.read().contains_key(id)
    }

    /// Returns the IDs of all open transactions.
    #[must_use]
    pub fn open_transactions(&self) -> Vec<TransactionId> {
        self.transactions.read().keys().copied().collect()
    }
}

impl<V> std::fmt::Debug for IsolatedStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedStore")
            .field("config", &self.config)
            .field("committed", &self.committed.read().map.len())
            .field("open_transactions", &self.transactions.read().len())
            .field("feed", &self.feed)
            .finish()
    }
}
