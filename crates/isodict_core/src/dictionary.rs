//! An isolated store guarded by intention locks.

use crate::config::StoreConfig;
use crate::error::CoreResult;
use crate::lock::{IntentionLock, SelectiveRelease};
use crate::store::{CommittedLog, IsolatedStore};
use crate::types::Timestamp;
use isodict_codec::SharedCloner;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// One [`IsolatedStore`] and the [`SelectiveRelease`] that guards it.
///
/// Every operation takes the caller's [`IntentionLock`] and runs the same
/// sequence: open the transaction if needed, acquire the lock (blocking
/// while it collides), catch the transaction up with commits it missed,
/// then operate on it.
///
/// Scope and intent are not validated here; `DictionaryContext` does that.
#[derive(Debug)]
pub struct IsolatedDictionary<V> {
    store: IsolatedStore<V>,
    locks: SelectiveRelease,
}

impl<V> IsolatedDictionary<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates an empty dictionary that deep-copies values through CBOR.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        let locks = SelectiveRelease::new(config.lock_timeout);
        Self {
            store: IsolatedStore::new(config),
            locks,
        }
    }
}

impl<V> IsolatedDictionary<V>
where
    V: Send + Sync + 'static,
{
    /// Creates an empty dictionary with a custom cloner.
    #[must_use]
    pub fn with_cloner(config: StoreConfig, cloner: SharedCloner<V>) -> Self {
        let locks = SelectiveRelease::new(config.lock_timeout);
        Self {
            store: IsolatedStore::with_cloner(config, cloner),
            locks,
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &IsolatedStore<V> {
        &self.store
    }

    /// Returns the lock manager.
    #[must_use]
    pub fn locks(&self) -> &SelectiveRelease {
        &self.locks
    }

    /// Opens the transaction, takes its lock and brings it up to date.
    pub fn acquire(&self, lock: &IntentionLock) -> CoreResult<()> {
        let id = lock.transaction_id();
        self.store.ensure_transaction(id, lock.scope())?;
        self.locks.next_acquire(lock)?;
        self.store.resync(id)?;
        Ok(())
    }

    /// Reads a key.
    pub fn get(&self, key: &str, lock: &IntentionLock) -> CoreResult<Option<V>> {
        self.acquire(lock)?;
        self.store.get(key, lock.transaction_id())
    }

    /// Buffers an add-or-update.
    pub fn add_or_update(
        &self,
        key: impl Into<String>,
        value: V,
        lock: &IntentionLock,
    ) -> CoreResult<Timestamp> {
        self.acquire(lock)?;
        self.store.add_or_update(key, value, lock.transaction_id())
    }

    /// Buffers several add-or-updates.
    pub fn add_or_update_range<I>(&self, items: I, lock: &IntentionLock) -> CoreResult<usize>
    where
        I: IntoIterator<Item = (String, V)>,
    {
        self.acquire(lock)?;
        self.store.add_or_update_range(items, lock.transaction_id())
    }

    /// Buffers a removal.
    pub fn remove(&self, key: impl Into<String>, lock: &IntentionLock) -> CoreResult<Timestamp> {
        self.acquire(lock)?;
        self.store.remove(key, lock.transaction_id())
    }

    /// Counts the visible keys.
    pub fn count(&self, lock: &IntentionLock) -> CoreResult<usize> {
        self.acquire(lock)?;
        self.store.count(lock.transaction_id())
    }

    /// Returns every visible entry, ordered by key.
    pub fn get_all(&self, lock: &IntentionLock) -> CoreResult<Vec<(String, V)>> {
        self.acquire(lock)?;
        self.store.get_all(lock.transaction_id())
    }

    /// Returns the values buffered by add-or-update operations.
    ///
    /// Only looks at the transaction's own write log, so no lock is taken
    /// and no transaction is opened.
    pub fn tracked_entities(&self, lock: &IntentionLock) -> CoreResult<Vec<V>> {
        let id = lock.transaction_id();
        if !self.store.contains_transaction(&id) {
            return Ok(Vec::new());
        }
        self.store.tracked_entities(id)
    }

    /// Commits under the lock, then releases it.
    ///
    /// Returns `None` when the transaction never started. On failure the
    /// lock stays held and the transaction stays open, so the caller can
    /// retry or roll back.
    pub fn save_changes(&self, lock: &IntentionLock) -> CoreResult<Option<Arc<CommittedLog<V>>>> {
        let id = lock.transaction_id();
        if !self.store.contains_transaction(&id) {
            self.locks.release(lock)?;
            return Ok(None);
        }

        self.acquire(lock)?;
        let log = self.store.save_changes(id)?;
        self.locks.release(lock)?;
        Ok(log)
    }

    /// Releases or abandons the lock and discards the transaction.
    ///
    /// Returns true if a transaction was open.
    pub fn undo_changes(&self, lock: &IntentionLock) -> CoreResult<bool> {
        self.locks.release(lock)?;
        Ok(self.store.undo_changes(lock.transaction_id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Intent, TransactionId};

    fn dictionary() -> IsolatedDictionary<String> {
        IsolatedDictionary::new(StoreConfig::new().lock_timeout_ms(30))
    }

    fn write_lock() -> IntentionLock {
        IntentionLock::whole_store(TransactionId::new(), Intent::Write)
    }

    #[test]
    fn commit_releases_lock() {
        let dict = dictionary();
        let lock = write_lock();

        dict.add_or_update("k", "v".into(), &lock).unwrap();
        assert!(dict.locks().is_held(&lock.transaction_id()));

        let log = dict.save_changes(&lock).unwrap().unwrap();
        assert_eq!(log.len(), 1);
        assert!(!dict.locks().is_held(&lock.transaction_id()));
        assert!(!dict.store().contains_transaction(&lock.transaction_id()));
    }

    #[test]
    fn writer_blocks_second_writer_until_commit() {
        let dict = dictionary();
        let first = write_lock();
        let second = write_lock();

        dict.add_or_update("k", "first".into(), &first).unwrap();
        let err = dict.get("k", &second).unwrap_err();
        assert!(err.is_retryable());
        assert!(dict.store().contains_transaction(&second.transaction_id()));

        dict.save_changes(&first).unwrap();
        assert_eq!(dict.get("k", &second).unwrap().as_deref(), Some("first"));
    }

    #[test]
    fn undo_releases_and_discards() {
        let dict = dictionary();
        let lock = write_lock();
        dict.add_or_update("k", "v".into(), &lock).unwrap();

        assert!(dict.undo_changes(&lock).unwrap());
        assert!(!dict.locks().is_held(&lock.transaction_id()));
        assert!(!dict.undo_changes(&lock).unwrap());
        assert_eq!(dict.store().committed_len(), 0);
    }

    #[test]
    fn save_without_transaction_is_noop() {
        let dict = dictionary();
        assert!(dict.save_changes(&write_lock()).unwrap().is_none());
    }

    #[test]
    fn tracked_entities_takes_no_lock() {
        let dict = dictionary();
        let holder = write_lock();
        dict.add_or_update("k", "v".into(), &holder).unwrap();

        let other = write_lock();
        assert!(dict.tracked_entities(&other).unwrap().is_empty());
        assert!(!dict.locks().is_held(&other.transaction_id()));
    }

    #[test]
    fn tracked_entities_never_opens_a_transaction() {
        let dict = dictionary();
        for _ in 0..3 {
            assert!(dict.tracked_entities(&write_lock()).unwrap().is_empty());
        }
        assert!(dict.store().open_transactions().is_empty());
    }

    #[test]
    fn read_only_commit_publishes_no_log() {
        let dict = dictionary();
        let lock = IntentionLock::for_keys(TransactionId::new(), ["a"], Intent::Read);

        assert_eq!(dict.get("a", &lock).unwrap(), None);
        assert!(dict.save_changes(&lock).unwrap().is_none());

        assert!(!dict.locks().is_held(&lock.transaction_id()));
        assert!(!dict.store().contains_transaction(&lock.transaction_id()));
        assert_eq!(dict.store().feed().history_len(), 0);
    }
}
