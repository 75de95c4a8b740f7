//! The unit-of-work façade.

use crate::dictionary::IsolatedDictionary;
use crate::error::{CoreError, CoreResult};
use crate::lock::{IntentionLock, LockScope};
use crate::store::CommittedLog;
use crate::types::{Intent, TransactionId};
use std::sync::Arc;

/// Lifecycle of a [`DictionaryContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// No transaction in progress.
    Idle,
    /// A transaction has started and may have buffered writes.
    Active,
}

/// A reusable unit of work over an [`IsolatedDictionary`].
///
/// The first operation after creation (or after a commit or rollback)
/// starts a transaction with a fresh ID. Until [`declare_intent`] is called
/// the transaction locks the whole store for writing.
///
/// A context is used by one thread at a time. Dropping an active context
/// rolls it back.
///
/// ```
/// use isodict_core::{DictionaryContext, IsolatedDictionary, StoreConfig};
/// use std::sync::Arc;
///
/// let dict = Arc::new(IsolatedDictionary::<String>::new(StoreConfig::default()));
///
/// let mut ctx = DictionaryContext::new(Arc::clone(&dict));
/// ctx.add_or_update("greeting", "hello".to_string())?;
/// assert_eq!(ctx.get("greeting")?.as_deref(), Some("hello"));
/// ctx.commit()?;
///
/// let mut reader = DictionaryContext::new(dict);
/// reader.declare_intent(["greeting"], true)?;
/// assert_eq!(reader.get("greeting")?.as_deref(), Some("hello"));
/// # Ok::<(), isodict_core::CoreError>(())
/// ```
///
/// [`declare_intent`]: DictionaryContext::declare_intent
#[derive(Debug)]
pub struct DictionaryContext<V>
where
    V: Send + Sync + 'static,
{
    dictionary: Arc<IsolatedDictionary<V>>,
    lock: IntentionLock,
    state: ContextState,
    intent_declared: bool,
}

impl<V> DictionaryContext<V>
where
    V: Send + Sync + 'static,
{
    /// Creates an idle context.
    #[must_use]
    pub fn new(dictionary: Arc<IsolatedDictionary<V>>) -> Self {
        Self {
            dictionary,
            lock: IntentionLock::default(),
            state: ContextState::Idle,
            intent_declared: false,
        }
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Returns the ID of the current (or next) transaction.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.lock.transaction_id()
    }

    /// Returns the lock this context presents.
    #[must_use]
    pub fn lock(&self) -> &IntentionLock {
        &self.lock
    }

    /// Returns the dictionary this context works on.
    #[must_use]
    pub fn dictionary(&self) -> &Arc<IsolatedDictionary<V>> {
        &self.dictionary
    }

    /// Fixes the key scope and intent of the coming transaction.
    ///
    /// An empty key list means the whole store. Allowed once per
    /// transaction, before its first operation.
    pub fn declare_intent<I, K>(&mut self, keys: I, read_only: bool) -> CoreResult<()>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        if self.intent_declared {
            return Err(CoreError::validation("intent was already declared"));
        }
        if self.state == ContextState::Active {
            return Err(CoreError::validation(
                "intent must be declared before the first operation",
            ));
        }
        self.lock = IntentionLock::new(
            self.lock.transaction_id(),
            LockScope::from_keys(keys),
            Intent::from_read_only(read_only),
        );
        self.intent_declared = true;
        Ok(())
    }

    fn begin(&mut self) {
        if self.state == ContextState::Idle {
            self.lock = self.lock.clone().with_transaction_id(TransactionId::new());
            self.state = ContextState::Active;
        }
    }

    fn reset(&mut self) {
        self.lock = IntentionLock::default();
        self.state = ContextState::Idle;
        self.intent_declared = false;
    }

    fn check_key(&self, key: &str) -> CoreResult<()> {
        if self.lock.scope().covers(key) {
            Ok(())
        } else {
            Err(CoreError::validation(format!(
                "key '{key}' is outside the declared scope"
            )))
        }
    }

    fn check_write(&self, key: &str) -> CoreResult<()> {
        if self.lock.intent() != Intent::Write {
            return Err(CoreError::validation(format!(
                "cannot write '{key}' under {} intent",
                self.lock.intent()
            )));
        }
        self.check_key(key)
    }

    fn check_whole_store(&self, operation: &str) -> CoreResult<()> {
        if self.lock.scope().is_whole_store() {
            Ok(())
        } else {
            Err(CoreError::validation(format!(
                "{operation} requires a whole-store scope"
            )))
        }
    }

    /// Reads a key.
    pub fn get(&mut self, key: &str) -> CoreResult<Option<V>> {
        self.check_key(key)?;
        self.begin();
        self.dictionary.get(key, &self.lock)
    }

    /// Adds or replaces a value.
    pub fn add_or_update(&mut self, key: impl Into<String>, value: V) -> CoreResult<()> {
        let key = key.into();
        self.check_write(&key)?;
        self.begin();
        self.dictionary.add_or_update(key, value, &self.lock)?;
        Ok(())
    }

    /// Adds or replaces several values. Either every key passes validation
    /// and all are buffered, or nothing is.
    pub fn add_or_update_range<I, K>(&mut self, items: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        let items: Vec<(String, V)> = items
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect();
        for (key, _) in &items {
            self.check_write(key)?;
        }
        self.begin();
        self.dictionary.add_or_update_range(items, &self.lock)?;
        Ok(())
    }

    /// Removes a key.
    pub fn remove(&mut self, key: impl Into<String>) -> CoreResult<()> {
        let key = key.into();
        self.check_write(&key)?;
        self.begin();
        self.dictionary.remove(key, &self.lock)?;
        Ok(())
    }

    /// Counts the keys visible to this transaction.
    pub fn count(&mut self) -> CoreResult<usize> {
        self.check_whole_store("count")?;
        self.begin();
        self.dictionary.count(&self.lock)
    }

    /// Returns every visible entry, ordered by key.
    pub fn get_all(&mut self) -> CoreResult<Vec<(String, V)>> {
        self.check_whole_store("get_all")?;
        self.begin();
        self.dictionary.get_all(&self.lock)
    }

    /// Returns copies of the values this transaction has added or updated.
    pub fn tracked_entities(&self) -> CoreResult<Vec<V>> {
        if self.state == ContextState::Idle {
            return Ok(Vec::new());
        }
        self.dictionary.tracked_entities(&self.lock)
    }

    /// Commits the transaction and returns to idle.
    ///
    /// Committing an idle context does nothing. On failure the context stays
    /// active and keeps its lock; roll back to give up.
    pub fn commit(&mut self) -> CoreResult<Option<Arc<CommittedLog<V>>>> {
        if self.state == ContextState::Idle {
            self.reset();
            return Ok(None);
        }
        let log = self.dictionary.save_changes(&self.lock)?;
        self.reset();
        Ok(log)
    }

    /// Discards the transaction and returns to idle. Always safe to call.
    pub fn rollback(&mut self) -> CoreResult<()> {
        if self.state == ContextState::Active {
            self.dictionary.undo_changes(&self.lock)?;
        }
        self.reset();
        Ok(())
    }
}

impl<V> Drop for DictionaryContext<V>
where
    V: Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.state == ContextState::Active {
            if let Err(err) = self.rollback() {
                tracing::warn!(
                    txn = %self.lock.transaction_id(),
                    error = %err,
                    "rollback on drop failed"
                );
            }
        }
    }
}
