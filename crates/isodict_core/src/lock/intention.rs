//! Intention lock requests.

use crate::types::{Intent, TransactionId};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The keys an intention lock covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LockScope {
    /// Every key in the store, including keys that do not exist yet.
    #[default]
    Store,
    /// A fixed, non-empty set of keys.
    Keys(Arc<BTreeSet<String>>),
}

impl LockScope {
    /// Builds a scope from a key list. An empty list means the whole store.
    pub fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            Self::Store
        } else {
            Self::Keys(Arc::new(keys))
        }
    }

    /// Returns true for the whole-store scope.
    #[must_use]
    pub fn is_whole_store(&self) -> bool {
        matches!(self, Self::Store)
    }

    /// Returns true if `key` falls inside this scope.
    #[must_use]
    pub fn covers(&self, key: &str) -> bool {
        match self {
            Self::Store => true,
            Self::Keys(keys) => keys.contains(key),
        }
    }

    /// Returns the declared keys, or `None` for the whole store.
    #[must_use]
    pub fn keys(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Store => None,
            Self::Keys(keys) => Some(keys),
        }
    }
}

/// A transaction's request to the lock manager.
///
/// The same lock value is presented on every access of a transaction; the
/// manager recognises repeat requests by `transaction_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentionLock {
    transaction_id: TransactionId,
    scope: LockScope,
    intent: Intent,
}

impl IntentionLock {
    /// Creates a lock request.
    #[must_use]
    pub fn new(transaction_id: TransactionId, scope: LockScope, intent: Intent) -> Self {
        Self {
            transaction_id,
            scope,
            intent,
        }
    }

    /// Creates a whole-store request.
    #[must_use]
    pub fn whole_store(transaction_id: TransactionId, intent: Intent) -> Self {
        Self::new(transaction_id, LockScope::Store, intent)
    }

    /// Creates a request over the given keys.
    pub fn for_keys<I, K>(transaction_id: TransactionId, keys: I, intent: Intent) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::new(transaction_id, LockScope::from_keys(keys), intent)
    }

    /// Returns the requesting transaction.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Returns the requested scope.
    #[must_use]
    pub fn scope(&self) -> &LockScope {
        &self.scope
    }

    /// Returns the requested intent.
    #[must_use]
    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// Returns the same request for another transaction.
    #[must_use]
    pub fn with_transaction_id(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = transaction_id;
        self
    }
}

impl Default for IntentionLock {
    fn default() -> Self {
        Self::whole_store(TransactionId::new(), Intent::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_list_is_whole_store() {
        assert_eq!(LockScope::from_keys(Vec::<String>::new()), LockScope::Store);
        assert!(LockScope::from_keys(["a"]).keys().is_some());
    }

    #[test]
    fn scope_coverage() {
        let scope = LockScope::from_keys(["a", "b", "a"]);
        assert!(scope.covers("a"));
        assert!(!scope.covers("c"));
        assert_eq!(scope.keys().map(BTreeSet::len), Some(2));
        assert!(LockScope::Store.covers("anything"));
    }

    #[test]
    fn default_lock_is_whole_store_write() {
        let lock = IntentionLock::default();
        assert!(lock.scope().is_whole_store());
        assert_eq!(lock.intent(), Intent::Write);
    }

    #[test]
    fn with_transaction_id_keeps_scope() {
        let id = TransactionId::new();
        let lock = IntentionLock::for_keys(TransactionId::new(), ["k"], Intent::Read)
            .with_transaction_id(id);
        assert_eq!(lock.transaction_id(), id);
        assert!(lock.scope().covers("k"));
        assert_eq!(lock.intent(), Intent::Read);
    }
}
