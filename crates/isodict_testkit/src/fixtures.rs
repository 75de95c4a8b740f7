//! Dictionary and context fixtures.

use isodict_core::{DictionaryContext, IsolatedDictionary, StoreConfig};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Lock timeout used by [`short_timeout_dictionary`].
pub const SHORT_LOCK_TIMEOUT: Duration = Duration::from_millis(50);

/// Creates a dictionary with default configuration (unbounded lock waits).
pub fn memory_dictionary<V>() -> Arc<IsolatedDictionary<V>>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    Arc::new(IsolatedDictionary::new(StoreConfig::default()))
}

/// Creates a dictionary whose lock waits give up after
/// [`SHORT_LOCK_TIMEOUT`], for tests that expect contention.
pub fn short_timeout_dictionary<V>() -> Arc<IsolatedDictionary<V>>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    Arc::new(IsolatedDictionary::new(
        StoreConfig::new().lock_timeout(SHORT_LOCK_TIMEOUT),
    ))
}

/// Creates two contexts over one short-timeout dictionary.
pub fn context_pair<V>() -> (DictionaryContext<V>, DictionaryContext<V>)
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let dictionary = short_timeout_dictionary();
    (
        DictionaryContext::new(Arc::clone(&dictionary)),
        DictionaryContext::new(dictionary),
    )
}

/// Commits `entries` in one transaction.
///
/// # Panics
///
/// Panics if the commit fails.
pub fn seed<V, I, K>(dictionary: &Arc<IsolatedDictionary<V>>, entries: I)
where
    V: Send + Sync + 'static,
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
{
    let mut ctx = DictionaryContext::new(Arc::clone(dictionary));
    ctx.add_or_update_range(entries).expect("failed to buffer seed entries");
    ctx.commit().expect("failed to commit seed entries");
}

/// Reads a key in a fresh read-only transaction.
///
/// # Panics
///
/// Panics if the read fails.
pub fn read_committed<V>(dictionary: &Arc<IsolatedDictionary<V>>, key: &str) -> Option<V>
where
    V: Send + Sync + 'static,
{
    let mut ctx = DictionaryContext::new(Arc::clone(dictionary));
    ctx.declare_intent([key], true)
        .expect("fresh context accepts an intent");
    ctx.get(key).expect("committed read failed")
}
