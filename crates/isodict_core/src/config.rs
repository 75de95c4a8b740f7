//! Store configuration.

use std::time::Duration;

/// Configuration for an isolated store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long a transaction may wait for its intention lock.
    ///
    /// `None` waits indefinitely.
    pub lock_timeout: Option<Duration>,

    /// Number of committed logs retained for lazily resynchronizing open
    /// transactions. Transactions that fall further behind re-snapshot.
    pub commit_history: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: None,
            commit_history: 1024,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lock acquisition timeout.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Sets the lock acquisition timeout in milliseconds.
    #[must_use]
    pub const fn lock_timeout_ms(self, millis: u64) -> Self {
        self.lock_timeout(Duration::from_millis(millis))
    }

    /// Waits for locks indefinitely.
    #[must_use]
    pub const fn unbounded_lock_wait(mut self) -> Self {
        self.lock_timeout = None;
        self
    }

    /// Sets how many committed logs are retained.
    #[must_use]
    pub const fn commit_history(mut self, entries: usize) -> Self {
        self.commit_history = entries;
        self
    }
}
