//! Transport abstraction for shipping committed logs.

use crate::error::{ReplicationError, ReplicationResult};
use isodict_codec::{from_cbor, to_cbor};
use isodict_core::{CommittedLog, Intent, IntentionLock, IsolatedDictionary, TransactionId};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Delivers committed logs from a leader to its followers.
///
/// Implementations must deliver logs in the order they are shipped.
pub trait LogTransport<V>: Send + Sync {
    /// Ships one committed log.
    fn ship(&self, log: &CommittedLog<V>) -> ReplicationResult<()>;
}

/// Accepts committed logs on the follower side.
pub trait LogReceiver<V>: Send + Sync {
    /// Applies one log. Returns false if it was already applied.
    fn receive(&self, log: &CommittedLog<V>) -> ReplicationResult<bool>;
}

impl<V> LogReceiver<V> for IsolatedDictionary<V>
where
    V: Send + Sync + 'static,
{
    /// Applies the log under a whole-store write lock, so no local
    /// transaction observes half of it.
    fn receive(&self, log: &CommittedLog<V>) -> ReplicationResult<bool> {
        let lock = IntentionLock::whole_store(TransactionId::new(), Intent::Write);
        self.locks().next_acquire(&lock)?;
        let applied = self.store().apply_committed(log);
        self.locks().release(&lock)?;
        Ok(applied?)
    }
}

/// An in-process transport that runs every log through the CBOR wire
/// encoding before handing it to its followers.
pub struct LoopbackTransport<V> {
    followers: RwLock<Vec<Arc<dyn LogReceiver<V>>>>,
    bytes_shipped: AtomicU64,
}

impl<V> LoopbackTransport<V> {
    /// Creates a transport with no followers.
    pub fn new() -> Self {
        Self {
            followers: RwLock::new(Vec::new()),
            bytes_shipped: AtomicU64::new(0),
        }
    }

    /// Adds a follower. Logs shipped afterwards are delivered to it.
    pub fn attach(&self, follower: Arc<dyn LogReceiver<V>>) {
        self.followers.write().push(follower);
    }

    /// Returns the number of attached followers.
    pub fn follower_count(&self) -> usize {
        self.followers.read().len()
    }

    /// Returns the total encoded size of every log shipped.
    pub fn bytes_shipped(&self) -> u64 {
        self.bytes_shipped.load(Ordering::Relaxed)
    }
}

impl<V> Default for LoopbackTransport<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for LoopbackTransport<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("followers", &self.follower_count())
            .field("bytes_shipped", &self.bytes_shipped())
            .finish()
    }
}

impl<V> LogTransport<V> for LoopbackTransport<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn ship(&self, log: &CommittedLog<V>) -> ReplicationResult<()> {
        let frame = to_cbor(log)?;
        self.bytes_shipped
            .fetch_add(frame.len() as u64, Ordering::Relaxed);

        for follower in self.followers.read().iter() {
            let decoded: CommittedLog<V> = from_cbor(&frame)?;
            follower.receive(&decoded)?;
        }
        tracing::trace!(
            commit_time = %log.commit_time(),
            bytes = frame.len(),
            "log shipped over loopback"
        );
        Ok(())
    }
}

/// A transport for tests that records what it is asked to ship.
#[derive(Debug)]
pub struct MockTransport<V> {
    shipped: Mutex<Vec<CommittedLog<V>>>,
    failing: AtomicBool,
}

impl<V> MockTransport<V> {
    /// Creates a mock transport that accepts every log.
    pub fn new() -> Self {
        Self {
            shipped: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Makes subsequent shipments fail with a retryable error, or succeed
    /// again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the number of logs accepted so far.
    pub fn shipped_count(&self) -> usize {
        self.shipped.lock().len()
    }
}

impl<V: Clone> MockTransport<V> {
    /// Returns every accepted log, in shipping order.
    pub fn shipped(&self) -> Vec<CommittedLog<V>> {
        self.shipped.lock().clone()
    }
}

impl<V> Default for MockTransport<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> LogTransport<V> for MockTransport<V>
where
    V: Clone + Send + Sync,
{
    fn ship(&self, log: &CommittedLog<V>) -> ReplicationResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReplicationError::transport_retryable(
                "mock transport is failing",
            ));
        }
        self.shipped.lock().push(log.clone());
        Ok(())
    }
}
