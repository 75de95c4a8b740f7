//! Leader and follower replication driver.

use crate::config::{ReplicationConfig, ReplicationRole};
use crate::error::{ReplicationError, ReplicationResult};
use crate::transport::{LogReceiver, LogTransport};
use isodict_core::{CommittedLog, IsolatedDictionary, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;

/// Statistics about replication.
#[derive(Debug, Clone, Default)]
pub struct ReplicationStats {
    /// Logs shipped by a leader.
    pub shipped: u64,
    /// Logs applied by a follower.
    pub received: u64,
    /// Logs a follower had already applied.
    pub ignored: u64,
    /// Failed shipments or applications.
    pub failures: u64,
    /// Commit time of the newest log shipped or applied.
    pub last_commit_time: Option<Timestamp>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Logs waiting to be shipped, ordered by commit time.
struct Backlog<V> {
    pending: BTreeMap<Timestamp, Arc<CommittedLog<V>>>,
    shipped_through: Timestamp,
}

impl<V> Backlog<V> {
    fn enqueue(&mut self, log: Arc<CommittedLog<V>>) {
        if log.commit_time() > self.shipped_through {
            self.pending.insert(log.commit_time(), log);
        }
    }
}

/// Replicates one dictionary.
///
/// A leader subscribes to its dictionary's commit feed when created and
/// ships each committed log, in commit order, through its transport on
/// [`Replicator::pump`]. A follower applies logs handed to
/// [`Replicator::receive`]. Calling the other role's side is an error.
pub struct Replicator<V, T: LogTransport<V>> {
    config: ReplicationConfig,
    dictionary: Arc<IsolatedDictionary<V>>,
    transport: Arc<T>,
    subscription: Option<Mutex<Receiver<Arc<CommittedLog<V>>>>>,
    backlog: Mutex<Backlog<V>>,
    stats: RwLock<ReplicationStats>,
}

impl<V, T> Replicator<V, T>
where
    V: Send + Sync + 'static,
    T: LogTransport<V>,
{
    /// Creates a replicator for `dictionary`.
    pub fn new(
        config: ReplicationConfig,
        dictionary: Arc<IsolatedDictionary<V>>,
        transport: T,
    ) -> Self {
        let subscription = config
            .role
            .is_leader()
            .then(|| Mutex::new(dictionary.store().subscribe()));
        Self {
            config,
            dictionary,
            transport: Arc::new(transport),
            subscription,
            backlog: Mutex::new(Backlog {
                pending: BTreeMap::new(),
                shipped_through: Timestamp::ZERO,
            }),
            stats: RwLock::new(ReplicationStats::default()),
        }
    }

    /// Returns the role of this replica.
    pub fn role(&self) -> ReplicationRole {
        self.config.role
    }

    /// Returns the replicated dictionary.
    pub fn dictionary(&self) -> &Arc<IsolatedDictionary<V>> {
        &self.dictionary
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> ReplicationStats {
        self.stats.read().clone()
    }

    /// Returns the number of logs waiting to be shipped.
    pub fn pending(&self) -> ReplicationResult<usize> {
        let mut backlog = self.backlog.lock();
        self.drain_subscription(&mut backlog)?;
        Ok(backlog.pending.len())
    }

    /// Queues logs committed after `cursor` that are still in the commit
    /// history, including ones committed before this replicator existed.
    ///
    /// Returns the number of logs queued.
    pub fn backfill(&self, cursor: Timestamp) -> ReplicationResult<usize> {
        self.ensure_leader()?;
        let mut backlog = self.backlog.lock();
        self.drain_subscription(&mut backlog)?;
        let before = backlog.pending.len();
        for log in self.dictionary.store().poll(cursor, usize::MAX) {
            backlog.enqueue(log);
        }
        Ok(backlog.pending.len() - before)
    }

    /// Ships up to `max_batch` pending logs in commit order.
    ///
    /// A failed shipment stays at the head of the backlog and is retried
    /// by the next pump. Returns the number of logs shipped.
    pub fn pump(&self) -> ReplicationResult<usize> {
        self.ensure_leader()?;
        let mut backlog = self.backlog.lock();
        self.drain_subscription(&mut backlog)?;

        let mut shipped = 0;
        while shipped < self.config.max_batch {
            let Some((&commit_time, log)) = backlog.pending.first_key_value() else {
                break;
            };
            if let Err(err) = self.transport.ship(log) {
                tracing::warn!(
                    commit_time = %commit_time,
                    error = %err,
                    retryable = err.is_retryable(),
                    "failed to ship committed log"
                );
                self.record_failure(&err);
                return Err(err);
            }
            backlog.pending.remove(&commit_time);
            backlog.shipped_through = commit_time;
            shipped += 1;

            let mut stats = self.stats.write();
            stats.shipped += 1;
            stats.last_commit_time = Some(commit_time);
            stats.last_error = None;
        }

        if shipped > 0 {
            tracing::debug!(
                shipped,
                remaining = backlog.pending.len(),
                "replication pump finished"
            );
        }
        Ok(shipped)
    }

    /// Applies a log shipped by the leader.
    ///
    /// Returns false if the log was already applied.
    pub fn receive(&self, log: &CommittedLog<V>) -> ReplicationResult<bool> {
        if self.config.role.is_leader() {
            return Err(ReplicationError::NotFollower);
        }
        let applied = match self.dictionary.receive(log) {
            Ok(applied) => applied,
            Err(err) => {
                tracing::warn!(
                    txn = %log.transaction_id(),
                    error = %err,
                    "failed to apply replicated log"
                );
                self.record_failure(&err);
                return Err(err);
            }
        };

        let mut stats = self.stats.write();
        if applied {
            stats.received += 1;
            stats.last_commit_time = Some(log.commit_time());
        } else {
            stats.ignored += 1;
        }
        Ok(applied)
    }

    fn ensure_leader(&self) -> ReplicationResult<()> {
        if self.config.role.is_leader() {
            Ok(())
        } else {
            Err(ReplicationError::NotLeader)
        }
    }

    fn drain_subscription(&self, backlog: &mut Backlog<V>) -> ReplicationResult<()> {
        let Some(subscription) = &self.subscription else {
            return Ok(());
        };
        let receiver = subscription.lock();
        loop {
            match receiver.try_recv() {
                Ok(log) => backlog.enqueue(log),
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => return Err(ReplicationError::Disconnected),
            }
        }
    }

    fn record_failure(&self, err: &ReplicationError) {
        let mut stats = self.stats.write();
        stats.failures += 1;
        stats.last_error = Some(err.to_string());
    }
}

impl<V, T> LogReceiver<V> for Replicator<V, T>
where
    V: Send + Sync + 'static,
    T: LogTransport<V>,
{
    fn receive(&self, log: &CommittedLog<V>) -> ReplicationResult<bool> {
        Replicator::receive(self, log)
    }
}

impl<V, T: LogTransport<V>> std::fmt::Debug for Replicator<V, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("config", &self.config)
            .field("pending", &self.backlog.lock().pending.len())
            .field("stats", &*self.stats.read())
            .finish()
    }
}
