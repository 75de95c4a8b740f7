//! Commit feed for observing committed write logs.
//!
//! Every successful commit produces one [`CommittedLog`]. The feed keeps a
//! bounded history of them, which serves two readers:
//! - open transactions catching up lazily with commits they missed
//! - replication, which subscribes or polls to ship logs to followers
//!
//! # Usage
//!
//! ```rust
//! use isodict_core::{CommitFeed, CommittedLog, Timestamp, TransactionId, WriteOperation};
//!
//! let feed = CommitFeed::<i32>::with_max_history(16);
//! let receiver = feed.subscribe();
//!
//! feed.emit(CommittedLog::new(
//!     TransactionId::new(),
//!     Timestamp::new(2),
//!     vec![WriteOperation::add_or_update("a", 1, Timestamp::new(1))],
//! ));
//!
//! let log = receiver.recv().unwrap();
//! assert_eq!(log.commit_time(), Timestamp::new(2));
//! ```

use crate::transaction::WriteOperation;
use crate::types::{Timestamp, TransactionId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// The operations of one commit, in log order, with its commit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedLog<V> {
    transaction_id: TransactionId,
    commit_time: Timestamp,
    operations: Vec<WriteOperation<V>>,
}

impl<V> CommittedLog<V> {
    /// Creates a committed log.
    #[must_use]
    pub fn new(
        transaction_id: TransactionId,
        commit_time: Timestamp,
        operations: Vec<WriteOperation<V>>,
    ) -> Self {
        Self {
            transaction_id,
            commit_time,
            operations,
        }
    }

    /// Returns the committing transaction.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Returns the commit timestamp.
    #[must_use]
    pub fn commit_time(&self) -> Timestamp {
        self.commit_time
    }

    /// Returns the applied operations in log order.
    #[must_use]
    pub fn operations(&self) -> &[WriteOperation<V>] {
        &self.operations
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true for a commit that wrote nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[derive(Debug)]
struct History<V> {
    entries: VecDeque<Arc<CommittedLog<V>>>,
    /// Commit time of the newest entry evicted so far.
    evicted_through: Timestamp,
}

/// Distributes committed logs to subscribers and retains recent ones.
///
/// The feed:
/// - emits only committed logs
/// - preserves commit order
/// - supports multiple subscribers
pub struct CommitFeed<V> {
    /// Subscribers (senders).
    subscribers: RwLock<Vec<Sender<Arc<CommittedLog<V>>>>>,
    /// Recent logs for catch-up and polling.
    history: RwLock<History<V>>,
    /// Maximum history size.
    max_history: usize,
}

impl<V> CommitFeed<V> {
    /// Creates a feed with a specific history limit.
    #[must_use]
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(History {
                entries: VecDeque::new(),
                evicted_through: Timestamp::ZERO,
            }),
            max_history,
        }
    }

    /// Subscribes to the feed.
    ///
    /// The receiver gets every log emitted after this call. It should be
    /// drained regularly to avoid unbounded memory growth.
    pub fn subscribe(&self) -> Receiver<Arc<CommittedLog<V>>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Records a log and sends it to every subscriber.
    ///
    /// Callers emit in commit order.
    pub fn emit(&self, log: CommittedLog<V>) -> Arc<CommittedLog<V>> {
        let log = Arc::new(log);
        {
            let mut history = self.history.write();
            history.entries.push_back(Arc::clone(&log));
            while history.entries.len() > self.max_history {
                if let Some(evicted) = history.entries.pop_front() {
                    history.evicted_through = evicted.commit_time;
                }
            }
        }

        // Disconnected subscribers are dropped.
        self.subscribers
            .write()
            .retain(|tx| tx.send(Arc::clone(&log)).is_ok());
        log
    }

    /// Returns every retained log committed after `horizon`, oldest first.
    ///
    /// Returns `None` if some log after `horizon` was already evicted, in
    /// which case the caller cannot catch up from the history alone.
    #[must_use]
    pub fn since(&self, horizon: Timestamp) -> Option<Vec<Arc<CommittedLog<V>>>> {
        let history = self.history.read();
        if horizon < history.evicted_through {
            return None;
        }
        Some(
            history
                .entries
                .iter()
                .filter(|log| log.commit_time > horizon)
                .cloned()
                .collect(),
        )
    }

    /// Polls logs committed after `cursor`, up to `limit`.
    #[must_use]
    pub fn poll(&self, cursor: Timestamp, limit: usize) -> Vec<Arc<CommittedLog<V>>> {
        self.history
            .read()
            .entries
            .iter()
            .filter(|log| log.commit_time > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the most recent log.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<CommittedLog<V>>> {
        self.history.read().entries.back().cloned()
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of retained logs.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.read().entries.len()
    }
}

impl<V> std::fmt::Debug for CommitFeed<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitFeed")
            .field("subscribers", &self.subscriber_count())
            .field("history", &self.history_len())
            .field("max_history", &self.max_history)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn log(commit_time: u64) -> CommittedLog<u64> {
        CommittedLog::new(
            TransactionId::new(),
            Timestamp::new(commit_time),
            vec![WriteOperation::add_or_update(
                format!("k{commit_time}"),
                commit_time,
                Timestamp::new(commit_time - 1),
            )],
        )
    }

    #[test]
    fn emit_and_receive() {
        let feed = CommitFeed::with_max_history(8);
        let rx = feed.subscribe();

        let sent = feed.emit(log(2));

        let received = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received, sent);
    }

    #[test]
    fn multiple_subscribers() {
        let feed = CommitFeed::with_max_history(8);
        let rx1 = feed.subscribe();
        let rx2 = feed.subscribe();

        feed.emit(log(2));

        assert_eq!(rx1.recv().unwrap().commit_time(), Timestamp::new(2));
        assert_eq!(rx2.recv().unwrap().commit_time(), Timestamp::new(2));
    }

    #[test]
    fn subscriber_cleanup() {
        let feed = CommitFeed::with_max_history(8);
        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        drop(rx);
        feed.emit(log(2));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn poll_from_cursor() {
        let feed = CommitFeed::with_max_history(16);
        for t in 1..=5 {
            feed.emit(log(t * 2));
        }

        let logs = feed.poll(Timestamp::new(4), 10);
        let times: Vec<_> = logs.iter().map(|l| l.commit_time().as_u64()).collect();
        assert_eq!(times, vec![6, 8, 10]);

        assert_eq!(feed.poll(Timestamp::ZERO, 2).len(), 2);
    }

    #[test]
    fn since_detects_evicted_history() {
        let feed = CommitFeed::with_max_history(3);
        for t in 1..=6 {
            feed.emit(log(t * 10));
        }

        assert_eq!(feed.history_len(), 3);
        assert!(feed.since(Timestamp::new(15)).is_none());

        let caught_up = feed.since(Timestamp::new(30)).unwrap();
        assert_eq!(caught_up.len(), 3);
        assert_eq!(feed.since(Timestamp::new(60)).unwrap().len(), 0);
    }

    #[test]
    fn latest_log() {
        let feed = CommitFeed::with_max_history(4);
        assert!(feed.latest().is_none());

        feed.emit(log(5));
        feed.emit(log(9));
        assert_eq!(feed.latest().map(|l| l.commit_time()), Some(Timestamp::new(9)));
    }

    #[test]
    fn threaded_subscribe() {
        let feed = Arc::new(CommitFeed::with_max_history(4));
        let rx = feed.subscribe();

        let emitter = Arc::clone(&feed);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            emitter.emit(log(42));
        });

        let received = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(received.operations()[0].value(), Some(&42));

        handle.join().unwrap();
    }
}
