//! The selective-release intention lock manager.

use crate::error::{CoreError, CoreResult};
use crate::lock::{IntentionLock, LockScope};
use crate::types::{Intent, TransactionId};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Outcome of a successful [`SelectiveRelease::next_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// The transaction already held its lock.
    AlreadyHeld,
    /// The lock was granted by this call.
    Granted,
}

impl Acquisition {
    /// Returns true if the lock was newly granted.
    #[must_use]
    pub fn is_new(self) -> bool {
        matches!(self, Self::Granted)
    }
}

#[derive(Debug, Clone, Copy)]
struct Hold {
    intent: Intent,
    holders: usize,
}

impl Hold {
    const FREE: Self = Self {
        intent: Intent::None,
        holders: 0,
    };
}

#[derive(Debug, Default)]
struct LockTable {
    /// Granted locks by transaction.
    ongoing: HashMap<TransactionId, IntentionLock>,
    /// Requests not yet granted, in arrival order.
    waiting: Vec<IntentionLock>,
    /// Per-key holds of partial-scope locks.
    keys: HashMap<String, Hold>,
    /// The whole-store hold.
    store: Option<Hold>,
}

impl LockTable {
    fn store_hold(&self) -> Hold {
        self.store.unwrap_or(Hold::FREE)
    }

    fn any_key_written(&self) -> bool {
        self.keys.values().any(|hold| hold.intent == Intent::Write)
    }

    fn can_grant(&self, lock: &IntentionLock) -> bool {
        let store = self.store_hold();
        match (lock.scope(), lock.intent()) {
            (_, Intent::None) => true,
            (LockScope::Store, Intent::Read) => {
                store.intent != Intent::Write && !self.any_key_written()
            }
            (LockScope::Store, Intent::Write) => store.holders == 0 && self.keys.is_empty(),
            (LockScope::Keys(keys), intent) => {
                let store_blocks = match store.intent {
                    Intent::Write => true,
                    Intent::Read => intent == Intent::Write,
                    Intent::None => false,
                };
                !store_blocks
                    && keys.iter().all(|key| match self.keys.get(key) {
                        None => true,
                        Some(hold) => hold.intent == Intent::Read && intent == Intent::Read,
                    })
            }
        }
    }

    fn stamp(&mut self, lock: &IntentionLock) {
        if lock.intent() == Intent::None {
            return;
        }
        match lock.scope() {
            LockScope::Store => {
                let hold = self.store.get_or_insert(Hold::FREE);
                hold.intent = lock.intent();
                hold.holders += 1;
            }
            LockScope::Keys(keys) => {
                for key in keys.iter() {
                    let hold = self.keys.entry(key.clone()).or_insert(Hold::FREE);
                    hold.intent = lock.intent();
                    hold.holders += 1;
                }
            }
        }
    }

    fn unstamp(&mut self, lock: &IntentionLock) -> CoreResult<()> {
        if lock.intent() == Intent::None {
            return Ok(());
        }
        match lock.scope() {
            LockScope::Store => {
                let hold = self
                    .store
                    .as_mut()
                    .filter(|hold| hold.holders > 0)
                    .ok_or_else(|| {
                        CoreError::lock_invariant(format!(
                            "{} released a whole-store hold that is not held",
                            lock.transaction_id()
                        ))
                    })?;
                hold.holders -= 1;
                if hold.holders == 0 {
                    self.store = None;
                }
            }
            LockScope::Keys(keys) => {
                for key in keys.iter() {
                    let hold = self
                        .keys
                        .get_mut(key)
                        .filter(|hold| hold.holders > 0)
                        .ok_or_else(|| {
                            CoreError::lock_invariant(format!(
                                "{} released key '{key}' that is not held",
                                lock.transaction_id()
                            ))
                        })?;
                    hold.holders -= 1;
                    if hold.holders == 0 {
                        self.keys.remove(key);
                    }
                }
            }
        }
        Ok(())
    }

    fn try_grant(&mut self, lock: IntentionLock) -> Result<(), IntentionLock> {
        if !self.can_grant(&lock) {
            return Err(lock);
        }
        self.stamp(&lock);
        tracing::debug!(
            txn = %lock.transaction_id(),
            intent = %lock.intent(),
            whole_store = lock.scope().is_whole_store(),
            "intention lock granted"
        );
        self.ongoing.insert(lock.transaction_id(), lock);
        Ok(())
    }

    /// Grants every waiter whose scope no longer collides, in arrival order.
    fn grant_waiting(&mut self) -> usize {
        let mut granted = 0;
        let mut index = 0;
        while index < self.waiting.len() {
            if self.can_grant(&self.waiting[index]) {
                let lock = self.waiting.remove(index);
                if self.try_grant(lock).is_ok() {
                    granted += 1;
                }
            } else {
                index += 1;
            }
        }
        granted
    }

    fn is_waiting(&self, id: &TransactionId) -> bool {
        self.waiting.iter().any(|lock| lock.transaction_id() == *id)
    }

    fn remove_waiting(&mut self, id: &TransactionId) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|lock| lock.transaction_id() != *id);
        self.waiting.len() != before
    }
}

/// Arbitrates intention locks between transactions.
///
/// Compatible requests (readers over overlapping scopes, or any requests
/// over disjoint key sets) proceed together. A writer excludes every other
/// request that overlaps its scope. Waiters are re-evaluated in arrival
/// order whenever a lock is released, and a later waiter may overtake an
/// earlier one whose scope still collides.
///
/// Blocked callers park on a condition variable until granted or until the
/// configured timeout elapses.
#[derive(Debug)]
pub struct SelectiveRelease {
    table: Mutex<LockTable>,
    granted: Condvar,
    timeout: Option<Duration>,
}

impl SelectiveRelease {
    /// Creates a lock manager. `None` waits indefinitely.
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            granted: Condvar::new(),
            timeout,
        }
    }

    /// Returns the configured acquisition timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Blocks until `lock` is granted.
    ///
    /// Returns [`Acquisition::AlreadyHeld`] when the transaction already
    /// holds its lock. A caller that times out is removed from the queue and
    /// gets [`CoreError::LockTimeout`]; it may call again later.
    pub fn next_acquire(&self, lock: &IntentionLock) -> CoreResult<Acquisition> {
        let id = lock.transaction_id();
        let mut table = self.table.lock();

        if table.ongoing.contains_key(&id) {
            return Ok(Acquisition::AlreadyHeld);
        }
        if !table.is_waiting(&id) {
            match table.try_grant(lock.clone()) {
                Ok(()) => return Ok(Acquisition::Granted),
                Err(lock) => table.waiting.push(lock),
            }
        }

        tracing::debug!(
            txn = %id,
            waiting = table.waiting.len(),
            "intention lock queued"
        );

        let started = Instant::now();
        let deadline = self.timeout.map(|timeout| started + timeout);
        loop {
            match deadline {
                Some(deadline) => {
                    let timed_out = self.granted.wait_until(&mut table, deadline).timed_out();
                    if table.ongoing.contains_key(&id) {
                        return Ok(Acquisition::Granted);
                    }
                    if !table.is_waiting(&id) {
                        return Err(withdrawn(id));
                    }
                    if timed_out {
                        table.remove_waiting(&id);
                        let waited = started.elapsed();
                        tracing::warn!(txn = %id, ?waited, "intention lock timed out");
                        return Err(CoreError::LockTimeout { id, waited });
                    }
                }
                None => {
                    self.granted.wait(&mut table);
                    if table.ongoing.contains_key(&id) {
                        return Ok(Acquisition::Granted);
                    }
                    if !table.is_waiting(&id) {
                        return Err(withdrawn(id));
                    }
                }
            }
        }
    }

    /// Releases the lock held by `lock`'s transaction, or abandons its
    /// queued request, then grants whatever waiters no longer collide.
    ///
    /// Returns false if the transaction was neither holding nor waiting.
    pub fn release(&self, lock: &IntentionLock) -> CoreResult<bool> {
        self.release_id(&lock.transaction_id())
    }

    /// Releases by transaction ID.
    pub fn release_id(&self, id: &TransactionId) -> CoreResult<bool> {
        let mut table = self.table.lock();

        let Some(held) = table.ongoing.remove(id) else {
            drop(table);
            return Ok(self.forfeit(id));
        };

        if let Err(err) = table.unstamp(&held) {
            tracing::error!(txn = %id, error = %err, "lock bookkeeping is inconsistent");
            return Err(err);
        }
        let granted = table.grant_waiting();
        tracing::debug!(txn = %id, granted, "intention lock released");
        drop(table);

        if granted > 0 {
            self.granted.notify_all();
        }
        Ok(true)
    }

    /// Drops a queued request without touching held locks.
    ///
    /// Returns true if a request was dequeued. A caller still parked on that
    /// request wakes up with a validation error.
    pub fn forfeit(&self, id: &TransactionId) -> bool {
        let removed = self.table.lock().remove_waiting(id);
        if removed {
            tracing::debug!(txn = %id, "queued intention lock forfeited");
            self.granted.notify_all();
        }
        removed
    }

    /// Returns true if the transaction currently holds its lock.
    #[must_use]
    pub fn is_held(&self, id: &TransactionId) -> bool {
        self.table.lock().ongoing.contains_key(id)
    }

    /// Returns the number of queued requests.
    #[must_use]
    pub fn waiting_count(&self) -> usize {
        self.table.lock().waiting.len()
    }

    /// Returns the number of granted locks.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.table.lock().ongoing.len()
    }

    /// Returns the intent currently held over the whole store.
    #[must_use]
    pub fn store_intent(&self) -> Intent {
        self.table.lock().store_hold().intent
    }
}

fn withdrawn(id: TransactionId) -> CoreError {
    CoreError::validation(format!("lock request of {id} was withdrawn while waiting"))
}

impl Default for SelectiveRelease {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn store_lock(intent: Intent) -> IntentionLock {
        IntentionLock::whole_store(TransactionId::new(), intent)
    }

    fn key_lock(keys: &[&str], intent: Intent) -> IntentionLock {
        IntentionLock::for_keys(TransactionId::new(), keys.iter().copied(), intent)
    }

    fn short() -> SelectiveRelease {
        SelectiveRelease::new(Some(Duration::from_millis(20)))
    }

    #[test]
    fn reacquire_is_already_held() {
        let locks = SelectiveRelease::default();
        let lock = store_lock(Intent::Write);

        assert_eq!(locks.next_acquire(&lock).unwrap(), Acquisition::Granted);
        assert_eq!(locks.next_acquire(&lock).unwrap(), Acquisition::AlreadyHeld);
        assert!(locks.is_held(&lock.transaction_id()));
    }

    #[test]
    fn whole_store_readers_share() {
        let locks = short();
        let a = store_lock(Intent::Read);
        let b = store_lock(Intent::Read);

        assert!(locks.next_acquire(&a).unwrap().is_new());
        assert!(locks.next_acquire(&b).unwrap().is_new());
        assert_eq!(locks.store_intent(), Intent::Read);
        assert_eq!(locks.held_count(), 2);
    }

    #[test]
    fn whole_store_writer_excludes_everyone() {
        let locks = short();
        locks.next_acquire(&store_lock(Intent::Write)).unwrap();

        for lock in [
            store_lock(Intent::Read),
            store_lock(Intent::Write),
            key_lock(&["a"], Intent::Read),
            key_lock(&["a"], Intent::Write),
        ] {
            let err = locks.next_acquire(&lock).unwrap_err();
            assert!(err.is_retryable());
        }
        assert_eq!(locks.waiting_count(), 0);
    }

    #[test]
    fn key_writer_blocks_whole_store_reader() {
        let locks = short();
        locks.next_acquire(&key_lock(&["a"], Intent::Write)).unwrap();

        assert!(locks.next_acquire(&store_lock(Intent::Read)).is_err());
        assert!(locks.next_acquire(&store_lock(Intent::Write)).is_err());
    }

    #[test]
    fn store_reader_blocks_key_writer_only() {
        let locks = short();
        locks.next_acquire(&store_lock(Intent::Read)).unwrap();

        assert!(locks.next_acquire(&key_lock(&["a"], Intent::Read)).is_ok());
        assert!(locks.next_acquire(&key_lock(&["b"], Intent::Write)).is_err());
    }

    #[test]
    fn disjoint_key_writers_proceed() {
        let locks = short();
        assert!(locks.next_acquire(&key_lock(&["a"], Intent::Write)).is_ok());
        assert!(locks.next_acquire(&key_lock(&["b"], Intent::Write)).is_ok());
        assert!(locks.next_acquire(&key_lock(&["b", "c"], Intent::Read)).is_err());
        assert!(locks.next_acquire(&key_lock(&["c"], Intent::Read)).is_ok());
    }

    #[test]
    fn key_readers_share_and_exclude_writer() {
        let locks = short();
        assert!(locks.next_acquire(&key_lock(&["a"], Intent::Read)).is_ok());
        assert!(locks.next_acquire(&key_lock(&["a"], Intent::Read)).is_ok());
        assert!(locks.next_acquire(&key_lock(&["a"], Intent::Write)).is_err());
    }

    #[test]
    fn releasing_one_reader_keeps_the_other() {
        let locks = short();
        let first = key_lock(&["a"], Intent::Read);
        let second = key_lock(&["a"], Intent::Read);
        locks.next_acquire(&first).unwrap();
        locks.next_acquire(&second).unwrap();

        assert!(locks.release(&first).unwrap());
        assert!(locks.next_acquire(&key_lock(&["a"], Intent::Write)).is_err());

        assert!(locks.release(&second).unwrap());
        assert!(locks.next_acquire(&key_lock(&["a"], Intent::Write)).is_ok());
    }

    #[test]
    fn release_unknown_is_noop() {
        let locks = SelectiveRelease::default();
        assert!(!locks.release(&store_lock(Intent::Write)).unwrap());
    }

    #[test]
    fn timeout_leaves_no_waiter_behind() {
        let locks = short();
        locks.next_acquire(&store_lock(Intent::Write)).unwrap();

        let blocked = store_lock(Intent::Write);
        match locks.next_acquire(&blocked) {
            Err(CoreError::LockTimeout { id, waited }) => {
                assert_eq!(id, blocked.transaction_id());
                assert!(waited >= Duration::from_millis(20));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(locks.waiting_count(), 0);
        assert!(!locks.is_held(&blocked.transaction_id()));
    }

    #[test]
    fn release_wakes_waiter() {
        let locks = Arc::new(SelectiveRelease::default());
        let holder = store_lock(Intent::Write);
        locks.next_acquire(&holder).unwrap();

        let waiter = store_lock(Intent::Write);
        let handle = {
            let locks = Arc::clone(&locks);
            let waiter = waiter.clone();
            thread::spawn(move || locks.next_acquire(&waiter))
        };

        while locks.waiting_count() == 0 {
            thread::yield_now();
        }
        assert!(!locks.is_held(&waiter.transaction_id()));

        locks.release(&holder).unwrap();
        assert_eq!(handle.join().unwrap().unwrap(), Acquisition::Granted);
        assert!(locks.is_held(&waiter.transaction_id()));
    }

    #[test]
    fn later_waiter_may_overtake_colliding_one() {
        let locks = Arc::new(SelectiveRelease::default());
        let a_holder = key_lock(&["a"], Intent::Write);
        let b_holder = key_lock(&["b"], Intent::Write);
        locks.next_acquire(&a_holder).unwrap();
        locks.next_acquire(&b_holder).unwrap();

        let wants_b = key_lock(&["b"], Intent::Write);
        let wants_a = key_lock(&["a"], Intent::Write);
        let spawn = |lock: IntentionLock| {
            let locks = Arc::clone(&locks);
            thread::spawn(move || locks.next_acquire(&lock))
        };

        let first = spawn(wants_b.clone());
        while locks.waiting_count() < 1 {
            thread::yield_now();
        }
        let second = spawn(wants_a.clone());
        while locks.waiting_count() < 2 {
            thread::yield_now();
        }

        locks.release(&a_holder).unwrap();
        assert!(second.join().unwrap().is_ok());
        assert!(locks.is_held(&wants_a.transaction_id()));
        assert!(!locks.is_held(&wants_b.transaction_id()));

        locks.release(&b_holder).unwrap();
        assert!(first.join().unwrap().is_ok());
    }

    #[test]
    fn forfeit_wakes_parked_waiter() {
        let locks = Arc::new(SelectiveRelease::default());
        let holder = store_lock(Intent::Write);
        locks.next_acquire(&holder).unwrap();

        let waiter = store_lock(Intent::Read);
        let handle = {
            let locks = Arc::clone(&locks);
            let waiter = waiter.clone();
            thread::spawn(move || locks.next_acquire(&waiter))
        };
        while locks.waiting_count() == 0 {
            thread::yield_now();
        }

        assert!(locks.forfeit(&waiter.transaction_id()));
        assert!(!locks.forfeit(&waiter.transaction_id()));
        let err = handle.join().unwrap().unwrap_err();
        assert!(err.is_caller_error());
        assert!(locks.is_held(&holder.transaction_id()));
    }
}
