//! Logical clock.

use crate::types::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

static GLOBAL: Clock = Clock::new();

/// A monotonically increasing logical counter.
///
/// Every write operation and every commit takes a fresh tick, so ordering
/// decisions never depend on wall-clock time. Stores in one process share
/// [`Clock::global`], which makes timestamps comparable across stores
/// (and across replicas hosted in the same process).
#[derive(Debug)]
pub struct Clock {
    counter: AtomicU64,
}

impl Clock {
    /// Creates a clock starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Returns the process-wide clock.
    #[must_use]
    pub fn global() -> &'static Clock {
        &GLOBAL
    }

    /// Advances the clock and returns the new reading.
    pub fn tick(&self) -> Timestamp {
        Timestamp::new(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Returns the latest reading without advancing.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        Timestamp::new(self.counter.load(Ordering::SeqCst))
    }

    /// Moves the clock forward to at least `seen`.
    ///
    /// Used when applying commits stamped elsewhere, so the next local
    /// tick is still greater than anything already observed.
    pub fn observe(&self, seen: Timestamp) {
        self.counter.fetch_max(seen.as_u64(), Ordering::SeqCst);
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn ticks_increase() {
        let clock = Clock::new();
        let a = clock.tick();
        let b = clock.tick();
        assert!(b > a);
        assert_eq!(clock.now(), b);
    }

    #[test]
    fn observe_only_moves_forward() {
        let clock = Clock::new();
        clock.tick();
        clock.observe(Timestamp::new(100));
        assert_eq!(clock.tick(), Timestamp::new(101));

        clock.observe(Timestamp::new(5));
        assert_eq!(clock.now(), Timestamp::new(101));
    }

    #[test]
    fn concurrent_ticks_are_unique() {
        let clock = Arc::new(Clock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = Arc::clone(&clock);
                thread::spawn(move || (0..1000).map(|_| clock.tick()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for ts in handle.join().unwrap() {
                assert!(seen.insert(ts));
            }
        }
        assert_eq!(seen.len(), 4000);
    }
}
