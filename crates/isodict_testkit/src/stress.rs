//! Threaded stress helpers.
//!
//! Each helper drives several threads, each owning its own
//! [`DictionaryContext`], against one shared dictionary.

use isodict_core::{CoreError, DictionaryContext, IsolatedDictionary};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Transactions committed.
    pub committed: usize,
    /// Lock acquisitions that timed out and were retried.
    pub timeouts: usize,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// Committed transactions per second.
    pub commits_per_second: f64,
}

impl StressResult {
    fn new(committed: usize, timeouts: usize, duration: Duration) -> Self {
        let commits_per_second = if duration.as_secs_f64() > 0.0 {
            committed as f64 / duration.as_secs_f64()
        } else {
            0.0
        };
        Self {
            committed,
            timeouts,
            duration,
            commits_per_second,
        }
    }
}

/// Runs `body` in a fresh transaction until it commits, retrying after
/// lock timeouts. Returns the number of timeouts seen.
///
/// # Panics
///
/// Panics on any error other than a lock timeout.
pub fn commit_with_retry<V, F>(ctx: &mut DictionaryContext<V>, mut body: F) -> usize
where
    V: Send + Sync + 'static,
    F: FnMut(&mut DictionaryContext<V>) -> Result<(), CoreError>,
{
    let mut timeouts = 0;
    loop {
        let outcome = body(ctx).and_then(|()| ctx.commit().map(|_| ()));
        match outcome {
            Ok(()) => return timeouts,
            Err(err) if err.is_retryable() => {
                timeouts += 1;
                ctx.rollback().expect("rollback after timeout failed");
            }
            Err(err) => panic!("transaction failed: {err}"),
        }
    }
}

/// Has `threads` threads each increment `key` `per_thread` times, one
/// transaction per increment, declaring write intent on `key` only.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn concurrent_increments(
    dictionary: &Arc<IsolatedDictionary<u64>>,
    key: &str,
    threads: usize,
    per_thread: usize,
) -> StressResult {
    let start = Instant::now();
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let dictionary = Arc::clone(dictionary);
            let key = key.to_string();
            thread::spawn(move || {
                let mut ctx = DictionaryContext::new(dictionary);
                let mut timeouts = 0;
                for _ in 0..per_thread {
                    timeouts += commit_with_retry(&mut ctx, |ctx| {
                        ctx.declare_intent([key.as_str()], false)?;
                        let current = ctx.get(&key)?.unwrap_or(0);
                        ctx.add_or_update(key.as_str(), current + 1)
                    });
                }
                timeouts
            })
        })
        .collect();

    let timeouts = handles
        .into_iter()
        .map(|handle| handle.join().expect("increment worker panicked"))
        .sum();
    StressResult::new(threads * per_thread, timeouts, start.elapsed())
}

/// Has each of `threads` threads commit `keys_per_thread` keys of its own,
/// named `t{thread}-{n}`, one transaction per key.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn disjoint_writers(
    dictionary: &Arc<IsolatedDictionary<u64>>,
    threads: usize,
    keys_per_thread: usize,
) -> StressResult {
    let start = Instant::now();
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let dictionary = Arc::clone(dictionary);
            thread::spawn(move || {
                let mut ctx = DictionaryContext::new(dictionary);
                let mut timeouts = 0;
                for n in 0..keys_per_thread {
                    let key = format!("t{t}-{n}");
                    timeouts += commit_with_retry(&mut ctx, |ctx| {
                        ctx.declare_intent([key.as_str()], false)?;
                        ctx.add_or_update(key.as_str(), n as u64)
                    });
                }
                timeouts
            })
        })
        .collect();

    let timeouts = handles
        .into_iter()
        .map(|handle| handle.join().expect("writer panicked"))
        .sum();
    StressResult::new(threads * keys_per_thread, timeouts, start.elapsed())
}
