//! Bounded worker pool over a fixed range of work items.
//!
//! Workers are scoped threads that claim item indices from one shared atomic
//! cursor. There is no queue and no polling: a worker that finishes an item
//! immediately claims the next one, and exits once the cursor passes the end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tracing::Span;

/// Run `f` once for every index in `[0, len)` on up to `workers` threads.
///
/// Threads claim indices from a shared cursor, so each index is visited
/// exactly once regardless of how the work is spread. Workers run inside the
/// caller's tracing span.
pub(crate) fn run_partitioned<F>(len: usize, workers: usize, f: F)
where
    F: Fn(usize) + Sync,
{
    if len == 0 {
        return;
    }

    let workers = workers.clamp(1, len);
    let cursor = AtomicUsize::new(0);
    let f = &f;
    let cursor = &cursor;
    let span = Span::current();

    thread::scope(|scope| {
        for _ in 0..workers {
            let span = span.clone();
            scope.spawn(move || {
                let _entered = span.enter();
                loop {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    if index >= len {
                        break;
                    }
                    f(index);
                }
            });
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn test_zero_items_spawns_nothing() {
        let calls = AtomicUsize::new(0);
        run_partitioned(0, 4, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_concurrency_bounded_by_workers() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        run_partitioned(24, 3, |_| {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    proptest! {
        #[test]
        fn test_partition_visits_each_index_once(len in 0usize..400, workers in 1usize..48) {
            let seen = Mutex::new(Vec::new());
            run_partitioned(len, workers, |index| seen.lock().push(index));

            let mut seen = seen.into_inner();
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..len).collect::<Vec<_>>());
        }
    }
}
