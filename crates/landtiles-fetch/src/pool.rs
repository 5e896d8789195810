//! Bounded worker pool.
//!
//! Jobs are pushed into a crossbeam channel up front; `workers` named threads
//! drain it and send `(index, result)` pairs back over a second channel.
//! Results are returned in job order regardless of completion order.
//!
//! ```text
//!            ┌──────────┐
//!  jobs ───► │ worker-0 │ ───┐
//!   (idx,T)  ├──────────┤    │  (idx,R)
//!       ───► │ worker-1 │ ───┼──────► results, re-ordered by idx
//!            ├──────────┤    │
//!       ───► │ worker-n │ ───┘
//!            └──────────┘
//! ```

use crossbeam_channel::unbounded;
use std::thread;

/// Run `f` over `items` on at most `workers` threads named `{name}-{i}`.
///
/// Blocks until every job finished. A panicking job propagates the panic.
pub fn run_pool<T, R, F>(name: &str, workers: usize, items: Vec<T>, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, total);

    let (job_tx, job_rx) = unbounded::<(usize, T)>();
    let (result_tx, result_rx) = unbounded::<(usize, R)>();
    for job in items.into_iter().enumerate() {
        // The receiver lives until the end of this function.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    thread::scope(|scope| {
        for i in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let f = &f;
            thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn_scoped(scope, move || {
                    while let Ok((idx, item)) = job_rx.recv() {
                        let _ = result_tx.send((idx, f(item)));
                    }
                })
                .expect("Failed to spawn worker thread");
        }
    });
    drop(result_tx);

    let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
    for (idx, result) in result_rx.iter() {
        slots[idx] = Some(result);
    }
    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_results_keep_job_order() {
        let items: Vec<u64> = (0..20).collect();
        let results = run_pool("test", 4, items, |n| {
            // Later jobs finish first.
            thread::sleep(Duration::from_millis(20 - n));
            n * 10
        });
        assert_eq!(results, (0..20).map(|n| n * 10).collect::<Vec<_>>());
    }

    #[test]
    fn test_bounded_named_workers() {
        let names = Mutex::new(HashSet::new());
        run_pool("bounded", 3, (0..30).collect::<Vec<u32>>(), |_| {
            let name = thread::current().name().map(str::to_string);
            names.lock().unwrap().insert(name);
            thread::sleep(Duration::from_millis(2));
        });
        let names = names.into_inner().unwrap();
        assert!(!names.is_empty() && names.len() <= 3);
        assert!(names
            .iter()
            .all(|n| n.as_deref().is_some_and(|n| n.starts_with("bounded-"))));
    }

    #[test]
    fn test_empty_and_zero_workers() {
        let none: Vec<u8> = run_pool("empty", 4, Vec::<u8>::new(), |n| n);
        assert!(none.is_empty());
        assert_eq!(run_pool("zero", 0, vec![1, 2], |n| n + 1), vec![2, 3]);
    }
}
