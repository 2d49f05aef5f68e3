//! Bounded fan-out over a set of items.
//!
//! One fan-out group is created per orchestration step, sized to the number
//! of items addressed in that step and capped by a system ceiling. Workers
//! are scoped threads pulling indices off a shared counter; the call returns
//! only after every task finished (full barrier, no mid-step cancellation).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

/// Upper bound for concurrent workers in one fan-out group.
pub fn worker_ceiling() -> usize {
    let cores = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8);
    cores * 4
}

/// Apply `task` to every item concurrently and return results in item order.
///
/// Worker count is `min(items, ceiling)`. Panics in `task` are contained to
/// their worker thread; the affected slots surface as `None` so the caller
/// can treat them as failures instead of tearing down the whole step.
pub fn run_all<T, R, F>(items: &[T], task: F) -> Vec<Option<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }

    let workers = items.len().min(worker_ceiling());
    let next = AtomicUsize::new(0);
    let results: Vec<Mutex<Option<R>>> = (0..items.len()).map(|_| Mutex::new(None)).collect();

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                if index >= items.len() {
                    break;
                }
                if let Ok(result) = catch_unwind(AssertUnwindSafe(|| task(&items[index]))) {
                    *results[index].lock().unwrap_or_else(|e| e.into_inner()) = Some(result);
                }
            });
        }
    });

    results
        .into_iter()
        .map(|slot| slot.into_inner().unwrap_or_else(|e| e.into_inner()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_keep_item_order() {
        let items: Vec<usize> = (0..100).collect();
        let results = run_all(&items, |x| x * 2);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(*r, Some(i * 2));
        }
    }

    #[test]
    fn test_empty_input() {
        let results: Vec<Option<usize>> = run_all(&[], |x: &usize| *x);
        assert!(results.is_empty());
    }

    #[test]
    fn test_all_items_processed_with_few_workers() {
        // More items than any sane ceiling; every slot must still fill.
        let items: Vec<usize> = (0..1000).collect();
        let results = run_all(&items, |x| *x);
        assert!(results.iter().all(|r| r.is_some()));
    }
}
