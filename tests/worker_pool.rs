//! Batch semantics of the worker pool.

use sph_surface_rs::pool::WorkerPool;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn counters(n: usize) -> Arc<Vec<AtomicU32>> {
    Arc::new((0..n).map(|_| AtomicU32::new(0)).collect())
}

#[test]
fn test_every_index_runs_exactly_once() {
    let pool = WorkerPool::new(4, |_| ()).unwrap();
    for size in [0usize, 1, 3, 4, 5, 97, 1000] {
        let hits = counters(size);
        let h = Arc::clone(&hits);
        pool.set_function(move |i, _| {
            h[i].fetch_add(1, Ordering::Relaxed);
        });
        pool.start(size);
        pool.wait();
        assert!(hits.iter().all(|c| c.load(Ordering::Relaxed) == 1), "size {}", size);
    }
}

#[test]
fn test_many_batches_reuse_the_same_threads() {
    let total = Arc::new(AtomicUsize::new(0));
    let pool = WorkerPool::new(3, |_| ()).unwrap();
    let t = Arc::clone(&total);
    pool.set_function(move |_, _| {
        t.fetch_add(1, Ordering::Relaxed);
    });

    for _ in 0..200 {
        pool.start(17);
        pool.wait();
    }
    assert_eq!(total.load(Ordering::Relaxed), 200 * 17);
}

#[test]
fn test_scratch_is_private_to_its_worker() {
    const N: usize = 500;
    // (worker id, per-worker running count) recorded for every index.
    let seen: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(vec![(usize::MAX, 0); N]));
    let pool = WorkerPool::new(4, |id| (id, 0usize)).unwrap();

    let s = Arc::clone(&seen);
    pool.set_function(move |i, scratch: &mut (usize, usize)| {
        scratch.1 += 1;
        s.lock().unwrap()[i] = *scratch;
    });
    pool.start(N);
    pool.wait();

    let seen = seen.lock().unwrap();
    for id in 0..4 {
        let mut counts: Vec<usize> = seen.iter().filter(|(w, _)| *w == id).map(|(_, c)| *c).collect();
        counts.sort_unstable();
        // A worker's counter only moves when that worker claims an index.
        let expected: Vec<usize> = (1..=counts.len()).collect();
        assert_eq!(counts, expected);
    }
    assert!(seen.iter().all(|(w, _)| *w < 4));
}

#[test]
fn test_start_returns_before_batch_finishes() {
    let release = Arc::new(AtomicBool::new(false));
    let pool = WorkerPool::new(2, |_| ()).unwrap();
    let r = Arc::clone(&release);
    pool.set_function(move |_, _| {
        while !r.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(1));
        }
    });

    pool.start(4);
    assert!(!pool.is_done());
    release.store(true, Ordering::Release);
    pool.wait();
    assert!(pool.is_done());
}

#[test]
fn test_drop_joins_workers() {
    let done = Arc::new(AtomicUsize::new(0));
    {
        let pool = WorkerPool::new(2, |_| ()).unwrap();
        let d = Arc::clone(&done);
        pool.set_function(move |_, _| {
            d.fetch_add(1, Ordering::Relaxed);
        });
        pool.start(10);
        pool.wait();
    }
    assert_eq!(done.load(Ordering::Relaxed), 10);
}
