//! Fixed-size data-parallel worker pool.
//!
//! Workers live for the lifetime of the pool and alternate between two phases:
//! - rendezvous: every worker plus the dispatcher meet at one cyclic barrier
//!   (`T + 1` parties). Passing it starts a batch, or ends the pool when the
//!   exit flag is set.
//! - claim: workers `fetch_add` a shared counter and run the job for every
//!   claimed index below the batch size, then go back to the barrier.
//!
//! Each worker owns one scratch record `S`, created once at construction and
//! handed to the job by `&mut` for every index the worker claims.

use log::{debug, error, info};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Errors raised while building a pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to spawn worker thread {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Per-index job: `(index, worker scratch)`.
pub type Job<S> = dyn Fn(usize, &mut S) + Send + Sync;

/// One-shot gate workers pass before their first rendezvous. Closed means the
/// pool failed to start and the worker should return without touching the barrier.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Gate {
    Pending,
    Open,
    Closed,
}

struct StartGate {
    state: Mutex<Gate>,
    changed: Condvar,
}

impl StartGate {
    fn new() -> Self {
        Self {
            state: Mutex::new(Gate::Pending),
            changed: Condvar::new(),
        }
    }

    fn set(&self, gate: Gate) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = gate;
        self.changed.notify_all();
    }

    /// Block until the gate leaves `Pending`; true if it opened.
    fn pass(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        while *state == Gate::Pending {
            state = self.changed.wait(state).unwrap_or_else(|p| p.into_inner());
        }
        *state == Gate::Open
    }
}

struct Shared<S> {
    gate: StartGate,
    barrier: Barrier,
    next: AtomicUsize,
    problem_size: AtomicUsize,
    /// Workers that have left the claim phase of the current batch
    parked: AtomicUsize,
    exit: AtomicBool,
    job: Mutex<Option<Arc<Job<S>>>>,
}

/// Worker threads to use by default: one per core, minus the dispatching thread.
pub fn default_thread_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

pub struct WorkerPool<S: Send + 'static> {
    shared: Arc<Shared<S>>,
    workers: Vec<JoinHandle<()>>,
    thread_count: usize,
}

impl<S: Send + 'static> WorkerPool<S> {
    /// Spawn `threads` workers (at least one). `make_scratch(worker_id)` builds
    /// each worker's scratch record.
    ///
    /// If a spawn fails, the workers already started are released and joined
    /// before the error is returned.
    pub fn new<F>(threads: usize, make_scratch: F) -> Result<Self, PoolError>
    where
        F: FnMut(usize) -> S,
    {
        Self::with_spawner(threads, make_scratch, |index, body| {
            thread::Builder::new()
                .name(format!("sph-worker-{}", index))
                .spawn(body)
        })
    }

    fn with_spawner<F, P>(threads: usize, mut make_scratch: F, mut spawn: P) -> Result<Self, PoolError>
    where
        F: FnMut(usize) -> S,
        P: FnMut(usize, Box<dyn FnOnce() + Send + 'static>) -> std::io::Result<JoinHandle<()>>,
    {
        let thread_count = threads.max(1);
        let shared = Arc::new(Shared {
            gate: StartGate::new(),
            barrier: Barrier::new(thread_count + 1),
            next: AtomicUsize::new(0),
            problem_size: AtomicUsize::new(0),
            parked: AtomicUsize::new(thread_count),
            exit: AtomicBool::new(false),
            job: Mutex::new(None),
        });

        let mut workers = Vec::with_capacity(thread_count);
        for index in 0..thread_count {
            let scratch = make_scratch(index);
            let worker_shared = Arc::clone(&shared);
            match spawn(index, Box::new(move || worker_loop(worker_shared, scratch))) {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    shared.gate.set(Gate::Closed);
                    for handle in workers {
                        if handle.join().is_err() {
                            error!("worker thread panicked during aborted startup");
                        }
                    }
                    return Err(PoolError::Spawn { index, source });
                }
            }
        }

        shared.gate.set(Gate::Open);
        info!("worker pool started with {} threads", thread_count);

        Ok(Self {
            shared,
            workers,
            thread_count,
        })
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Install the per-index job. Must not be called while a batch is running.
    pub fn set_function<F>(&self, f: F)
    where
        F: Fn(usize, &mut S) + Send + Sync + 'static,
    {
        debug_assert!(self.is_done(), "set_function called during a batch");
        let mut slot = self.shared.job.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(Arc::new(f));
    }

    /// Kick off a batch of `problem_size` indices and return without waiting
    /// for it. Only blocks until every worker is back at the rendezvous, which
    /// is immediate once the previous batch is done.
    pub fn start(&self, problem_size: usize) {
        debug_assert!(self.is_done(), "start called during a batch");
        self.shared.next.store(0, Ordering::Relaxed);
        self.shared.problem_size.store(problem_size, Ordering::Relaxed);
        self.shared.parked.store(0, Ordering::Relaxed);
        self.shared.barrier.wait();
    }

    /// True once every index of the current batch has been processed and all
    /// workers have left the claim phase. Never blocks.
    pub fn is_done(&self) -> bool {
        self.shared.parked.load(Ordering::Acquire) == self.thread_count
    }

    /// Poll `is_done` until the batch finishes.
    pub fn wait(&self) {
        while !self.is_done() {
            thread::yield_now();
        }
    }

    /// Stop and join all workers. A batch still in flight runs to completion
    /// first. Calling it again is a no-op.
    pub fn exit(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.shared.exit.store(true, Ordering::Release);
        self.shared.barrier.wait();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("worker thread panicked during shutdown");
            }
        }
        debug!("worker pool stopped");
    }
}

impl<S: Send + 'static> Drop for WorkerPool<S> {
    fn drop(&mut self) {
        self.exit();
    }
}

fn worker_loop<S>(shared: Arc<Shared<S>>, mut scratch: S) {
    if !shared.gate.pass() {
        return;
    }
    loop {
        shared.barrier.wait();
        if shared.exit.load(Ordering::Acquire) {
            break;
        }

        let job = shared
            .job
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        let problem_size = shared.problem_size.load(Ordering::Relaxed);

        if let Some(job) = job {
            loop {
                let index = shared.next.fetch_add(1, Ordering::Relaxed);
                if index >= problem_size {
                    break;
                }
                // A panicking index must not take the worker (and the barrier) down.
                if catch_unwind(AssertUnwindSafe(|| job(index, &mut scratch))).is_err() {
                    error!("job panicked at index {}", index);
                }
            }
        }

        shared.parked.fetch_add(1, Ordering::Release);
    }
}
