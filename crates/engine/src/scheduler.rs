//! Background scheduler for index rebuilds
//!
//! Rebuild jobs run on a fixed pool of named worker threads fed from a
//! bounded priority queue. Delta rebuilds are small and follow user saves,
//! so they overtake queued core rebuilds. Within one priority jobs run in
//! submission order.
//!
//! A panicking job is caught and logged; the worker keeps serving the queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use docsync_core::{Error, PartitionKind, Result};

/// Queue priority of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobPriority {
    /// Full core rebuilds
    Low = 0,
    /// Delta rebuilds following saves
    Normal = 1,
}

impl From<PartitionKind> for JobPriority {
    fn from(kind: PartitionKind) -> Self {
        match kind {
            PartitionKind::Core => JobPriority::Low,
            PartitionKind::Delta => JobPriority::Normal,
        }
    }
}

/// Why a job was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// The queue is at its configured depth
    QueueFull,
    /// `shutdown` was called
    ShutDown,
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejected::QueueFull => write!(f, "rebuild queue is full"),
            Rejected::ShutDown => write!(f, "rebuild scheduler is shut down"),
        }
    }
}

impl std::error::Error for Rejected {}

impl From<Rejected> for Error {
    fn from(r: Rejected) -> Self {
        Error::IndexUnavailable(r.to_string())
    }
}

/// Point-in-time scheduler counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Jobs waiting in the queue
    pub queued: usize,
    /// Jobs currently running
    pub running: usize,
    /// Jobs finished (including panicked ones)
    pub completed: u64,
    /// Worker threads
    pub workers: usize,
}

struct Job {
    priority: JobPriority,
    sequence: u64,
    run: Box<dyn FnOnce() + Send>,
}

impl Eq for Job {}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

// Max-heap: higher priority first, then older sequence first
impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Shared {
    queue: Mutex<BinaryHeap<Job>>,
    job_ready: Condvar,
    idle: Condvar,
    shutdown: AtomicBool,
    sequence: AtomicU64,
    queued: AtomicUsize,
    running: AtomicUsize,
    completed: AtomicU64,
    max_queued: usize,
}

/// Fixed worker pool running rebuild jobs
pub struct RebuildScheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl RebuildScheduler {
    /// Spawn `workers` threads named `docsync-indexer-<n>`.
    ///
    /// At most `max_queued` jobs wait at a time; running jobs do not count.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `workers` is zero. `Io` if a worker thread cannot
    /// be spawned; workers started before the failure are shut down.
    pub fn new(workers: usize, max_queued: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::InvalidConfig(
                "rebuild scheduler needs at least one worker".to_string(),
            ));
        }
        let shared = Arc::new(Shared {
            queue: Mutex::new(BinaryHeap::new()),
            job_ready: Condvar::new(),
            idle: Condvar::new(),
            shutdown: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            queued: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            max_queued,
        });

        let scheduler = RebuildScheduler {
            shared,
            workers: Mutex::new(Vec::with_capacity(workers)),
            worker_count: workers,
        };

        for i in 0..workers {
            let shared = Arc::clone(&scheduler.shared);
            let spawned = std::thread::Builder::new()
                .name(format!("docsync-indexer-{}", i))
                .spawn(move || worker_loop(&shared));
            match spawned {
                Ok(handle) => scheduler.workers.lock().push(handle),
                Err(e) => {
                    scheduler.shutdown();
                    return Err(Error::Io(e));
                }
            }
        }

        debug!(target: "docsync::scheduler", workers, max_queued, "rebuild scheduler started");
        Ok(scheduler)
    }

    /// Queue a job. Never blocks on the job itself.
    pub fn submit(
        &self,
        priority: JobPriority,
        job: impl FnOnce() + Send + 'static,
    ) -> std::result::Result<(), Rejected> {
        if self.shared.shutdown.load(AtomicOrdering::Acquire) {
            return Err(Rejected::ShutDown);
        }

        {
            let mut queue = self.shared.queue.lock();
            if self.shared.queued.load(AtomicOrdering::Acquire) >= self.shared.max_queued {
                return Err(Rejected::QueueFull);
            }
            let sequence = self.shared.sequence.fetch_add(1, AtomicOrdering::Relaxed);
            queue.push(Job {
                priority,
                sequence,
                run: Box::new(job),
            });
            self.shared.queued.fetch_add(1, AtomicOrdering::Release);
        }

        self.shared.job_ready.notify_one();
        Ok(())
    }

    /// Block until the queue is empty and no job is running.
    ///
    /// Workers stay up afterwards.
    pub fn drain(&self) {
        let mut queue = self.shared.queue.lock();
        while self.shared.queued.load(AtomicOrdering::Acquire) > 0
            || self.shared.running.load(AtomicOrdering::Acquire) > 0
        {
            self.shared.idle.wait(&mut queue);
        }
    }

    /// Stop accepting jobs, let workers finish the queue, join them.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, AtomicOrdering::Release);

        // Notify under the queue lock so a worker about to wait cannot miss it
        {
            let _queue = self.shared.queue.lock();
            self.shared.job_ready.notify_all();
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// True once `shutdown` has been called
    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.load(AtomicOrdering::Acquire)
    }

    /// Current counters
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queued: self.shared.queued.load(AtomicOrdering::Relaxed),
            running: self.shared.running.load(AtomicOrdering::Relaxed),
            completed: self.shared.completed.load(AtomicOrdering::Relaxed),
            workers: self.worker_count,
        }
    }
}

impl Drop for RebuildScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for RebuildScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RebuildScheduler")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Decrements `running` on drop, so a panicking job cannot wedge `drain`.
struct RunningGuard<'a> {
    shared: &'a Shared,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.shared.completed.fetch_add(1, AtomicOrdering::Release);
        let was_running = self.shared.running.fetch_sub(1, AtomicOrdering::Release);

        if was_running == 1 && self.shared.queued.load(AtomicOrdering::Acquire) == 0 {
            let _queue = self.shared.queue.lock();
            self.shared.idle.notify_all();
        }
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(job) = queue.pop() {
                    shared.queued.fetch_sub(1, AtomicOrdering::Release);
                    shared.running.fetch_add(1, AtomicOrdering::Release);
                    break job;
                }
                if shared.shutdown.load(AtomicOrdering::Acquire) {
                    return;
                }
                shared.job_ready.wait(&mut queue);
            }
        };

        let _guard = RunningGuard { shared };

        if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job.run)) {
            let message = panic
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("(non-string panic)");
            error!(target: "docsync::scheduler", priority = ?job.priority, panic = message, "rebuild job panicked");
        }
    }
}
