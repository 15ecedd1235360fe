//! Worker pool for parallel job execution.
//!
//! Workers run on named threads, pulling jobs from a shared [`JobScheduler`]
//! and handing each one to an executor callback.

use crate::{Job, JobScheduler};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Callback invoked by a worker for every job it takes.
///
/// The executor owns the job. Results travel back to the submitter through
/// whatever channel the executor captured.
pub type JobExecutor<T> = Arc<dyn Fn(Job<T>) + Send + Sync>;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads to spawn.
    /// Default: half the logical CPU cores, at least one.
    pub num_workers: usize,

    /// How long an idle worker waits before re-checking for shutdown.
    /// Default: 100ms.
    pub poll_interval: Duration,

    /// Thread name prefix, suffixed with the worker index.
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new(default_worker_count())
    }
}

impl WorkerPoolConfig {
    /// `0` workers selects the default count.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: if num_workers == 0 {
                default_worker_count()
            } else {
                num_workers
            },
            poll_interval: Duration::from_millis(100),
            thread_name: "page-merger-worker".to_owned(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Fixed-size pool of worker threads.
///
/// Dropping the pool shuts the scheduler down and joins every worker; jobs
/// still queued at that point are never run.
///
/// # Example
///
/// ```
/// use page_merger_scheduler::{Job, JobPriority, JobScheduler, WorkerPool, WorkerPoolConfig};
/// use std::sync::{mpsc, Arc};
///
/// let scheduler = Arc::new(JobScheduler::new());
/// let (tx, rx) = mpsc::channel();
/// let tx = std::sync::Mutex::new(tx);
///
/// let executor = Arc::new(move |job: Job<u32>| {
///     let _ = tx.lock().unwrap().send(job.payload * 2);
/// });
/// let pool = WorkerPool::new(Arc::clone(&scheduler), executor, WorkerPoolConfig::new(2))
///     .expect("worker threads should spawn");
///
/// scheduler.submit(JobPriority::Visible, 21);
/// assert_eq!(rx.recv().unwrap(), 42);
///
/// pool.shutdown();
/// ```
pub struct WorkerPool<T: Send + 'static> {
    workers: Vec<Worker>,
    scheduler: Arc<JobScheduler<T>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create and start a new worker pool.
    ///
    /// # Arguments
    ///
    /// * `scheduler` - Job scheduler to pull jobs from
    /// * `executor` - Callback that runs each job
    /// * `config` - Worker pool configuration
    ///
    /// # Errors
    ///
    /// Fails if a worker thread cannot be spawned; threads already started
    /// are shut down first.
    pub fn new(
        scheduler: Arc<JobScheduler<T>>,
        executor: JobExecutor<T>,
        config: WorkerPoolConfig,
    ) -> io::Result<Self> {
        let mut pool = Self {
            workers: Vec::with_capacity(config.num_workers.max(1)),
            scheduler,
        };

        for id in 0..config.num_workers.max(1) {
            let worker = Worker::spawn(
                format!("{}-{}", config.thread_name, id),
                Arc::clone(&pool.scheduler),
                Arc::clone(&executor),
                config.poll_interval,
            )?;
            pool.workers.push(worker);
        }

        tracing::debug!(workers = pool.workers.len(), "worker pool started");
        Ok(pool)
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler<T>> {
        &self.scheduler
    }

    /// Shut down and wait for every worker to finish its current job.
    pub fn shutdown(self) {
        drop(self);
    }

    fn stop(&mut self) {
        self.scheduler.shutdown();
        for worker in self.workers.drain(..) {
            worker.join();
        }
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    name: String,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn<T: Send + 'static>(
        name: String,
        scheduler: Arc<JobScheduler<T>>,
        executor: JobExecutor<T>,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || Self::run(scheduler, executor, poll_interval))?;

        Ok(Self {
            name,
            thread: Some(thread),
        })
    }

    fn run<T>(scheduler: Arc<JobScheduler<T>>, executor: JobExecutor<T>, poll_interval: Duration) {
        while !scheduler.is_shut_down() {
            let Some(job) = scheduler.wait_for_job(poll_interval) else {
                continue;
            };
            let job_id = job.id;

            // A panicking job must not take the worker down with it.
            if panic::catch_unwind(AssertUnwindSafe(|| executor(job))).is_err() {
                tracing::error!(job_id, "job executor panicked");
            }

            scheduler.complete_job(job_id);
        }
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!(worker = %self.name, "worker thread panicked");
            }
        }
    }
}

/// Half the logical CPU cores, never less than one.
pub fn default_worker_count() -> usize {
    let cores = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    (cores / 2).max(1)
}
