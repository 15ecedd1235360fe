//! Job scheduler implementation
//!
//! Provides a thread-safe scheduler that manages job submission,
//! priority-based execution ordering, and job lifecycle.

use crate::priority::{Job, JobId, JobPriority, PriorityQueue};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Job scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Total jobs submitted
    pub jobs_submitted: u64,

    /// Total jobs completed
    pub jobs_completed: u64,

    /// Total jobs removed from the queue before they ran
    pub jobs_cancelled: u64,

    /// Current queue size
    pub queue_size: usize,

    /// Jobs handed to a worker and not yet completed
    pub running: usize,
}

impl SchedulerStats {
    /// Jobs queued or running
    pub fn pending_jobs(&self) -> u64 {
        self.jobs_submitted - self.jobs_completed - self.jobs_cancelled
    }
}

struct SchedulerState<T> {
    queue: PriorityQueue<T>,
    stats: SchedulerStats,
    shutdown: bool,
}

/// Job scheduler with priority queue
///
/// Workers block in [`JobScheduler::wait_for_job`] until a job is submitted or
/// the scheduler is shut down.
///
/// # Example
///
/// ```
/// use page_merger_scheduler::{JobPriority, JobScheduler};
///
/// let scheduler = JobScheduler::new();
/// scheduler.submit(JobPriority::Prefetch, "page 12");
/// scheduler.submit(JobPriority::Visible, "page 3");
///
/// let job = scheduler.next_job().expect("two jobs are queued");
/// assert_eq!(job.payload, "page 3");
/// scheduler.complete_job(job.id);
/// ```
pub struct JobScheduler<T> {
    state: Mutex<SchedulerState<T>>,
    available: Condvar,
}

impl<T> JobScheduler<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                queue: PriorityQueue::new(),
                stats: SchedulerStats::default(),
                shutdown: false,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit a job and wake one waiting worker.
    pub fn submit(&self, priority: JobPriority, payload: T) -> JobId {
        let mut state = self.lock();
        let job_id = state.queue.push(priority, payload);
        state.stats.jobs_submitted += 1;
        drop(state);

        self.available.notify_one();
        job_id
    }

    /// Take the highest priority job without waiting.
    ///
    /// The job counts as running until `complete_job()` is called for it.
    pub fn next_job(&self) -> Option<Job<T>> {
        let mut state = self.lock();
        let job = state.queue.pop()?;
        state.stats.running += 1;
        Some(job)
    }

    /// Take the highest priority job, waiting up to `timeout` for one.
    ///
    /// Returns `None` on timeout or once the scheduler is shut down.
    pub fn wait_for_job(&self, timeout: Duration) -> Option<Job<T>> {
        let state = self.lock();
        let (mut state, _) = self
            .available
            .wait_timeout_while(state, timeout, |state| {
                state.queue.is_empty() && !state.shutdown
            })
            .unwrap_or_else(PoisonError::into_inner);

        if state.shutdown {
            return None;
        }
        let job = state.queue.pop()?;
        state.stats.running += 1;
        Some(job)
    }

    /// Mark a job handed out by `next_job`/`wait_for_job` as finished.
    pub fn complete_job(&self, _job_id: JobId) {
        let mut state = self.lock();
        state.stats.jobs_completed += 1;
        state.stats.running = state.stats.running.saturating_sub(1);
    }

    /// Remove queued jobs matching a predicate. Running jobs are unaffected.
    pub fn cancel_jobs_if<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Job<T>) -> bool,
    {
        let mut state = self.lock();
        let removed = state.queue.remove_if(predicate);
        state.stats.jobs_cancelled += removed as u64;
        removed
    }

    /// Raise queued jobs matching a predicate to `priority`.
    pub fn promote_jobs_if<F>(&self, priority: JobPriority, predicate: F) -> usize
    where
        F: Fn(&Job<T>) -> bool,
    {
        self.lock().queue.promote_if(priority, predicate)
    }

    /// Drop every queued job
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let cancelled = state.queue.len();
        state.queue.clear();
        state.stats.jobs_cancelled += cancelled as u64;
        cancelled
    }

    pub fn pending_jobs(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.lock().queue.is_empty()
    }

    /// `true` when nothing is queued and nothing is running
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.queue.is_empty() && state.stats.running == 0
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.lock();
        let mut stats = state.stats.clone();
        stats.queue_size = state.queue.len();
        stats
    }

    /// Wake all waiting workers and stop handing out jobs.
    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.available.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shutdown
    }
}

impl<T: Clone> JobScheduler<T> {
    /// Snapshot of queued jobs in arbitrary order (for inspection)
    pub fn pending_jobs_list(&self) -> Vec<Job<T>> {
        self.lock().queue.jobs().cloned().collect()
    }
}

impl<T> Default for JobScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_scheduler_basic() {
        let scheduler = JobScheduler::new();

        assert_eq!(scheduler.pending_jobs(), 0);
        assert!(!scheduler.has_pending_jobs());
        assert!(scheduler.is_idle());

        let job_id = scheduler.submit(JobPriority::Visible, "docA#0");

        assert_eq!(scheduler.pending_jobs(), 1);
        assert!(!scheduler.is_idle());

        let job = scheduler.next_job().unwrap();
        assert_eq!(job.id, job_id);
        assert!(!scheduler.is_idle(), "running job keeps the scheduler busy");
        assert_eq!(scheduler.stats().running, 1);

        scheduler.complete_job(job_id);
        assert!(scheduler.is_idle());

        let stats = scheduler.stats();
        assert_eq!(stats.jobs_submitted, 1);
        assert_eq!(stats.jobs_completed, 1);
        assert_eq!(stats.jobs_cancelled, 0);
        assert_eq!(stats.pending_jobs(), 0);
    }

    #[test]
    fn test_scheduler_priority_ordering() {
        let scheduler = JobScheduler::new();

        scheduler.submit(JobPriority::Prefetch, 1);
        scheduler.submit(JobPriority::Eager, 2);
        scheduler.submit(JobPriority::Enumeration, 3);

        assert_eq!(scheduler.next_job().unwrap().payload, 3);
        assert_eq!(scheduler.next_job().unwrap().payload, 2);
        assert_eq!(scheduler.next_job().unwrap().payload, 1);
        assert!(scheduler.next_job().is_none());
    }

    #[test]
    fn test_cancel_jobs_if() {
        let scheduler = JobScheduler::new();

        scheduler.submit(JobPriority::Visible, ("a.pdf", 0));
        scheduler.submit(JobPriority::Visible, ("b.pdf", 0));
        scheduler.submit(JobPriority::Prefetch, ("a.pdf", 1));

        let cancelled = scheduler.cancel_jobs_if(|job| job.payload.0 == "a.pdf");
        assert_eq!(cancelled, 2);
        assert_eq!(scheduler.pending_jobs(), 1);
        assert_eq!(scheduler.next_job().unwrap().payload, ("b.pdf", 0));

        let stats = scheduler.stats();
        assert_eq!(stats.jobs_cancelled, 2);
        assert_eq!(stats.pending_jobs(), 1);
    }

    #[test]
    fn test_promote_jobs_if() {
        let scheduler = JobScheduler::new();

        scheduler.submit(JobPriority::Eager, "eager");
        scheduler.submit(JobPriority::Prefetch, "margin");

        assert_eq!(
            scheduler.promote_jobs_if(JobPriority::Visible, |job| job.payload == "margin"),
            1
        );
        assert_eq!(scheduler.next_job().unwrap().payload, "margin");
    }

    #[test]
    fn test_clear() {
        let scheduler = JobScheduler::new();

        scheduler.submit(JobPriority::Visible, ());
        scheduler.submit(JobPriority::Prefetch, ());

        assert_eq!(scheduler.clear(), 2);
        assert_eq!(scheduler.pending_jobs(), 0);

        let stats = scheduler.stats();
        assert_eq!(stats.jobs_submitted, 2);
        assert_eq!(stats.jobs_cancelled, 2);
    }

    #[test]
    fn test_pending_jobs_list() {
        let scheduler = JobScheduler::new();
        scheduler.submit(JobPriority::Visible, 1);
        scheduler.submit(JobPriority::Prefetch, 2);

        let mut payloads: Vec<_> = scheduler
            .pending_jobs_list()
            .into_iter()
            .map(|job| job.payload)
            .collect();
        payloads.sort();
        assert_eq!(payloads, vec![1, 2]);
    }

    #[test]
    fn test_wait_for_job_times_out_when_empty() {
        let scheduler: JobScheduler<()> = JobScheduler::new();

        let start = Instant::now();
        assert!(scheduler.wait_for_job(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_for_job_wakes_on_submit() {
        let scheduler = Arc::new(JobScheduler::new());
        let waiter = {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || scheduler.wait_for_job(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        scheduler.submit(JobPriority::Visible, 42);

        let job = waiter.join().unwrap().expect("waiter should receive the job");
        assert_eq!(job.payload, 42);
    }

    #[test]
    fn test_shutdown_releases_waiters() {
        let scheduler: Arc<JobScheduler<u32>> = Arc::new(JobScheduler::new());
        let waiter = {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || scheduler.wait_for_job(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        scheduler.shutdown();

        assert!(waiter.join().unwrap().is_none());
        assert!(scheduler.is_shut_down());
    }
}
