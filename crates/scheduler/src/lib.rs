//! Page Merger Scheduler Library
//!
//! Priority job queue and a fixed-size worker pool.
//!
//! Jobs carry an arbitrary payload and are ordered by [`JobPriority`]
//! (document enumeration, visible rows, eagerly loaded rows, scroll-margin
//! prefetch), FIFO within each level.
//!
//! # Example
//!
//! ```
//! use page_merger_scheduler::{JobPriority, JobScheduler};
//!
//! let scheduler = JobScheduler::new();
//! scheduler.submit(JobPriority::Prefetch, ("a.pdf", 30));
//! scheduler.submit(JobPriority::Enumeration, ("b.pdf", 0));
//!
//! let job = scheduler.next_job().unwrap();
//! assert_eq!(job.priority, JobPriority::Enumeration);
//! scheduler.complete_job(job.id);
//! ```

mod priority;
mod scheduler;
mod worker;

pub use priority::{Job, JobId, JobPriority, PriorityQueue};
pub use scheduler::{JobScheduler, SchedulerStats};
pub use worker::{default_worker_count, JobExecutor, WorkerPool, WorkerPoolConfig};
