//! Priority-based job ordering
//!
//! Jobs are executed in priority order, with higher priority jobs running first
//! and FIFO ordering within the same priority.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Job priority levels
///
/// Higher numeric values have higher priority and are executed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobPriority {
    /// Rows in the scroll margin around the viewport
    Prefetch = 0,

    /// First screens of a freshly populated list
    Eager = 1,

    /// Rows currently on screen
    Visible = 2,

    /// Opening documents to count their pages (highest priority)
    Enumeration = 3,
}

/// Unique job identifier
pub type JobId = u64;

/// A scheduled job carrying a payload of type `T`.
///
/// Jobs are ordered by priority (higher priority first), then by insertion order
/// (earlier jobs first).
#[derive(Debug, Clone)]
pub struct Job<T> {
    pub id: JobId,
    pub priority: JobPriority,
    pub payload: T,

    /// Insertion order (used for FIFO within same priority)
    insertion_order: u64,
}

impl<T> Job<T> {
    pub fn new(id: JobId, priority: JobPriority, payload: T, insertion_order: u64) -> Self {
        Self {
            id,
            priority,
            payload,
            insertion_order,
        }
    }
}

impl<T> PartialEq for Job<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Job<T> {}

impl<T> PartialOrd for Job<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Job<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            // BinaryHeap is a max heap, so earlier insertions must compare greater
            Ordering::Equal => other.insertion_order.cmp(&self.insertion_order),
            other => other,
        }
    }
}

/// Priority queue for jobs.
///
/// Not synchronized on its own; [`crate::JobScheduler`] guards it.
pub struct PriorityQueue<T> {
    heap: BinaryHeap<Job<T>>,

    /// Next job ID (for automatic ID assignment)
    next_job_id: JobId,

    /// Insertion counter (for FIFO ordering within same priority)
    insertion_counter: u64,
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_job_id: 1,
            insertion_counter: 0,
        }
    }

    /// Push a job onto the queue and return its assigned ID.
    pub fn push(&mut self, priority: JobPriority, payload: T) -> JobId {
        let job_id = self.next_job_id;
        self.next_job_id += 1;

        let insertion_order = self.insertion_counter;
        self.insertion_counter += 1;

        self.heap
            .push(Job::new(job_id, priority, payload, insertion_order));
        job_id
    }

    /// Pop the highest priority job from the queue
    pub fn pop(&mut self) -> Option<Job<T>> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&Job<T>> {
        self.heap.peek()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Remove all jobs matching a predicate and return how many were removed.
    pub fn remove_if<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&Job<T>) -> bool,
    {
        let original_len = self.heap.len();
        let heap = std::mem::take(&mut self.heap);
        self.heap = heap.into_iter().filter(|job| !predicate(job)).collect();
        original_len - self.heap.len()
    }

    /// Raise matching jobs to `priority`, keeping their place among jobs of
    /// that priority. Jobs already at or above it are left alone.
    ///
    /// Returns the number of jobs promoted.
    pub fn promote_if<F>(&mut self, priority: JobPriority, predicate: F) -> usize
    where
        F: Fn(&Job<T>) -> bool,
    {
        let mut promoted = 0;
        let heap = std::mem::take(&mut self.heap);
        self.heap = heap
            .into_iter()
            .map(|mut job| {
                if job.priority < priority && predicate(&job) {
                    job.priority = priority;
                    promoted += 1;
                }
                job
            })
            .collect();
        promoted
    }

    /// Jobs in arbitrary order (for inspection)
    pub fn jobs(&self) -> impl Iterator<Item = &Job<T>> {
        self.heap.iter()
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_priority_ordering() {
        assert!(JobPriority::Enumeration > JobPriority::Visible);
        assert!(JobPriority::Visible > JobPriority::Eager);
        assert!(JobPriority::Eager > JobPriority::Prefetch);
    }

    #[test]
    fn test_priority_queue_basic() {
        let mut queue = PriorityQueue::new();

        assert!(queue.is_empty());

        let id1 = queue.push(JobPriority::Visible, "a.pdf");
        assert_eq!(queue.len(), 1);

        let job = queue.pop().unwrap();
        assert_eq!(job.id, id1);
        assert_eq!(job.priority, JobPriority::Visible);
        assert_eq!(job.payload, "a.pdf");

        assert!(queue.is_empty());
    }

    #[test]
    fn test_priority_queue_ordering() {
        let mut queue = PriorityQueue::new();

        queue.push(JobPriority::Prefetch, 0);
        queue.push(JobPriority::Eager, 1);
        queue.push(JobPriority::Enumeration, 2);
        queue.push(JobPriority::Visible, 3);

        assert_eq!(queue.pop().unwrap().priority, JobPriority::Enumeration);
        assert_eq!(queue.pop().unwrap().priority, JobPriority::Visible);
        assert_eq!(queue.pop().unwrap().priority, JobPriority::Eager);
        assert_eq!(queue.pop().unwrap().priority, JobPriority::Prefetch);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_mixed_priority_fifo() {
        let mut queue = PriorityQueue::new();

        let id1 = queue.push(JobPriority::Visible, 1);
        let id2 = queue.push(JobPriority::Prefetch, 2);
        let id3 = queue.push(JobPriority::Visible, 3);
        let id4 = queue.push(JobPriority::Prefetch, 4);
        let id5 = queue.push(JobPriority::Eager, 5);

        assert_eq!(queue.pop().unwrap().id, id1);
        assert_eq!(queue.pop().unwrap().id, id3);
        assert_eq!(queue.pop().unwrap().id, id5);
        assert_eq!(queue.pop().unwrap().id, id2);
        assert_eq!(queue.pop().unwrap().id, id4);
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut queue = PriorityQueue::new();
        assert!(queue.peek().is_none());

        let id1 = queue.push(JobPriority::Visible, ());
        queue.push(JobPriority::Prefetch, ());

        assert_eq!(queue.peek().map(|job| job.id), Some(id1));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_remove_if() {
        let mut queue = PriorityQueue::new();

        queue.push(JobPriority::Visible, 10);
        queue.push(JobPriority::Visible, 11);
        queue.push(JobPriority::Prefetch, 20);

        let removed = queue.remove_if(|job| job.payload < 20);
        assert_eq!(removed, 2);
        assert_eq!(queue.pop().unwrap().payload, 20);
    }

    #[test]
    fn test_promote_keeps_fifo_among_promoted() {
        let mut queue = PriorityQueue::new();

        let visible = queue.push(JobPriority::Visible, "on-screen");
        let first = queue.push(JobPriority::Prefetch, "margin-1");
        let second = queue.push(JobPriority::Prefetch, "margin-2");
        queue.push(JobPriority::Prefetch, "margin-3");

        let promoted = queue.promote_if(JobPriority::Visible, |job| job.payload != "margin-3");
        assert_eq!(promoted, 2);

        assert_eq!(queue.pop().unwrap().id, visible);
        assert_eq!(queue.pop().unwrap().id, first);
        assert_eq!(queue.pop().unwrap().id, second);
        assert_eq!(queue.pop().unwrap().payload, "margin-3");
    }

    #[test]
    fn test_promote_never_demotes() {
        let mut queue = PriorityQueue::new();
        queue.push(JobPriority::Enumeration, ());

        assert_eq!(queue.promote_if(JobPriority::Visible, |_| true), 0);
        assert_eq!(queue.pop().unwrap().priority, JobPriority::Enumeration);
    }

    #[test]
    fn test_clear() {
        let mut queue = PriorityQueue::new();
        queue.push(JobPriority::Visible, ());
        queue.push(JobPriority::Prefetch, ());

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.jobs().count(), 0);
    }
}
