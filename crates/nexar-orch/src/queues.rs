//! Per-batch-key pending queues.
//!
//! One FIFO queue exists per `(provider, device)` pair, each behind its own
//! lock so dispatches to different devices proceed in parallel. Queues hold
//! job ids and enqueue stamps only; submission state stays in the store.

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::submission::{BatchKey, JobId};

/// One queue member: the job id and when it entered the queue.
///
/// The stamp comes from the monotonic clock; wall-clock time is used only
/// for scheduled fire times.
#[derive(Debug, Clone, Copy)]
pub struct PendingJob {
    /// Orchestrator job id.
    pub job_id: JobId,
    /// When the job entered this queue.
    pub enqueued: Instant,
}

impl PendingJob {
    /// Create an entry stamped now.
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            enqueued: Instant::now(),
        }
    }
}

type Queue = Arc<Mutex<VecDeque<PendingJob>>>;

/// The set of pending queues, keyed by [`BatchKey`].
#[derive(Default)]
pub struct BatchQueues {
    queues: RwLock<FxHashMap<BatchKey, Queue>>,
}

impl BatchQueues {
    /// Create an empty queue set.
    pub fn new() -> Self {
        Self::default()
    }

    async fn queue(&self, key: &BatchKey) -> Queue {
        {
            let queues = self.queues.read().await;
            if let Some(queue) = queues.get(key) {
                return queue.clone();
            }
        }
        let mut queues = self.queues.write().await;
        queues
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }

    /// Append a job to its key's queue.
    pub async fn push(&self, key: &BatchKey, job_id: JobId) {
        let queue = self.queue(key).await;
        queue.lock().await.push_back(PendingJob::new(job_id));
    }

    /// Number of jobs waiting under a key.
    pub async fn len(&self, key: &BatchKey) -> usize {
        let queues = self.queues.read().await;
        match queues.get(key) {
            Some(queue) => queue.lock().await.len(),
            None => 0,
        }
    }

    /// All keys that currently have a queue (possibly empty).
    pub async fn keys(&self) -> Vec<BatchKey> {
        let queues = self.queues.read().await;
        queues.keys().cloned().collect()
    }

    /// Snapshot a key's queue in FIFO order.
    pub async fn snapshot(&self, key: &BatchKey) -> Vec<PendingJob> {
        let queues = self.queues.read().await;
        match queues.get(key) {
            Some(queue) => queue.lock().await.iter().copied().collect(),
            None => Vec::new(),
        }
    }

    /// Remove one job from a key's queue. Returns whether it was present.
    pub async fn remove(&self, key: &BatchKey, job_id: &JobId) -> bool {
        let queues = self.queues.read().await;
        let Some(queue) = queues.get(key) else {
            return false;
        };
        let mut queue = queue.lock().await;
        let before = queue.len();
        queue.retain(|entry| entry.job_id != *job_id);
        queue.len() < before
    }

    /// Remove a set of jobs from a key's queue.
    pub async fn remove_ids(&self, key: &BatchKey, ids: &[JobId]) {
        let queues = self.queues.read().await;
        if let Some(queue) = queues.get(key) {
            let mut queue = queue.lock().await;
            queue.retain(|entry| !ids.contains(&entry.job_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let queues = BatchQueues::new();
        let key = BatchKey::new("local", "dev");

        let ids: Vec<JobId> = (0..3).map(|_| JobId::new()).collect();
        for id in &ids {
            queues.push(&key, *id).await;
        }

        let snapshot = queues.snapshot(&key).await;
        let order: Vec<JobId> = snapshot.iter().map(|e| e.job_id).collect();
        assert_eq!(order, ids);
        assert_eq!(queues.len(&key).await, 3);
    }

    #[tokio::test]
    async fn test_remove() {
        let queues = BatchQueues::new();
        let key = BatchKey::new("local", "dev");

        let keep = JobId::new();
        let drop = JobId::new();
        queues.push(&key, keep).await;
        queues.push(&key, drop).await;

        assert!(queues.remove(&key, &drop).await);
        assert!(!queues.remove(&key, &drop).await);
        assert_eq!(queues.len(&key).await, 1);
        assert_eq!(queues.snapshot(&key).await[0].job_id, keep);
    }

    #[tokio::test]
    async fn test_keys_independent() {
        let queues = BatchQueues::new();
        let key_a = BatchKey::new("local", "dev_a");
        let key_b = BatchKey::new("local", "dev_b");

        queues.push(&key_a, JobId::new()).await;
        queues.push(&key_a, JobId::new()).await;
        queues.push(&key_b, JobId::new()).await;

        assert_eq!(queues.len(&key_a).await, 2);
        assert_eq!(queues.len(&key_b).await, 1);
        assert_eq!(queues.keys().await.len(), 2);
    }
}
