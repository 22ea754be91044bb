//! In-memory queue for tests and single-process runs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use super::{Job, JobId, QueuedJob, WorkQueue};
use crate::Result;

#[derive(Debug)]
struct Entry {
    id: i64,
    job: Job,
    attempts: u32,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    entries: Vec<Entry>,
}

/// In-memory [`WorkQueue`] implementation.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs currently stored (visible or claimed).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// True when no jobs are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl WorkQueue for MemoryQueue {
    async fn enqueue(&self, job: &Job) -> Result<JobId> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.entries.push(Entry {
            id,
            job: job.clone(),
            attempts: 0,
            visible_at: Instant::now(),
        });
        Ok(JobId(id))
    }

    async fn dequeue(&self, visibility: Duration) -> Result<Option<QueuedJob>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;

        let Some(entry) = inner
            .entries
            .iter_mut()
            .filter(|e| e.visible_at <= now)
            .min_by_key(|e| e.id)
        else {
            return Ok(None);
        };

        entry.attempts += 1;
        entry.visible_at = now + visibility;
        Ok(Some(QueuedJob {
            id: JobId(entry.id),
            job: entry.job.clone(),
            attempts: entry.attempts,
        }))
    }

    async fn ack(&self, id: JobId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.entries.retain(|e| e.id != id.0);
        Ok(())
    }

    async fn retry(&self, id: JobId, delay: Duration) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.entries.iter_mut().find(|e| e.id == id.0) {
            entry.visible_at = Instant::now() + delay;
        }
        Ok(())
    }
}
