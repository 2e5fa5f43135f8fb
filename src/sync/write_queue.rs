//! Deferred, batched session writes.
//!
//! Queued writes are create-if-absent: a drain skips any identity that
//! already exists in the store. The immediate path in the engine is the
//! only overwrite.

use crate::store::DocumentStore;
use crate::sync::dedup::RequestDeduplicator;
use crate::types::SessionEntity;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Outcome of one drain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.created + self.skipped + self.failed
    }
}

struct QueueState {
    pending: HashMap<String, SessionEntity>,
    timer: Option<JoinHandle<()>>,
}

struct QueueInner {
    store: Arc<dyn DocumentStore>,
    reads: RequestDeduplicator,
    collection: String,
    delay: Duration,
    state: Mutex<QueueState>,
}

/// Pending-write map drained by a single deferred timer.
#[derive(Clone)]
pub struct CoalescingWriteQueue {
    inner: Arc<QueueInner>,
}

impl CoalescingWriteQueue {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        reads: RequestDeduplicator,
        collection: impl Into<String>,
        delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                store,
                reads,
                collection: collection.into(),
                delay,
                state: Mutex::new(QueueState {
                    pending: HashMap::new(),
                    timer: None,
                }),
            }),
        }
    }

    /// Store `entity` as the pending write for `id`, replacing any earlier
    /// one, and arm the drain timer if it is not armed yet.
    pub async fn enqueue(&self, id: impl Into<String>, entity: SessionEntity) {
        let id = id.into();
        let mut state = self.inner.state.lock().await;
        state.pending.insert(id.clone(), entity);
        debug!("Queued write for {} ({} pending)", id, state.pending.len());

        if state.timer.is_none() {
            let queue = self.clone();
            let delay = self.inner.delay;
            state.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                queue.drain().await;
            }));
        }
    }

    pub async fn pending_len(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    pub async fn is_armed(&self) -> bool {
        self.inner.state.lock().await.timer.is_some()
    }

    /// Cancel an armed timer and drain now. Does nothing when no timer is armed.
    pub async fn flush(&self) -> DrainReport {
        let armed = {
            let mut state = self.inner.state.lock().await;
            state.timer.take()
        };
        match armed {
            Some(timer) => {
                timer.abort();
                self.drain().await
            }
            None => DrainReport::default(),
        }
    }

    /// Swap out the pending batch and create every entity not already stored.
    /// Per-item failures are logged and counted; they never abort the batch.
    pub async fn drain(&self) -> DrainReport {
        let batch = {
            let mut state = self.inner.state.lock().await;
            state.timer = None;
            std::mem::take(&mut state.pending)
        };

        let mut report = DrainReport::default();
        if batch.is_empty() {
            return report;
        }

        for (id, entity) in batch {
            if self.inner.reads.get_by_identity(&id).await.is_some() {
                debug!("Skipping queued write for {}: already stored", id);
                report.skipped += 1;
                continue;
            }

            let document = match serde_json::to_value(&entity) {
                Ok(document) => document,
                Err(e) => {
                    error!("Failed to serialize queued session {}: {}", id, e);
                    report.failed += 1;
                    continue;
                }
            };

            match self.inner.store.create(&self.inner.collection, document).await {
                Ok(_) => report.created += 1,
                Err(e) => {
                    error!("Queued create for {} failed: {}", id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Drained write queue: {} created, {} skipped, {} failed",
            report.created, report.skipped, report.failed
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_session, InMemoryStore};

    fn queue(store: Arc<InMemoryStore>) -> CoalescingWriteQueue {
        let reads = RequestDeduplicator::new(store.clone(), "sessions");
        CoalescingWriteQueue::new(store, reads, "sessions", Duration::from_millis(1000))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_drains_after_delay() {
        let store = Arc::new(InMemoryStore::new());
        let queue = queue(store.clone());

        queue.enqueue("a.md", sample_session("a.md")).await;
        queue.enqueue("b.md", sample_session("b.md")).await;
        assert!(queue.is_armed().await);
        assert_eq!(store.create_count(), 0);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(store.create_count(), 2);
        assert_eq!(queue.pending_len().await, 0);
        assert!(!queue.is_armed().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_enqueue_wins() {
        let store = Arc::new(InMemoryStore::new());
        let queue = queue(store.clone());

        let mut first = sample_session("a.md");
        first.title = "first".to_string();
        let mut second = sample_session("a.md");
        second.title = "second".to_string();

        queue.enqueue("a.md", first).await;
        queue.enqueue("a.md", second).await;
        let report = queue.flush().await;

        assert_eq!(report.created, 1);
        assert_eq!(store.get("sessions", "a.md").unwrap()["title"], "second");
    }

    #[tokio::test]
    async fn test_existing_entities_are_not_overwritten() {
        let store = Arc::new(InMemoryStore::new());
        let mut stored = sample_session("a.md");
        stored.title = "stored".to_string();
        store.insert("sessions", stored);
        let queue = queue(store.clone());

        let mut queued = sample_session("a.md");
        queued.title = "queued".to_string();
        queue.enqueue("a.md", queued).await;
        let report = queue.flush().await;

        assert_eq!(report, DrainReport { created: 0, skipped: 1, failed: 0 });
        assert_eq!(store.get("sessions", "a.md").unwrap()["title"], "stored");
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_creates_for("bad.md");
        let queue = queue(store.clone());

        queue.enqueue("bad.md", sample_session("bad.md")).await;
        queue.enqueue("good.md", sample_session("good.md")).await;
        let report = queue.flush().await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.created, 1);
        assert!(store.get("sessions", "good.md").is_some());
    }

    #[tokio::test]
    async fn test_flush_without_timer_is_noop() {
        let store = Arc::new(InMemoryStore::new());
        let queue = queue(store.clone());

        assert_eq!(queue.flush().await, DrainReport::default());
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_during_drain_starts_new_batch() {
        let store = Arc::new(InMemoryStore::new());
        let queue = queue(store.clone());

        queue.enqueue("a.md", sample_session("a.md")).await;
        queue.flush().await;
        queue.enqueue("b.md", sample_session("b.md")).await;

        assert!(queue.is_armed().await);
        assert_eq!(queue.pending_len().await, 1);
        assert_eq!(queue.flush().await.created, 1);
        assert_eq!(store.create_count(), 2);
    }
}
