//! Background recording of API key `last_used_at` timestamps.
//!
//! Authentication enqueues an update and moves on. The worker drains what is
//! queued when the shutdown token fires, then exits.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use uuid::Uuid;

use crate::db::DbPool;

/// Pending last-used updates held before new ones are dropped.
pub const LAST_USED_QUEUE_CAPACITY: usize = 1024;

/// Records credential last-used timestamps off the request path.
///
/// A single worker drains a bounded queue. When the queue is full the newest
/// update is dropped: a stale `last_used_at` is harmless.
#[derive(Clone)]
pub struct LastUsedUpdater {
    sender: mpsc::Sender<Uuid>,
    dropped: Arc<AtomicU64>,
}

impl LastUsedUpdater {
    pub fn spawn(
        db: Arc<DbPool>,
        capacity: usize,
        tracker: &TaskTracker,
        shutdown: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        tracker.spawn(run_worker(db, receiver, shutdown));
        Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue an update for `key_id`. Never waits.
    pub fn touch(&self, key_id: Uuid) {
        if self.sender.try_send(key_id).is_err() {
            let count = self.dropped.fetch_add(1, Ordering::Relaxed);
            if count.is_multiple_of(100) {
                tracing::warn!(
                    dropped_count = count + 1,
                    "Last-used queue full: dropping credential timestamp updates"
                );
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn run_worker(
    db: Arc<DbPool>,
    mut receiver: mpsc::Receiver<Uuid>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            next = receiver.recv() => match next {
                Some(key_id) => update(&db, key_id).await,
                None => break,
            },
            _ = shutdown.cancelled() => {
                while let Ok(key_id) = receiver.try_recv() {
                    update(&db, key_id).await;
                }
                break;
            }
        }
    }
    tracing::debug!("Last-used worker stopped");
}

async fn update(db: &DbPool, key_id: Uuid) {
    if let Err(e) = db.api_keys().update_last_used(key_id).await {
        tracing::warn!(error = %e, api_key_id = %key_id, "Failed to update API key last_used_at");
    }
}
