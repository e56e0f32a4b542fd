//! Bounded usage event buffer.
//!
//! Request handlers push [`UsageEvent`]s without waiting on storage; a single
//! background worker drains the queue in batches and hands them to a
//! [`UsageSink`]. The queue has a fixed capacity: when storage falls behind,
//! new events are dropped and counted rather than growing memory.
//!
//! The worker flushes when:
//! - a full batch (`batch_size`) is available
//! - the `flush_interval` elapses
//! - [`UsageBuffer::shutdown`] is called, in which case everything still
//!   queued is written before the worker exits

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use tokio::sync::Notify;

use crate::{models::UsageEvent, observability::metrics, usage_sink::UsageSink};

#[derive(Debug, Clone)]
pub struct UsageBufferConfig {
    /// Maximum events per sink write.
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Queue capacity. Pushes beyond this are dropped.
    pub max_pending_entries: usize,
}

impl Default for UsageBufferConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            flush_interval: Duration::from_secs(1),
            max_pending_entries: 10_000,
        }
    }
}

impl From<&crate::config::UsageConfig> for UsageBufferConfig {
    fn from(config: &crate::config::UsageConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            flush_interval: Duration::from_millis(config.flush_interval_ms),
            max_pending_entries: config.max_pending_entries,
        }
    }
}

/// Lock-free, bounded queue of usage events with a batching flush worker.
pub struct UsageBuffer {
    sender: Sender<UsageEvent>,
    receiver: Receiver<UsageEvent>,
    config: UsageBufferConfig,
    shutdown: AtomicBool,
    wake: Notify,
    dropped_count: AtomicU64,
}

impl UsageBuffer {
    pub fn new(config: UsageBufferConfig) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(config.max_pending_entries.max(1));
        Self {
            sender,
            receiver,
            config,
            shutdown: AtomicBool::new(false),
            wake: Notify::new(),
            dropped_count: AtomicU64::new(0),
        }
    }

    /// Enqueue an event. Never blocks.
    ///
    /// When the queue is full the new event is dropped.
    pub fn push(&self, event: UsageEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics::record_usage_dropped("queue_full", 1);
                let count = self.dropped_count.fetch_add(1, Ordering::Relaxed);
                // Log every 100 drops
                if count.is_multiple_of(100) {
                    tracing::warn!(
                        dropped_count = count + 1,
                        max_pending = self.config.max_pending_entries,
                        "Usage buffer full: dropping events (storage may be slow or unavailable)"
                    );
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                metrics::record_usage_dropped("closed", 1);
            }
        }
    }

    /// Number of events dropped because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    /// Start the background flush worker on `tracker`.
    pub fn start_worker(
        self: &Arc<Self>,
        sink: Arc<dyn UsageSink>,
        tracker: &tokio_util::task::TaskTracker,
    ) -> tokio::task::JoinHandle<()> {
        let buffer = Arc::clone(self);
        tracker.spawn(async move { buffer.run(sink).await })
    }

    async fn run(&self, sink: Arc<dyn UsageSink>) {
        let batch_size = self.config.batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size);
        tracing::debug!(sink = sink.name(), "Usage buffer worker started");

        loop {
            self.drain_entries(&mut batch, batch_size);
            let full = batch.len() == batch_size;
            if !batch.is_empty() {
                self.flush_batch(&sink, &mut batch).await;
            }

            if self.shutdown.load(Ordering::Acquire) {
                loop {
                    self.drain_entries(&mut batch, batch_size);
                    if batch.is_empty() {
                        break;
                    }
                    self.flush_batch(&sink, &mut batch).await;
                }
                tracing::info!("Usage buffer worker shutting down");
                break;
            }

            // More is waiting: keep going without sleeping.
            if full {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.flush_interval) => {}
                _ = self.wake.notified() => {}
            }
        }
    }

    fn drain_entries(&self, batch: &mut Vec<UsageEvent>, max_size: usize) {
        while batch.len() < max_size {
            match self.receiver.try_recv() {
                Ok(event) => batch.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    /// Signal the worker to drain what is queued and exit.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    async fn flush_batch(&self, sink: &Arc<dyn UsageSink>, batch: &mut Vec<UsageEvent>) {
        let count = batch.len();
        tracing::debug!(count, sink = sink.name(), "Flushing usage buffer");

        // A failed batch is lost; the request that produced it already succeeded.
        if let Err(e) = sink.write_batch(batch).await {
            metrics::record_usage_dropped("sink_error", count as u64);
            tracing::error!(error = %e, count, sink = sink.name(), "Usage flush failed");
        }
        batch.clear();
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tokio_util::task::TaskTracker;
    use uuid::Uuid;

    use super::*;
    use crate::usage_sink::MemorySink;

    fn make_test_event() -> UsageEvent {
        UsageEvent {
            organization_id: Uuid::new_v4(),
            api_key_id: Some(Uuid::new_v4()),
            endpoint: "/api/v1/messages/send".to_string(),
            method: "POST".to_string(),
            status_code: 200,
            occurred_at: Utc::now(),
        }
    }

    fn config(batch_size: usize, max_pending_entries: usize) -> UsageBufferConfig {
        UsageBufferConfig {
            batch_size,
            flush_interval: Duration::from_secs(60),
            max_pending_entries,
        }
    }

    #[test]
    fn test_buffer_push_and_len() {
        let buffer = UsageBuffer::new(UsageBufferConfig::default());
        assert!(buffer.is_empty());

        buffer.push(make_test_event());
        buffer.push(make_test_event());
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_buffer_overflow_drops_new_entries() {
        let buffer = UsageBuffer::new(config(10, 5));

        for _ in 0..5 {
            buffer.push(make_test_event());
        }
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.dropped_count(), 0);

        buffer.push(make_test_event());
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.dropped_count(), 1);

        for _ in 0..3 {
            buffer.push(make_test_event());
        }
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.dropped_count(), 4);
    }

    #[test]
    fn test_overflow_keeps_oldest() {
        let buffer = UsageBuffer::new(config(10, 2));
        let first = make_test_event();
        buffer.push(first.clone());
        buffer.push(make_test_event());
        buffer.push(make_test_event());

        let mut batch = Vec::new();
        buffer.drain_entries(&mut batch, 10);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], first);
    }

    #[test]
    fn test_drain_entries() {
        let buffer = UsageBuffer::new(config(10, 100));
        for _ in 0..15 {
            buffer.push(make_test_event());
        }

        let mut batch = Vec::new();
        buffer.drain_entries(&mut batch, 10);
        assert_eq!(batch.len(), 10);
        assert_eq!(buffer.len(), 5);

        batch.clear();
        buffer.drain_entries(&mut batch, 10);
        assert_eq!(batch.len(), 5);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_config_from_usage_config() {
        let usage = crate::config::UsageConfig {
            batch_size: 50,
            flush_interval_ms: 250,
            max_pending_entries: 400,
            ..Default::default()
        };
        let config = UsageBufferConfig::from(&usage);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.flush_interval, Duration::from_millis(250));
        assert_eq!(config.max_pending_entries, 400);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let buffer = Arc::new(UsageBuffer::new(config(4, 100)));
        let sink = Arc::new(MemorySink::default());
        let tracker = TaskTracker::new();

        for _ in 0..11 {
            buffer.push(make_test_event());
        }
        let handle = buffer.start_worker(sink.clone(), &tracker);
        buffer.shutdown();
        handle.await.unwrap();

        assert_eq!(sink.events().len(), 11);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_worker_flushes_on_interval() {
        let buffer = Arc::new(UsageBuffer::new(UsageBufferConfig {
            batch_size: 100,
            flush_interval: Duration::from_millis(10),
            max_pending_entries: 100,
        }));
        let sink = Arc::new(MemorySink::default());
        let tracker = TaskTracker::new();
        let handle = buffer.start_worker(sink.clone(), &tracker);

        buffer.push(make_test_event());
        for _ in 0..100 {
            if !sink.events().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.events().len(), 1);

        buffer.shutdown();
        handle.await.unwrap();
    }
}
