//! Destinations for recorded usage events.
//!
//! The usage buffer hands batches to a [`UsageSink`]. In production that is
//! the [`DatabaseSink`]; tests plug in an in-memory sink.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{db::DbPool, models::UsageEvent, observability::metrics};

/// Trait for usage data sinks.
#[async_trait]
pub trait UsageSink: Send + Sync {
    /// Write a batch of usage events.
    ///
    /// Returns the number of events written.
    async fn write_batch(&self, events: &[UsageEvent]) -> Result<usize, UsageSinkError>;

    /// Sink name for logging.
    fn name(&self) -> &'static str;
}

#[derive(Debug, thiserror::Error)]
pub enum UsageSinkError {
    #[error("Database error: {0}")]
    Database(String),
}

/// Writes usage events to the configured database.
pub struct DatabaseSink {
    db: Arc<DbPool>,
}

impl DatabaseSink {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UsageSink for DatabaseSink {
    async fn write_batch(&self, events: &[UsageEvent]) -> Result<usize, UsageSinkError> {
        if events.is_empty() {
            return Ok(0);
        }

        let start = std::time::Instant::now();
        match self.db.usage().insert_batch(events).await {
            Ok(inserted) => {
                let duration = start.elapsed().as_secs_f64();
                metrics::record_usage_flush(inserted, true, duration);
                tracing::debug!(
                    inserted = inserted,
                    total = events.len(),
                    duration_ms = duration * 1000.0,
                    "Usage batch insert successful"
                );
                Ok(inserted)
            }
            Err(e) => {
                let duration = start.elapsed().as_secs_f64();
                metrics::record_usage_flush(events.len(), false, duration);
                tracing::error!(
                    error = %e,
                    count = events.len(),
                    "Failed to batch insert usage events"
                );
                Err(UsageSinkError::Database(e.to_string()))
            }
        }
    }

    fn name(&self) -> &'static str {
        "database"
    }
}

/// Collects events in memory. Used by tests that need to observe what the
/// pipeline recorded.
#[cfg(test)]
#[derive(Default)]
pub struct MemorySink {
    events: std::sync::Mutex<Vec<UsageEvent>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl UsageSink for MemorySink {
    async fn write_batch(&self, events: &[UsageEvent]) -> Result<usize, UsageSinkError> {
        self.events.lock().unwrap().extend_from_slice(events);
        Ok(events.len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
