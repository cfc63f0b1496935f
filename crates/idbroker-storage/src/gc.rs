//! Periodic garbage collection of expired credential rows.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::StorageResult;
use crate::traits::Storage;
use crate::types::GcResult;

/// Runs [`Storage::garbage_collect`] on a fixed interval.
pub struct GarbageCollector {
    storage: Arc<dyn Storage>,
    interval: Duration,
}

impl GarbageCollector {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, interval: Duration) -> Self {
        Self { storage, interval }
    }

    /// One sweep at the current time.
    pub async fn run_once(&self) -> StorageResult<GcResult> {
        self.run_at(OffsetDateTime::now_utc()).await
    }

    pub async fn run_at(&self, now: OffsetDateTime) -> StorageResult<GcResult> {
        let result = self.storage.garbage_collect(now).await?;
        if !result.is_empty() {
            tracing::info!(
                backend = self.storage.backend_name(),
                auth_requests = result.auth_requests,
                auth_codes = result.auth_codes,
                device_requests = result.device_requests,
                device_tokens = result.device_tokens,
                "garbage collection removed expired rows"
            );
        }
        Ok(result)
    }

    /// Sweeps every interval until `cancel` fires. A failed sweep is logged
    /// and retried on the next tick.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            tracing::warn!(error = %e, category = %e.category(), "garbage collection failed");
                        }
                    }
                }
            }
            tracing::debug!("garbage collection loop stopped");
        })
    }
}
