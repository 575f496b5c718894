use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info_span, Instrument};

use crate::cleanup::CleanupScheduler;
use crate::config::ProcessorConfig;
use crate::coordinator::KeyCoordinator;
use crate::error::{IdempotencyError, Result};
use crate::metrics::MetricsRegistry;
use crate::storage::{InMemoryStorage, StorageBackend};

/// Exactly-once execution coordinator.
///
/// For a given idempotency key, concurrent or repeated calls to
/// [`process`](Self::process) trigger at most one real execution of the action
/// within the TTL window; every caller observes the value produced by that
/// single execution. Failures are never cached. Work on unrelated keys
/// proceeds fully in parallel.
///
/// The processor owns no record state itself: records live in the
/// [`StorageBackend`], per-key locks in the [`KeyCoordinator`].
pub struct IdempotentProcessor<T: Send + Sync + 'static> {
    ttl: Duration,
    storage: Arc<dyn StorageBackend<T>>,
    coordinator: KeyCoordinator,
    metrics: Arc<MetricsRegistry>,
    cleanup: CleanupScheduler,
}

impl<T> IdempotentProcessor<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn builder() -> IdempotentProcessorBuilder<T> {
        IdempotentProcessorBuilder::new()
    }

    /// Runs `action` at most once per key within the TTL window.
    ///
    /// Arguments for the action travel as closure captures. The flow is
    /// check → coordinate → re-check → execute → cache: a cached hit returns
    /// immediately; otherwise the caller enters the key's critical section,
    /// re-checks the cache (a caller that waited must see the winner's result
    /// without re-executing), and only then runs the action. A successful
    /// result is stored before the lock is released; an action error is
    /// forwarded unchanged and nothing is cached, so the next call re-executes.
    ///
    /// The per-key lock is released on every exit path, including errors and
    /// cancellation.
    pub async fn process<F, Fut>(&self, key: &str, action: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let span = info_span!("idempotency.process", key = %key);
        async {
            if let Some(result) = self.lookup(key).await? {
                self.metrics.record_hit();
                return Ok(result);
            }

            let claim = self.coordinator.enter(key);
            if claim.contended() {
                self.metrics.record_wait();
            }
            let _permit = claim.acquire().await;

            // Double-check under the lock: losers of the race to enter must
            // observe the winner's record instead of executing again.
            if let Some(result) = self.lookup(key).await? {
                self.metrics.record_hit();
                return Ok(result);
            }

            self.metrics.record_miss();
            let result = action()
                .await
                .map_err(|source| IdempotencyError::action(key, source))?;
            self.storage
                .set_success(key, result.clone(), Instant::now())
                .await
                .map_err(|source| IdempotencyError::storage(key, source))?;
            Ok(result)
        }
        .instrument(span)
        .await
    }

    async fn lookup(&self, key: &str) -> Result<Option<T>> {
        let record = self
            .storage
            .get(key, Instant::now(), self.ttl)
            .await
            .map_err(|source| IdempotencyError::storage(key, source))?;
        Ok(record.map(|record| record.result))
    }

    /// Access to the processor's counters for export or assertions.
    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stops the background cleanup task. Idempotent; a second call is a
    /// no-op. No sweep starts after this returns. Request processing keeps
    /// working afterwards, minus proactive expiry.
    pub async fn shutdown(&self) {
        self.cleanup.shutdown().await;
    }
}

/// Builder for configuring a processor instance.
pub struct IdempotentProcessorBuilder<T: Send + Sync + 'static> {
    ttl: Duration,
    cleanup_interval: Duration,
    storage: Option<Arc<dyn StorageBackend<T>>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl<T> IdempotentProcessorBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let config = ProcessorConfig::default();
        Self {
            ttl: config.ttl(),
            cleanup_interval: config.cleanup_interval(),
            storage: None,
            metrics: None,
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self {
            ttl: config.ttl(),
            cleanup_interval: config.cleanup_interval(),
            storage: None,
            metrics: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend<T>>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the processor and spawns its cleanup task; requires a running
    /// tokio runtime.
    pub fn build(self) -> IdempotentProcessor<T> {
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemoryStorage::new()));
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(MetricsRegistry::new()));
        // A zero interval would make the ticker spin.
        let interval = self.cleanup_interval.max(Duration::from_millis(1));
        let cleanup = CleanupScheduler::spawn(
            Arc::clone(&storage),
            self.ttl,
            interval,
            Arc::clone(&metrics),
        );

        IdempotentProcessor {
            ttl: self.ttl,
            storage,
            coordinator: KeyCoordinator::new(),
            metrics,
            cleanup,
        }
    }
}

impl<T> Default for IdempotentProcessorBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
