use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use opentelemetry::global;
use opentelemetry::metrics::Counter as OtelCounter;
use serde::Serialize;

/// Counters recorded by the processor. Lightweight atomics back the snapshot
/// API; OpenTelemetry handles export the same series in production.
#[derive(Clone)]
pub struct MetricsRegistry {
    cache_hit: Arc<AtomicU64>,
    cache_miss: Arc<AtomicU64>,
    concurrent_wait: Arc<AtomicU64>,
    cleanup_runs: Arc<AtomicU64>,
    cleanup_removed: Arc<AtomicU64>,
    cache_hit_counter: Option<OtelCounter<u64>>,
    cache_miss_counter: Option<OtelCounter<u64>>,
    concurrent_wait_counter: Option<OtelCounter<u64>>,
    cleanup_removed_counter: Option<OtelCounter<u64>>,
}

/// Point-in-time view of the counters, safe to take concurrently with
/// increments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Lookups satisfied from a cached record, before or after the lock.
    pub cache_hit: u64,
    /// Calls that reached actual action execution.
    pub cache_miss: u64,
    /// Callers that found an execution already in flight for their key.
    pub concurrent_wait: u64,
    /// Completed background sweeps.
    pub cleanup_runs: u64,
    /// Records reclaimed by background sweeps.
    pub cleanup_removed: u64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let meter = global::meter("keyflight");
        Self {
            cache_hit: Arc::new(AtomicU64::new(0)),
            cache_miss: Arc::new(AtomicU64::new(0)),
            concurrent_wait: Arc::new(AtomicU64::new(0)),
            cleanup_runs: Arc::new(AtomicU64::new(0)),
            cleanup_removed: Arc::new(AtomicU64::new(0)),
            cache_hit_counter: Some(meter.u64_counter("keyflight_cache_hit_total").build()),
            cache_miss_counter: Some(meter.u64_counter("keyflight_cache_miss_total").build()),
            concurrent_wait_counter: Some(
                meter.u64_counter("keyflight_concurrent_wait_total").build(),
            ),
            cleanup_removed_counter: Some(
                meter.u64_counter("keyflight_cleanup_removed_total").build(),
            ),
        }
    }

    /// Registry with atomics only, without OpenTelemetry instruments. Useful
    /// in tests and embedded setups with no meter provider installed.
    pub fn without_telemetry() -> Self {
        Self {
            cache_hit: Arc::new(AtomicU64::new(0)),
            cache_miss: Arc::new(AtomicU64::new(0)),
            concurrent_wait: Arc::new(AtomicU64::new(0)),
            cleanup_runs: Arc::new(AtomicU64::new(0)),
            cleanup_removed: Arc::new(AtomicU64::new(0)),
            cache_hit_counter: None,
            cache_miss_counter: None,
            concurrent_wait_counter: None,
            cleanup_removed_counter: None,
        }
    }

    pub fn record_hit(&self) {
        self.cache_hit.fetch_add(1, Ordering::Relaxed);
        if let Some(counter) = &self.cache_hit_counter {
            counter.add(1, &[]);
        }
    }

    pub fn record_miss(&self) {
        self.cache_miss.fetch_add(1, Ordering::Relaxed);
        if let Some(counter) = &self.cache_miss_counter {
            counter.add(1, &[]);
        }
    }

    pub fn record_wait(&self) {
        self.concurrent_wait.fetch_add(1, Ordering::Relaxed);
        if let Some(counter) = &self.concurrent_wait_counter {
            counter.add(1, &[]);
        }
    }

    pub fn record_cleanup(&self, removed: u64) {
        self.cleanup_runs.fetch_add(1, Ordering::Relaxed);
        self.cleanup_removed.fetch_add(removed, Ordering::Relaxed);
        if let Some(counter) = &self.cleanup_removed_counter {
            counter.add(removed, &[]);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hit: self.cache_hit.load(Ordering::Relaxed),
            cache_miss: self.cache_miss.load(Ordering::Relaxed),
            concurrent_wait: self.concurrent_wait.load(Ordering::Relaxed),
            cleanup_runs: self.cleanup_runs.load(Ordering::Relaxed),
            cleanup_removed: self.cleanup_removed.load(Ordering::Relaxed),
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
