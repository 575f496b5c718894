use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::metrics::MetricsRegistry;
use crate::storage::StorageBackend;

/// Periodic expiry sweep, decoupled from the request path.
///
/// The sweep talks to the storage backend only. It never takes a per-key lock,
/// so an in-flight execution is never stalled by reclamation.
pub struct CleanupScheduler {
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CleanupScheduler {
    /// Spawns the sweep task on the current runtime.
    pub fn spawn<T>(
        storage: Arc<dyn StorageBackend<T>>,
        ttl: Duration,
        interval: Duration,
        metrics: Arc<MetricsRegistry>,
    ) -> Self
    where
        T: Send + Sync + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut tick = time::interval(interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        match storage.sweep_expired(Instant::now(), ttl).await {
                            Ok(removed) => {
                                metrics.record_cleanup(removed as u64);
                                if removed > 0 {
                                    debug!(removed, "removed expired idempotency records");
                                }
                            }
                            // A failed sweep is retried on the next tick.
                            Err(err) => warn!(error = %err, "cleanup sweep failed"),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stops the sweep and waits for the task to finish. Idempotent: a second
    /// call finds nothing to do. No sweep starts after this returns.
    pub async fn shutdown(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(handle) = handle else { return };
        let _ = self.shutdown_tx.send(true);
        if handle.await.is_ok() {
            info!("cleanup scheduler stopped");
        }
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        // Best-effort stop for processors dropped without an explicit
        // shutdown; awaiting is not possible here.
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}
