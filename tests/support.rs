#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keyflight::{IdempotencyRecord, StorageBackend};
use tokio::time::Instant;

/// Backend that fails every operation, simulating an unreachable store.
pub struct FailingStorage;

#[async_trait]
impl StorageBackend<String> for FailingStorage {
    async fn get(
        &self,
        _key: &str,
        _now: Instant,
        _ttl: Duration,
    ) -> anyhow::Result<Option<IdempotencyRecord<String>>> {
        Err(anyhow::anyhow!("backend unreachable"))
    }

    async fn set_success(
        &self,
        _key: &str,
        _result: String,
        _stored_at: Instant,
    ) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("backend unreachable"))
    }

    async fn delete(&self, _key: &str) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("backend unreachable"))
    }

    async fn sweep_expired(&self, _now: Instant, _ttl: Duration) -> anyhow::Result<usize> {
        Err(anyhow::anyhow!("backend unreachable"))
    }
}

/// Counts how many times an action body actually ran.
#[derive(Default)]
pub struct InvocationCounter(AtomicUsize);

impl InvocationCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
