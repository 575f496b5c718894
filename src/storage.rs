use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// A completed, cacheable outcome for one idempotency key.
///
/// Records are write-once: created after a successful execution and never
/// mutated. Failed executions produce no record at all.
#[derive(Clone, Debug)]
pub struct IdempotencyRecord<T> {
    /// Value produced by the action, returned verbatim to every reader.
    pub result: T,
    /// Creation time on the monotonic clock, used for TTL math.
    pub stored_at: Instant,
    /// Only `true` records satisfy lookups. Always `true` for records written
    /// through [`StorageBackend::set_success`]; kept in the record so backends
    /// that persist failure markers still honor the read contract.
    pub success: bool,
}

impl<T> IdempotencyRecord<T> {
    /// A record counts as a hit only while successful and strictly younger
    /// than the TTL.
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        self.success && now.duration_since(self.stored_at) < ttl
    }
}

/// Pluggable key→record store.
///
/// The in-memory implementation is the default; a networked key-value store
/// can be substituted without touching the processor or coordinator. Backend
/// failures must be returned as errors — the processor propagates them rather
/// than treating an outage as a miss.
#[async_trait]
pub trait StorageBackend<T: Send + Sync + 'static>: Send + Sync {
    /// Returns the record for `key` only when it is present, successful, and
    /// fresh at `now`. Expired and failed entries read as absent. Must not
    /// mutate state as a side effect of a miss.
    async fn get(
        &self,
        key: &str,
        now: Instant,
        ttl: Duration,
    ) -> anyhow::Result<Option<IdempotencyRecord<T>>>;

    /// Stores a successful result for `key`, overwriting any existing record.
    /// The processor only overwrites after expiry-triggered re-execution.
    async fn set_success(&self, key: &str, result: T, stored_at: Instant) -> anyhow::Result<()>;

    /// Removes a record unconditionally.
    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Removes every record whose age is at least the TTL and returns how many
    /// were dropped. Called by the cleanup sweep, never from the request path.
    async fn sweep_expired(&self, now: Instant, ttl: Duration) -> anyhow::Result<usize>;
}

/// In-memory backend used by default and in tests.
///
/// Guarded by a plain `std::sync` lock: every critical section is a short map
/// operation with no await point inside.
#[derive(Debug)]
pub struct InMemoryStorage<T> {
    records: RwLock<HashMap<String, IdempotencyRecord<T>>>,
}

impl<T> InMemoryStorage<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records currently held, including expired ones the sweep has
    /// not reclaimed yet.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, IdempotencyRecord<T>>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T> Default for InMemoryStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> StorageBackend<T> for InMemoryStorage<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(
        &self,
        key: &str,
        now: Instant,
        ttl: Duration,
    ) -> anyhow::Result<Option<IdempotencyRecord<T>>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records
            .get(key)
            .filter(|record| record.is_fresh(now, ttl))
            .cloned())
    }

    async fn set_success(&self, key: &str, result: T, stored_at: Instant) -> anyhow::Result<()> {
        self.write().insert(
            key.to_string(),
            IdempotencyRecord {
                result,
                stored_at,
                success: true,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.write().remove(key);
        Ok(())
    }

    async fn sweep_expired(&self, now: Instant, ttl: Duration) -> anyhow::Result<usize> {
        let mut records = self.write();
        let before = records.len();
        records.retain(|_, record| now.duration_since(record.stored_at) < ttl);
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn fresh_record_is_returned() {
        let storage = InMemoryStorage::new();
        storage
            .set_success("k", "v".to_string(), Instant::now())
            .await
            .unwrap();

        let record = storage.get("k", Instant::now(), TTL).await.unwrap();
        assert_eq!(record.unwrap().result, "v");
    }

    #[tokio::test(start_paused = true)]
    async fn record_expires_at_exactly_ttl() {
        let storage = InMemoryStorage::new();
        storage
            .set_success("k", "v".to_string(), Instant::now())
            .await
            .unwrap();

        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        assert!(storage.get("k", Instant::now(), TTL).await.unwrap().is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(storage.get("k", Instant::now(), TTL).await.unwrap().is_none());
        // Expired reads leave the record in place for the sweep.
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired_records() {
        let storage = InMemoryStorage::new();
        storage
            .set_success("old", 1u32, Instant::now())
            .await
            .unwrap();
        tokio::time::advance(TTL).await;
        storage
            .set_success("young", 2u32, Instant::now())
            .await
            .unwrap();

        let removed = storage.sweep_expired(Instant::now(), TTL).await.unwrap();
        assert_eq!(removed, 1);
        assert!(storage.get("old", Instant::now(), TTL).await.unwrap().is_none());
        assert!(storage.get("young", Instant::now(), TTL).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn set_success_overwrites_previous_record() {
        let storage = InMemoryStorage::new();
        storage
            .set_success("k", "v1".to_string(), Instant::now())
            .await
            .unwrap();
        storage
            .set_success("k", "v2".to_string(), Instant::now())
            .await
            .unwrap();

        let record = storage.get("k", Instant::now(), TTL).await.unwrap();
        assert_eq!(record.unwrap().result, "v2");
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_removes_unconditionally() {
        let storage = InMemoryStorage::new();
        storage
            .set_success("k", "v".to_string(), Instant::now())
            .await
            .unwrap();
        storage.delete("k").await.unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn failed_record_never_reads_as_fresh() {
        let record = IdempotencyRecord {
            result: "v",
            stored_at: Instant::now(),
            success: false,
        };
        assert!(!record.is_fresh(Instant::now(), TTL));
    }
}
