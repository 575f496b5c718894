#![forbid(unsafe_code)]

pub mod cleanup;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod processor;
pub mod storage;

pub use cleanup::CleanupScheduler;
pub use config::ProcessorConfig;
pub use coordinator::{KeyClaim, KeyCoordinator, KeyPermit};
pub use error::{IdempotencyError, Result};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use processor::{IdempotentProcessor, IdempotentProcessorBuilder};
pub use storage::{IdempotencyRecord, InMemoryStorage, StorageBackend};
