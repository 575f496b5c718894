use std::time::Duration;

use serde::Deserialize;

/// Tuning knobs recognized by the processor builder.
///
/// Partial documents deserialize cleanly; omitted fields fall back to their
/// defaults.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Age after which a cached record no longer counts as a hit.
    pub ttl_seconds: u64,
    /// Sweep frequency of the background cleanup task, independent of the TTL.
    pub cleanup_interval_seconds: u64,
}

impl ProcessorConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            cleanup_interval_seconds: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_documented_values() {
        let config = ProcessorConfig::default();
        assert_eq!(config.ttl(), Duration::from_secs(300));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(30));
    }

    #[test]
    fn partial_document_fills_in_defaults() {
        let config: ProcessorConfig =
            serde_json::from_value(json!({ "ttl_seconds": 60 })).expect("valid config");
        assert_eq!(config.ttl_seconds, 60);
        assert_eq!(config.cleanup_interval_seconds, 30);
    }

    #[test]
    fn full_document_round_trips() {
        let config: ProcessorConfig = serde_json::from_value(json!({
            "ttl_seconds": 10,
            "cleanup_interval_seconds": 2,
        }))
        .expect("valid config");
        assert_eq!(config.ttl(), Duration::from_secs(10));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(2));
    }
}
