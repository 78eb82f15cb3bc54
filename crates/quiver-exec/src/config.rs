//! Executor tunables.

use std::time::Duration;

use serde::Deserialize;

fn default_http_timeout_ms() -> u64 {
    5_000
}

fn default_assert_batch_timeout_ms() -> u64 {
    30_000
}

fn default_collection_timeout_ms() -> u64 {
    35_000
}

fn default_assert_timeout_ms() -> u64 {
    5_000
}

fn default_slow_assert_warn_ms() -> u64 {
    500
}

/// Deadlines and parallelism for request execution.
///
/// Deserializable so a host process can load it from its config file;
/// [`Default`] gives the stock values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Outbound HTTP call deadline, milliseconds.
    pub http_timeout_ms: u64,
    /// Deadline for one whole assertion batch, milliseconds.
    pub assert_batch_timeout_ms: u64,
    /// Deadline for the collection phase (call + assertions + persist),
    /// milliseconds.
    pub collection_timeout_ms: u64,
    /// Per-assertion deadline, milliseconds.
    pub assert_timeout_ms: u64,
    /// Evaluations slower than this are logged, milliseconds.
    pub slow_assert_warn_ms: u64,
    /// Concurrent assertion evaluations; `None` runs one task per
    /// assertion.
    pub assert_parallelism: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            http_timeout_ms: default_http_timeout_ms(),
            assert_batch_timeout_ms: default_assert_batch_timeout_ms(),
            collection_timeout_ms: default_collection_timeout_ms(),
            assert_timeout_ms: default_assert_timeout_ms(),
            slow_assert_warn_ms: default_slow_assert_warn_ms(),
            assert_parallelism: None,
        }
    }
}

impl ExecutorConfig {
    /// Outbound HTTP call deadline.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Whole-batch assertion deadline.
    pub fn assert_batch_timeout(&self) -> Duration {
        Duration::from_millis(self.assert_batch_timeout_ms)
    }

    /// Collection-phase deadline.
    pub fn collection_timeout(&self) -> Duration {
        Duration::from_millis(self.collection_timeout_ms)
    }

    /// Per-assertion deadline.
    pub fn assert_timeout(&self) -> Duration {
        Duration::from_millis(self.assert_timeout_ms)
    }

    /// Slow-evaluation warning threshold.
    pub fn slow_assert_warn(&self) -> Duration {
        Duration::from_millis(self.slow_assert_warn_ms)
    }

    /// Semaphore width for `n` assertions.
    pub fn parallelism_for(&self, n: usize) -> usize {
        match self.assert_parallelism {
            Some(width) => width.max(1),
            None => n.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.http_timeout(), Duration::from_secs(5));
        assert_eq!(config.assert_batch_timeout(), Duration::from_secs(30));
        assert_eq!(config.collection_timeout(), Duration::from_secs(35));
        assert_eq!(config.parallelism_for(7), 7);
    }

    #[test]
    fn test_partial_deserialization_keeps_defaults() {
        let config: ExecutorConfig =
            serde_json::from_str(r#"{"http_timeout_ms": 250, "assert_parallelism": 2}"#).unwrap();
        assert_eq!(config.http_timeout(), Duration::from_millis(250));
        assert_eq!(config.parallelism_for(7), 2);
        assert_eq!(config.assert_batch_timeout(), Duration::from_secs(30));
    }
}
