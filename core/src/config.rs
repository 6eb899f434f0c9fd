//! Benchmark run configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pool::MAX_WORKERS;

/// Benchmark configuration
///
/// Defines how a benchmark run should be executed: how many workers (and
/// therefore lanes) the pool owns, and an optional overall deadline after
/// which the run is cancelled cooperatively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Number of concurrent workers; each worker owns exactly one lane
    pub workers: usize,

    /// Optional overall deadline for the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Duration>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            deadline: None,
        }
    }
}

impl BenchConfig {
    /// Create a new config with the given worker count
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    /// Set the overall run deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers < 1 || self.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkers(format!(
                "worker count must be within [1, {}], got {}",
                MAX_WORKERS, self.workers
            )));
        }

        if let Some(deadline) = self.deadline {
            if deadline.is_zero() {
                return Err(ConfigError::InvalidDeadline(
                    "deadline must be greater than zero".into(),
                ));
            }
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("invalid worker count: {0}")]
    InvalidWorkers(String),

    /// Invalid deadline
    #[error("invalid deadline: {0}")]
    InvalidDeadline(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BenchConfig::default();
        assert_eq!(config.workers, 1);
        assert!(config.deadline.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder_pattern() {
        let config = BenchConfig::new(8).with_deadline(Duration::from_secs(60));
        assert_eq!(config.workers, 8);
        assert_eq!(config.deadline, Some(Duration::from_secs(60)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_workers() {
        let config = BenchConfig::new(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_too_many_workers() {
        let config = BenchConfig::new(MAX_WORKERS + 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_max_workers_is_valid() {
        let config = BenchConfig::new(MAX_WORKERS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_deadline() {
        let config = BenchConfig::new(1).with_deadline(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = BenchConfig::new(4).with_deadline(Duration::from_secs(30));
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: BenchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.workers, 4);
        assert_eq!(deserialized.deadline, Some(Duration::from_secs(30)));
    }
}
