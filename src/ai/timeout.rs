//! Timeout Handling
//!
//! Every model call is bounded. A call that exceeds its budget yields
//! `NovelError::Timeout`, which the stage runner treats exactly like an
//! unrecoverable model output: one retry, then escalation.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::ai::timeout::{TimeoutConfig, with_timeout};
//!
//! let config = TimeoutConfig::from_secs(120);
//! let response = with_timeout(config.llm_request, provider.generate(&req), "scene_writer").await?;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::constants::network as net_constants;
use crate::types::{NovelError, Result};

/// Timeout configuration for pipeline operations
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for a single model call (default: 5 minutes)
    pub llm_request: Duration,
    /// Timeout for network connections (default: 30 seconds)
    pub connection: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_request: Duration::from_secs(net_constants::DEFAULT_TIMEOUT_SECS),
            connection: Duration::from_secs(net_constants::CONNECTION_TIMEOUT_SECS),
        }
    }
}

impl TimeoutConfig {
    /// Config with the given model-call budget
    pub fn from_secs(llm_secs: u64) -> Self {
        Self {
            llm_request: Duration::from_secs(llm_secs),
            ..Self::default()
        }
    }
}

/// Execute an async operation with a timeout
///
/// Returns `NovelError::Timeout` if the operation doesn't complete within the
/// specified duration. The inner future is dropped on expiry.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(NovelError::timeout(operation_name, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_config_defaults() {
        let config = TimeoutConfig::default();
        assert_eq!(config.llm_request.as_secs(), 300);
        assert_eq!(config.connection.as_secs(), 30);
        assert_eq!(TimeoutConfig::from_secs(12).llm_request.as_secs(), 12);
    }

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, NovelError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, NovelError>(42)
            },
            "slow operation",
        )
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, NovelError::Timeout { .. }));
        assert!(err.is_recoverable());
    }
}
