//! Operator configuration
//!
//! Built once at process start and handed to each controller by value.

use crate::error::{OperatorError, Result};
use std::time::Duration;

/// Default number of reconciliations running at the same time, per controller
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 2;

/// Default requeue interval for successful reconciliations
pub const DEFAULT_REQUEUE_SECONDS: u64 = 120;

/// Default requeue interval for failed reconciliations
pub const DEFAULT_ERROR_REQUEUE_SECONDS: u64 = 30;

/// Default timeout for a single Elasticsearch request
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Base URL of the Elasticsearch cluster
    pub es_url: String,
    pub max_concurrent_reconciles: u16,
    /// Namespace to watch, `None` for all namespaces
    pub namespace: Option<String>,
    pub requeue_interval: Duration,
    pub error_requeue_interval: Duration,
    pub request_timeout: Duration,
}

impl OperatorConfig {
    pub fn new(es_url: impl Into<String>) -> Self {
        Self {
            es_url: es_url.into(),
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            namespace: None,
            requeue_interval: Duration::from_secs(DEFAULT_REQUEUE_SECONDS),
            error_requeue_interval: Duration::from_secs(DEFAULT_ERROR_REQUEUE_SECONDS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
        }
    }

    /// Reject values the controllers can't run with
    pub fn validate(&self) -> Result<()> {
        let url = self.es_url.trim();
        if url.is_empty() {
            return Err(OperatorError::InvalidConfig(
                "ES_URL must not be empty".to_string(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(OperatorError::InvalidConfig(format!(
                "ES_URL '{url}' must start with http:// or https://"
            )));
        }
        if self.max_concurrent_reconciles == 0 {
            return Err(OperatorError::InvalidConfig(
                "MAX_CONCURRENT_RECONCILES must be at least 1".to_string(),
            ));
        }
        for (name, interval) in [
            ("REQUEUE_INTERVAL_SECS", self.requeue_interval),
            ("ERROR_REQUEUE_SECS", self.error_requeue_interval),
            ("ES_REQUEST_TIMEOUT_SECS", self.request_timeout),
        ] {
            if interval.is_zero() {
                return Err(OperatorError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}
