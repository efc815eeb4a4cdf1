//! Error types for the Elasticsearch objects operator

use crate::es_client::EsError;
use thiserror::Error;

/// Errors that can occur during operator operations
#[derive(Error, Debug)]
pub enum OperatorError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Elasticsearch API error
    #[error("{0}")]
    Elasticsearch(#[from] EsError),

    /// Attempt to change a setting that is fixed at creation time
    #[error("can't change static setting {path} from '{observed}' to '{desired}'")]
    ImmutableSetting {
        path: String,
        observed: String,
        desired: String,
    },

    /// Remote resource exists but does not carry our ownership marker
    #[error("'{name}' is not managed by this operator")]
    NotOwned { name: String },

    /// Malformed schema document or other structural problem
    #[error("structural error: {0}")]
    Structural(String),

    /// Spec validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Invalid operator configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reconciliation failed
    #[error("Reconciliation failed: {0}")]
    ReconcileFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML serialization error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Finalizer error
    #[error("Finalizer error: {0}")]
    FinalizerError(String),
}

/// Result type for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

impl OperatorError {
    /// Errors that need an operator to fix the desired spec before a retry can succeed
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            OperatorError::ImmutableSetting { .. }
                | OperatorError::NotOwned { .. }
                | OperatorError::Structural(_)
                | OperatorError::ValidationError(_)
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            OperatorError::KubeError(_) | OperatorError::ReconcileFailed(_) => true,
            OperatorError::Elasticsearch(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immutable_setting_message() {
        let err = OperatorError::ImmutableSetting {
            path: "index.number_of_shards".to_string(),
            observed: "32".to_string(),
            desired: "33".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "can't change static setting index.number_of_shards from '32' to '33'"
        );
        assert!(err.is_permanent());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_owned_is_permanent() {
        let err = OperatorError::NotOwned {
            name: "logs".to_string(),
        };
        assert!(err.is_permanent());
        assert!(err.to_string().contains("logs"));
    }

    #[test]
    fn test_transient_elasticsearch_error_is_retryable() {
        let err = OperatorError::from(EsError::Status {
            status: 503,
            body: "unavailable".to_string(),
        });
        assert!(err.is_retryable());
        assert!(!err.is_permanent());

        let rejected = OperatorError::from(EsError::Status {
            status: 400,
            body: "bad request".to_string(),
        });
        assert!(!rejected.is_retryable());
    }
}
