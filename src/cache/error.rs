use std::time::Duration;

use cumulus_types::ModelError;
use thiserror::Error;

use super::backend::BackendError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("backing store call `{op}` failed: {source}")]
    Backend {
        op: &'static str,
        #[source]
        source: BackendError,
    },
    #[error("backing store call `{op}` exceeded {timeout:?}")]
    Timeout { op: &'static str, timeout: Duration },
    #[error("failed to encode attribute `{attribute}` of `{type_name}:{id}`: {source}")]
    Encode {
        type_name: String,
        id: String,
        attribute: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode attribute `{attribute}` of `{type_name}:{id}`: {source}")]
    Decode {
        type_name: String,
        id: String,
        attribute: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid cache data for type `{type_name}`: {source}")]
    Invalid {
        type_name: String,
        #[source]
        source: ModelError,
    },
    #[error("invalid identifier pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

impl CacheError {
    /// Transient I/O failures the caller may retry on its own schedule.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::Timeout { .. })
    }
}
