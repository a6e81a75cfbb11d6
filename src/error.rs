//! Core error taxonomy.
//!
//! Every error surfaced by the pipeline carries a stable kind string so
//! callers (the HTTP layer, the CLI) can branch on it without matching on
//! message text.

use thiserror::Error;

/// Errors surfaced by the core pipeline and search engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient upstream failure: {0}")]
    TransientUpstream(String),

    #[error("permanent upstream failure: {0}")]
    PermanentUpstream(String),

    #[error("capability disabled: {0}")]
    CapabilityDisabled(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable kind string for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Conflict(_) => "conflict",
            Self::TransientUpstream(_) => "transient_upstream",
            Self::PermanentUpstream(_) => "permanent_upstream",
            Self::CapabilityDisabled(_) => "capability_disabled",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether callers should retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientUpstream(_) | Self::Internal(_))
    }
}

impl From<crate::repository::RepositoryError> for CoreError {
    fn from(e: crate::repository::RepositoryError) -> Self {
        match e {
            crate::repository::RepositoryError::NotFound(what) => Self::NotFound(what),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// A single sub-error inside a batch report.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorDetail {
    /// Stable kind string (same vocabulary as [`CoreError::kind`]).
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// The item the error applies to (URL, page id, ...), when known.
    pub item: Option<String>,
}

impl ErrorDetail {
    pub fn from_error(err: &CoreError, item: impl Into<Option<String>>) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            item: item.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryError;

    #[test]
    fn test_kind_strings_are_stable() {
        assert_eq!(CoreError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(CoreError::InvalidArgument("q".into()).kind(), "invalid_argument");
        assert_eq!(CoreError::Conflict("dup".into()).kind(), "conflict");
        assert_eq!(
            CoreError::TransientUpstream("503".into()).kind(),
            "transient_upstream"
        );
        assert_eq!(
            CoreError::PermanentUpstream("404".into()).kind(),
            "permanent_upstream"
        );
        assert_eq!(
            CoreError::CapabilityDisabled("semantic".into()).kind(),
            "capability_disabled"
        );
        assert_eq!(CoreError::Cancelled.kind(), "cancelled");
        assert_eq!(CoreError::Internal("bug".into()).kind(), "internal");
    }

    #[test]
    fn test_transient_classification() {
        assert!(CoreError::TransientUpstream("timeout".into()).is_transient());
        assert!(CoreError::Internal("retryable".into()).is_transient());
        assert!(!CoreError::PermanentUpstream("404".into()).is_transient());
        assert!(!CoreError::InvalidArgument("bad".into()).is_transient());
        assert!(!CoreError::Cancelled.is_transient());
    }

    #[test]
    fn test_repository_not_found_maps_to_not_found() {
        let err: CoreError = RepositoryError::NotFound("document abc".into()).into();
        assert_eq!(err.kind(), "not_found");
        assert!(err.to_string().contains("document abc"));
    }

    #[test]
    fn test_repository_other_errors_map_to_internal() {
        let err: CoreError =
            RepositoryError::Serialization(serde_json::from_str::<i32>("nope").unwrap_err()).into();
        assert_eq!(err.kind(), "internal");
    }

    #[test]
    fn test_error_detail_carries_kind_and_item() {
        let err = CoreError::PermanentUpstream("HTTP 404".into());
        let detail = ErrorDetail::from_error(&err, Some("https://example.com/a.pdf".into()));
        assert_eq!(detail.kind, "permanent_upstream");
        assert!(detail.message.contains("HTTP 404"));
        assert_eq!(detail.item.as_deref(), Some("https://example.com/a.pdf"));

        let detail = ErrorDetail::from_error(&CoreError::Cancelled, None);
        assert!(detail.item.is_none());
    }
}
