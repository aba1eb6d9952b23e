//! Error types for the `docqa-rag` crate.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether a provider failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Rate limits, timeouts, upstream 5xx. Retrying may succeed.
    Transient,
    /// Invalid input, authentication, malformed responses. Retrying will not help.
    Permanent,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::Permanent => f.write_str("permanent"),
        }
    }
}

/// Errors that can occur in document question-answering operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration tunable is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An upload exceeded the per-session document count or size quota.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// An embedding or synthesis provider failed.
    #[error("Provider error ({provider}, {kind}): {message}")]
    Provider {
        /// The provider that produced the error.
        provider: String,
        /// Whether the failure is retryable.
        kind: ProviderErrorKind,
        /// A description of the failure.
        message: String,
    },

    /// Embedding vectors of different lengths were mixed in one corpus.
    #[error("Dimension mismatch at position {position}: expected {expected}, found {found}")]
    DimensionMismatch {
        /// The dimension established by the first vector.
        expected: usize,
        /// The offending vector's dimension.
        found: usize,
        /// Index of the offending vector.
        position: usize,
    },

    /// Ingestion gave up after exhausting its retry budget.
    #[error("Ingestion failed after {attempts} attempt(s): {reason}")]
    IngestionFailed {
        /// Total embedding attempts made for the failing batch.
        attempts: u32,
        /// The last error observed.
        reason: String,
    },

    /// The operation is not valid in the session's current state.
    #[error("Invalid state: cannot {operation} while session is {state}")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the session was in.
        state: String,
    },

    /// A caller-supplied parameter is out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No session with the given identifier exists.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// An upload could not be turned into plain text.
    #[error("Extraction error ({filename}): {message}")]
    Extraction {
        /// The uploaded file name.
        filename: String,
        /// A description of the failure.
        message: String,
    },
}

impl RagError {
    /// Build a transient [`RagError::Provider`].
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            kind: ProviderErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Build a permanent [`RagError::Provider`].
    pub fn permanent(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            kind: ProviderErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// Returns `true` only for provider failures classified as transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider { kind: ProviderErrorKind::Transient, .. })
    }
}

/// A convenience result type for question-answering operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_provider_errors_are_retryable() {
        assert!(RagError::transient("mock", "rate limited").is_transient());
        assert!(!RagError::permanent("mock", "bad input").is_transient());
        assert!(!RagError::InvalidArgument("k".into()).is_transient());
        assert!(!RagError::IngestionFailed { attempts: 3, reason: "x".into() }.is_transient());
    }

    #[test]
    fn display_names_provider_and_kind() {
        let err = RagError::transient("OpenAI", "429 Too Many Requests");
        assert_eq!(err.to_string(), "Provider error (OpenAI, transient): 429 Too Many Requests");

        let err = RagError::InvalidState { operation: "query", state: "empty".into() };
        assert_eq!(err.to_string(), "Invalid state: cannot query while session is empty");
    }
}
