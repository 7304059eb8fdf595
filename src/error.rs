//! Error types shared by every component of the service.
//!
//! [`LegalRagError`] is the client-facing taxonomy: each variant is built at
//! the point that first detects the failure and is never re-wrapped into the
//! same kind. [`BackendError`] covers failures inside the hosted embedding
//! and generation backends; the agent wraps it exactly once, into
//! [`LegalRagError::Initialization`] or [`LegalRagError::QueryProcessing`].

use thiserror::Error;

/// Errors surfaced by the persona store, corpus manager and query agent.
#[derive(Debug, Error)]
pub enum LegalRagError {
    /// Fatal startup error: missing credential or invalid document directory.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Fatal for one agent instance: backend or index construction failed.
    #[error("initialization error: {0}")]
    Initialization(String),

    /// Empty query or empty context-update payload.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Upload with an extension outside the allow-list.
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    /// Missing document or static asset.
    #[error("not found: {0}")]
    NotFound(String),

    /// A single query failed in retrieval or generation. The agent stays usable.
    #[error("query processing error: {0}")]
    QueryProcessing(String),

    /// Filesystem failure while reading or mutating the corpus.
    #[error("storage error: {0}")]
    Storage(String),
}

impl LegalRagError {
    /// Whether the caller may retry or correct the request.
    ///
    /// Configuration and initialization errors abort startup; everything else
    /// is reported to the client and the service keeps running.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            LegalRagError::Configuration(_) | LegalRagError::Initialization(_)
        )
    }
}

/// A convenience result type for service operations.
pub type Result<T> = std::result::Result<T, LegalRagError>;

/// Failures talking to a hosted embedding or generation backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport-level failure (DNS, TLS, timeout, connection reset).
    #[error("{provider} request failed: {source}")]
    Network {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered with a non-success status.
    #[error("{provider} API error {status}: {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    /// The backend answered 2xx but the body did not have the expected shape.
    #[error("invalid {provider} response: {message}")]
    InvalidResponse { provider: String, message: String },
}

impl BackendError {
    /// 429 and 5xx answers and transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Network { .. } => true,
            BackendError::Api { status, .. } => *status == 429 || *status >= 500,
            BackendError::InvalidResponse { .. } => false,
        }
    }
}
