//! Error taxonomy for indexing and retrieval.
//!
//! Variants split into two families. User-input errors carry enough detail
//! for the caller to correct the request and are reported verbatim.
//! Infrastructure faults (`Storage`, `Embedding`) carry internal detail that
//! transports should log rather than expose; see [`KbError::public_message`].

use thiserror::Error;

/// Result alias used by the collection manager, pipeline, and query engine.
pub type KbResult<T> = std::result::Result<T, KbError>;

#[derive(Debug, Error)]
pub enum KbError {
    /// Collection name outside `[A-Za-z0-9_-]+`.
    #[error(
        "invalid collection name '{0}': must contain only letters, numbers, hyphens, and underscores"
    )]
    InvalidName(String),

    /// File extension not in the supported-format set.
    #[error("unsupported file type: '{extension}'. Supported: {}", .supported.join(", "))]
    UnsupportedFormat {
        extension: String,
        supported: Vec<String>,
    },

    /// The document parsed but contained no extractable text.
    #[error("no text could be extracted from '{filename}'")]
    NoContent { filename: String },

    /// The chunker was handed text with no non-whitespace content.
    #[error("input text is empty")]
    EmptyInput,

    /// The format parser rejected the document.
    #[error("could not read '{filename}': {reason}")]
    Extraction { filename: String, reason: String },

    /// The targeted collection does not exist.
    #[error("collection '{0}' not found")]
    NotFound(String),

    /// A request parameter is out of range.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Index open/write/delete failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Embedding provider failure.
    #[error("embedding error: {0}")]
    Embedding(String),
}

impl KbError {
    /// Wrap an adapter error as a storage fault, keeping the full cause chain.
    pub fn storage(err: anyhow::Error) -> Self {
        KbError::Storage(format!("{:#}", err))
    }

    /// Wrap a provider error as an embedding fault, keeping the full cause chain.
    pub fn embedding(err: anyhow::Error) -> Self {
        KbError::Embedding(format!("{:#}", err))
    }

    /// True for errors caused by the request itself rather than the system.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, KbError::Storage(_) | KbError::Embedding(_))
    }

    /// Stable machine-readable code for transports.
    pub fn code(&self) -> &'static str {
        match self {
            KbError::InvalidName(_) => "invalid_name",
            KbError::UnsupportedFormat { .. } => "unsupported_format",
            KbError::NoContent { .. } | KbError::EmptyInput => "no_content",
            KbError::Extraction { .. } => "extraction_failed",
            KbError::NotFound(_) => "not_found",
            KbError::InvalidRequest(_) => "bad_request",
            KbError::Storage(_) => "storage_error",
            KbError::Embedding(_) => "embedding_error",
        }
    }

    /// Message safe to return to an external caller.
    ///
    /// Infrastructure faults collapse to a generic sentence.
    pub fn public_message(&self) -> String {
        match self {
            KbError::Storage(_) => "internal storage error".to_string(),
            KbError::Embedding(_) => "embedding service unavailable".to_string(),
            other => other.to_string(),
        }
    }
}
