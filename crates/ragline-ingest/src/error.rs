//! Error types for the ingestion pipeline.

use ragline_core::ErrorStage;
use ragline_embed::EmbedError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] ragline_db::DbError),

    #[error("Config error: {0}")]
    Config(#[from] ragline_config::ConfigError),

    #[error("Embedding client error: {0}")]
    Embed(#[from] EmbedError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Cannot hash {path}: {source}")]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Extraction failed for {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("Chunking failed: {0}")]
    Chunking(String),

    #[error("Metadata extraction failed: {0}")]
    Metadata(String),

    #[error("Ledger state undetermined for {doc_id}: {message}")]
    StorageUndetermined { doc_id: String, message: String },

    #[error("Registration failed for {doc_id}: {message}")]
    Registration { doc_id: String, message: String },

    #[error("Async runtime error: {0}")]
    Runtime(String),
}

impl IngestError {
    pub(crate) fn extraction(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        IngestError::Extraction {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Pipeline stage this error is attributed to.
    pub fn stage(&self) -> ErrorStage {
        match self {
            IngestError::Hash { .. } => ErrorStage::Hash,
            IngestError::StorageUndetermined { .. } | IngestError::Database(_) => ErrorStage::Ledger,
            IngestError::Extraction { .. }
            | IngestError::FileNotFound(_)
            | IngestError::UnsupportedFileType(_)
            | IngestError::Io(_)
            | IngestError::Serialization(_) => ErrorStage::Extraction,
            IngestError::Chunking(_) | IngestError::Config(_) => ErrorStage::Chunking,
            IngestError::Metadata(_) => ErrorStage::Metadata,
            IngestError::Registration { .. } => ErrorStage::Registration,
            IngestError::Embed(_) | IngestError::Runtime(_) => ErrorStage::Provider,
        }
    }
}

/// Outcome class of a failed embed-and-store call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider rejected the request for exceeding its rate limit.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// A failure that may succeed on retry (network, timeout, 5xx, busy store).
    #[error("transient failure: {0}")]
    Transient(String),

    /// A failure that will not succeed on retry.
    #[error("permanent failure: {0}")]
    Fatal(String),
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }
}

impl From<EmbedError> for ProviderError {
    fn from(err: EmbedError) -> Self {
        match &err {
            EmbedError::RateLimited {
                retry_after: Some(after),
                message,
            } => ProviderError::RateLimited(format!("{} (retry after {}s)", message, after.as_secs())),
            EmbedError::RateLimited { .. } => ProviderError::RateLimited(err.to_string()),
            _ if err.is_transient() => ProviderError::Transient(err.to_string()),
            _ => ProviderError::Fatal(err.to_string()),
        }
    }
}

impl From<ragline_db::DbError> for ProviderError {
    fn from(err: ragline_db::DbError) -> Self {
        if err.is_busy() {
            ProviderError::Transient(err.to_string())
        } else {
            ProviderError::Fatal(err.to_string())
        }
    }
}
