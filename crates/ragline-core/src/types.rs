//! Core domain types for ragline.

use crate::ids::chunk_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Content hash of a document (lowercase hex SHA-256).
pub type DocId = String;

/// Identifier of a chunk, see [`crate::chunk_id`].
pub type ChunkId = String;

/// Identifier of one ingestion run.
pub type RunId = String;

/// Kind of source document, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pdf,
    Epub,
    Text,
    Docx,
    Markdown,
}

impl SourceKind {
    /// Extensions accepted during discovery (matched case-insensitively).
    pub const EXTENSIONS: &'static [&'static str] = &["pdf", "epub", "txt", "docx", "md", "markdown"];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Pdf => "pdf",
            SourceKind::Epub => "epub",
            SourceKind::Text => "text",
            SourceKind::Docx => "docx",
            SourceKind::Markdown => "markdown",
        }
    }

    /// Detect the source kind from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(SourceKind::Pdf),
            "epub" => Some(SourceKind::Epub),
            "txt" => Some(SourceKind::Text),
            "docx" => Some(SourceKind::Docx),
            "md" | "markdown" => Some(SourceKind::Markdown),
            _ => None,
        }
    }

    /// Detect the source kind of a path.
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What to do with a document in the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingDecision {
    /// Already ingested (or owned by another worker of this run).
    Skip,
    /// Not ingested yet.
    Process,
    /// Ingested before; delete its chunks and ingest again.
    Reindex,
}

impl ProcessingDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingDecision::Skip => "skip",
            ProcessingDecision::Process => "process",
            ProcessingDecision::Reindex => "reindex",
        }
    }
}

impl std::fmt::Display for ProcessingDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger status of a document row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Claimed by a worker, not yet registered.
    #[default]
    Processing,
    /// Fully processed and registered.
    Registered,
    /// Finished with some chunk batches missing; the next run fills them in.
    Partial,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Registered => "registered",
            DocumentStatus::Partial => "partial",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "processing" => Some(DocumentStatus::Processing),
            "registered" => Some(DocumentStatus::Registered),
            "partial" => Some(DocumentStatus::Partial),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    Hash,
    Ledger,
    Extraction,
    Chunking,
    Metadata,
    RateLimit,
    Provider,
    Registration,
}

impl ErrorStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStage::Hash => "hash",
            ErrorStage::Ledger => "ledger",
            ErrorStage::Extraction => "extraction",
            ErrorStage::Chunking => "chunking",
            ErrorStage::Metadata => "metadata",
            ErrorStage::RateLimit => "rate_limit",
            ErrorStage::Provider => "provider",
            ErrorStage::Registration => "registration",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hash" => Some(ErrorStage::Hash),
            "ledger" => Some(ErrorStage::Ledger),
            "extraction" => Some(ErrorStage::Extraction),
            "chunking" => Some(ErrorStage::Chunking),
            "metadata" => Some(ErrorStage::Metadata),
            "rate_limit" => Some(ErrorStage::RateLimit),
            "provider" => Some(ErrorStage::Provider),
            "registration" => Some(ErrorStage::Registration),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Half-open character range `[start, end)` into a document's extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharRange {
    pub start: usize,
    pub end: usize,
}

impl CharRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Descriptive metadata extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: Option<String>,
    pub language: String,
    pub category: String,
    pub published_year: Option<i32>,
}

impl DocumentMetadata {
    pub const UNKNOWN_LANGUAGE: &'static str = "unknown";
    pub const GENERAL_CATEGORY: &'static str = "general";

    /// Metadata used when nothing better can be extracted.
    pub fn fallback(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: None,
            language: Self::UNKNOWN_LANGUAGE.to_string(),
            category: Self::GENERAL_CATEGORY.to_string(),
            published_year: None,
        }
    }
}

/// A document row in the deduplication ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc_id: DocId,
    pub file_name: String,
    pub file_path: String,
    pub metadata: DocumentMetadata,
    pub total_chunks: i64,
    pub status: DocumentStatus,
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn new(
        doc_id: impl Into<DocId>,
        file_name: impl Into<String>,
        file_path: impl Into<String>,
        run_id: impl Into<RunId>,
    ) -> Self {
        let file_name = file_name.into();
        let now = Utc::now();
        Self {
            doc_id: doc_id.into(),
            metadata: DocumentMetadata::fallback(file_name.clone()),
            file_name,
            file_path: file_path.into(),
            total_chunks: 0,
            status: DocumentStatus::Processing,
            run_id: run_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_total_chunks(mut self, total_chunks: i64) -> Self {
        self.total_chunks = total_chunks;
        self
    }
}

/// A chunk of document text ready for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub doc_id: DocId,
    pub ordinal_index: usize,
    pub text: String,
    pub range: CharRange,
    pub file_name: String,
    pub book_title: String,
}

impl Chunk {
    /// Create a chunk; its id is derived from `doc_id`, `ordinal_index` and `text`.
    pub fn new(
        doc_id: impl Into<DocId>,
        ordinal_index: usize,
        text: impl Into<String>,
        range: CharRange,
    ) -> Self {
        let doc_id = doc_id.into();
        let text = text.into();
        Self {
            chunk_id: chunk_id(&doc_id, ordinal_index, &text),
            doc_id,
            ordinal_index,
            text,
            range,
            file_name: String::new(),
            book_title: String::new(),
        }
    }

    pub fn with_source(mut self, file_name: impl Into<String>, book_title: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self.book_title = book_title.into();
        self
    }

    /// Rough token estimate (four characters per token).
    pub fn estimated_tokens(&self) -> u64 {
        (self.text.chars().count() / 4) as u64
    }
}

/// One row of the ingestion error log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionErrorEntry {
    pub id: i64,
    pub run_id: Option<RunId>,
    pub doc_id: Option<DocId>,
    pub file_path: String,
    pub stage: ErrorStage,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Ledger and store statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerStats {
    pub documents_registered: i64,
    pub documents_processing: i64,
    pub documents_partial: i64,
    pub total_chunks: i64,
    pub total_embeddings: i64,
    pub documents_by_category: HashMap<String, i64>,
    pub errors_by_stage: HashMap<String, i64>,
    pub database_size_bytes: i64,
}
