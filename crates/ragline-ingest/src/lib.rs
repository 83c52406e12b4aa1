//! Ragline Ingest - Concurrent document ingestion pipeline.
//!
//! This crate provides:
//! - Text extraction for PDF, EPUB, DOCX, Markdown and plain text
//! - Overlapping, boundary-aware chunking
//! - Content-hash deduplication through the ledger
//! - Rate-limited, retried embedding in sub-batches
//! - A fixed-size worker pool and an end-of-run report

mod chunker;
mod error;
mod events;
mod ledger;
mod metadata;
mod parsers;
mod pool;
mod processor;
mod rate_limiter;
mod report;
mod retry;
mod run;
mod store;

pub use chunker::{ChunkConfig, Chunker, TextSpan};
pub use error::{IngestError, IngestResult, ProviderError};
pub use events::{IngestObserver, NoopObserver};
pub use ledger::{Ledger, SqliteLedger};
pub use metadata::{HeuristicMetadataExtractor, MetadataExtractor};
pub use parsers::{DocumentParser, FileTextExtractor, ParsedDocument, TextExtractor};
pub use pool::{CancelFlag, FailedFile, RunStats, WorkerPool};
pub use processor::{FileOutcome, FileProcessor, ProcessorSettings};
pub use rate_limiter::RateLimiter;
pub use report::RunReport;
pub use retry::{RetryError, RetryPolicy};
pub use run::{discover, IngestionRun};
pub use store::{EmbedStore, Embedder, RemoteEmbedder, SqliteEmbedStore};
