//! Pipeline progress events.

use ragline_core::ErrorStage;
use std::path::Path;
use std::time::Duration;

/// Receives progress notifications from workers.
///
/// Methods are called concurrently from several worker threads. All of
/// them default to doing nothing.
pub trait IngestObserver: Send + Sync {
    fn on_file_started(&self, _path: &Path) {}

    /// The file's content was already ingested (or is owned by another worker).
    fn on_file_duplicate(&self, _path: &Path, _doc_id: &str) {}

    /// Previous chunks were deleted before reingesting.
    fn on_file_reindex(&self, _path: &Path, _deleted_chunks: u64) {}

    fn on_chunk_batch_processed(&self, _path: &Path, _chunks: usize, _tokens: u64) {}

    /// A rate-limited call is about to be retried after `delay`.
    fn on_rate_limit_retry(&self, _path: &Path, _attempt: u32, _delay: Duration) {}

    fn on_file_completed(&self, _path: &Path, _chunks: usize, _suspicious: bool) {}

    fn on_file_error(&self, _path: &Path, _stage: ErrorStage, _message: &str) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl IngestObserver for NoopObserver {}
