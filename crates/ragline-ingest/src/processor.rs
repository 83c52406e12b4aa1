//! Per-file ingestion: hash, claim, extract, chunk, embed, register.

use crate::chunker::Chunker;
use crate::error::{IngestError, IngestResult};
use crate::events::{IngestObserver, NoopObserver};
use crate::ledger::Ledger;
use crate::metadata::{file_stem, HeuristicMetadataExtractor, MetadataExtractor};
use crate::parsers::{FileTextExtractor, TextExtractor};
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::store::EmbedStore;
use ragline_core::{
    doc_id_for_reader, Chunk, DocId, DocumentMetadata, DocumentRecord, ErrorStage, ProcessingDecision, RunId,
};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Settings shared by every file of a run.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub run_id: RunId,
    pub embedding_batch_size: usize,
    pub min_chunks_per_file: usize,
    pub force_reindex: bool,
}

/// How one file ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Completed {
        doc_id: DocId,
        chunks_generated: usize,
        /// Chunks newly written in this run.
        chunks_written: usize,
        /// Chunks of the document known to be stored after this run.
        chunks_present: usize,
        suspicious: bool,
        reindexed: bool,
        deleted_chunks: u64,
        failed_batches: usize,
    },
    Duplicate {
        doc_id: DocId,
    },
    Failed {
        stage: ErrorStage,
        message: String,
    },
}

#[derive(Debug, Default)]
struct BatchTotals {
    written: usize,
    present: usize,
    failed_batches: usize,
}

/// Runs one file through the pipeline. Shared by all workers.
pub struct FileProcessor {
    settings: ProcessorSettings,
    chunker: Chunker,
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn EmbedStore>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    extractor: Arc<dyn TextExtractor>,
    metadata: Arc<dyn MetadataExtractor>,
    observer: Arc<dyn IngestObserver>,
}

impl FileProcessor {
    pub fn new(
        settings: ProcessorSettings,
        chunker: Chunker,
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn EmbedStore>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> IngestResult<Self> {
        Ok(Self {
            settings: ProcessorSettings {
                embedding_batch_size: settings.embedding_batch_size.max(1),
                ..settings
            },
            chunker,
            ledger,
            store,
            limiter,
            retry,
            extractor: Arc::new(FileTextExtractor::new()),
            metadata: Arc::new(HeuristicMetadataExtractor::new()?),
            observer: Arc::new(NoopObserver),
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_metadata_extractor(mut self, metadata: Arc<dyn MetadataExtractor>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn IngestObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    /// Process one file. Never panics on bad input; every failure becomes
    /// [`FileOutcome::Failed`] and is written to the error log.
    pub fn process(&self, path: &Path, worker_id: usize) -> FileOutcome {
        self.observer.on_file_started(path);
        debug!("[worker {}] Starting {:?}", worker_id, path);

        let mut doc_id = None;
        match self.run_file(path, worker_id, &mut doc_id) {
            Ok(outcome) => outcome,
            Err(err) => {
                let stage = err.stage();
                let message = err.to_string();
                error!("[worker {}] {} failed at {}: {}", worker_id, path.display(), stage, message);

                self.ledger.log_error(
                    &self.settings.run_id,
                    doc_id.as_deref(),
                    &path.display().to_string(),
                    stage,
                    &message,
                );
                self.observer.on_file_error(path, stage, &message);
                FileOutcome::Failed { stage, message }
            }
        }
    }

    fn run_file(&self, path: &Path, worker_id: usize, doc_slot: &mut Option<DocId>) -> IngestResult<FileOutcome> {
        let doc_id = File::open(path)
            .and_then(|file| doc_id_for_reader(BufReader::new(file)))
            .map_err(|e| IngestError::Hash {
                path: path.to_path_buf(),
                source: e,
            })?;
        *doc_slot = Some(doc_id.clone());

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let claim = DocumentRecord::new(
            doc_id.clone(),
            file_name.clone(),
            path.display().to_string(),
            self.settings.run_id.clone(),
        );

        let outcome = self.ledger.decide(&claim, self.settings.force_reindex)?;
        let mut deleted_chunks = 0;
        match outcome.decision {
            ProcessingDecision::Skip => {
                info!("[worker {}] Skipping {} (already ingested as {})", worker_id, file_name, short(&doc_id));
                self.observer.on_file_duplicate(path, &doc_id);
                return Ok(FileOutcome::Duplicate { doc_id });
            }
            ProcessingDecision::Reindex => {
                deleted_chunks = self.ledger.delete_chunks(&doc_id)?;
                info!("[worker {}] Reindexing {}: deleted {} chunks", worker_id, file_name, deleted_chunks);
                self.observer.on_file_reindex(path, deleted_chunks);
            }
            ProcessingDecision::Process => {
                info!("[worker {}] Processing {}", worker_id, file_name);
            }
        }

        let parsed = self.extractor.extract(path)?;
        let text = parsed.text();
        if text.trim().is_empty() {
            return Err(IngestError::extraction(path, "no text could be extracted"));
        }

        let metadata = match self.metadata.extract(path, &text, &parsed) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("[worker {}] Metadata extraction failed for {}: {}", worker_id, file_name, e);
                self.ledger.log_error(
                    &self.settings.run_id,
                    Some(doc_id.as_str()),
                    &path.display().to_string(),
                    ErrorStage::Metadata,
                    &e.to_string(),
                );
                DocumentMetadata::fallback(file_stem(path))
            }
        };

        let chunks: Vec<Chunk> = self
            .chunker
            .split(&text)
            .into_iter()
            .enumerate()
            .map(|(idx, span)| {
                Chunk::new(doc_id.clone(), idx, span.text, span.range).with_source(&file_name, &metadata.title)
            })
            .collect();
        if chunks.is_empty() {
            return Err(IngestError::Chunking(format!("{} produced no chunks", file_name)));
        }
        debug!("[worker {}] {} split into {} chunks", worker_id, file_name, chunks.len());

        let totals = self.embed_chunks(path, worker_id, &doc_id, &chunks);
        let suspicious = totals.present < self.settings.min_chunks_per_file;
        if suspicious {
            warn!(
                "[worker {}] {} has only {} chunks (minimum {})",
                worker_id, file_name, totals.present, self.settings.min_chunks_per_file
            );
        }

        let record = claim
            .with_metadata(metadata)
            .with_total_chunks(totals.present as i64);
        let registered = if totals.failed_batches > 0 {
            warn!(
                "[worker {}] {}: {} batches failed, left for the next run",
                worker_id, file_name, totals.failed_batches
            );
            self.ledger.register_partial(&record)
        } else {
            self.ledger.register(&record)
        };
        if let Err(e) = registered {
            warn!("[worker {}] {}", worker_id, e);
            self.ledger.log_error(
                &self.settings.run_id,
                Some(doc_id.as_str()),
                &path.display().to_string(),
                e.stage(),
                &e.to_string(),
            );
        }

        info!(
            "[worker {}] Completed {}: {} chunks ({} new)",
            worker_id, file_name, totals.present, totals.written
        );
        self.observer.on_file_completed(path, totals.present, suspicious);

        Ok(FileOutcome::Completed {
            doc_id,
            chunks_generated: chunks.len(),
            chunks_written: totals.written,
            chunks_present: totals.present,
            suspicious,
            reindexed: outcome.decision == ProcessingDecision::Reindex,
            deleted_chunks,
            failed_batches: totals.failed_batches,
        })
    }

    /// Embed and store chunks in sub-batches, in index order.
    ///
    /// A failed batch is logged and skipped; the remaining batches still run.
    fn embed_chunks(&self, path: &Path, worker_id: usize, doc_id: &str, chunks: &[Chunk]) -> BatchTotals {
        let mut totals = BatchTotals::default();

        for batch in chunks.chunks(self.settings.embedding_batch_size) {
            let pending: Vec<Chunk> = batch
                .iter()
                .filter(|chunk| match self.ledger.chunk_exists(&chunk.chunk_id) {
                    Ok(true) => {
                        totals.present += 1;
                        false
                    }
                    Ok(false) => true,
                    // The store write ignores duplicates, so embedding again is safe
                    Err(e) => {
                        debug!("chunk_exists failed for {}: {}", chunk.chunk_id, e);
                        true
                    }
                })
                .cloned()
                .collect();
            if pending.is_empty() {
                continue;
            }

            let tokens: u64 = pending.iter().map(Chunk::estimated_tokens).sum();
            let operation = format!(
                "[worker {}] embed chunks {}..={} of {}",
                worker_id,
                pending[0].ordinal_index,
                pending[pending.len() - 1].ordinal_index,
                path.display()
            );

            let result = self.retry.run_observed(
                &operation,
                |_| {
                    self.limiter.admit();
                    self.store.embed_and_store(&pending)
                },
                |attempt, err, delay| {
                    if err.is_rate_limited() {
                        self.observer.on_rate_limit_retry(path, attempt + 1, delay);
                    }
                },
            );

            if let Err(e) = self.ledger.touch(doc_id, &self.settings.run_id) {
                debug!("Could not renew claim on {}: {}", short(doc_id), e);
            }

            match result {
                Ok(written) => {
                    self.limiter.record(tokens);
                    totals.written += written;
                    totals.present += pending.len();
                    self.observer.on_chunk_batch_processed(path, pending.len(), tokens);
                }
                Err(e) => {
                    totals.failed_batches += 1;
                    let stage = if e.is_rate_limited() {
                        ErrorStage::RateLimit
                    } else {
                        ErrorStage::Provider
                    };
                    error!("{}", e);
                    self.ledger.log_error(
                        &self.settings.run_id,
                        Some(doc_id),
                        &path.display().to_string(),
                        stage,
                        &e.to_string(),
                    );
                }
            }
        }

        totals
    }
}

/// First characters of a content hash, for log lines.
fn short(doc_id: &str) -> &str {
    doc_id.get(..12).unwrap_or(doc_id)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chunker::ChunkConfig;
    use crate::error::ProviderError;
    use crate::ledger::SqliteLedger;
    use crate::parsers::ParsedDocument;
    use crate::store::{Embedder, SqliteEmbedStore};
    use ragline_core::DocumentStatus;
    use ragline_db::Database;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Deterministic embedder that counts its calls.
    #[derive(Default)]
    pub(crate) struct CountingEmbedder {
        pub calls: AtomicUsize,
        pub texts: AtomicUsize,
    }

    impl Embedder for Arc<CountingEmbedder> {
        fn model(&self) -> &str {
            "counting"
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.chars().count() as f32]).collect())
        }
    }

    /// Store that fails a fixed number of calls, then writes through.
    struct FlakyStore {
        inner: SqliteEmbedStore<Arc<CountingEmbedder>>,
        failures_left: AtomicUsize,
    }

    impl EmbedStore for FlakyStore {
        fn embed_and_store(&self, chunks: &[Chunk]) -> Result<usize, ProviderError> {
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(ProviderError::Transient("503".into()));
            }
            self.inner.embed_and_store(chunks)
        }
    }

    /// Embed store whose calls always fail with the given error.
    struct FailingStore {
        error: ProviderError,
        calls: AtomicUsize,
    }

    impl EmbedStore for FailingStore {
        fn embed_and_store(&self, _chunks: &[Chunk]) -> Result<usize, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        }
    }

    struct FailingMetadata;

    impl MetadataExtractor for FailingMetadata {
        fn extract(&self, _path: &Path, _text: &str, _parsed: &ParsedDocument) -> IngestResult<DocumentMetadata> {
            Err(IngestError::Metadata("boom".into()))
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl IngestObserver for RecordingObserver {
        fn on_file_duplicate(&self, _path: &Path, _doc_id: &str) {
            self.events.lock().unwrap().push("duplicate".into());
        }
        fn on_file_reindex(&self, _path: &Path, deleted: u64) {
            self.events.lock().unwrap().push(format!("reindex:{}", deleted));
        }
        fn on_rate_limit_retry(&self, _path: &Path, attempt: u32, _delay: Duration) {
            self.events.lock().unwrap().push(format!("retry:{}", attempt));
        }
        fn on_file_completed(&self, _path: &Path, chunks: usize, suspicious: bool) {
            self.events.lock().unwrap().push(format!("completed:{}:{}", chunks, suspicious));
        }
        fn on_file_error(&self, _path: &Path, stage: ErrorStage, _message: &str) {
            self.events.lock().unwrap().push(format!("error:{}", stage));
        }
    }

    pub(crate) fn settings(run_id: &str, force: bool) -> ProcessorSettings {
        ProcessorSettings {
            run_id: run_id.to_string(),
            embedding_batch_size: 2,
            min_chunks_per_file: 2,
            force_reindex: force,
        }
    }

    pub(crate) fn processor(
        db: &Database,
        embedder: Arc<CountingEmbedder>,
        settings: ProcessorSettings,
    ) -> FileProcessor {
        processor_with(
            SqliteLedger::new(db.clone()),
            Arc::new(SqliteEmbedStore::new(db.clone(), embedder)),
            settings,
        )
    }

    fn processor_with(ledger: SqliteLedger, store: Arc<dyn EmbedStore>, settings: ProcessorSettings) -> FileProcessor {
        FileProcessor::new(
            settings,
            Chunker::new(ChunkConfig {
                chunk_size: 40,
                chunk_overlap: 10,
            })
            .unwrap(),
            Arc::new(ledger),
            store,
            Arc::new(RateLimiter::new(1000, 1_000_000)),
            RetryPolicy::with_unit(3, Duration::from_millis(1)),
        )
        .unwrap()
    }

    pub(crate) fn write_doc(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    const BODY: &str = "Alpha beta gamma delta. Epsilon zeta eta theta. Iota kappa lambda mu. \
                        Nu xi omicron pi. Rho sigma tau upsilon. Phi chi psi omega.";

    #[test]
    fn test_process_then_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let embedder = Arc::new(CountingEmbedder::default());
        let observer = Arc::new(RecordingObserver::default());
        let p = processor(&db, embedder.clone(), settings("run-1", false)).with_observer(observer.clone());

        let first = write_doc(dir.path(), "a.txt", BODY);
        let copy = write_doc(dir.path(), "renamed copy.txt", BODY);

        let outcome = p.process(&first, 1);
        let FileOutcome::Completed {
            doc_id,
            chunks_generated,
            chunks_written,
            suspicious,
            ..
        } = outcome
        else {
            panic!("expected completion");
        };
        assert!(chunks_generated > 2);
        assert_eq!(chunks_written, chunks_generated);
        assert!(!suspicious);

        assert_eq!(p.process(&copy, 2), FileOutcome::Duplicate { doc_id: doc_id.clone() });
        assert_eq!(db.count_chunks_by_doc(&doc_id).unwrap() as usize, chunks_generated);
        assert_eq!(embedder.texts.load(Ordering::SeqCst), chunks_generated);

        let record = db.get_document(&doc_id).unwrap().unwrap();
        assert_eq!(record.status, DocumentStatus::Registered);
        assert_eq!(record.total_chunks as usize, chunks_generated);
        assert_eq!(record.file_name, "a.txt");
        assert!(observer.events.lock().unwrap().contains(&"duplicate".to_string()));
    }

    #[test]
    fn test_reindex_replaces_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let embedder = Arc::new(CountingEmbedder::default());
        let path = write_doc(dir.path(), "a.txt", BODY);

        let FileOutcome::Completed { doc_id, chunks_generated, .. } =
            processor(&db, embedder.clone(), settings("run-1", false)).process(&path, 1)
        else {
            panic!("first run failed");
        };

        let observer = Arc::new(RecordingObserver::default());
        let outcome = processor(&db, embedder.clone(), settings("run-2", true))
            .with_observer(observer.clone())
            .process(&path, 1);

        match outcome {
            FileOutcome::Completed {
                reindexed,
                deleted_chunks,
                chunks_written,
                ..
            } => {
                assert!(reindexed);
                assert_eq!(deleted_chunks as usize, chunks_generated);
                assert_eq!(chunks_written, chunks_generated);
            }
            other => panic!("expected reindex completion, got {:?}", other),
        }
        assert_eq!(db.count_chunks_by_doc(&doc_id).unwrap() as usize, chunks_generated);
        assert_eq!(embedder.texts.load(Ordering::SeqCst), chunks_generated * 2);
        assert_eq!(observer.events.lock().unwrap()[0], format!("reindex:{}", chunks_generated));
    }

    #[test]
    fn test_resume_skips_stored_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let embedder = Arc::new(CountingEmbedder::default());
        let path = write_doc(dir.path(), "a.txt", BODY);
        let doc_id = ragline_core::doc_id_for_bytes(BODY.as_bytes());

        // An earlier run claimed the document and stored two chunks before dying
        let stale = DocumentRecord::new(doc_id.clone(), "a.txt", path.display().to_string(), "crashed-run");
        db.claim_document(&stale, false, ragline_db::DEFAULT_STALE_CLAIM).unwrap();
        let spans = Chunker::new(ChunkConfig {
            chunk_size: 40,
            chunk_overlap: 10,
        })
        .unwrap()
        .split(BODY);
        let early: Vec<Chunk> = spans
            .into_iter()
            .take(2)
            .enumerate()
            .map(|(idx, span)| Chunk::new(doc_id.clone(), idx, span.text, span.range))
            .collect();
        SqliteEmbedStore::new(db.clone(), embedder.clone())
            .embed_and_store(&early)
            .unwrap();

        // Zero lease: the crashed run's claim counts as abandoned
        let outcome = processor_with(
            SqliteLedger::new(db.clone()).with_stale_claim_after(Duration::ZERO),
            Arc::new(SqliteEmbedStore::new(db.clone(), embedder.clone())),
            settings("run-2", false),
        )
        .process(&path, 1);
        match outcome {
            FileOutcome::Completed {
                chunks_generated,
                chunks_written,
                chunks_present,
                reindexed,
                ..
            } => {
                assert!(!reindexed);
                assert_eq!(chunks_written, chunks_generated - 2);
                assert_eq!(chunks_present, chunks_generated);
                assert_eq!(embedder.texts.load(Ordering::SeqCst), chunks_generated);
            }
            other => panic!("expected resumed completion, got {:?}", other),
        }
        assert_eq!(
            db.get_document(&doc_id).unwrap().unwrap().status,
            DocumentStatus::Registered
        );
    }

    #[test]
    fn test_live_claim_of_other_run_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let embedder = Arc::new(CountingEmbedder::default());
        let path = write_doc(dir.path(), "a.txt", BODY);
        let doc_id = ragline_core::doc_id_for_bytes(BODY.as_bytes());

        let busy = DocumentRecord::new(doc_id.clone(), "a.txt", path.display().to_string(), "run-1");
        db.claim_document(&busy, false, ragline_db::DEFAULT_STALE_CLAIM).unwrap();

        let outcome = processor(&db, embedder.clone(), settings("run-2", false)).process(&path, 1);
        assert_eq!(outcome, FileOutcome::Duplicate { doc_id: doc_id.clone() });
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);

        let record = db.get_document(&doc_id).unwrap().unwrap();
        assert_eq!(record.status, DocumentStatus::Processing);
        assert_eq!(record.run_id, "run-1");
    }

    #[test]
    fn test_failed_batch_is_filled_in_by_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let embedder = Arc::new(CountingEmbedder::default());
        let path = write_doc(dir.path(), "a.txt", BODY);

        // Every attempt on the first batch fails; later batches go through
        let flaky = Arc::new(FlakyStore {
            inner: SqliteEmbedStore::new(db.clone(), embedder.clone()),
            failures_left: AtomicUsize::new(3),
        });
        let FileOutcome::Completed {
            doc_id,
            chunks_generated,
            chunks_present,
            failed_batches,
            ..
        } = processor_with(SqliteLedger::new(db.clone()), flaky, settings("run-1", false)).process(&path, 1)
        else {
            panic!("first run must complete");
        };
        assert_eq!(failed_batches, 1);
        assert_eq!(chunks_present, chunks_generated - 2);

        let record = db.get_document(&doc_id).unwrap().unwrap();
        assert_eq!(record.status, DocumentStatus::Partial);
        assert_eq!(record.total_chunks as usize, chunks_generated - 2);
        let embedded_first = embedder.texts.load(Ordering::SeqCst);

        let outcome = processor(&db, embedder.clone(), settings("run-2", false)).process(&path, 1);
        match outcome {
            FileOutcome::Completed {
                chunks_written,
                chunks_present,
                failed_batches,
                reindexed,
                ..
            } => {
                assert!(!reindexed);
                assert_eq!(failed_batches, 0);
                assert_eq!(chunks_written, 2);
                assert_eq!(chunks_present, chunks_generated);
            }
            other => panic!("expected resumed completion, got {:?}", other),
        }
        assert_eq!(embedder.texts.load(Ordering::SeqCst) - embedded_first, 2);

        let record = db.get_document(&doc_id).unwrap().unwrap();
        assert_eq!(record.status, DocumentStatus::Registered);
        assert_eq!(record.total_chunks as usize, chunks_generated);
        assert_eq!(db.count_chunks_by_doc(&doc_id).unwrap() as usize, chunks_generated);

        assert!(matches!(
            processor(&db, embedder, settings("run-3", false)).process(&path, 1),
            FileOutcome::Duplicate { .. }
        ));
    }

    #[test]
    fn test_empty_file_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let path = write_doc(dir.path(), "blank.txt", "   \n\n  ");

        let outcome = processor(&db, Arc::new(CountingEmbedder::default()), settings("run-1", false))
            .process(&path, 1);
        assert!(matches!(outcome, FileOutcome::Failed { stage: ErrorStage::Extraction, .. }));

        let errors = db.recent_ingestion_errors(10).unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].doc_id.is_some());
    }

    #[test]
    fn test_unreadable_file_is_hash_error() {
        let db = Database::open_in_memory().unwrap();
        let outcome = processor(&db, Arc::new(CountingEmbedder::default()), settings("run-1", false))
            .process(Path::new("/nonexistent/missing.txt"), 1);
        assert!(matches!(outcome, FileOutcome::Failed { stage: ErrorStage::Hash, .. }));
    }

    #[test]
    fn test_small_file_is_suspicious() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let path = write_doc(dir.path(), "short.txt", "Just one short line.");

        let outcome = processor(&db, Arc::new(CountingEmbedder::default()), settings("run-1", false))
            .process(&path, 1);
        assert!(matches!(outcome, FileOutcome::Completed { suspicious: true, chunks_present: 1, .. }));
    }

    #[test]
    fn test_metadata_failure_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let path = write_doc(dir.path(), "Someone - Some Title.txt", BODY);

        let outcome = processor(&db, Arc::new(CountingEmbedder::default()), settings("run-1", false))
            .with_metadata_extractor(Arc::new(FailingMetadata))
            .process(&path, 1);
        let FileOutcome::Completed { doc_id, .. } = outcome else {
            panic!("metadata failure must not fail the file");
        };

        let record = db.get_document(&doc_id).unwrap().unwrap();
        assert_eq!(record.metadata.title, "Someone - Some Title");
        assert_eq!(record.metadata.language, "unknown");
        assert_eq!(record.metadata.category, "general");
        assert_eq!(db.recent_ingestion_errors(10).unwrap()[0].stage, ErrorStage::Metadata);
    }

    #[test]
    fn test_rate_limited_batches_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let path = write_doc(dir.path(), "a.txt", BODY);
        let store = Arc::new(FailingStore {
            error: ProviderError::RateLimited("429".into()),
            calls: AtomicUsize::new(0),
        });
        let observer = Arc::new(RecordingObserver::default());

        let p = FileProcessor::new(
            settings("run-1", false),
            Chunker::new(ChunkConfig {
                chunk_size: 40,
                chunk_overlap: 10,
            })
            .unwrap(),
            Arc::new(SqliteLedger::new(db.clone())),
            store.clone(),
            Arc::new(RateLimiter::new(1000, 1_000_000)),
            RetryPolicy::with_unit(3, Duration::from_millis(1)),
        )
        .unwrap()
        .with_observer(observer.clone());

        let outcome = p.process(&path, 1);
        let FileOutcome::Completed {
            chunks_generated,
            chunks_written,
            failed_batches,
            suspicious,
            ..
        } = outcome
        else {
            panic!("batch failures must not fail the file");
        };

        let batches = chunks_generated.div_ceil(2);
        assert_eq!(failed_batches, batches);
        assert_eq!(chunks_written, 0);
        assert!(suspicious);
        assert_eq!(store.calls.load(Ordering::SeqCst), batches * 3);

        let events = observer.events.lock().unwrap();
        assert_eq!(events.iter().filter(|e| e.starts_with("retry:")).count(), batches * 2);

        let errors = db.recent_ingestion_errors(100).unwrap();
        assert!(errors.iter().all(|e| e.stage == ErrorStage::RateLimit));
        assert_eq!(errors.len(), batches);
    }
}
