//! One ingestion run: discovery, wiring, execution.

use crate::chunker::{ChunkConfig, Chunker};
use crate::error::{IngestError, IngestResult};
use crate::events::IngestObserver;
use crate::ledger::{Ledger, SqliteLedger};
use crate::parsers::TextExtractor;
use crate::pool::{CancelFlag, WorkerPool};
use crate::processor::{FileProcessor, ProcessorSettings};
use crate::rate_limiter::RateLimiter;
use crate::report::RunReport;
use crate::retry::RetryPolicy;
use crate::store::{EmbedStore, RemoteEmbedder, SqliteEmbedStore};
use chrono::Utc;
use ragline_config::Config;
use ragline_core::{new_id, RunId, SourceKind};
use ragline_db::Database;
use ragline_embed::EmbeddingClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Supported files under `root`, sorted by path.
///
/// Follows symlinks and skips hidden files and directories. A file path
/// is returned as-is when it has a supported extension.
pub fn discover(root: &Path) -> IngestResult<Vec<PathBuf>> {
    if !root.exists() {
        return Err(IngestError::FileNotFound(root.to_path_buf()));
    }
    if root.is_file() {
        return match SourceKind::from_path(root) {
            Some(_) => Ok(vec![root.to_path_buf()]),
            None => Err(IngestError::UnsupportedFileType(root.display().to_string())),
        };
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && SourceKind::from_path(e.path()).is_some())
        .map(|e| e.into_path())
        .collect();
    files.sort();

    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// A configured ingestion run.
pub struct IngestionRun {
    run_id: RunId,
    config: Config,
    limiter: Arc<RateLimiter>,
    processor: FileProcessor,
    pool: WorkerPool,
}

impl IngestionRun {
    /// Wire the run against SQLite and the configured embedding provider.
    pub fn from_config(config: &Config, db: Database, runtime: Arc<Runtime>) -> IngestResult<Self> {
        let client = EmbeddingClient::from_config(&config.embedding)?;
        let store = SqliteEmbedStore::new(db.clone(), RemoteEmbedder::new(client, runtime));
        let ledger = SqliteLedger::new(db)
            .with_stale_claim_after(Duration::from_secs(config.ingest.stale_claim_seconds));
        Self::new(config, Arc::new(ledger), Arc::new(store))
    }

    /// Wire the run against explicit ledger and store implementations.
    pub fn new(config: &Config, ledger: Arc<dyn Ledger>, store: Arc<dyn EmbedStore>) -> IngestResult<Self> {
        config.validate()?;

        let run_id = new_id();
        let ingest = &config.ingest;
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit.rpm_target,
            config.rate_limit.tpm_target,
        ));
        let processor = FileProcessor::new(
            ProcessorSettings {
                run_id: run_id.clone(),
                embedding_batch_size: ingest.embedding_batch_size,
                min_chunks_per_file: ingest.min_chunks_per_file,
                force_reindex: ingest.force_reindex,
            },
            Chunker::new(ChunkConfig::from_ingest_config(ingest))?,
            ledger,
            store,
            Arc::clone(&limiter),
            RetryPolicy::new(ingest.max_retries),
        )?;

        Ok(Self {
            run_id,
            config: config.clone(),
            limiter,
            processor,
            pool: WorkerPool::new(ingest.workers),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn IngestObserver>) -> Self {
        self.processor = self.processor.with_observer(observer);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.processor = self.processor.with_extractor(extractor);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Flag that stops workers from taking further files.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.pool.cancel_flag()
    }

    fn log_configuration(&self, files: usize) {
        let ingest = &self.config.ingest;
        let rate = &self.config.rate_limit;
        info!("Run {}: {} files", self.run_id, files);
        info!(
            "Chunking: size={} overlap={} | batch={} | workers={}",
            ingest.chunk_size,
            ingest.chunk_overlap,
            ingest.embedding_batch_size,
            self.pool.workers()
        );
        info!(
            "Rate targets: {} RPM / {} TPM (limits {} / {}) | retries={} | min chunks={} | force_reindex={}",
            rate.rpm_target,
            rate.tpm_target,
            rate.rpm_limit,
            rate.tpm_limit,
            ingest.max_retries,
            ingest.min_chunks_per_file,
            ingest.force_reindex
        );
        info!(
            "Embedding model: {} via {}",
            self.config.embedding.model,
            self.config.embedding.provider.as_str()
        );
    }

    /// Process all files and wait for the workers.
    pub fn execute(&self, files: Vec<PathBuf>) -> RunReport {
        let files_discovered = files.len();
        self.log_configuration(files_discovered);

        let started_at = Utc::now();
        let started = Instant::now();
        let stats = self.pool.run(files, &self.processor);
        let elapsed = started.elapsed();
        let (window_requests, window_tokens) = self.limiter.usage();

        info!(
            "Run {} finished in {:.1}s: {} processed, {} skipped, {} failed",
            self.run_id,
            elapsed.as_secs_f64(),
            stats.files_processed,
            stats.files_skipped,
            stats.files_failed
        );

        RunReport {
            run_id: self.run_id.clone(),
            started_at,
            finished_at: Utc::now(),
            elapsed_seconds: elapsed.as_secs_f64(),
            files_discovered,
            stats,
            window_requests,
            window_tokens,
            rpm_target: self.limiter.rpm_target(),
            tpm_target: self.limiter.tpm_target(),
            min_chunks_per_file: self.config.ingest.min_chunks_per_file,
        }
    }
}
