//! Fixed-size worker pool over a shared file queue.

use crate::processor::{FileOutcome, FileProcessor};
use chrono::{DateTime, Utc};
use ragline_core::ErrorStage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, error, info};

/// Shared cancellation switch, checked before each file is taken.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum WorkItem {
    File(PathBuf),
    Stop,
}

/// A file that ended in an error.
#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub path: String,
    pub stage: ErrorStage,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Aggregate counters for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub files_processed: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
    pub files_reindexed: usize,
    pub chunks_generated: usize,
    pub chunks_written: usize,
    pub failed_batches: usize,
    pub suspicious_files: Vec<String>,
    pub failed_files: Vec<FailedFile>,
    pub cancelled: bool,
}

impl RunStats {
    /// Fold one file's outcome into the totals.
    pub fn record(&mut self, path: &Path, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Completed {
                chunks_generated,
                chunks_written,
                suspicious,
                reindexed,
                failed_batches,
                ..
            } => {
                self.files_processed += 1;
                if *reindexed {
                    self.files_reindexed += 1;
                }
                self.chunks_generated += chunks_generated;
                self.chunks_written += chunks_written;
                self.failed_batches += failed_batches;
                if *suspicious {
                    self.suspicious_files.push(path.display().to_string());
                }
            }
            FileOutcome::Duplicate { .. } => self.files_skipped += 1,
            FileOutcome::Failed { stage, message } => {
                self.files_failed += 1;
                self.failed_files.push(FailedFile {
                    path: path.display().to_string(),
                    stage: *stage,
                    message: message.clone(),
                    at: Utc::now(),
                });
            }
        }
    }

    /// Files that reached a terminal outcome.
    pub fn files_finished(&self) -> usize {
        self.files_processed + self.files_failed + self.files_skipped
    }
}

/// Runs a [`FileProcessor`] over a list of files on N OS threads.
pub struct WorkerPool {
    workers: usize,
    cancel: CancelFlag,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process every file and wait for all workers to finish.
    pub fn run(&self, files: Vec<PathBuf>, processor: &FileProcessor) -> RunStats {
        let (tx, rx) = mpsc::channel();
        let total = files.len();
        for file in files {
            if tx.send(WorkItem::File(file)).is_err() {
                break;
            }
        }
        for _ in 0..self.workers {
            if tx.send(WorkItem::Stop).is_err() {
                break;
            }
        }
        drop(tx);

        info!("Starting {} workers for {} files", self.workers, total);

        let queue = Mutex::new(rx);
        let stats = Mutex::new(RunStats::default());
        let (queue, stats_ref, cancel) = (&queue, &stats, &self.cancel);

        thread::scope(|scope| {
            for worker_id in 1..=self.workers {
                let spawned = thread::Builder::new()
                    .name(format!("ingest-worker-{}", worker_id))
                    .spawn_scoped(scope, move || worker_loop(worker_id, queue, processor, stats_ref, cancel));
                if let Err(e) = spawned {
                    error!("Failed to start worker {}: {}", worker_id, e);
                }
            }
        });

        let mut stats = stats.into_inner().unwrap_or_else(|e| e.into_inner());
        stats.cancelled = self.cancel.is_cancelled();
        stats
    }
}

fn worker_loop(
    worker_id: usize,
    queue: &Mutex<Receiver<WorkItem>>,
    processor: &FileProcessor,
    stats: &Mutex<RunStats>,
    cancel: &CancelFlag,
) {
    debug!("[worker {}] started", worker_id);
    loop {
        let item = {
            let rx = queue.lock().unwrap_or_else(|e| e.into_inner());
            rx.recv()
        };

        let path = match item {
            Ok(WorkItem::File(path)) => path,
            Ok(WorkItem::Stop) | Err(_) => break,
        };
        if cancel.is_cancelled() {
            debug!("[worker {}] cancelled", worker_id);
            break;
        }

        let outcome = processor.process(&path, worker_id);
        stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(&path, &outcome);
    }
    debug!("[worker {}] finished", worker_id);
}
