//! Deduplication ledger seam.

use crate::error::{IngestError, IngestResult};
use ragline_core::{DocumentRecord, DocumentStatus, ErrorStage};
use ragline_db::{ClaimOutcome, Database, DEFAULT_STALE_CLAIM};
use std::time::Duration;
use tracing::debug;

/// Tracks which documents have been ingested and which chunks are stored.
pub trait Ledger: Send + Sync {
    /// Decide what to do with a document and claim it for this run.
    ///
    /// A storage failure is [`IngestError::StorageUndetermined`]; it must
    /// never be read as "not ingested yet".
    fn decide(&self, claim: &DocumentRecord, force_reindex: bool) -> IngestResult<ClaimOutcome>;

    /// Mark a document as fully ingested with its final metadata.
    fn register(&self, record: &DocumentRecord) -> IngestResult<()>;

    /// Record a document whose chunks are only partly stored. The next run
    /// claims it again and fills in what is missing.
    fn register_partial(&self, record: &DocumentRecord) -> IngestResult<()>;

    /// Renew this run's claim on a document while it is still being worked on.
    fn touch(&self, _doc_id: &str, _run_id: &str) -> IngestResult<()> {
        Ok(())
    }

    /// Delete every chunk of a document, returning how many were removed.
    fn delete_chunks(&self, doc_id: &str) -> IngestResult<u64>;

    fn chunk_exists(&self, chunk_id: &str) -> IngestResult<bool>;

    /// Append a per-file failure to the error log. Failures here are ignored.
    fn log_error(&self, _run_id: &str, _doc_id: Option<&str>, _file_path: &str, _stage: ErrorStage, _message: &str) {}
}

/// Ledger backed by the SQLite database.
#[derive(Clone)]
pub struct SqliteLedger {
    db: Database,
    stale_after: Duration,
}

impl SqliteLedger {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            stale_after: DEFAULT_STALE_CLAIM,
        }
    }

    /// How long another run's unfinished claim is honored before it is taken over.
    pub fn with_stale_claim_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    fn complete(&self, record: &DocumentRecord, status: DocumentStatus) -> IngestResult<()> {
        self.db
            .complete_document(record, status)
            .map_err(|e| IngestError::Registration {
                doc_id: record.doc_id.clone(),
                message: e.to_string(),
            })
    }
}

impl Ledger for SqliteLedger {
    fn decide(&self, claim: &DocumentRecord, force_reindex: bool) -> IngestResult<ClaimOutcome> {
        self.db
            .claim_document(claim, force_reindex, self.stale_after)
            .map_err(|e| IngestError::StorageUndetermined {
                doc_id: claim.doc_id.clone(),
                message: e.to_string(),
            })
    }

    fn register(&self, record: &DocumentRecord) -> IngestResult<()> {
        self.complete(record, DocumentStatus::Registered)
    }

    fn register_partial(&self, record: &DocumentRecord) -> IngestResult<()> {
        self.complete(record, DocumentStatus::Partial)
    }

    fn touch(&self, doc_id: &str, run_id: &str) -> IngestResult<()> {
        self.db.touch_document(doc_id, run_id)?;
        Ok(())
    }

    fn delete_chunks(&self, doc_id: &str) -> IngestResult<u64> {
        Ok(self.db.delete_chunks_by_doc(doc_id)?)
    }

    fn chunk_exists(&self, chunk_id: &str) -> IngestResult<bool> {
        Ok(self.db.chunk_exists(chunk_id)?)
    }

    fn log_error(&self, run_id: &str, doc_id: Option<&str>, file_path: &str, stage: ErrorStage, message: &str) {
        if let Err(e) = self
            .db
            .log_ingestion_error(Some(run_id), doc_id, file_path, stage, message)
        {
            debug!("Could not record ingestion error for {}: {}", file_path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::ProcessingDecision;

    fn ledger() -> (SqliteLedger, Database) {
        let db = Database::open_in_memory().unwrap();
        (SqliteLedger::new(db.clone()), db)
    }

    #[test]
    fn test_process_then_skip_across_runs() {
        let (ledger, _db) = ledger();
        let claim = DocumentRecord::new("doc-a", "a.txt", "/a.txt", "run-1");

        assert_eq!(ledger.decide(&claim, false).unwrap().decision, ProcessingDecision::Process);
        ledger.register(&claim.clone().with_total_chunks(3)).unwrap();

        let next_run = DocumentRecord::new("doc-a", "copy.txt", "/copy.txt", "run-2");
        let outcome = ledger.decide(&next_run, false).unwrap();
        assert_eq!(outcome.decision, ProcessingDecision::Skip);
        assert_eq!(outcome.previous.unwrap().status, DocumentStatus::Registered);

        assert_eq!(ledger.decide(&next_run, true).unwrap().decision, ProcessingDecision::Reindex);
    }

    #[test]
    fn test_partial_registration_is_claimed_again() {
        let (ledger, db) = ledger();
        let claim = DocumentRecord::new("doc-a", "a.txt", "/a.txt", "run-1");
        ledger.decide(&claim, false).unwrap();
        ledger.register_partial(&claim.clone().with_total_chunks(2)).unwrap();
        assert_eq!(db.get_document("doc-a").unwrap().unwrap().status, DocumentStatus::Partial);

        let next_run = DocumentRecord::new("doc-a", "a.txt", "/a.txt", "run-2");
        assert_eq!(ledger.decide(&next_run, false).unwrap().decision, ProcessingDecision::Process);
    }

    #[test]
    fn test_claim_lease_follows_configured_timeout() {
        let db = Database::open_in_memory().unwrap();
        let patient = SqliteLedger::new(db.clone());
        let eager = SqliteLedger::new(db).with_stale_claim_after(Duration::ZERO);

        let first = DocumentRecord::new("doc-a", "a.txt", "/a.txt", "run-1");
        patient.decide(&first, false).unwrap();
        patient.touch("doc-a", "run-1").unwrap();

        let second = DocumentRecord::new("doc-a", "a.txt", "/a.txt", "run-2");
        assert_eq!(patient.decide(&second, false).unwrap().decision, ProcessingDecision::Skip);
        assert_eq!(eager.decide(&second, false).unwrap().decision, ProcessingDecision::Process);
    }

    #[test]
    fn test_log_error_is_persisted() {
        let (ledger, db) = ledger();
        ledger.log_error("run-1", None, "/bad.pdf", ErrorStage::Extraction, "no text");

        let errors = db.recent_ingestion_errors(10).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stage, ErrorStage::Extraction);
        assert_eq!(errors[0].run_id.as_deref(), Some("run-1"));
    }
}
