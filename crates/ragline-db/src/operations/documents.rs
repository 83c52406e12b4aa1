//! Document ledger operations.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use ragline_core::{DocumentMetadata, DocumentRecord, DocumentStatus, ProcessingDecision};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::time::Duration;
use tracing::debug;

/// How long a `processing` claim from another run blocks reprocessing.
pub const DEFAULT_STALE_CLAIM: Duration = Duration::from_secs(15 * 60);

const DOCUMENT_COLUMNS: &str = "doc_id, file_name, file_path, title, author, language, category, \
     published_year, total_chunks, status, run_id, created_at, updated_at";

/// Result of claiming a document for the current run.
#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    pub decision: ProcessingDecision,
    /// The ledger row as it was before the claim.
    pub previous: Option<DocumentRecord>,
}

impl Database {
    /// Decide what to do with a document and claim it for `claim.run_id`.
    ///
    /// Runs in one `BEGIN IMMEDIATE` transaction, so two workers holding the same
    /// `doc_id` are serialized: exactly one of them gets `Process`/`Reindex`.
    ///
    /// - no row: insert a `processing` claim, `Process`
    /// - row already touched by this run: `Skip`
    /// - `registered` row: `Skip`, or `Reindex` when forced
    /// - `partial` row: `Process` to fill in missing chunks, or `Reindex` when forced
    /// - `processing` row from another run: `Skip` while its lease is younger than
    ///   `stale_after`, otherwise the run is presumed dead and the claim is taken over
    pub fn claim_document(
        &self,
        claim: &DocumentRecord,
        force_reindex: bool,
        stale_after: Duration,
    ) -> DbResult<ClaimOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let previous = query_document(&tx, &claim.doc_id)?;
        let decision = match &previous {
            None => ProcessingDecision::Process,
            Some(existing) if existing.run_id == claim.run_id => ProcessingDecision::Skip,
            Some(existing) => match existing.status {
                DocumentStatus::Registered if force_reindex => ProcessingDecision::Reindex,
                DocumentStatus::Registered => ProcessingDecision::Skip,
                DocumentStatus::Partial if force_reindex => ProcessingDecision::Reindex,
                DocumentStatus::Partial => ProcessingDecision::Process,
                DocumentStatus::Processing if lease_expired(existing.updated_at, stale_after) => {
                    ProcessingDecision::Process
                }
                DocumentStatus::Processing => ProcessingDecision::Skip,
            },
        };

        let decision = match (decision, &previous) {
            (ProcessingDecision::Skip, _) => ProcessingDecision::Skip,
            (decision, None) => match insert_claim(&tx, claim) {
                Ok(()) => decision,
                Err(e) if is_constraint_violation(&e) => ProcessingDecision::Skip,
                Err(e) => return Err(DbError::from(e)),
            },
            (decision, Some(_)) => {
                tx.execute(
                    r#"
                    UPDATE documents
                    SET status = ?2, run_id = ?3, file_name = ?4, file_path = ?5, updated_at = ?6
                    WHERE doc_id = ?1
                    "#,
                    params![
                        claim.doc_id,
                        DocumentStatus::Processing.as_str(),
                        claim.run_id,
                        claim.file_name,
                        claim.file_path,
                        Utc::now().to_rfc3339(),
                    ],
                )?;
                decision
            }
        };

        tx.commit()?;
        debug!("Ledger decision for {}: {}", short_id(&claim.doc_id), decision);

        Ok(ClaimOutcome { decision, previous })
    }

    /// Mark a document as registered, storing its final metadata and chunk count.
    pub fn register_document(&self, record: &DocumentRecord) -> DbResult<()> {
        self.complete_document(record, DocumentStatus::Registered)
    }

    /// Store final metadata and chunk count, leaving the row in `status`.
    pub fn complete_document(&self, record: &DocumentRecord, status: DocumentStatus) -> DbResult<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO documents (doc_id, file_name, file_path, title, author, language, category,
                                   published_year, total_chunks, status, run_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(doc_id) DO UPDATE SET
                file_name = excluded.file_name,
                file_path = excluded.file_path,
                title = excluded.title,
                author = excluded.author,
                language = excluded.language,
                category = excluded.category,
                published_year = excluded.published_year,
                total_chunks = excluded.total_chunks,
                status = excluded.status,
                run_id = excluded.run_id,
                updated_at = excluded.updated_at
            "#,
            params![
                record.doc_id,
                record.file_name,
                record.file_path,
                record.metadata.title,
                record.metadata.author,
                record.metadata.language,
                record.metadata.category,
                record.metadata.published_year,
                record.total_chunks,
                status.as_str(),
                record.run_id,
                record.created_at.to_rfc3339(),
                now,
            ],
        )?;
        Ok(())
    }

    /// Renew the lease on a claim held by `run_id`.
    ///
    /// Returns false when the row is no longer this run's `processing` claim.
    pub fn touch_document(&self, doc_id: &str, run_id: &str) -> DbResult<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE documents SET updated_at = ?3 WHERE doc_id = ?1 AND run_id = ?2 AND status = ?4",
            params![
                doc_id,
                run_id,
                Utc::now().to_rfc3339(),
                DocumentStatus::Processing.as_str()
            ],
        )?;
        Ok(updated > 0)
    }

    /// Get a document by its content hash.
    pub fn get_document(&self, doc_id: &str) -> DbResult<Option<DocumentRecord>> {
        let conn = self.conn()?;
        query_document(&conn, doc_id).map_err(DbError::from)
    }

    /// List documents, optionally filtered by status, most recently updated first.
    pub fn list_documents(&self, status: Option<DocumentStatus>, limit: i64) -> DbResult<Vec<DocumentRecord>> {
        let conn = self.conn()?;
        let docs = match status {
            Some(s) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM documents WHERE status = ?1 ORDER BY updated_at DESC LIMIT ?2",
                    DOCUMENT_COLUMNS
                ))?;
                let rows = stmt.query_map(params![s.as_str(), limit], row_to_document)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM documents ORDER BY updated_at DESC LIMIT ?1",
                    DOCUMENT_COLUMNS
                ))?;
                let rows = stmt.query_map(params![limit], row_to_document)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(docs)
    }
}

fn insert_claim(conn: &Connection, claim: &DocumentRecord) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT INTO documents (doc_id, file_name, file_path, title, author, language, category,
                               published_year, total_chunks, status, run_id, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, NULL, 0, ?7, ?8, ?9, ?9)
        "#,
        params![
            claim.doc_id,
            claim.file_name,
            claim.file_path,
            claim.metadata.title,
            claim.metadata.language,
            claim.metadata.category,
            DocumentStatus::Processing.as_str(),
            claim.run_id,
            claim.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn query_document(conn: &Connection, doc_id: &str) -> rusqlite::Result<Option<DocumentRecord>> {
    conn.query_row(
        &format!("SELECT {} FROM documents WHERE doc_id = ?1", DOCUMENT_COLUMNS),
        params![doc_id],
        row_to_document,
    )
    .optional()
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn lease_expired(updated_at: DateTime<Utc>, stale_after: Duration) -> bool {
    match Utc::now().signed_duration_since(updated_at).to_std() {
        Ok(age) => age >= stale_after,
        // Timestamp in the future (clock skew): only a zero lease treats it as stale
        Err(_) => stale_after.is_zero(),
    }
}

fn short_id(doc_id: &str) -> &str {
    &doc_id[..doc_id.len().min(12)]
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<DocumentRecord> {
    let status_str: String = row.get(9)?;
    let created_at_str: String = row.get(11)?;
    let updated_at_str: String = row.get(12)?;

    Ok(DocumentRecord {
        doc_id: row.get(0)?,
        file_name: row.get(1)?,
        file_path: row.get(2)?,
        metadata: DocumentMetadata {
            title: row.get(3)?,
            author: row.get(4)?,
            language: row.get(5)?,
            category: row.get(6)?,
            published_year: row.get(7)?,
        },
        total_chunks: row.get(8)?,
        status: DocumentStatus::from_str(&status_str).unwrap_or_default(),
        run_id: row.get(10)?,
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
    })
}
