//! Ingestion error log.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use ragline_core::{ErrorStage, IngestionErrorEntry};
use rusqlite::params;

impl Database {
    /// Append a failure to the error log, returning its row id.
    pub fn log_ingestion_error(
        &self,
        run_id: Option<&str>,
        doc_id: Option<&str>,
        file_path: &str,
        stage: ErrorStage,
        message: &str,
    ) -> DbResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO ingestion_errors (run_id, doc_id, file_path, stage, message, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![run_id, doc_id, file_path, stage.as_str(), message, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent errors first.
    pub fn recent_ingestion_errors(&self, limit: i64) -> DbResult<Vec<IngestionErrorEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, run_id, doc_id, file_path, stage, message, created_at
             FROM ingestion_errors ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], |row| {
            let stage_str: String = row.get(4)?;
            let created_at_str: String = row.get(6)?;
            Ok(IngestionErrorEntry {
                id: row.get(0)?,
                run_id: row.get(1)?,
                doc_id: row.get(2)?,
                file_path: row.get(3)?,
                stage: ErrorStage::from_str(&stage_str).unwrap_or(ErrorStage::Provider),
                message: row.get(5)?,
                created_at: DateTime::parse_from_rfc3339(&created_at_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}
