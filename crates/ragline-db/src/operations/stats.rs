//! Ledger statistics.

use crate::database::Database;
use crate::error::DbResult;
use ragline_core::LedgerStats;
use rusqlite::Connection;
use std::collections::HashMap;

impl Database {
    /// Collect document, chunk and error counts.
    pub fn get_stats(&self) -> DbResult<LedgerStats> {
        let conn = self.conn()?;

        let documents_registered: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE status = 'registered'",
            [],
            |row| row.get(0),
        )?;

        let documents_processing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE status = 'processing'",
            [],
            |row| row.get(0),
        )?;

        let documents_partial: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE status = 'partial'",
            [],
            |row| row.get(0),
        )?;

        let total_chunks: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;

        let total_embeddings: i64 =
            conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;

        let documents_by_category = grouped_counts(
            &conn,
            "SELECT category, COUNT(*) FROM documents WHERE status IN ('registered', 'partial') GROUP BY category",
        )?;

        let errors_by_stage = grouped_counts(
            &conn,
            "SELECT stage, COUNT(*) FROM ingestion_errors GROUP BY stage",
        )?;

        // Database size (page_count * page_size)
        let page_count: i64 = conn.pragma_query_value(None, "page_count", |row| row.get(0))?;
        let page_size: i64 = conn.pragma_query_value(None, "page_size", |row| row.get(0))?;

        Ok(LedgerStats {
            documents_registered,
            documents_processing,
            documents_partial,
            total_chunks,
            total_embeddings,
            documents_by_category,
            errors_by_stage,
            database_size_bytes: page_count * page_size,
        })
    }
}

fn grouped_counts(conn: &Connection, sql: &str) -> DbResult<HashMap<String, i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| {
        let key: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok((key, count))
    })?;

    let mut counts = HashMap::new();
    for row in rows {
        let (key, count) = row?;
        counts.insert(key, count);
    }
    Ok(counts)
}
