//! Chunk and embedding operations.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::Utc;
use ragline_core::{CharRange, Chunk};
use rusqlite::params;

/// A chunk paired with its embedding vector, ready to be written.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

impl Database {
    /// Write chunks and their embeddings in one transaction.
    ///
    /// Chunks are keyed by `chunk_id` and never overwritten; returns the number
    /// of chunks that were actually new.
    pub fn insert_chunks(&self, chunks: &[StoredChunk], model: &str) -> DbResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let mut inserted = 0;

        {
            let mut chunk_stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO chunks
                    (chunk_id, doc_id, ordinal_index, content, char_start, char_end, file_name, book_title, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )?;
            let mut embedding_stmt = tx.prepare(
                r#"
                INSERT OR REPLACE INTO embeddings (chunk_id, vector, model, dimensions)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )?;

            for stored in chunks {
                let chunk = &stored.chunk;
                let changed = chunk_stmt.execute(params![
                    chunk.chunk_id,
                    chunk.doc_id,
                    chunk.ordinal_index as i64,
                    chunk.text,
                    chunk.range.start as i64,
                    chunk.range.end as i64,
                    chunk.file_name,
                    chunk.book_title,
                    now,
                ])?;
                if changed == 0 {
                    continue;
                }

                embedding_stmt.execute(params![
                    chunk.chunk_id,
                    vector_to_bytes(&stored.vector),
                    model,
                    stored.vector.len() as i64,
                ])?;
                inserted += 1;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Check whether a chunk is already stored.
    pub fn chunk_exists(&self, chunk_id: &str) -> DbResult<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM chunks WHERE chunk_id = ?1)",
            params![chunk_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Delete all chunks (and their embeddings) of a document.
    pub fn delete_chunks_by_doc(&self, doc_id: &str) -> DbResult<u64> {
        let conn = self.conn()?;
        let count = conn.execute("DELETE FROM chunks WHERE doc_id = ?1", params![doc_id])?;
        Ok(count as u64)
    }

    /// Count stored chunks of a document.
    pub fn count_chunks_by_doc(&self, doc_id: &str) -> DbResult<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE doc_id = ?1",
            params![doc_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Get all chunks of a document in order.
    pub fn get_chunks_by_doc(&self, doc_id: &str) -> DbResult<Vec<Chunk>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT chunk_id, doc_id, ordinal_index, content, char_start, char_end, file_name, book_title
             FROM chunks WHERE doc_id = ?1 ORDER BY ordinal_index",
        )?;

        let chunks = stmt.query_map(params![doc_id], |row| {
            let ordinal_index: i64 = row.get(2)?;
            let start: i64 = row.get(4)?;
            let end: i64 = row.get(5)?;
            Ok(Chunk {
                chunk_id: row.get(0)?,
                doc_id: row.get(1)?,
                ordinal_index: ordinal_index as usize,
                text: row.get(3)?,
                range: CharRange::new(start as usize, end as usize),
                file_name: row.get(6)?,
                book_title: row.get(7)?,
            })
        })?;

        chunks.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Get the embedding stored for a chunk.
    pub fn get_embedding(&self, chunk_id: &str) -> DbResult<Option<Vec<f32>>> {
        let conn = self.conn()?;

        let result = conn.query_row(
            "SELECT vector, dimensions FROM embeddings WHERE chunk_id = ?1",
            params![chunk_id],
            |row| {
                let bytes: Vec<u8> = row.get(0)?;
                let dimensions: i64 = row.get(1)?;
                Ok((bytes, dimensions))
            },
        );

        match result {
            Ok((bytes, dimensions)) => Ok(Some(bytes_to_vector(&bytes, dimensions as usize))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DbError::from(e)),
        }
    }
}

fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_vector(bytes: &[u8], dimensions: usize) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .take(dimensions)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
