//! Embedding provider and chunk store seams.

use crate::error::ProviderError;
use ragline_core::Chunk;
use ragline_db::{Database, StoredChunk};
use ragline_embed::EmbeddingClient;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Turns texts into vectors, one per input, in input order.
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Embeds chunks and persists them with their vectors.
pub trait EmbedStore: Send + Sync {
    /// Returns the number of chunks newly written. Chunks already stored
    /// are left untouched.
    fn embed_and_store(&self, chunks: &[Chunk]) -> Result<usize, ProviderError>;
}

/// [`Embedder`] over the HTTP client, driven by a shared tokio runtime.
pub struct RemoteEmbedder {
    client: EmbeddingClient,
    runtime: Arc<Runtime>,
}

impl RemoteEmbedder {
    pub fn new(client: EmbeddingClient, runtime: Arc<Runtime>) -> Self {
        Self { client, runtime }
    }
}

impl Embedder for RemoteEmbedder {
    fn model(&self) -> &str {
        self.client.model()
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.runtime
            .block_on(self.client.embed(texts))
            .map_err(ProviderError::from)
    }
}

/// Store that writes chunks and embeddings to SQLite in one transaction.
pub struct SqliteEmbedStore<E> {
    db: Database,
    embedder: E,
}

impl<E: Embedder> SqliteEmbedStore<E> {
    pub fn new(db: Database, embedder: E) -> Self {
        Self { db, embedder }
    }
}

impl<E: Embedder> EmbedStore for SqliteEmbedStore<E> {
    fn embed_and_store(&self, chunks: &[Chunk]) -> Result<usize, ProviderError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts)?;
        if vectors.len() != chunks.len() {
            return Err(ProviderError::Fatal(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let stored: Vec<StoredChunk> = chunks
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| StoredChunk { chunk, vector })
            .collect();

        Ok(self.db.insert_chunks(&stored, self.embedder.model())?)
    }
}
