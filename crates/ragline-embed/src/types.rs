//! Request and response bodies for the embedding APIs.

use serde::{Deserialize, Serialize};

/// Request body for OpenAI-compatible `/embeddings` and Ollama `/api/embed`.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRequest<'a> {
    pub model: &'a str,
    pub input: &'a [String],
}

/// One vector in an OpenAI-compatible response.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingData {
    #[serde(default)]
    pub index: usize,
    pub embedding: Vec<f32>,
}

/// Token usage reported by OpenAI-compatible providers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbeddingUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Response from an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiEmbeddingResponse {
    pub data: Vec<EmbeddingData>,
    #[serde(default)]
    pub usage: Option<EmbeddingUsage>,
}

impl OpenAiEmbeddingResponse {
    /// Vectors in input order.
    pub fn into_vectors(mut self) -> Vec<Vec<f32>> {
        self.data.sort_by_key(|d| d.index);
        self.data.into_iter().map(|d| d.embedding).collect()
    }
}

/// Response from Ollama's `/api/embed` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaEmbeddingResponse {
    pub embeddings: Vec<Vec<f32>>,
}
