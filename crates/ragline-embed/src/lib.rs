//! Ragline Embed - HTTP clients for embedding providers.
//!
//! Talks to OpenAI-compatible `/embeddings` endpoints and to Ollama's
//! `/api/embed`, mapping HTTP failures onto [`EmbedError`] so callers can
//! tell rate limits and transient faults apart from permanent ones.

mod client;
mod error;
mod types;

pub use client::EmbeddingClient;
pub use error::{EmbedError, EmbedResult};
pub use types::*;
