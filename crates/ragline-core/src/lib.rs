//! Ragline Core - Core types and identities for the ragline ingestion pipeline.

mod ids;
mod types;

pub use ids::{chunk_id, doc_id_for_bytes, doc_id_for_reader, new_id};
pub use types::*;
