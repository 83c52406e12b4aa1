//! Ragline DB - SQLite ledger and chunk store for ragline.

mod database;
mod error;
mod migrations;
mod operations;

pub use database::{Database, DEFAULT_BUSY_TIMEOUT};
pub use error::{DbError, DbResult};
pub use operations::chunks::StoredChunk;
pub use operations::documents::{ClaimOutcome, DEFAULT_STALE_CLAIM};
