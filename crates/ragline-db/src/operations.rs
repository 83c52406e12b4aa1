//! Database operations.

pub mod chunks;
pub mod documents;
pub mod errors;
pub mod stats;
