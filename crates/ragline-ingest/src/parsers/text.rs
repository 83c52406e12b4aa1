//! Plain text document parser.

use super::{DocumentParser, ParsedDocument};
use crate::error::IngestResult;
use std::path::Path;

/// Parser for plain text files. Invalid UTF-8 is replaced, never rejected.
pub struct TextParser;

impl TextParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for TextParser {
    fn parse(&self, path: &Path) -> IngestResult<ParsedDocument> {
        let bytes = std::fs::read(path)?;
        let content = String::from_utf8_lossy(&bytes);
        // Strip a UTF-8 BOM so it does not end up in the first chunk
        let content = content.trim_start_matches('\u{feff}');
        Ok(ParsedDocument::new(vec![content.to_string()]))
    }

    fn extensions(&self) -> &[&str] {
        &["txt"]
    }
}
