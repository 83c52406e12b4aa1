//! Word (.docx) document parser.

use super::{first_element_text, read_zip_entry, DocumentParser, ParsedDocument};
use crate::error::{IngestError, IngestResult};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;

/// Parser for Office Open XML word documents.
pub struct DocxParser;

impl DocxParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for DocxParser {
    fn parse(&self, path: &Path) -> IngestResult<ParsedDocument> {
        let file = std::fs::File::open(path)?;
        let mut archive = zip::ZipArchive::new(std::io::BufReader::new(file))
            .map_err(|e| IngestError::extraction(path, format!("Not a valid docx archive: {}", e)))?;

        let document = read_zip_entry(&mut archive, "word/document.xml")
            .ok_or_else(|| IngestError::extraction(path, "word/document.xml not found"))?;
        let text = paragraphs_text(&document).map_err(|e| IngestError::extraction(path, e))?;

        let (title, author) = match read_zip_entry(&mut archive, "docProps/core.xml") {
            Some(core) => (
                first_element_text(&core, b"title"),
                first_element_text(&core, b"creator"),
            ),
            None => (None, None),
        };

        Ok(ParsedDocument::new(vec![text])
            .with_title(title)
            .with_author(author))
    }

    fn extensions(&self) -> &[&str] {
        &["docx"]
    }
}

/// Concatenate `<w:t>` runs, one line per `<w:p>` paragraph.
fn paragraphs_text(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => match t.unescape() {
                Ok(text) => out.push_str(&text),
                Err(_) => out.push_str(&String::from_utf8_lossy(&t)),
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("Malformed document.xml: {}", e)),
            _ => {}
        }
    }

    Ok(out.trim().to_string())
}
