//! PDF document parser.

use super::{DocumentParser, ParsedDocument};
use crate::error::{IngestError, IngestResult};
use lopdf::{Document, Object};
use std::path::Path;
use tracing::debug;

/// Parser for PDF files.
pub struct PdfParser;

impl PdfParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for PdfParser {
    fn parse(&self, path: &Path) -> IngestResult<ParsedDocument> {
        debug!("Parsing PDF: {:?}", path);

        // pdf-extract panics on some malformed files instead of returning an error
        let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text(path))
            .map_err(|_| IngestError::extraction(path, "PDF parser panicked"))?
            .map_err(|e| IngestError::extraction(path, format!("Failed to extract text from PDF: {}", e)))?;

        let pages: Vec<String> = extracted.split('\x0C').map(clean_pdf_text).collect();

        debug!("Extracted {} pages from PDF", pages.len());

        let info = pdf_info(path);
        Ok(ParsedDocument::new(pages)
            .with_title(info.title)
            .with_author(info.author))
    }

    fn extensions(&self) -> &[&str] {
        &["pdf"]
    }
}

/// Title and author from the PDF `/Info` dictionary.
#[derive(Debug, Default, PartialEq)]
pub struct PdfInfo {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Read the document information dictionary. Any failure yields empty info.
pub fn pdf_info(path: &Path) -> PdfInfo {
    let loaded = std::panic::catch_unwind(|| Document::load(path));
    let doc = match loaded {
        Ok(Ok(doc)) => doc,
        Ok(Err(e)) => {
            debug!("No PDF info for {:?}: {}", path, e);
            return PdfInfo::default();
        }
        Err(_) => {
            debug!("PDF info reader panicked on {:?}", path);
            return PdfInfo::default();
        }
    };

    let info = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => doc.get_object(*id).ok(),
        Ok(object) => Some(object),
        Err(_) => None,
    };
    let Some(Ok(dict)) = info.map(Object::as_dict) else {
        return PdfInfo::default();
    };

    let field = |key: &[u8]| match dict.get(key) {
        Ok(Object::String(bytes, _)) => {
            let value = decode_pdf_string(bytes);
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        }
        _ => None,
    };

    PdfInfo {
        title: field(b"Title"),
        author: field(b"Author"),
    }
}

/// Text strings are UTF-16BE with a byte order mark, UTF-8 with a BOM, or
/// PDFDocEncoding, read here as Latin-1.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Trim lines and collapse repeated blank lines.
fn clean_pdf_text(text: &str) -> String {
    text.lines()
        .map(|line| line.trim())
        .fold(Vec::new(), |mut acc, line| {
            let last_was_empty = acc.last().map(|s: &String| s.is_empty()).unwrap_or(false);
            if !(line.is_empty() && last_was_empty) {
                acc.push(line.to_string());
            }
            acc
        })
        .join("\n")
        .trim()
        .to_string()
}
