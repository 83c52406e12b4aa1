//! Document parsers for the supported source formats.

mod docx;
mod epub;
mod markdown;
mod pdf;
mod text;

pub use docx::DocxParser;
pub use epub::EpubParser;
pub use markdown::MarkdownParser;
pub use pdf::PdfParser;
pub use text::TextParser;

use crate::error::{IngestError, IngestResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use ragline_core::SourceKind;
use std::io::Read;
use std::path::Path;

/// Upper bound on bytes read from a single archive entry (docx/epub).
pub(crate) const MAX_ARCHIVE_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// Text extracted from a document, one section per page/chapter/part.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub sections: Vec<String>,
    /// Title found in the document's own metadata, if any.
    pub title: Option<String>,
    /// Author found in the document's own metadata, if any.
    pub author: Option<String>,
}

impl ParsedDocument {
    pub fn new(sections: Vec<String>) -> Self {
        Self {
            sections,
            title: None,
            author: None,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author.filter(|a| !a.trim().is_empty());
        self
    }

    /// Non-empty sections joined by blank lines.
    pub fn text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Trait for document parsers.
pub trait DocumentParser: Send + Sync {
    /// Parse a file at the given path.
    fn parse(&self, path: &Path) -> IngestResult<ParsedDocument>;

    /// Get the supported file extensions.
    fn extensions(&self) -> &[&str];

    /// Check if this parser supports the given extension.
    fn supports(&self, extension: &str) -> bool {
        self.extensions()
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }
}

/// Turns a source file into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> IngestResult<ParsedDocument>;
}

/// Extractor that dispatches on the file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTextExtractor;

impl FileTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl TextExtractor for FileTextExtractor {
    fn extract(&self, path: &Path) -> IngestResult<ParsedDocument> {
        if !path.exists() {
            return Err(IngestError::FileNotFound(path.to_path_buf()));
        }

        let kind = SourceKind::from_path(path).ok_or_else(|| {
            IngestError::UnsupportedFileType(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("")
                    .to_string(),
            )
        })?;

        match kind {
            SourceKind::Pdf => PdfParser::new().parse(path),
            SourceKind::Epub => EpubParser::new().parse(path),
            SourceKind::Docx => DocxParser::new().parse(path),
            SourceKind::Markdown => MarkdownParser::new().parse(path),
            SourceKind::Text => TextParser::new().parse(path),
        }
    }
}

/// Read one entry of a zip archive into a string, bounded in size.
pub(crate) fn read_zip_entry<R: std::io::Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Option<String> {
    let entry = archive.by_name(name).ok()?;
    let mut bytes = Vec::new();
    entry
        .take(MAX_ARCHIVE_ENTRY_BYTES)
        .read_to_end(&mut bytes)
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Text of the first element with the given local name, e.g. `title` for `dc:title`.
pub(crate) fn first_element_text(xml: &str, local_name: &[u8]) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut inside = false;
    let mut out = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == local_name => inside = true,
            Ok(Event::End(e)) if inside && e.local_name().as_ref() == local_name => break,
            Ok(Event::Text(t)) if inside => match t.unescape() {
                Ok(text) => out.push_str(&text),
                Err(_) => out.push_str(&String::from_utf8_lossy(&t)),
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    let out = out.trim().to_string();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Unescaped value of an attribute, matched by its local name.
pub(crate) fn attribute_value(element: &BytesStart<'_>, local_name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local_name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Collapse runs of spaces and blank lines left behind by markup.
pub(crate) fn normalize_whitespace(text: &str) -> String {
    let mut out = Vec::new();
    let mut blank = false;
    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            if !blank && !out.is_empty() {
                out.push(String::new());
            }
            blank = true;
        } else {
            out.push(line);
            blank = false;
        }
    }
    out.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_text_joins_sections_skipping_blank() {
        let doc = ParsedDocument::new(vec![
            "Page one.".to_string(),
            "   ".to_string(),
            " Page two. ".to_string(),
        ]);
        assert_eq!(doc.text(), "Page one.\n\nPage two.");
    }

    #[test]
    fn test_blank_title_is_dropped() {
        let doc = ParsedDocument::new(vec![]).with_title(Some("  ".into()));
        assert!(doc.title.is_none());
    }

    #[test]
    fn test_normalize_whitespace() {
        let input = "  a   b \n\n\n\n c\t d \n";
        assert_eq!(normalize_whitespace(input), "a b\n\nc d");
    }

    #[test]
    fn test_first_element_text() {
        let xml = r#"<cp:coreProperties xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Rust &amp; Friends</dc:title><dc:creator>Ana</dc:creator></cp:coreProperties>"#;
        assert_eq!(first_element_text(xml, b"title").as_deref(), Some("Rust & Friends"));
        assert_eq!(first_element_text(xml, b"creator").as_deref(), Some("Ana"));
        assert_eq!(first_element_text(xml, b"subject"), None);
    }

    #[test]
    fn test_extractor_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.TXT");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "hello there").unwrap();

        let doc = FileTextExtractor::new().extract(&path).unwrap();
        assert_eq!(doc.text(), "hello there");
    }

    #[test]
    fn test_extractor_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        std::fs::write(&path, b"\x89PNG").unwrap();

        let err = FileTextExtractor::new().extract(&path).unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFileType(ext) if ext == "png"));
    }

    #[test]
    fn test_extractor_missing_file() {
        let err = FileTextExtractor::new()
            .extract(Path::new("/nonexistent/book.pdf"))
            .unwrap_err();
        assert!(matches!(err, IngestError::FileNotFound(_)));
    }
}
