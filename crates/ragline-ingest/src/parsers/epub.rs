//! EPUB document parser.
//!
//! Follows `META-INF/container.xml` to the package document, then reads the
//! spine in order. Each spine item becomes one section.

use super::{
    attribute_value, first_element_text, normalize_whitespace, read_zip_entry, DocumentParser,
    ParsedDocument,
};
use crate::error::{IngestError, IngestResult};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Parser for EPUB e-books.
pub struct EpubParser;

impl EpubParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EpubParser {
    fn default() -> Self {
        Self::new()
    }
}

/// The parts of the package document needed to read the book.
#[derive(Debug, Default)]
struct Package {
    title: Option<String>,
    creator: Option<String>,
    /// Manifest id -> href
    manifest: HashMap<String, String>,
    spine: Vec<String>,
}

impl DocumentParser for EpubParser {
    fn parse(&self, path: &Path) -> IngestResult<ParsedDocument> {
        let file = std::fs::File::open(path)?;
        let mut archive = zip::ZipArchive::new(std::io::BufReader::new(file))
            .map_err(|e| IngestError::extraction(path, format!("Not a valid epub archive: {}", e)))?;

        let container = read_zip_entry(&mut archive, "META-INF/container.xml")
            .ok_or_else(|| IngestError::extraction(path, "META-INF/container.xml not found"))?;
        let opf_path = rootfile_path(&container)
            .ok_or_else(|| IngestError::extraction(path, "container.xml has no rootfile"))?;

        let opf = read_zip_entry(&mut archive, &opf_path)
            .ok_or_else(|| IngestError::extraction(path, format!("package document {} not found", opf_path)))?;
        let package = parse_package(&opf);
        let base = match opf_path.rfind('/') {
            Some(idx) => &opf_path[..=idx],
            None => "",
        };

        let mut sections = Vec::with_capacity(package.spine.len());
        for idref in &package.spine {
            let Some(href) = package.manifest.get(idref) else {
                debug!("Spine item {} missing from manifest", idref);
                continue;
            };
            let entry = resolve_href(base, href);
            match read_zip_entry(&mut archive, &entry) {
                Some(xhtml) => sections.push(xhtml_text(&xhtml)),
                None => warn!("EPUB {:?}: spine entry {} not readable", path, entry),
            }
        }

        debug!("Extracted {} spine sections from EPUB", sections.len());
        Ok(ParsedDocument::new(sections)
            .with_title(package.title)
            .with_author(package.creator))
    }

    fn extensions(&self) -> &[&str] {
        &["epub"]
    }
}

/// `full-path` of the first `<rootfile>` in container.xml.
fn rootfile_path(container: &str) -> Option<String> {
    let mut reader = Reader::from_str(container);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"rootfile" => {
                return attribute_value(&e, b"full-path");
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

fn parse_package(opf: &str) -> Package {
    let mut package = Package {
        title: first_element_text(opf, b"title"),
        creator: first_element_text(opf, b"creator"),
        ..Package::default()
    };

    let mut reader = Reader::from_str(opf);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"item" => {
                    if let (Some(id), Some(href)) = (attribute_value(&e, b"id"), attribute_value(&e, b"href")) {
                        package.manifest.insert(id, href);
                    }
                }
                b"itemref" => {
                    if let Some(idref) = attribute_value(&e, b"idref") {
                        package.spine.push(idref);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    package
}

/// Archive path of a manifest href relative to the package document.
fn resolve_href(base: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let mut parts: Vec<&str> = base.split('/').filter(|p| !p.is_empty()).collect();
    let decoded = percent_decode(href);
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            if let Ok(byte) = u8::from_str_radix(&input[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

const BLOCK_ELEMENTS: &[&[u8]] = &[
    b"p", b"div", b"br", b"li", b"tr", b"h1", b"h2", b"h3", b"h4", b"h5", b"h6", b"section",
    b"blockquote", b"pre", b"hr", b"dd", b"dt",
];

/// Visible text of an XHTML chapter; block elements become line breaks.
fn xhtml_text(xhtml: &str) -> String {
    let mut reader = Reader::from_str(xhtml);
    reader.config_mut().check_end_names = false;

    let mut out = String::new();
    let mut skip_depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if skip_depth > 0 || matches!(name.as_ref(), b"script" | b"style" | b"head") {
                    skip_depth += 1;
                } else if BLOCK_ELEMENTS.contains(&name.as_ref()) {
                    out.push('\n');
                }
            }
            Ok(Event::End(e)) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                } else if BLOCK_ELEMENTS.contains(&e.local_name().as_ref()) {
                    out.push('\n');
                }
            }
            Ok(Event::Empty(e)) => {
                if skip_depth == 0 && BLOCK_ELEMENTS.contains(&e.local_name().as_ref()) {
                    out.push('\n');
                }
            }
            Ok(Event::Text(t)) if skip_depth == 0 => match t.unescape() {
                Ok(text) => out.push_str(&text),
                // HTML entities such as &nbsp; are not XML entities
                Err(_) => out.push_str(&String::from_utf8_lossy(&t)),
            },
            Ok(Event::CData(t)) if skip_depth == 0 => out.push_str(&String::from_utf8_lossy(&t)),
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("Stopping at malformed XHTML: {}", e);
                break;
            }
            _ => {}
        }
    }

    normalize_whitespace(&out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>El Camino del Trader</dc:title>
    <dc:creator>Luis Gómez</dc:creator>
  </metadata>
  <manifest>
    <item id="c2" href="text/chapter%202.xhtml" media-type="application/xhtml+xml"/>
    <item id="c1" href="text/chapter1.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="style.css" media-type="text/css"/>
  </manifest>
  <spine>
    <itemref idref="c1"/>
    <itemref idref="c2"/>
  </spine>
</package>"#;

    const CHAPTER_1: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Ignored</title><style>p { color: red; }</style></head>
<body>
  <h1>Capítulo 1</h1>
  <p>El mercado   es un <em>espejo</em>.</p>
  <script>var x = 1;</script>
  <p>Fish &amp; chips&nbsp;aside.</p>
</body>
</html>"#;

    const CHAPTER_2: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml"><body><p>Segundo capítulo.</p></body></html>"#;

    fn write_epub(path: &Path, entries: &[(&str, &str)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_parse_epub_in_spine_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        write_epub(
            &path,
            &[
                ("mimetype", "application/epub+zip"),
                ("META-INF/container.xml", CONTAINER),
                ("OEBPS/content.opf", OPF),
                ("OEBPS/text/chapter1.xhtml", CHAPTER_1),
                ("OEBPS/text/chapter 2.xhtml", CHAPTER_2),
            ],
        );

        let doc = EpubParser::new().parse(&path).unwrap();
        assert_eq!(doc.title.as_deref(), Some("El Camino del Trader"));
        assert_eq!(doc.author.as_deref(), Some("Luis Gómez"));
        assert_eq!(doc.sections.len(), 2);

        let first = &doc.sections[0];
        assert!(first.starts_with("Capítulo 1"));
        assert!(first.contains("El mercado es un espejo."));
        assert!(first.contains("Fish"));
        assert!(!first.contains("Ignored"));
        assert!(!first.contains("color"));
        assert!(!first.contains("var x"));
        assert_eq!(doc.sections[1], "Segundo capítulo.");
    }

    #[test]
    fn test_missing_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.epub");
        write_epub(&path, &[("mimetype", "application/epub+zip")]);

        let err = EpubParser::new().parse(&path).unwrap_err();
        assert!(matches!(err, IngestError::Extraction { .. }));
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href("OEBPS/", "text/ch1.xhtml"), "OEBPS/text/ch1.xhtml");
        assert_eq!(resolve_href("OEBPS/text/", "../images/a.xhtml#x"), "OEBPS/images/a.xhtml");
        assert_eq!(resolve_href("", "ch%201.xhtml"), "ch 1.xhtml");
    }
}
