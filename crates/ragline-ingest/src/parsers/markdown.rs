//! Markdown document parser.

use super::{DocumentParser, ParsedDocument};
use crate::error::IngestResult;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag};
use std::path::Path;

/// Parser for Markdown files.
pub struct MarkdownParser {
    /// Whether to keep fenced code blocks in the text.
    preserve_code_blocks: bool,
}

impl MarkdownParser {
    pub fn new() -> Self {
        Self {
            preserve_code_blocks: true,
        }
    }

    /// Extract plain text and the first H1 from markdown.
    fn extract_text(&self, markdown: &str) -> (String, Option<String>) {
        let parser = Parser::new(markdown);
        let mut text = String::new();
        let mut title: Option<String> = None;
        let mut in_heading = false;
        let mut heading_level: Option<HeadingLevel> = None;
        let mut current_heading = String::new();

        for event in parser {
            match event {
                Event::Start(Tag::Heading(level, _, _)) => {
                    in_heading = true;
                    heading_level = Some(level);
                    current_heading.clear();
                }
                Event::End(Tag::Heading(_, _, _)) => {
                    in_heading = false;
                    if heading_level == Some(HeadingLevel::H1) && title.is_none() {
                        title = Some(current_heading.trim().to_string());
                    }
                    text.push_str(&current_heading);
                    text.push_str("\n\n");
                    heading_level = None;
                }
                Event::Start(Tag::CodeBlock(_)) if self.preserve_code_blocks => {
                    text.push('\n');
                }
                Event::End(Tag::CodeBlock(_)) if self.preserve_code_blocks => {
                    text.push('\n');
                }
                Event::End(Tag::Paragraph) => {
                    text.push_str("\n\n");
                }
                Event::End(Tag::List(_)) => {
                    text.push('\n');
                }
                Event::Start(Tag::Item) => {
                    text.push_str("- ");
                }
                Event::End(Tag::Item) => {
                    text.push('\n');
                }
                Event::Text(t) | Event::Code(t) => {
                    if in_heading {
                        current_heading.push_str(&t);
                    } else {
                        text.push_str(&t);
                    }
                }
                Event::SoftBreak | Event::HardBreak => {
                    text.push('\n');
                }
                _ => {}
            }
        }

        (text.trim().to_string(), title.filter(|t| !t.is_empty()))
    }
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for MarkdownParser {
    fn parse(&self, path: &Path) -> IngestResult<ParsedDocument> {
        let bytes = std::fs::read(path)?;
        let content = String::from_utf8_lossy(&bytes);
        let (text, title) = self.extract_text(&content);

        Ok(ParsedDocument::new(vec![text]).with_title(title))
    }

    fn extensions(&self) -> &[&str] {
        &["md", "markdown"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_markdown() {
        let mut file = NamedTempFile::with_suffix(".md").unwrap();
        writeln!(
            file,
            r#"# My Document

This is a paragraph with some `inline` text.

## Section One

More content here with a [link](https://example.com).

```rust
fn main() {{
    println!("Hello");
}}
```

- Item one
- Item two
"#
        )
        .unwrap();

        let doc = MarkdownParser::new().parse(file.path()).unwrap();
        let text = doc.text();

        assert_eq!(doc.title, Some("My Document".to_string()));
        assert!(text.contains("This is a paragraph with some inline text."));
        assert!(text.contains("Section One"));
        assert!(text.contains("a link."));
        assert!(text.contains("fn main()"));
        assert!(text.contains("- Item two"));
        assert!(!text.contains("https://example.com"));
    }

    #[test]
    fn test_no_title() {
        let mut file = NamedTempFile::with_suffix(".md").unwrap();
        writeln!(file, "Just some text without a heading.").unwrap();

        let doc = MarkdownParser::new().parse(file.path()).unwrap();
        assert!(doc.title.is_none());
        assert_eq!(doc.text(), "Just some text without a heading.");
    }
}
