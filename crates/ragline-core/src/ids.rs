//! Deterministic identities for documents and chunks.

use sha2::{Digest, Sha256};
use std::io::{self, Read};
use uuid::Uuid;

/// Generate a new random identifier (used for run ids).
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Content identity of a document: lowercase hex SHA-256 of its raw bytes.
///
/// Two files with identical bytes get the same id regardless of name or path.
pub fn doc_id_for_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Same as [`doc_id_for_bytes`], hashing the reader's contents as they stream in.
pub fn doc_id_for_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Identity of a chunk, derived from its document, position and text.
///
/// Fields are NUL-separated so that no two distinct triples hash the same input.
pub fn chunk_id(doc_id: &str, ordinal_index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(doc_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(ordinal_index.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_id_is_content_hash() {
        let a = doc_id_for_bytes(b"same bytes");
        let b = doc_id_for_bytes(b"same bytes");
        let c = doc_id_for_bytes(b"other bytes");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn test_doc_id_known_value() {
        // sha256("")
        assert_eq!(
            doc_id_for_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_streamed_doc_id_matches_bytes() {
        let body = "a large book ".repeat(10_000);
        let streamed = doc_id_for_reader(std::io::Cursor::new(body.as_bytes())).unwrap();
        assert_eq!(streamed, doc_id_for_bytes(body.as_bytes()));
    }

    #[test]
    fn test_chunk_id_stable_across_calls() {
        let doc = doc_id_for_bytes(b"book");
        assert_eq!(chunk_id(&doc, 3, "hello"), chunk_id(&doc, 3, "hello"));
    }

    #[test]
    fn test_chunk_id_depends_on_every_field() {
        let doc = doc_id_for_bytes(b"book");
        let other_doc = doc_id_for_bytes(b"another book");
        let base = chunk_id(&doc, 1, "text");

        assert_ne!(base, chunk_id(&other_doc, 1, "text"));
        assert_ne!(base, chunk_id(&doc, 2, "text"));
        assert_ne!(base, chunk_id(&doc, 1, "text!"));
    }

    #[test]
    fn test_chunk_id_fields_do_not_bleed() {
        // "1" + "1x" must not collide with "11" + "x"
        let doc = "d";
        assert_ne!(chunk_id(doc, 1, "1x"), chunk_id(doc, 11, "x"));
    }
}
