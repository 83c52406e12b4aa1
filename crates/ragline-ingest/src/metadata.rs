//! Document metadata extraction.
//!
//! Heuristics over the file name and the extracted text: title and author,
//! language (Spanish or English by stop-word counts), a coarse category by
//! keyword scores, and the most recent plausible publication year.

use crate::error::{IngestError, IngestResult};
use crate::parsers::ParsedDocument;
use chrono::Datelike;
use ragline_core::DocumentMetadata;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

/// Lines scanned for a title-like line.
const TITLE_SCAN_LINES: usize = 20;
/// Characters scanned for author markers.
const AUTHOR_SCAN_CHARS: usize = 1000;
/// Characters scanned for publication years.
const YEAR_SCAN_CHARS: usize = 5000;
/// Characters sampled for language detection.
const LANGUAGE_SAMPLE_CHARS: usize = 10_000;
/// Distinct stop words needed before a language is reported.
const LANGUAGE_MIN_HITS: usize = 5;
/// Characters of body text scanned for category keywords.
const CATEGORY_SAMPLE_CHARS: usize = 50_000;
/// Minimum keyword hits before a category beats `general`.
const CATEGORY_MIN_SCORE: usize = 2;

const SPANISH_STOP_WORDS: &[&str] = &[
    "el", "la", "de", "que", "y", "en", "un", "es", "se", "no", "lo", "le", "su", "por", "son",
    "con", "para", "al", "del", "una", "está", "pero", "más", "muy", "ser", "como", "todo",
    "también", "después", "hasta", "año", "vez", "puede", "cada", "donde", "mientras", "cuando",
    "estos", "estas", "están", "hacer", "hacia", "había",
];

const ENGLISH_STOP_WORDS: &[&str] = &[
    "the", "be", "to", "of", "and", "in", "that", "have", "it", "for", "not", "on", "with", "he",
    "as", "you", "do", "at", "this", "but", "his", "by", "from", "they", "we", "her", "she", "or",
    "an", "will", "my", "one", "all", "would", "there", "their", "what", "so", "if", "about",
    "who", "which", "when", "can", "just", "into", "your", "some", "could", "them", "than", "then",
    "also", "after", "because", "these",
];

const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "trading",
        &[
            "trading", "forex", "bolsa", "acciones", "mercado", "inversión", "opciones", "futuros",
            "crypto", "criptomoneda", "bitcoin", "análisis técnico", "technical analysis",
            "indicadores", "trader", "day trading", "swing trading",
        ],
    ),
    (
        "finanzas",
        &[
            "finanzas", "financiero", "financiera", "economía", "económico", "presupuesto",
            "ahorro", "jubilación", "planificación financiera", "financial planning", "wealth",
            "riqueza",
        ],
    ),
    (
        "psicología",
        &[
            "psicología", "psicológico", "emocional", "emociones", "terapia", "cognitivo",
            "comportamiento", "conducta", "personalidad", "ansiedad", "depresión", "estrés",
            "autoestima", "mindfulness", "meditación",
        ],
    ),
    (
        "autoayuda",
        &[
            "autoayuda", "desarrollo personal", "crecimiento personal", "superación", "motivación",
            "éxito", "objetivos", "metas", "hábitos", "productividad", "liderazgo",
            "emprendimiento", "self-help", "personal development", "habits",
        ],
    ),
    (
        "tecnología",
        &[
            "tecnología", "tecnológico", "programación", "software", "hardware", "computadora",
            "algoritmo", "inteligencia artificial", "machine learning", "data science",
            "big data", "cloud computing",
        ],
    ),
    (
        "salud",
        &[
            "salud", "saludable", "nutrición", "dieta", "ejercicio", "fitness", "bienestar",
            "medicina", "médico", "enfermedad", "tratamiento", "mental health",
        ],
    ),
    (
        "educación",
        &[
            "educación", "educativo", "aprendizaje", "enseñanza", "curso", "tutorial",
            "pedagogía", "didáctica", "conocimiento",
        ],
    ),
];

/// Derives descriptive metadata for a document.
pub trait MetadataExtractor: Send + Sync {
    /// `parsed` carries title/author found in the file's own metadata, if any.
    fn extract(&self, path: &Path, text: &str, parsed: &ParsedDocument) -> IngestResult<DocumentMetadata>;
}

/// Keyword and pattern based extractor.
pub struct HeuristicMetadataExtractor {
    author_marker: Regex,
    year: Regex,
}

impl HeuristicMetadataExtractor {
    pub fn new() -> IngestResult<Self> {
        let author_marker = Regex::new(
            r"(?im)^\s*(?:author|autor|written by|escrito por|by|por)\s*[:\s]\s*(\S[^\n]{1,98}\S)\s*$",
        )
        .map_err(|e| IngestError::Metadata(e.to_string()))?;
        let year = Regex::new(r"\b(\d{4})\b").map_err(|e| IngestError::Metadata(e.to_string()))?;

        Ok(Self { author_marker, year })
    }

    fn author_from_text(&self, text: &str) -> Option<String> {
        let head = prefix(text, AUTHOR_SCAN_CHARS);
        self.author_marker
            .captures(head)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    }

    /// Most recent year in `1900..=current+1` near the start of the document.
    fn published_year(&self, title: &str, text: &str) -> Option<i32> {
        let max_year = chrono::Utc::now().year() + 1;
        let scan = format!("{} {}", title, prefix(text, YEAR_SCAN_CHARS));

        self.year
            .captures_iter(&scan)
            .filter_map(|c| c.get(1)?.as_str().parse::<i32>().ok())
            .filter(|y| (1900..=max_year).contains(y))
            .max()
    }
}

impl MetadataExtractor for HeuristicMetadataExtractor {
    fn extract(&self, path: &Path, text: &str, parsed: &ParsedDocument) -> IngestResult<DocumentMetadata> {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let stem = file_stem(path);
        let (name_author, name_title) = split_author_title(&stem);

        let title = parsed
            .title
            .clone()
            .or(name_title)
            .or_else(|| title_from_text(text))
            .unwrap_or_else(|| stem.clone());
        let author = parsed
            .author
            .clone()
            .or(name_author)
            .or_else(|| self.author_from_text(text));

        Ok(DocumentMetadata {
            language: detect_language(text),
            category: classify_category(text, &title, file_name),
            published_year: self.published_year(&title, text),
            title,
            author,
        })
    }
}

/// File name without its extension.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// `"Author - Title"` file names.
fn split_author_title(stem: &str) -> (Option<String>, Option<String>) {
    match stem.split_once(" - ") {
        Some((author, title)) if !author.trim().is_empty() && !title.trim().is_empty() => {
            (Some(author.trim().to_string()), Some(title.trim().to_string()))
        }
        _ => (None, None),
    }
}

/// First short line near the top that looks like a title.
fn title_from_text(text: &str) -> Option<String> {
    text.lines().take(TITLE_SCAN_LINES).find_map(|line| {
        let line = line.trim();
        let len = line.chars().count();
        if !(5..=200).contains(&len) || line.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }

        let has_letters = line.chars().any(char::is_alphabetic);
        let all_caps = has_letters && !line.chars().any(char::is_lowercase);
        let capitalized = len > 10 && line.starts_with(char::is_uppercase);
        (all_caps || capitalized).then(|| line.to_string())
    })
}

/// `es`, `en` or `unknown`.
pub fn detect_language(text: &str) -> String {
    if text.trim().chars().count() < 50 {
        return DocumentMetadata::UNKNOWN_LANGUAGE.to_string();
    }

    let sample = prefix(text, LANGUAGE_SAMPLE_CHARS).to_lowercase();
    let words: HashSet<&str> = sample
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let spanish = SPANISH_STOP_WORDS.iter().filter(|w| words.contains(*w)).count();
    let english = ENGLISH_STOP_WORDS.iter().filter(|w| words.contains(*w)).count();

    if spanish > english && spanish > LANGUAGE_MIN_HITS {
        "es".to_string()
    } else if english > spanish && english > LANGUAGE_MIN_HITS {
        "en".to_string()
    } else {
        DocumentMetadata::UNKNOWN_LANGUAGE.to_string()
    }
}

/// Category with the most keyword hits, or `general` below the threshold.
pub fn classify_category(text: &str, title: &str, file_name: &str) -> String {
    if text.trim().is_empty() {
        return DocumentMetadata::GENERAL_CATEGORY.to_string();
    }

    let haystack = format!("{} {} {}", prefix(text, CATEGORY_SAMPLE_CHARS), title, file_name).to_lowercase();
    let mut best: Option<(&str, usize)> = None;
    for (category, keywords) in CATEGORIES {
        let score: usize = keywords.iter().map(|k| haystack.matches(k).count()).sum();
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((*category, score));
        }
    }

    match best {
        Some((category, score)) if score >= CATEGORY_MIN_SCORE => category.to_string(),
        _ => DocumentMetadata::GENERAL_CATEGORY.to_string(),
    }
}

/// The first `max_chars` characters of `text`.
fn prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
