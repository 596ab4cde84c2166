//! Core data models used throughout pdf-qa.
//!
//! These types represent the document, its chunks, stored figures and the
//! per-question answer record that flow through the ingestion and
//! question-answering pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The extracted markdown of the currently loaded PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// File name the document was ingested from.
    pub source: String,
    /// Full markdown text produced by the extraction step.
    pub markdown: String,
    /// Sidecar text holding `<PAGE_p_IMAGE_i>…</PAGE_p_IMAGE_i>` blocks.
    #[serde(default)]
    pub descriptions: String,
    /// SHA-256 of the source PDF bytes.
    pub fingerprint: String,
    pub ingested_at: DateTime<Utc>,
}

/// One level of the markdown header chain a chunk falls under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// Number of `#` characters (1 = `#`).
    pub level: u8,
    pub title: String,
}

/// A contiguous span of document text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the document's chunk sequence, contiguous from 0.
    pub index: usize,
    /// Exact slice `markdown[start..end]`.
    pub content: String,
    /// Enclosing headers, outermost first.
    pub headings: Vec<Heading>,
    /// Byte offset of the first character in the document.
    pub start: usize,
    /// Byte offset one past the last character in the document.
    pub end: usize,
    /// SHA-256 of `content`, hex encoded.
    pub hash: String,
}

impl Chunk {
    /// Opaque store key: stable for identical content at the same position.
    pub fn id(&self) -> String {
        format!("{}-{}", self.index, &self.hash[..12.min(self.hash.len())])
    }

    /// The innermost heading title, if the chunk sits under any header.
    pub fn nearest_heading(&self) -> Option<&str> {
        self.headings.last().map(|h| h.title.as_str())
    }

    /// Titles of the heading chain, outermost first.
    pub fn heading_path(&self) -> Vec<&str> {
        self.headings.iter().map(|h| h.title.as_str()).collect()
    }
}

/// A figure stored by the extraction step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// 1-based page number.
    pub page: u32,
    /// 1-based position of the image within its page.
    pub index: u32,
    /// 1-based ordinal across the whole document.
    pub ordinal: u32,
    pub path: String,
    pub width: u32,
    pub height: u32,
    /// Text of the matching `<PAGE_p_IMAGE_i>` block, if the sidecar has one.
    #[serde(default)]
    pub description: Option<String>,
}

/// A chunk paired with its similarity to a query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// The image-vs-text triage for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub is_image_question: bool,
    /// Page number, or 0 when the question uses a document-wide ordinal.
    pub page: u32,
    /// Image number: global when `page == 0`, otherwise within `page`.
    pub ordinal: u32,
}

impl RoutingDecision {
    pub fn text() -> Self {
        Self::default()
    }

    /// Builds a decision from a `(page, image)` pair; `(_, 0)` is a text question.
    pub fn from_pair(page: u32, ordinal: u32) -> Self {
        Self {
            is_image_question: ordinal > 0,
            page: if ordinal > 0 { page } else { 0 },
            ordinal,
        }
    }
}

/// What an answer was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    Text { text: String },
    Image { path: String, description: String },
}

impl Evidence {
    /// The evidence as display text.
    pub fn as_text(&self) -> &str {
        match self {
            Evidence::Text { text } => text,
            Evidence::Image { description, .. } => description,
        }
    }
}

/// The per-question record returned to callers; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub route: RoutingDecision,
    pub answer: String,
    pub evidence: Evidence,
    pub is_image_answer: bool,
}
