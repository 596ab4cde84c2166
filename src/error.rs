//! Error types for the question-answering pipeline.
//!
//! Most failures inside the pipeline are *recovered*, not returned: a dead
//! embedding service degrades to TF-IDF, a malformed routing reply means
//! "not an image question", and a failed LLM call becomes a fallback
//! response. The variants for those cases still exist so the recovery sites
//! can log a typed reason.
//!
//! Only [`QaError::ExtractionUnavailable`] and [`QaError::NoDocument`] are
//! surfaced to callers of the session API.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QaError {
    /// The extraction collaborator failed or produced no text.
    #[error("no content could be extracted from '{path}': {reason}")]
    ExtractionUnavailable { path: PathBuf, reason: String },

    /// The dense embedding backend could not be created or reached.
    #[error("embedding backend unavailable: {0}")]
    EmbeddingBackendUnavailable(String),

    /// The image-routing classification reply did not match the schema.
    #[error("routing reply does not match schema: {reply:?}")]
    RoutingParse { reply: String },

    /// No stored image matches the requested ordinal or (page, index).
    #[error("image not found (page {page}, image {ordinal})")]
    ImageNotFound { page: u32, ordinal: u32 },

    /// The LLM provider returned an error or could not be reached.
    #[error("LLM provider '{provider}' call failed: {message}")]
    GatewayCall { provider: String, message: String },

    /// A question was asked before any document was ingested.
    #[error("no document loaded; run `pdfqa ingest <file.pdf>` first")]
    NoDocument,
}

pub type QaResult<T> = std::result::Result<T, QaError>;
