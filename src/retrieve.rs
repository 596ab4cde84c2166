//! Question → evidence retrieval.
//!
//! # Policy
//!
//! 1. Query the active index for the `k` nearest chunks. Dense results are
//!    returned as-is; sparse results at or below `min_score` are dropped.
//!    If the query cannot be embedded, the same question is answered from
//!    the sparse twin of the dense index.
//! 2. If nothing is ranked, scan the whole document for sentences that
//!    contain any keyword derived from the question (see
//!    [`crate::keywords`]) and join the first few into one pseudo-chunk.
//! 3. If no sentence matches, return the document's leading window.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embedding::{embed_query, Embedder};
use crate::error::QaError;
use crate::index::Index;
use crate::keywords::extract_keywords;
use crate::models::{Chunk, ScoredChunk};
use crate::session::LoadedDocument;
use crate::store::VectorStore;

static SENTENCE_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?。！？]+").expect("static regex"));

/// What the retriever found for one question.
#[derive(Debug, Clone)]
pub enum Retrieval {
    /// Index hits, best first.
    Ranked(Vec<ScoredChunk>),
    /// Keyword-matching sentences joined into one pseudo-chunk.
    Keyword(String),
    /// The document's first characters.
    Leading(String),
}

impl Retrieval {
    pub fn is_fallback(&self) -> bool {
        !matches!(self, Retrieval::Ranked(_))
    }

    /// Ranked hits; empty for the fallbacks.
    pub fn scored(&self) -> &[ScoredChunk] {
        match self {
            Retrieval::Ranked(hits) => hits,
            _ => &[],
        }
    }
}

/// Retrieve at most `k` chunks for `question` from the loaded document.
pub async fn retrieve(
    doc: &LoadedDocument,
    embedder: &dyn Embedder,
    question: &str,
    k: usize,
    config: &RetrievalConfig,
) -> Retrieval {
    let ranked = rank(doc, embedder, question, k, config).await;
    if !ranked.is_empty() {
        return Retrieval::Ranked(ranked);
    }

    let keywords = extract_keywords(question);
    debug!(?keywords, "no ranked chunks; scanning for keywords");
    match keyword_scan(&doc.document.markdown, &keywords, config.keyword_sentences) {
        Some(text) => Retrieval::Keyword(text),
        None => Retrieval::Leading(leading_window(
            &doc.document.markdown,
            config.fallback_chars,
        )),
    }
}

async fn rank(
    doc: &LoadedDocument,
    embedder: &dyn Embedder,
    question: &str,
    k: usize,
    config: &RetrievalConfig,
) -> Vec<ScoredChunk> {
    let hits: Vec<(usize, f64)> = match &doc.index {
        Index::Sparse(sparse) => sparse.search(question, k, config.min_score),
        Index::Dense(dense) => {
            let dense_hits = match embed_query(embedder, question).await {
                Ok(query_vec) => dense.store().search(&query_vec, k).await.map_err(|e| {
                    QaError::EmbeddingBackendUnavailable(e.to_string())
                }),
                Err(e) => Err(QaError::EmbeddingBackendUnavailable(e.to_string())),
            };
            match dense_hits {
                Ok(hits) => hits
                    .into_iter()
                    .map(|h| (h.chunk_index, h.score as f64))
                    .collect(),
                Err(e) => {
                    warn!(error = %e, "query embedding failed; answering from tf-idf");
                    dense
                        .sparse_twin(&doc.chunks, config)
                        .search(question, k, config.min_score)
                }
            }
        }
    };

    hits.into_iter()
        .filter_map(|(i, score)| {
            doc.chunks.get(i).map(|chunk: &Chunk| ScoredChunk {
                chunk: chunk.clone(),
                score,
            })
        })
        .collect()
}

/// Sentences of `text` containing any keyword (case-insensitive), at most
/// `max_sentences`, joined with `". "`.
pub fn keyword_scan(text: &str, keywords: &[String], max_sentences: usize) -> Option<String> {
    if keywords.is_empty() {
        return None;
    }
    let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

    let sentences: Vec<&str> = SENTENCE_SPLIT
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| {
            let lower = s.to_lowercase();
            lowered.iter().any(|k| lower.contains(k.as_str()))
        })
        .take(max_sentences)
        .collect();

    if sentences.is_empty() {
        None
    } else {
        Some(sentences.join(". "))
    }
}

/// The first `n` characters of `text`.
pub fn leading_window(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}
