//! Chunk index: dense embeddings with a TF-IDF fallback.
//!
//! [`build_index`] always produces an [`Index`]. When the embedding
//! provider is disabled, cannot be created, or fails while embedding the
//! chunks, the result is [`Index::Sparse`] and a warning is logged; the
//! ingestion itself never fails because of the dense backend.
//!
//! A dense index keeps a lazily built sparse twin so a query can still be
//! answered when the embedding service disappears between ingestion and
//! question time.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{Config, RetrievalConfig};
use crate::embedding::{embed_batched, Embedder};
use crate::error::{QaError, QaResult};
use crate::models::Chunk;
use crate::store::{MemoryVectorStore, VectorRecord, VectorSnapshot, VectorStore};
use crate::tfidf::{sparse_dot, SparseVector, TfidfModel, TfidfParams};

/// TF-IDF rows for every chunk, plus the fitted vocabulary.
#[derive(Debug, Clone)]
pub struct SparseIndex {
    model: TfidfModel,
    rows: Vec<SparseVector>,
}

impl SparseIndex {
    pub fn build(chunks: &[Chunk], config: &RetrievalConfig) -> Self {
        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let params = TfidfParams {
            max_features: config.max_features,
            ngram_min: config.ngram_min,
            ngram_max: config.ngram_max,
        };
        let (model, rows) = TfidfModel::fit_transform(&texts, params);
        debug!(
            chunks = rows.len(),
            vocabulary = model.vocabulary_len(),
            "built tf-idf index"
        );
        Self { model, rows }
    }

    /// `(chunk index, score)` pairs with score above `min_score`, best first,
    /// at most `limit` of them.
    pub fn search(&self, query: &str, limit: usize, min_score: f64) -> Vec<(usize, f64)> {
        let q = self.model.transform(query);
        if q.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f64)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (i, sparse_dot(&q, row)))
            .filter(|(_, score)| *score > min_score)
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);
        scored
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Embedded chunks in a vector store.
pub struct DenseIndex {
    store: MemoryVectorStore,
    sparse_twin: OnceCell<SparseIndex>,
}

impl DenseIndex {
    pub fn store(&self) -> &MemoryVectorStore {
        &self.store
    }

    /// The sparse index over the same chunks, built on first use.
    pub fn sparse_twin(&self, chunks: &[Chunk], config: &RetrievalConfig) -> &SparseIndex {
        self.sparse_twin
            .get_or_init(|| SparseIndex::build(chunks, config))
    }
}

/// The active index of the loaded document.
pub enum Index {
    Dense(DenseIndex),
    Sparse(SparseIndex),
}

impl Index {
    pub fn backend(&self) -> &'static str {
        match self {
            Index::Dense(_) => "dense",
            Index::Sparse(_) => "sparse",
        }
    }

    /// The stored vectors, for dense indexes.
    pub fn vectors(&self) -> anyhow::Result<Option<VectorSnapshot>> {
        match self {
            Index::Dense(dense) => Ok(Some(dense.store.snapshot()?)),
            Index::Sparse(_) => Ok(None),
        }
    }

    /// Rebuild an index from persisted chunks and (optionally) vectors.
    ///
    /// Vectors only count when they cover exactly the given chunks; a stale
    /// snapshot degrades to TF-IDF rather than mixing two documents.
    pub fn restore(
        chunks: &[Chunk],
        vectors: Option<VectorSnapshot>,
        config: &RetrievalConfig,
    ) -> Self {
        match vectors {
            Some(snapshot) if covers(&snapshot, chunks) => Index::Dense(DenseIndex {
                store: MemoryVectorStore::from_snapshot(snapshot),
                sparse_twin: OnceCell::new(),
            }),
            Some(_) => {
                warn!("stored vectors do not match the stored chunks; using tf-idf");
                Index::Sparse(SparseIndex::build(chunks, config))
            }
            None => Index::Sparse(SparseIndex::build(chunks, config)),
        }
    }
}

fn covers(snapshot: &VectorSnapshot, chunks: &[Chunk]) -> bool {
    snapshot.records.len() == chunks.len()
        && snapshot
            .records
            .iter()
            .all(|r| chunks.get(r.chunk_index).is_some_and(|c| c.id() == r.chunk_id))
}

/// Persisted form of the chunk sequence and, for dense indexes, its vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub backend: String,
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub vectors: Option<VectorSnapshot>,
}

/// Build the index for a freshly chunked document.
pub async fn build_index(chunks: &[Chunk], config: &Config, embedder: &dyn Embedder) -> Index {
    match build_dense(chunks, config, embedder).await {
        Ok(dense) => {
            info!(
                chunks = chunks.len(),
                model = embedder.model_name(),
                "built dense index"
            );
            Index::Dense(dense)
        }
        Err(e) => {
            if config.embedding.is_enabled() {
                warn!(error = %e, "dense index unavailable; falling back to tf-idf");
            } else {
                debug!("embedding disabled; using tf-idf");
            }
            Index::Sparse(SparseIndex::build(chunks, &config.retrieval))
        }
    }
}

async fn build_dense(
    chunks: &[Chunk],
    config: &Config,
    embedder: &dyn Embedder,
) -> QaResult<DenseIndex> {
    if !config.embedding.is_enabled() {
        return Err(QaError::EmbeddingBackendUnavailable(
            "provider disabled".to_string(),
        ));
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let vectors = embed_batched(embedder, &texts, config.embedding.batch_size)
        .await
        .map_err(|e| QaError::EmbeddingBackendUnavailable(e.to_string()))?;

    let dims = vectors.first().map(|v| v.len()).unwrap_or(embedder.dims());
    let records = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| VectorRecord {
            chunk_id: chunk.id(),
            chunk_index: chunk.index,
            vector,
        })
        .collect();

    let store = MemoryVectorStore::new(embedder.model_name(), dims);
    store
        .replace_all(records)
        .await
        .map_err(|e| QaError::EmbeddingBackendUnavailable(e.to_string()))?;

    Ok(DenseIndex {
        store,
        sparse_twin: OnceCell::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_markdown;
    use crate::config::{ChunkingConfig, EmbeddingConfig};
    use crate::embedding::DisabledProvider;
    use anyhow::Result;
    use async_trait::async_trait;

    /// Deterministic bag-of-letters embedder.
    struct LetterEmbedder;

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; 26];
                    for c in t.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
                        v[(c - b'a') as usize] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    fn sample_chunks() -> Vec<Chunk> {
        chunk_markdown(
            "# Data\nwe evaluate on cora and citeseer datasets\n\
             # Model\nthe attention layer weighs neighbours\n",
            &ChunkingConfig::default(),
        )
    }

    fn dense_config() -> Config {
        Config {
            embedding: EmbeddingConfig {
                provider: "ollama".into(),
                model: Some("letters".into()),
                ..EmbeddingConfig::default()
            },
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_embedding_builds_sparse() {
        let index = build_index(&sample_chunks(), &Config::default(), &DisabledProvider).await;
        assert_eq!(index.backend(), "sparse");
    }

    #[tokio::test]
    async fn test_failing_embedder_falls_back_to_sparse() {
        // Enabled in config, but every call errors.
        let index = build_index(&sample_chunks(), &dense_config(), &DisabledProvider).await;
        assert_eq!(index.backend(), "sparse");
    }

    #[tokio::test]
    async fn test_working_embedder_builds_dense() {
        let chunks = sample_chunks();
        let index = build_index(&chunks, &dense_config(), &LetterEmbedder).await;
        let Index::Dense(dense) = &index else {
            panic!("expected dense index");
        };
        assert_eq!(dense.store().len().await.unwrap(), chunks.len());
        assert_eq!(dense.store().dims(), 26);
    }

    #[test]
    fn test_sparse_search_threshold_and_order() {
        let chunks = sample_chunks();
        let index = SparseIndex::build(&chunks, &RetrievalConfig::default());
        let hits = index.search("which datasets", 5, 0.1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0);
        assert!(index.search("zebra", 5, 0.1).is_empty());
    }

    #[test]
    fn test_sparse_rebuild_is_identical() {
        let chunks = sample_chunks();
        let a = SparseIndex::build(&chunks, &RetrievalConfig::default());
        let b = SparseIndex::build(&chunks, &RetrievalConfig::default());
        assert_eq!(
            a.search("attention datasets", 5, 0.0),
            b.search("attention datasets", 5, 0.0)
        );
    }

    #[tokio::test]
    async fn test_restore_rejects_mismatched_vectors() {
        let chunks = sample_chunks();
        let index = build_index(&chunks, &dense_config(), &LetterEmbedder).await;
        let vectors = index.vectors().unwrap();
        assert!(vectors.is_some());

        let restored = Index::restore(&chunks, vectors.clone(), &RetrievalConfig::default());
        assert_eq!(restored.backend(), "dense");

        let other = chunk_markdown("# Other\ncompletely different\n", &ChunkingConfig::default());
        let restored = Index::restore(&other, vectors, &RetrievalConfig::default());
        assert_eq!(restored.backend(), "sparse");
    }
}
