//! Vector storage for the dense retrieval backend.
//!
//! The [`VectorStore`] trait is the seam between the indexer and whatever
//! holds the chunk embeddings. The only implementation is
//! [`MemoryVectorStore`]: vectors in a `Vec` behind a `RwLock`, searched by
//! brute-force cosine similarity. One PDF yields at most a few thousand
//! chunks, so a linear scan is fast enough and keeps results exact.
//!
//! The store is replaced wholesale per document; there is no per-chunk
//! update or delete. [`MemoryVectorStore::snapshot`] and
//! [`MemoryVectorStore::from_snapshot`] move its contents to and from the
//! workspace's `index.json`.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::cosine_similarity;

/// One embedded chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Opaque key derived from the chunk (see [`crate::models::Chunk::id`]).
    pub chunk_id: String,
    pub chunk_index: usize,
    pub vector: Vec<f32>,
}

/// A search hit: which chunk, and how similar.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: String,
    pub chunk_index: usize,
    pub score: f32,
}

/// Serializable contents of a [`MemoryVectorStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSnapshot {
    pub model: String,
    pub dims: usize,
    pub records: Vec<VectorRecord>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Drop every stored vector and insert `records`.
    async fn replace_all(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// The `limit` most similar records, highest score first; ties keep
    /// chunk order.
    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<VectorHit>>;

    async fn len(&self) -> Result<usize>;
}

/// In-memory store, brute-force cosine search.
pub struct MemoryVectorStore {
    model: String,
    dims: usize,
    records: RwLock<Vec<VectorRecord>>,
}

impl MemoryVectorStore {
    pub fn new(model: &str, dims: usize) -> Self {
        Self {
            model: model.to_string(),
            dims,
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn snapshot(&self) -> Result<VectorSnapshot> {
        let records = self
            .records
            .read()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;
        Ok(VectorSnapshot {
            model: self.model.clone(),
            dims: self.dims,
            records: records.clone(),
        })
    }

    pub fn from_snapshot(snapshot: VectorSnapshot) -> Self {
        Self {
            model: snapshot.model,
            dims: snapshot.dims,
            records: RwLock::new(snapshot.records),
        }
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn replace_all(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut stored = self
            .records
            .write()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;
        *stored = records;
        Ok(())
    }

    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        let stored = self
            .records
            .read()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;

        let mut hits: Vec<VectorHit> = stored
            .iter()
            .map(|r| VectorHit {
                chunk_id: r.chunk_id.clone(),
                chunk_index: r.chunk_index,
                score: cosine_similarity(query_vec, &r.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn len(&self) -> Result<usize> {
        let stored = self
            .records
            .read()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;
        Ok(stored.len())
    }
}
