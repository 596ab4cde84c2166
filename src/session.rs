//! The question-answering session.
//!
//! A [`Session`] owns the one loaded document and the handles every query
//! needs (gateway, embedder, workspace). Ingesting a new PDF takes the
//! write lock, drops the previous document, and rebuilds everything before
//! releasing it; queries hold a cheap `Arc` clone of the current document.
//!
//! # Query flow
//!
//! ```text
//! question ─► router::route ─► image hit? ──yes──► answer::answer_image
//!                                  │
//!                                  no
//!                                  ▼
//!                      retrieve::retrieve ─► answer::answer_text
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::answer::{answer_image, answer_text, summarize};
use crate::chunk::chunk_markdown;
use crate::config::Config;
use crate::describe::{describe_all, ImageDescriber, VisionDescriber};
use crate::embedding::{create_provider, DisabledProvider, Embedder};
use crate::error::QaError;
use crate::extract::Extractor;
use crate::gateway::Gateway;
use crate::images::{ImageCatalog, ImageFilter};
use crate::index::{build_index, Index, IndexSnapshot};
use crate::models::{Answer, Chunk, Document};
use crate::retrieve::retrieve;
use crate::router::{resolve, route};
use crate::workspace::{Manifest, Workspace};

/// Everything derived from one ingested PDF.
pub struct LoadedDocument {
    pub document: Document,
    pub chunks: Vec<Chunk>,
    pub index: Index,
    pub images: ImageCatalog,
}

/// Outcome of an ingestion, for display.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub source: String,
    pub fingerprint: String,
    pub extractor: String,
    pub index_backend: String,
    pub chunks: usize,
    pub images: usize,
    pub described_images: usize,
}

pub struct Session {
    config: Config,
    gateway: Arc<Gateway>,
    embedder: Arc<dyn Embedder>,
    describer: Option<Arc<dyn ImageDescriber>>,
    workspace: Workspace,
    current: RwLock<Option<Arc<LoadedDocument>>>,
}

impl Session {
    pub fn new(config: Config, gateway: Arc<Gateway>, embedder: Arc<dyn Embedder>) -> Self {
        let workspace = Workspace::new(config.workspace.dir.clone());
        Self {
            config,
            gateway,
            embedder,
            describer: None,
            workspace,
            current: RwLock::new(None),
        }
    }

    /// Build gateway, embedder and describer from the config.
    ///
    /// An embedding provider that cannot be created is replaced by the
    /// disabled one, so ingestion falls back to TF-IDF.
    pub fn from_config(config: Config) -> Result<Self> {
        let gateway = Arc::new(Gateway::from_config(&config.llm));
        let embedder: Arc<dyn Embedder> = match create_provider(&config.embedding) {
            Ok(provider) => Arc::from(provider),
            Err(e) => {
                warn!(error = %e, "embedding provider unavailable; using tf-idf");
                Arc::new(DisabledProvider)
            }
        };
        let describer = if config.extraction.describe_images {
            VisionDescriber::from_config(&config)?.map(|d| Arc::new(d) as Arc<dyn ImageDescriber>)
        } else {
            None
        };

        let mut session = Self::new(config, gateway, embedder);
        session.describer = describer;
        Ok(session)
    }

    pub fn with_describer(mut self, describer: Arc<dyn ImageDescriber>) -> Self {
        self.describer = Some(describer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub async fn current(&self) -> Option<Arc<LoadedDocument>> {
        self.current.read().await.clone()
    }

    /// Extract, chunk, index and persist `pdf`, replacing the loaded document.
    pub async fn ingest(&self, pdf: &Path, extractor: &dyn Extractor) -> Result<IngestReport> {
        let mut current = self.current.write().await;
        *current = None;

        let bytes = tokio::fs::read(pdf)
            .await
            .with_context(|| format!("Failed to read {}", pdf.display()))?;
        let fingerprint = format!("{:x}", Sha256::digest(&bytes));
        let source = pdf
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| pdf.display().to_string());

        self.workspace.clear()?;
        let root = self.workspace.root();
        let extraction = extractor.extract(pdf, root).await?;
        info!(
            source = %source,
            extractor = extractor.name(),
            chars = extraction.markdown.len(),
            "extracted document"
        );

        let mut descriptions = extraction.descriptions;
        let mut images = ImageCatalog::scan(
            root,
            ImageFilter::from_config(&self.config.extraction),
            &descriptions,
        )?;
        let described_images = self.describe_missing(&mut images, &mut descriptions).await?;

        let chunks = chunk_markdown(&extraction.markdown, &self.config.chunking);
        let index = build_index(&chunks, &self.config, self.embedder.as_ref()).await;

        let document = Document {
            source: source.clone(),
            markdown: extraction.markdown,
            descriptions,
            fingerprint: fingerprint.clone(),
            ingested_at: Utc::now(),
        };

        self.workspace.write_content(&document.markdown)?;
        self.workspace.save_index(&IndexSnapshot {
            backend: index.backend().to_string(),
            chunks: chunks.clone(),
            vectors: index.vectors()?,
        })?;
        self.workspace.save_manifest(&Manifest {
            source: source.clone(),
            fingerprint: fingerprint.clone(),
            ingested_at: document.ingested_at,
            extractor: extractor.name().to_string(),
            index_backend: index.backend().to_string(),
            chunk_count: chunks.len(),
            images: images.records().to_vec(),
        })?;

        let report = IngestReport {
            source,
            fingerprint,
            extractor: extractor.name().to_string(),
            index_backend: index.backend().to_string(),
            chunks: chunks.len(),
            images: images.len(),
            described_images,
        };
        info!(
            chunks = report.chunks,
            images = report.images,
            index = %report.index_backend,
            "document ready"
        );

        *current = Some(Arc::new(LoadedDocument {
            document,
            chunks,
            index,
            images,
        }));
        Ok(report)
    }

    /// Describe catalog images that have no description yet, appending the
    /// new blocks to `descriptions`.
    async fn describe_missing(
        &self,
        images: &mut ImageCatalog,
        descriptions: &mut String,
    ) -> Result<usize> {
        let pending: Vec<_> = images
            .records()
            .iter()
            .filter(|r| r.description.is_none())
            .cloned()
            .collect();
        if pending.is_empty() || !self.config.extraction.describe_images {
            return Ok(0);
        }
        let Some(describer) = &self.describer else {
            warn!(
                pending = pending.len(),
                "describe_images is on but no vision API key is configured; skipping"
            );
            return Ok(0);
        };

        let sidecar = describe_all(
            describer.as_ref(),
            self.workspace.root(),
            &pending,
            self.config.extraction.describe_workers,
        )
        .await;
        descriptions.push_str(&sidecar);
        self.workspace.write_descriptions(descriptions)?;

        let before = images.records().iter().filter(|r| r.description.is_some()).count();
        images.attach_descriptions(descriptions);
        let after = images.records().iter().filter(|r| r.description.is_some()).count();
        Ok(after - before)
    }

    /// Reload the document persisted by an earlier ingestion.
    ///
    /// Returns `false` when the workspace holds no document.
    pub async fn load_workspace(&self) -> Result<bool> {
        if !self.workspace.has_document() {
            return Ok(false);
        }
        let mut current = self.current.write().await;

        let manifest = self.workspace.load_manifest()?;
        let markdown = self.workspace.read_content()?;
        let descriptions = self.workspace.read_descriptions();

        let (chunks, vectors) = match self.workspace.load_index()? {
            Some(snapshot) => (snapshot.chunks, snapshot.vectors),
            None => (chunk_markdown(&markdown, &self.config.chunking), None),
        };
        let index = Index::restore(&chunks, vectors, &self.config.retrieval);

        let mut images = ImageCatalog::new(manifest.images);
        images.attach_descriptions(&descriptions);

        info!(
            source = %manifest.source,
            chunks = chunks.len(),
            index = index.backend(),
            "loaded workspace"
        );
        *current = Some(Arc::new(LoadedDocument {
            document: Document {
                source: manifest.source,
                markdown,
                descriptions,
                fingerprint: manifest.fingerprint,
                ingested_at: manifest.ingested_at,
            },
            chunks,
            index,
            images,
        }));
        Ok(true)
    }

    /// Answer one question about the loaded document.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let doc = self.current().await.ok_or(QaError::NoDocument)?;

        let decision = route(&self.gateway, question).await;
        if let Some(hit) = resolve(&doc.images, &decision) {
            return Ok(answer_image(
                &self.gateway,
                question,
                decision,
                hit,
                self.config.answer.image_follow_up,
            )
            .await);
        }

        let retrieval = retrieve(
            &doc,
            self.embedder.as_ref(),
            question,
            self.config.retrieval.top_k,
            &self.config.retrieval,
        )
        .await;
        Ok(answer_text(&self.gateway, question, decision, &retrieval).await)
    }

    pub async fn summary(&self) -> Result<String> {
        let doc = self.current().await.ok_or(QaError::NoDocument)?;
        Ok(summarize(&self.gateway, &doc.document, self.config.answer.summary_max_chars).await)
    }
}
