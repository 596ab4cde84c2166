//! # pdf-qa
//!
//! Ask questions about one PDF at a time.
//!
//! A PDF is extracted to markdown (plus its figures), split into
//! header-aware chunks, and indexed either densely (embedding vectors) or
//! sparsely (TF-IDF). Each question is first triaged by the LLM: questions
//! naming a specific figure are answered from that figure's stored
//! description, everything else is answered from the best-matching chunks.
//! Every external call has a degraded path, so a question always gets an
//! answer and the evidence it was grounded on.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌──────────────────┐
//! │  Extract  │──▶│  Chunk   │──▶│  Index           │
//! │ text/OCR  │   │ headers  │   │ dense | TF-IDF   │
//! └─────┬─────┘   └──────────┘   └────────┬─────────┘
//!       │ images/                         │
//!       ▼                                 ▼
//! ┌───────────┐   ┌──────────┐   ┌──────────────────┐
//! │  Catalog  │◀──│  Router  │──▶│  Retrieve        │
//! │ + vision  │   │ (LLM)    │   │ top-k / fallback │
//! └─────┬─────┘   └──────────┘   └────────┬─────────┘
//!       └──────────────┬──────────────────┘
//!                      ▼
//!               ┌────────────┐      ┌──────────────┐
//!               │  Answer    │─────▶│  LLM Gateway │
//!               └────────────┘      └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pdfqa ingest paper.pdf                  # extract, chunk, index
//! pdfqa ask "What dataset is used?"       # grounded text answer
//! pdfqa ask "第2页的第1张图是什么？"         # figure answer
//! pdfqa summary
//! pdfqa serve                             # JSON HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline error taxonomy |
//! | [`extract`] | PDF → markdown bundle extraction |
//! | [`describe`] | Vision-model figure descriptions |
//! | [`images`] | Figure catalog and description sidecar |
//! | [`chunk`] | Header-aware markdown chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | In-memory vector store |
//! | [`tfidf`] | TF-IDF vectorizer |
//! | [`index`] | Dense / sparse index construction |
//! | [`keywords`] | Keyword extraction for fallback retrieval |
//! | [`retrieve`] | Top-k retrieval with fallbacks |
//! | [`gateway`] | LLM provider gateway with offline fallback |
//! | [`router`] | Image-question routing |
//! | [`answer`] | Prompt assembly and answers |
//! | [`workspace`] | On-disk document state |
//! | [`session`] | The loaded document and query flow |
//! | [`server`] | JSON HTTP server |
//! | [`http`] | Shared JSON POST with retry |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod describe;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod http;
pub mod images;
pub mod index;
pub mod keywords;
pub mod models;
pub mod retrieve;
pub mod router;
pub mod server;
pub mod session;
pub mod store;
pub mod tfidf;
pub mod workspace;
