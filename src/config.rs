//! TOML configuration.
//!
//! Every tunable of the pipeline lives here and is passed explicitly to the
//! components that need it; nothing reads environment variables behind the
//! caller's back. All sections are optional: [`Config::default`] is a
//! working offline configuration (TF-IDF retrieval, fallback LLM responses).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    /// Directory holding the extracted bundle and index snapshot.
    #[serde(default = "default_workspace_dir")]
    pub dir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            dir: default_workspace_dir(),
        }
    }
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("./pdfqa-workspace")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `qwen`, `deepseek`, `doubao` or `openai`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    /// Bearer token. Without it every completion is a fallback response.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            model: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
        }
    }
}

fn default_llm_provider() -> String {
    "deepseek".to_string()
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_llm_max_retries() -> u32 {
    2
}

impl LlmConfig {
    pub fn has_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `disabled`, `openai`, `ollama` or `local`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for Ollama or an OpenAI-compatible embeddings endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            api_key: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_max_retries() -> u32 {
    3
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive windows of one section.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Deepest `#` level that starts a new section.
    #[serde(default = "default_max_header_level")]
    pub max_header_level: u8,
    /// Drop the header line itself from the section body.
    #[serde(default)]
    pub strip_headers: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_header_level: default_max_header_level(),
            strip_headers: false,
        }
    }
}

fn default_chunk_size() -> usize {
    200
}
fn default_chunk_overlap() -> usize {
    10
}
fn default_max_header_level() -> u8 {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Sparse results at or below this cosine score are discarded.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_max_features")]
    pub max_features: usize,
    #[serde(default = "default_ngram_min")]
    pub ngram_min: usize,
    #[serde(default = "default_ngram_max")]
    pub ngram_max: usize,
    /// Sentences kept by the keyword-scan fallback.
    #[serde(default = "default_keyword_sentences")]
    pub keyword_sentences: usize,
    /// Leading characters returned when nothing else matches.
    #[serde(default = "default_fallback_chars")]
    pub fallback_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
            max_features: default_max_features(),
            ngram_min: default_ngram_min(),
            ngram_max: default_ngram_max(),
            keyword_sentences: default_keyword_sentences(),
            fallback_chars: default_fallback_chars(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_min_score() -> f64 {
    0.1
}
fn default_max_features() -> usize {
    1000
}
fn default_ngram_min() -> usize {
    1
}
fn default_ngram_max() -> usize {
    2
}
fn default_keyword_sentences() -> usize {
    5
}
fn default_fallback_chars() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// `text` (pdf-extract), `command` (external OCR program) or `bundle`.
    #[serde(default = "default_extraction_mode")]
    pub mode: String,
    /// External program argv; `{pdf}` and `{out}` are substituted.
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default = "default_min_image_side")]
    pub min_image_width: u32,
    #[serde(default = "default_min_image_side")]
    pub min_image_height: u32,
    #[serde(default)]
    pub describe_images: bool,
    #[serde(default = "default_describe_workers")]
    pub describe_workers: usize,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_vision_base_url")]
    pub vision_base_url: String,
    #[serde(default)]
    pub vision_api_key: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: default_extraction_mode(),
            command: Vec::new(),
            min_image_width: default_min_image_side(),
            min_image_height: default_min_image_side(),
            describe_images: false,
            describe_workers: default_describe_workers(),
            vision_model: default_vision_model(),
            vision_base_url: default_vision_base_url(),
            vision_api_key: None,
        }
    }
}

fn default_extraction_mode() -> String {
    "text".to_string()
}
fn default_min_image_side() -> u32 {
    100
}
fn default_describe_workers() -> usize {
    4
}
fn default_vision_model() -> String {
    "qwen-vl-plus".to_string()
}
fn default_vision_base_url() -> String {
    "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    /// Send the image description and question to the LLM for a direct answer.
    #[serde(default)]
    pub image_follow_up: bool,
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            image_follow_up: false,
            summary_max_chars: default_summary_max_chars(),
        }
    }
}

fn default_summary_max_chars() -> usize {
    12_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// Load the config file, or the defaults when it does not exist.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = parse_config(&content)?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

pub fn validate(config: &Config) -> Result<()> {
    let chunking = &config.chunking;
    if chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if chunking.chunk_overlap >= chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            chunking.chunk_overlap,
            chunking.chunk_size
        );
    }
    if !(1..=6).contains(&chunking.max_header_level) {
        bail!("chunking.max_header_level must be in [1, 6]");
    }

    let retrieval = &config.retrieval;
    if retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if retrieval.ngram_min == 0 || retrieval.ngram_min > retrieval.ngram_max {
        bail!("retrieval ngram range must satisfy 1 <= ngram_min <= ngram_max");
    }
    if retrieval.max_features == 0 {
        bail!("retrieval.max_features must be > 0");
    }

    match config.llm.provider.as_str() {
        "qwen" | "deepseek" | "doubao" | "openai" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be qwen, deepseek, doubao, or openai.",
            other
        ),
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama")
        && config.embedding.model.is_none()
    {
        bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    match config.extraction.mode.as_str() {
        "text" | "bundle" => {}
        "command" => {
            if config.extraction.command.is_empty() {
                bail!("extraction.command must be set when extraction.mode = \"command\"");
            }
        }
        other => bail!(
            "Unknown extraction mode: '{}'. Must be text, command, or bundle.",
            other
        ),
    }
    if config.extraction.describe_workers == 0 {
        bail!("extraction.describe_workers must be >= 1");
    }

    Ok(())
}
