//! Figure descriptions from a vision model.
//!
//! Each catalog image is sent as a base64 PNG data URL to an
//! OpenAI-compatible chat endpoint (DashScope compatible mode and
//! `qwen-vl-plus` by default). Calls run concurrently, bounded by
//! `extraction.describe_workers`; the finished descriptions are assembled
//! in ordinal order into one sidecar text of
//! `<PAGE_p_IMAGE_i>…</PAGE_p_IMAGE_i>` blocks, so a single writer owns the
//! file and blocks never interleave.
//!
//! A failed call leaves that image without a block; the router then
//! reports the description as not found.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::config::Config;
use crate::http::{client_with_timeout, post_json, JsonPost};
use crate::images::description_block;
use crate::models::ImageRecord;

const SYSTEM_PROMPT: &str = "你是学术论文图表分析助手。请准确、简洁地描述图片中的内容，\
包括图表类型、坐标轴、主要趋势和关键数值；如果是结构示意图，请说明各组成部分及其关系。";

const USER_PROMPT: &str = "请描述这张图片的内容";

#[async_trait]
pub trait ImageDescriber: Send + Sync {
    async fn describe(&self, image_path: &Path) -> Result<String>;
}

/// OpenAI-compatible vision chat client.
pub struct VisionDescriber {
    url: String,
    model: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl VisionDescriber {
    /// `None` when no vision key is configured (`extraction.vision_api_key`,
    /// falling back to `llm.api_key`).
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let key = config
            .extraction
            .vision_api_key
            .clone()
            .or_else(|| config.llm.api_key.clone())
            .filter(|k| !k.trim().is_empty());
        let Some(api_key) = key else {
            return Ok(None);
        };

        Ok(Some(Self {
            url: format!(
                "{}/chat/completions",
                config.extraction.vision_base_url.trim_end_matches('/')
            ),
            model: config.extraction.vision_model.clone(),
            api_key,
            max_retries: config.llm.max_retries,
            client: client_with_timeout(config.llm.timeout_secs)?,
        }))
    }
}

/// Chat request carrying one image as a data URL.
pub fn vision_request(model: &str, png_bytes: &[u8]) -> serde_json::Value {
    let data_url = format!("data:image/png;base64,{}", STANDARD.encode(png_bytes));
    serde_json::json!({
        "model": model,
        "messages": [
            {
                "role": "system",
                "content": [{ "type": "text", "text": SYSTEM_PROMPT }],
            },
            {
                "role": "user",
                "content": [
                    { "type": "image_url", "image_url": { "url": data_url } },
                    { "type": "text", "text": USER_PROMPT },
                ],
            },
        ],
    })
}

#[async_trait]
impl ImageDescriber for VisionDescriber {
    async fn describe(&self, image_path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(image_path)
            .await
            .with_context(|| format!("Failed to read image: {}", image_path.display()))?;
        let body = vision_request(&self.model, &bytes);
        let json = post_json(JsonPost {
            client: &self.client,
            url: &self.url,
            bearer: Some(&self.api_key),
            body: &body,
            max_retries: self.max_retries,
            label: "vision",
        })
        .await?;

        json.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("vision reply has no message content"))
    }
}

/// Describe every record under `root`, returning the sidecar text.
pub async fn describe_all(
    describer: &dyn ImageDescriber,
    root: &Path,
    records: &[ImageRecord],
    workers: usize,
) -> String {
    let calls: Vec<_> = records
        .iter()
        .cloned()
        .map(|record| {
            let path = root.join(&record.path);
            async move {
                let result = describer.describe(&path).await;
                (record, result)
            }
        })
        .collect();

    let mut results: Vec<(ImageRecord, Result<String>)> = stream::iter(calls)
        .buffer_unordered(workers.max(1))
        .collect()
        .await;

    results.sort_by_key(|(record, _)| record.ordinal);

    let mut sidecar = String::new();
    let mut described = 0;
    for (record, result) in results {
        match result {
            Ok(text) if !text.trim().is_empty() => {
                sidecar.push_str(&description_block(record.page, record.index, &text));
                described += 1;
            }
            Ok(_) => warn!(path = %record.path, "vision model returned an empty description"),
            Err(e) => warn!(path = %record.path, error = %e, "image description failed"),
        }
    }
    info!(described, total = records.len(), "image descriptions generated");
    sidecar
}
