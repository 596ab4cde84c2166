//! LLM gateway: one `complete(prompt)` call over several hosted providers.
//!
//! # Providers
//!
//! | Provider | Default endpoint | Default model | Reply path |
//! |----------|------------------|---------------|------------|
//! | `qwen` | DashScope text-generation | `qwen-turbo` | `output.text` |
//! | `deepseek` | `api.deepseek.com/v1/chat/completions` | `deepseek-chat` | `choices[0].message.content` |
//! | `doubao` | `api.doubao.com/v1/chat/completions` | `doubao-pro` | `choices[0].message.content` |
//! | `openai` | `api.openai.com/v1/chat/completions` | `gpt-4o-mini` | `choices[0].message.content` |
//!
//! `llm.base_url` replaces the endpoint URL and `llm.model` the model.
//!
//! # Fallback
//!
//! [`Gateway::complete`] never fails. Without an API key, with an unknown
//! provider, or after the retries are exhausted, the reply comes from
//! [`fallback_response`] and is marked [`CompletionSource::Fallback`]:
//! a canned stub when the prompt names a known category, otherwise the
//! fixed [`UNAVAILABLE`] sentinel.

use anyhow::anyhow;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{QaError, QaResult};
use crate::http::{client_with_timeout, post_json, JsonPost};

/// Reply used when no canned stub matches.
pub const UNAVAILABLE: &str = "api调用失败";

pub const SUMMARY_STUB: &str = "【离线总结】当前未连接大模型服务，无法自动生成文献总结。\
请配置 LLM API 密钥后重试；在此之前可参考下方原文片段了解研究内容、方法与实验结果。";

pub const DATASET_STUB: &str = "【离线回答】当前未连接大模型服务。\
与数据集相关的原文片段已列在下方，请据此查看所用数据集及其划分方式。";

pub const CONTRIBUTION_STUB: &str = "【离线回答】当前未连接大模型服务。\
与创新点和贡献相关的原文片段已列在下方，请据此查看本文的主要创新。";

/// Canned replies, first match wins.
const CANNED: &[(&[&str], &str)] = &[
    (&["总结", "summary", "summarize"], SUMMARY_STUB),
    (&["数据集", "dataset"], DATASET_STUB),
    (&["创新", "contribution", "novelty"], CONTRIBUTION_STUB),
];

/// Deterministic reply for `prompt` when no provider answered.
pub fn fallback_response(prompt: &str) -> &'static str {
    let lower = prompt.to_lowercase();
    CANNED
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, reply)| *reply)
        .unwrap_or(UNAVAILABLE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSource {
    Remote,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub source: CompletionSource,
}

impl Completion {
    pub fn is_fallback(&self) -> bool {
        self.source == CompletionSource::Fallback
    }
}

/// A remote text-completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn provider(&self) -> &str;
    async fn complete(&self, prompt: &str) -> QaResult<String>;
}

/// Request/response shape spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// DashScope native: `{model, input: {messages}, parameters}` → `output.text`.
    DashScope,
    /// OpenAI chat-completions: `{model, messages, ...}` → `choices[0].message.content`.
    ChatCompletions,
}

/// Default `(endpoint, model, dialect)` for a provider name.
pub fn provider_defaults(provider: &str) -> Option<(&'static str, &'static str, Dialect)> {
    match provider {
        "qwen" => Some((
            "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation",
            "qwen-turbo",
            Dialect::DashScope,
        )),
        "deepseek" => Some((
            "https://api.deepseek.com/v1/chat/completions",
            "deepseek-chat",
            Dialect::ChatCompletions,
        )),
        "doubao" => Some((
            "https://api.doubao.com/v1/chat/completions",
            "doubao-pro",
            Dialect::ChatCompletions,
        )),
        "openai" => Some((
            "https://api.openai.com/v1/chat/completions",
            "gpt-4o-mini",
            Dialect::ChatCompletions,
        )),
        _ => None,
    }
}

pub fn request_body(
    dialect: Dialect,
    model: &str,
    prompt: &str,
    max_tokens: u32,
    temperature: f32,
) -> serde_json::Value {
    let messages = serde_json::json!([{ "role": "user", "content": prompt }]);
    match dialect {
        Dialect::DashScope => serde_json::json!({
            "model": model,
            "input": { "messages": messages },
            "parameters": {
                "max_tokens": max_tokens,
                "temperature": temperature,
            },
        }),
        Dialect::ChatCompletions => serde_json::json!({
            "model": model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": temperature,
        }),
    }
}

/// The completion text of a provider reply.
pub fn parse_reply(dialect: Dialect, json: &serde_json::Value) -> Option<String> {
    let chat = |v: &serde_json::Value| {
        v.get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()
            .map(str::to_string)
    };
    match dialect {
        Dialect::DashScope => {
            let output = json.get("output")?;
            output
                .get("text")
                .and_then(|t| t.as_str())
                .map(str::to_string)
                .or_else(|| chat(output))
        }
        Dialect::ChatCompletions => chat(json),
    }
}

/// Bearer-token JSON client for one provider.
pub struct HttpBackend {
    provider: String,
    dialect: Dialect,
    url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn from_config(config: &LlmConfig) -> QaResult<Self> {
        let call_err = |message: String| QaError::GatewayCall {
            provider: config.provider.clone(),
            message,
        };

        let (url, model, dialect) = provider_defaults(&config.provider)
            .ok_or_else(|| call_err("unknown provider".to_string()))?;
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| call_err("no API key configured".to_string()))?;
        let client =
            client_with_timeout(config.timeout_secs).map_err(|e| call_err(e.to_string()))?;

        Ok(Self {
            provider: config.provider.clone(),
            dialect,
            url: config.base_url.clone().unwrap_or_else(|| url.to_string()),
            model: config.model.clone().unwrap_or_else(|| model.to_string()),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn complete(&self, prompt: &str) -> QaResult<String> {
        let body = request_body(
            self.dialect,
            &self.model,
            prompt,
            self.max_tokens,
            self.temperature,
        );
        let result = post_json(JsonPost {
            client: &self.client,
            url: &self.url,
            bearer: Some(&self.api_key),
            body: &body,
            max_retries: self.max_retries,
            label: &self.provider,
        })
        .await
        .and_then(|json| {
            parse_reply(self.dialect, &json)
                .ok_or_else(|| anyhow!("reply has no completion text: {}", json))
        });

        result.map_err(|e| QaError::GatewayCall {
            provider: self.provider.clone(),
            message: e.to_string(),
        })
    }
}

/// Handle passed to every component that talks to the LLM.
pub struct Gateway {
    backend: Option<Box<dyn CompletionBackend>>,
}

impl Gateway {
    pub fn new(backend: Box<dyn CompletionBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A gateway that only ever answers from the fallback responder.
    pub fn offline() -> Self {
        Self { backend: None }
    }

    /// Build from config; a missing key or unknown provider gives an
    /// offline gateway.
    pub fn from_config(config: &LlmConfig) -> Self {
        if !config.has_key() {
            info!(provider = %config.provider, "no LLM API key; using fallback responses");
            return Self::offline();
        }
        match HttpBackend::from_config(config) {
            Ok(backend) => Self::new(Box::new(backend)),
            Err(e) => {
                warn!(error = %e, "LLM backend unavailable; using fallback responses");
                Self::offline()
            }
        }
    }

    pub fn is_offline(&self) -> bool {
        self.backend.is_none()
    }

    pub fn provider(&self) -> &str {
        self.backend
            .as_ref()
            .map(|b| b.provider())
            .unwrap_or("offline")
    }

    pub async fn complete(&self, prompt: &str) -> Completion {
        let Some(backend) = &self.backend else {
            return fallback(prompt);
        };
        match backend.complete(prompt).await {
            Ok(text) => {
                debug!(provider = backend.provider(), chars = text.len(), "completion received");
                Completion {
                    text,
                    source: CompletionSource::Remote,
                }
            }
            Err(e) => {
                warn!(error = %e, "LLM call failed; using fallback response");
                fallback(prompt)
            }
        }
    }
}

fn fallback(prompt: &str) -> Completion {
    Completion {
        text: fallback_response(prompt).to_string(),
        source: CompletionSource::Fallback,
    }
}
