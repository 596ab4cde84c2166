//! JSON-over-HTTP POST with retry and exponential backoff.
//!
//! Shared by the embedding providers, the LLM gateway and the image
//! describer, which all speak the same "bearer token + JSON body" dialect.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;
use tracing::debug;

/// One outbound JSON request.
pub struct JsonPost<'a> {
    pub client: &'a reqwest::Client,
    pub url: &'a str,
    pub bearer: Option<&'a str>,
    pub body: &'a serde_json::Value,
    pub max_retries: u32,
    /// Service name used in error messages (e.g. `"OpenAI"`).
    pub label: &'a str,
}

/// Build a client with the given request timeout.
pub fn client_with_timeout(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

pub async fn post_json(req: JsonPost<'_>) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=req.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(label = req.label, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut builder = req
            .client
            .post(req.url)
            .header("Content-Type", "application/json")
            .json(req.body);
        if let Some(token) = req.bearer {
            builder = builder.header("Authorization", format!("Bearer {}", token.trim()));
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "{} API error {}: {}",
                        req.label,
                        status,
                        body_text
                    ));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", req.label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!(
                    "{} connection error ({}): {}",
                    req.label,
                    req.url,
                    e
                ));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", req.label)))
}
