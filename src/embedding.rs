//! OpenAI-compatible embedding provider.
//!
//! Implements both capability seams:
//! - [`ImageEmbedder`] — captions the photo with a vision chat model, then
//!   embeds the caption text.
//! - [`TextEmbedder`] — embeds free text directly.
//!
//! # Retry Strategy
//!
//! Both API calls use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::Engine as _;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::traits::{ImageEmbedder, ImageEmbedding, TextEmbedder};

/// Prompt used to caption found-item photos. Kept close to the item itself:
/// distinguishing features, not background.
const CAPTION_PROMPT: &str = "Someone found this item and submitted a photo to a lost-and-found \
system. Write a clear, specific description of the item to help its owner recognize it. Include \
what the item is, its color, material, any logos, text, or labels, and any visible signs of wear, \
damage, or customization. Ignore the background. Keep the description under 500 characters.";

/// Embedding provider speaking the OpenAI REST API.
pub struct OpenAiEmbedder {
    endpoint: String,
    api_key: String,
    chat_model: String,
    embed_model: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    /// Create a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not in the environment or
    /// the HTTP client cannot be built.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            chat_model: config.chat_model.clone(),
            embed_model: config.embed_model.clone(),
            max_retries: config.max_retries,
            client,
        })
    }

    /// POST a JSON body with retry/backoff per the module-level strategy.
    async fn post_with_retry(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding request failed after retries")))
    }

    /// Caption an image with the vision chat model.
    async fn caption_image(&self, bytes: &[u8]) -> Result<String> {
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(bytes);

        let body = serde_json::json!({
            "model": self.chat_model,
            "temperature": 0.2,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": CAPTION_PROMPT },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/jpeg;base64,{}", image_base64) }
                    }
                ]
            }]
        });

        let url = format!("{}/chat/completions", self.endpoint);
        let json = self.post_with_retry(&url, &body).await?;
        parse_caption_response(&json)
    }

    /// Embed a single text with the embeddings endpoint.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.embed_model,
            "input": text,
        });

        let url = format!("{}/embeddings", self.endpoint);
        let json = self.post_with_retry(&url, &body).await?;
        parse_embedding_response(&json)
    }
}

#[async_trait]
impl ImageEmbedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.embed_model
    }

    fn caption_model(&self) -> &str {
        &self.chat_model
    }

    async fn embed_image(&self, bytes: &[u8]) -> Result<ImageEmbedding> {
        let caption = self.caption_image(bytes).await?;
        let vector = self.embed(&caption).await?;
        Ok(ImageEmbedding { caption, vector })
    }
}

#[async_trait]
impl TextEmbedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.embed_model
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }
}

/// Extract the assistant message text from a chat completions response.
fn parse_caption_response(json: &serde_json::Value) -> Result<String> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing message content"))?;

    let caption = content.trim();
    if caption.is_empty() {
        bail!("Invalid chat response: empty caption");
    }
    Ok(caption.to_string())
}

/// Extract the first embedding vector from an embeddings response.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .pointer("/data/0/embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing embedding"))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}
