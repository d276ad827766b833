//! Chat completion models.
//!
//! The composer talks to a [`ChatModel`]: one rendered prompt in, one
//! completion out. [`OpenAIChat`] speaks the OpenAI-compatible
//! `/v1/chat/completions` protocol, so any compatible server works by
//! pointing `generation.base_url` at it.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::{LoreError, Result};

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier (e.g. `"gpt-4o"`).
    fn model_name(&self) -> &str;

    /// Send `prompt` as a single user message and return the reply text.
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}

pub struct OpenAIChat {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAIChat {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(LoreError::generation)?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/v1/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": temperature,
            "stream": false,
        });

        let res = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LoreError::generation(format!("chat request failed: {}", e)))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(LoreError::generation(format!(
                "chat API error {}: {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(LoreError::generation)?;
        tracing::debug!(model = %self.model, "chat completion received");
        extract_content(&payload)
    }
}

fn extract_content(payload: &Value) -> Result<String> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| LoreError::generation("chat response has no message content"))
}
