//! Anthropic messages client

use super::{ChatModel, ChatRequest, Role};
use crate::config::AnthropicConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const PROVIDER: &str = "anthropic";

/// The messages API requires `max_tokens`
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicChat {
    client: reqwest::Client,
    api_key: String,
    api_version: String,
    model: String,
    endpoint: String,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct WireContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct WireResponse {
    content: Vec<WireContent>,
}

impl WireResponse {
    fn first_text(self) -> Option<String> {
        self.content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
    }
}

impl AnthropicChat {
    pub fn new(config: &AnthropicConfig, model: &str) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "Anthropic API key required (ANTHROPIC_KEY)".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            api_version: config.api_version.clone(),
            model: model.to_string(),
            endpoint: format!("{}/messages", config.api_base.trim_end_matches('/')),
        })
    }

    fn wire_request<'a>(&'a self, request: &'a ChatRequest) -> WireRequest<'a> {
        WireRequest {
            model: &self.model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: request.system.as_deref(),
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
            temperature: request.temperature,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&self.wire_request(request))
            .send()
            .await
            .map_err(|e| AppError::language_model(PROVIDER, format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::language_model(
                PROVIDER,
                format!("API error {}: {}", status, body),
            ));
        }

        let message: WireResponse = response.json().await.map_err(|e| {
            AppError::language_model(PROVIDER, format!("Failed to parse response: {}", e))
        })?;

        message
            .first_text()
            .ok_or_else(|| AppError::language_model(PROVIDER, "Response had no text block"))
    }
}

#[async_trait]
impl ChatModel for AnthropicChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let start = Instant::now();
        let result = self.send(request).await;
        metrics::record_llm_call(
            start.elapsed().as_secs_f64(),
            PROVIDER,
            &self.model,
            result.is_ok(),
        );
        result
    }

    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
