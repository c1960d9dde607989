//! OpenAI chat completions client

use super::{ChatModel, ChatRequest};
use crate::config::OpenAiConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const PROVIDER: &str = "openai";

pub struct OpenAIChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessageResponse,
}

#[derive(Deserialize)]
struct WireMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

impl OpenAIChat {
    pub fn new(config: &OpenAiConfig, model: &str) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "OpenAI API key required (OPENAI_API_KEY)".to_string(),
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
            model: model.to_string(),
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
        })
    }

    fn wire_request<'a>(&'a self, request: &'a ChatRequest) -> WireRequest<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        for message in &request.messages {
            messages.push(WireMessage {
                role: match message.role {
                    super::Role::User => "user",
                    super::Role::Assistant => "assistant",
                },
                content: &message.content,
            });
        }

        WireRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
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

        let chat: WireResponse = response.json().await.map_err(|e| {
            AppError::language_model(PROVIDER, format!("Failed to parse response: {}", e))
        })?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::language_model(PROVIDER, "Empty response"))
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
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
