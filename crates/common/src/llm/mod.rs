//! Generative model abstraction
//!
//! One trait over the chat/completion endpoints the pipeline calls:
//! - OpenAI chat completions (augmentation, final answers)
//! - Anthropic messages (query simplification, document summaries)
//! - A scripted mock for tests and offline runs

mod anthropic;
mod openai;

pub use anthropic::AnthropicChat;
pub use openai::OpenAIChat;

use crate::config::{AppConfig, ModelRole, Provider};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single conversation turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// A stateless completion request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    /// System instruction
    pub system: Option<String>,

    /// Conversation turns
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Maximum output tokens
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage {
            role: Role::User,
            content: content.into(),
        });
        self
    }

    pub fn temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Text of the last user turn
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Trait for generative text completion
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one completion and return the generated text
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// Provider name, for logs and metrics
    fn provider(&self) -> &str;

    /// Model name
    fn model_name(&self) -> &str;
}

type ReplyFn = dyn Fn(&ChatRequest) -> Result<String> + Send + Sync;

/// Mock chat model for testing
///
/// Replies are produced by a closure; every request is recorded.
pub struct MockChatModel {
    respond: Box<ReplyFn>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockChatModel {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&ChatRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always reply with `text`
    pub fn fixed(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Always fail with a language-model error
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(move |_| Err(AppError::language_model("mock", message.clone())))
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        (self.respond)(request)
    }

    fn provider(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}

/// Create the chat model for one role
pub fn create_chat_model(config: &AppConfig, role: &ModelRole) -> Result<Arc<dyn ChatModel>> {
    match role.provider {
        Provider::OpenAi => Ok(Arc::new(OpenAIChat::new(&config.openai, &role.model)?)),
        Provider::Anthropic => Ok(Arc::new(AnthropicChat::new(
            &config.anthropic,
            &role.model,
        )?)),
        Provider::Mock => {
            tracing::warn!(model = %role.model, "Using mock chat model");
            Ok(Arc::new(MockChatModel::new(|request| {
                Ok(format!(
                    "[mock response] {}",
                    request.last_user_message().unwrap_or_default()
                ))
            })))
        }
    }
}
