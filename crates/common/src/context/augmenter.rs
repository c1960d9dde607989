//! Query augmentation
//!
//! A short user question embeds poorly against case summaries. Asking a model
//! for a plausible answer "as found in a case document" produces text that
//! lands closer to the stored summaries.

use crate::errors::Result;
use crate::llm::{ChatModel, ChatRequest};
use std::sync::Arc;
use tracing::{debug, instrument};

pub const AUGMENT_SYSTEM_PROMPT: &str = "You are a helpful expert legal research assistant. \
Provide a plausible example answer to the user's query as if you found it in a case document.";

/// Generates the hypothetical answer used for retrieval
pub struct QueryAugmenter {
    model: Arc<dyn ChatModel>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl QueryAugmenter {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    #[instrument(skip_all, fields(model = %self.model.model_name()))]
    pub async fn augment(&self, query: &str) -> Result<String> {
        let request = ChatRequest::new()
            .system(AUGMENT_SYSTEM_PROMPT)
            .user(query)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens);

        let augmented = self.model.complete(&request).await?;
        debug!(chars = augmented.len(), "Query augmented");
        Ok(augmented)
    }
}
