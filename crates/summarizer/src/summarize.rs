//! Case document summarization
//!
//! Documents that fit one chunk get a single call. Longer ones are split with
//! `text-splitter`, each part summarized, and the parts merged by a final call.

use crate::errors::SummarizerError;
use imole_common::llm::{ChatModel, ChatRequest};
use std::sync::Arc;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::{debug, instrument};

/// Characters per chunk sent to the model
pub const DEFAULT_CHUNK_SIZE: usize = 12_000;

const SYSTEM_PROMPT: &str = "You are an expert legal analyst. You summarize court judgments \
accurately and concisely for a legal-assistance knowledge base.";

fn document_prompt(text: &str) -> String {
    format!(
        "Summarize the following legal case document. Cover the parties involved, the core \
issue, the key facts in chronological order, and the court's decision with its outcome.\n\n\
Document:\n{text}"
    )
}

fn part_prompt(part: usize, total: usize, text: &str) -> String {
    format!(
        "This is part {part} of {total} of a legal case document. Summarize the facts, \
arguments and any decision it contains.\n\nPart:\n{text}"
    )
}

fn combine_prompt(parts: &[String]) -> String {
    format!(
        "The following are summaries of consecutive parts of one legal case document. Combine \
them into a single summary covering the parties involved, the core issue, the key facts in \
chronological order, and the court's decision with its outcome.\n\n{}",
        parts.join("\n\n---\n\n")
    )
}

pub struct Summarizer {
    model: Arc<dyn ChatModel>,
    chunk_size: usize,
    max_tokens: Option<u32>,
}

impl Summarizer {
    pub fn new(model: Arc<dyn ChatModel>, max_tokens: Option<u32>) -> Self {
        Self {
            model,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_tokens,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    async fn call(&self, prompt: String) -> Result<String, SummarizerError> {
        let request = ChatRequest::new()
            .system(SYSTEM_PROMPT)
            .user(prompt)
            .max_tokens(self.max_tokens);
        Ok(self.model.complete(&request).await?.trim().to_string())
    }

    #[instrument(skip_all, fields(chars = text.chars().count()))]
    pub async fn summarize(&self, text: &str) -> Result<String, SummarizerError> {
        if text.trim().is_empty() {
            return Err(SummarizerError::EmptyDocument);
        }

        let splitter = TextSplitter::new(ChunkConfig::new(self.chunk_size));
        let chunks: Vec<&str> = splitter.chunks(text).collect();

        if chunks.len() <= 1 {
            return self.call(document_prompt(text.trim())).await;
        }

        debug!(parts = chunks.len(), "Summarizing in parts");
        let total = chunks.len();
        let mut parts = Vec::with_capacity(total);
        for (i, chunk) in chunks.into_iter().enumerate() {
            parts.push(self.call(part_prompt(i + 1, total, chunk)).await?);
        }

        self.call(combine_prompt(&parts)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imole_common::llm::MockChatModel;

    #[tokio::test]
    async fn test_short_document_single_call() {
        let model = Arc::new(MockChatModel::fixed(" The court ruled for the tenant. "));
        let summarizer = Summarizer::new(model.clone(), Some(1024));

        let summary = summarizer.summarize("A short judgment.").await.unwrap();
        assert_eq!(summary, "The court ruled for the tenant.");

        let seen = model.requests();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].last_user_message().unwrap().contains("A short judgment."));
        assert_eq!(seen[0].max_tokens, Some(1024));
    }

    #[tokio::test]
    async fn test_long_document_map_reduce() {
        let model = Arc::new(MockChatModel::new(|req| {
            let prompt = req.last_user_message().unwrap_or_default();
            Ok(if prompt.starts_with("This is part") {
                "partial".to_string()
            } else {
                "combined".to_string()
            })
        }));
        let summarizer = Summarizer::new(model.clone(), None).with_chunk_size(40);

        let text = "The appellant was employed as a cashier. ".repeat(5);
        let summary = summarizer.summarize(&text).await.unwrap();
        assert_eq!(summary, "combined");

        let seen = model.requests();
        assert!(seen.len() >= 3);
        let last = seen.last().unwrap().last_user_message().unwrap();
        assert!(last.contains("partial\n\n---\n\npartial"));
    }

    #[tokio::test]
    async fn test_empty_document_rejected() {
        let summarizer = Summarizer::new(Arc::new(MockChatModel::fixed("x")), None);
        let err = summarizer.summarize("  \n").await.unwrap_err();
        assert!(matches!(err, SummarizerError::EmptyDocument));
    }
}
