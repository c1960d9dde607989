//! Plain-language rewriting of extracted cases
//!
//! One stateless model call per case. The first failure stops the run so a
//! partial output file is never written.

use crate::errors::PreprocessError;
use crate::extractor::QuerySet;
use imole_common::errors::Result;
use imole_common::llm::{ChatModel, ChatRequest};
use std::sync::Arc;
use tracing::{info, instrument};

pub const SIMPLIFY_SYSTEM_PROMPT: &str = "You are an expert legal advisor specializing in making \
complex legal cases easy for the general public to understand.";

/// Default output budget per rewritten case
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// Conversion instructions around one case
pub fn build_prompt(legal_text: &str) -> String {
    format!(
        r#"Convert the following complex legal case into a simple, natural-language question
or statement that a regular person might type into a chatbot.
The output should be conversational, brief, and avoid legal jargon.

The question or issue should:
- Sound like something a real person would ask online or in a chatbot
- Be in either first-person ("I was fired from my job...") or third-person ("My friend was fired...")
- If relevant, reframe it as a general legal inquiry ("What happens if someone is fired after being falsely accused?")

Legal Case:
{legal_text}

Expected Output:
- A clear, simple legal issue stated in everyday language
- Format it as a direct question or a brief statement

Example Outputs:
- "I was fired from my bank job for allegedly taking money, but I was later found not guilty. Can I get my job back?"
- "My uncle was charged with fraud but later acquitted. His company still refuses to reinstate him. What are his rights?"
- "What happens if someone is wrongly accused of a crime at work and loses their job because of it?"
"#
    )
}

pub struct QuerySimplifier {
    model: Arc<dyn ChatModel>,
    max_tokens: u32,
}

impl QuerySimplifier {
    pub fn new(model: Arc<dyn ChatModel>, max_tokens: u32) -> Self {
        Self { model, max_tokens }
    }

    /// Rewrite one case; the reply is trimmed
    pub async fn simplify(&self, legal_text: &str) -> Result<String> {
        let request = ChatRequest::new()
            .system(SIMPLIFY_SYSTEM_PROMPT)
            .user(build_prompt(legal_text))
            .max_tokens(Some(self.max_tokens));

        let reply = self.model.complete(&request).await?;
        Ok(reply.trim().to_string())
    }

    /// Rewrite every case, keeping identifiers and order
    #[instrument(skip_all, fields(cases = queries.len(), model = %self.model.model_name()))]
    pub async fn simplify_all(&self, queries: &QuerySet) -> std::result::Result<QuerySet, PreprocessError> {
        let mut simplified = QuerySet::new();

        for (case_id, legal_text) in queries.iter() {
            info!(case_id, "Simplifying");
            let text = self
                .simplify(legal_text)
                .await
                .map_err(|source| PreprocessError::Simplify {
                    case_id: case_id.to_string(),
                    source,
                })?;
            simplified.insert(case_id, text);
        }

        Ok(simplified)
    }
}
