//! Final answer generation
//!
//! The instruction template is the whole system prompt; the retrieved
//! summaries sit in its knowledge-base slot and the user's question goes in
//! unchanged as the only user turn. The reply is returned as-is.

use crate::errors::Result;
use crate::llm::{ChatModel, ChatRequest};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Knowledge-base text when retrieval found nothing
pub const NO_MATCH_CONTEXT: &str =
    "(No matching case was found in the knowledge base. Follow the \"If no matching case\" rules below.)";

const KNOWLEDGE_BASE_SLOT: &str = "{knowledge_base}";

const RESPONSE_TEMPLATE: &str = r#"You are a legal assistant designed to help users understand their legal situations by retrieving and summarizing relevant cases. Follow these steps STRICTLY:

1. **Sympathize with the user** (1-2 sentences):
   - Acknowledge their situation with empathy (e.g., "I’m sorry to hear...", "This sounds difficult...").

2. **Retrieve and summarize a case** from the knowledge base below:
{knowledge_base}
   - Format:
     **Case Name**: [Exact case title]

     **Introduction**: [1-2 sentence overview: who was involved and the core issue]

     **Details**: [Key facts/events in chronological order]

     **Verdict**: [Court decision + outcomes like damages or policy changes]

3. **Next Steps** (3-4 bullet points):
   - Practical actions tied to the case (e.g., "Save emails from [date range]")
   - Resources (e.g., "Contact [Agency Name] within [timeframe]")

Tone Rules:
- Professional but compassionate
- Zero legal jargon (avoid terms like "plaintiff" or "motion")
- If no matching case:
  * Apologize briefly
  * Provide 2-3 general steps
  * Add: "Every case is unique – consulting a lawyer is recommended"

Example structure to mimic:
"I’m sorry to hear about your situation. Let me share a similar case:

**Case Name**: Smith v. ABC Corp

**Introduction**: A warehouse worker fired after reporting safety issues.

**Details**: The employee reported violations in March 2022, was terminated April 2022 with no warning. The employer claimed budget cuts.

**Verdict**: Court ruled wrongful termination – $150k awarded due to retaliation evidence.

**Next steps:**
- Document all safety reports you filed
- Contact OSHA within 30 days
- Consult an employment lawyer""#;

/// Fill the knowledge-base slot of the response template
pub fn build_system_prompt(summaries: &[String]) -> String {
    let knowledge_base = if summaries.is_empty() {
        NO_MATCH_CONTEXT.to_string()
    } else {
        summaries.join("\n\n")
    };
    RESPONSE_TEMPLATE.replacen(KNOWLEDGE_BASE_SLOT, &knowledge_base, 1)
}

pub struct Responder {
    model: Arc<dyn ChatModel>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl Responder {
    pub fn new(model: Arc<dyn ChatModel>, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        Self {
            model,
            temperature,
            max_tokens,
        }
    }

    #[instrument(skip_all, fields(model = %self.model.model_name(), cases = summaries.len()))]
    pub async fn respond(&self, question: &str, summaries: &[String]) -> Result<String> {
        let request = ChatRequest::new()
            .system(build_system_prompt(summaries))
            .user(question)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens);

        let answer = self.model.complete(&request).await?;
        debug!(chars = answer.len(), "Response generated");
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockChatModel;

    #[test]
    fn test_prompt_embeds_summary() {
        let prompt = build_system_prompt(&["A bank clerk was dismissed after acquittal.".to_string()]);
        assert!(prompt.contains("A bank clerk was dismissed after acquittal."));
        assert!(!prompt.contains(KNOWLEDGE_BASE_SLOT));
        assert!(!prompt.contains(NO_MATCH_CONTEXT));
        assert!(prompt.contains("**Verdict**"));
    }

    #[test]
    fn test_empty_retrieval_takes_no_match_branch() {
        let prompt = build_system_prompt(&[]);
        assert!(prompt.contains(NO_MATCH_CONTEXT));
        assert!(prompt.contains("Every case is unique – consulting a lawyer is recommended"));
    }

    #[tokio::test]
    async fn test_respond_request_shape() {
        let model = Arc::new(MockChatModel::fixed("I’m sorry to hear that."));
        let responder = Responder::new(model.clone(), Some(0.3), Some(1500));

        let answer = responder
            .respond("I was fired for reporting safety issues.", &["summary".to_string()])
            .await
            .unwrap();
        assert_eq!(answer, "I’m sorry to hear that.");

        let seen = model.requests();
        assert_eq!(seen[0].messages.len(), 1);
        assert_eq!(
            seen[0].last_user_message(),
            Some("I was fired for reporting safety issues.")
        );
        assert_eq!(seen[0].temperature, Some(0.3));
        assert_eq!(seen[0].max_tokens, Some(1500));
        assert!(seen[0].system.as_deref().unwrap_or_default().contains("summary"));
    }
}
