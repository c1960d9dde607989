//! End-to-end question answering

use super::{CaseRetriever, QueryAugmenter, Responder};
use crate::config::AppConfig;
use crate::db::{CaseMatch, CaseStore};
use crate::embeddings::Embedder;
use crate::errors::Result;
use crate::llm::create_chat_model;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Generated answer plus the case it was grounded on
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub response: String,
    pub case: Option<CaseMatch>,
}

pub struct RagPipeline {
    retriever: CaseRetriever,
    responder: Responder,
}

impl RagPipeline {
    pub fn new(retriever: CaseRetriever, responder: Responder) -> Self {
        Self {
            retriever,
            responder,
        }
    }

    /// Wire the pipeline from configuration around an existing store and embedder
    pub fn from_config(
        config: &AppConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn CaseStore>,
    ) -> Result<Self> {
        let augment = &config.models.augment;
        let respond = &config.models.respond;

        let augmenter = QueryAugmenter::new(create_chat_model(config, augment)?)
            .with_sampling(augment.temperature, augment.max_tokens);
        let retriever = CaseRetriever::new(augmenter, embedder, store, config.retrieval.top_k);
        let responder = Responder::new(
            create_chat_model(config, respond)?,
            respond.temperature,
            respond.max_tokens,
        );

        Ok(Self::new(retriever, responder))
    }

    #[instrument(skip_all)]
    pub async fn answer(&self, question: &str) -> Result<RagAnswer> {
        let matches = self.retriever.retrieve_matches(question).await?;
        let summaries: Vec<String> = matches.iter().map(|m| m.summary.clone()).collect();
        let response = self.responder.respond(question, &summaries).await?;

        Ok(RagAnswer {
            response,
            case: matches.into_iter().next(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;
    use crate::db::InMemoryCaseStore;
    use crate::embeddings::MockEmbedder;
    use crate::llm::MockChatModel;

    #[tokio::test]
    async fn test_answer_carries_case() {
        let store = Arc::new(InMemoryCaseStore::new(2));
        store.insert_case("doc_1.txt", "Wrongful dismissal.", &[1.0, 0.0]).await.unwrap();

        let augmenter = QueryAugmenter::new(Arc::new(MockChatModel::fixed("aug")));
        let retriever =
            CaseRetriever::new(augmenter, Arc::new(MockEmbedder::fixed(vec![1.0, 0.0])), store, 1);
        let model = Arc::new(MockChatModel::new(|req| {
            Ok(req.system.clone().unwrap_or_default())
        }));
        let pipeline = RagPipeline::new(retriever, Responder::new(model, None, None));

        let answer = tokio_test::assert_ok!(pipeline.answer("I was fired").await);
        assert!(answer.response.contains("Wrongful dismissal."));
        let case = answer.case.unwrap();
        assert_eq!(case.filename, "doc_1.txt");
        assert!((case.similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_no_cases_no_fabricated_match() {
        let mut config = AppConfig::default();
        config.models.augment.provider = Provider::Mock;
        config.models.respond.provider = Provider::Mock;

        let store = Arc::new(InMemoryCaseStore::new(8));
        let pipeline =
            RagPipeline::from_config(&config, Arc::new(MockEmbedder::new(8)), store).unwrap();

        let answer = pipeline.answer("help").await.unwrap();
        assert!(answer.case.is_none());
        assert_eq!(answer.response, "[mock response] help");
    }
}
