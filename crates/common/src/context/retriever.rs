//! Case retrieval: augment, embed, nearest-neighbor lookup

use super::QueryAugmenter;
use crate::db::{CaseMatch, CaseStore};
use crate::embeddings::Embedder;
use crate::errors::Result;
use crate::metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

pub struct CaseRetriever {
    augmenter: QueryAugmenter,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn CaseStore>,
    top_k: usize,
}

impl CaseRetriever {
    pub fn new(
        augmenter: QueryAugmenter,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn CaseStore>,
        top_k: usize,
    ) -> Self {
        Self {
            augmenter,
            embedder,
            store,
            top_k: top_k.max(1),
        }
    }

    /// Summaries of the closest cases; empty only when no case is stored
    pub async fn retrieve(&self, query: &str) -> Result<Vec<String>> {
        let matches = self.retrieve_matches(query).await?;
        Ok(matches.into_iter().map(|m| m.summary).collect())
    }

    /// Closest cases with filename and similarity
    #[instrument(skip_all, fields(top_k = self.top_k))]
    pub async fn retrieve_matches(&self, query: &str) -> Result<Vec<CaseMatch>> {
        let augmented = self.augmenter.augment(query).await?;
        let embedding = self.embedder.embed(&augmented).await?;

        let start = Instant::now();
        let matches = self.store.nearest(&embedding, self.top_k).await?;
        let top = matches.first().map(|m| m.similarity);
        metrics::record_retrieval(start.elapsed().as_secs_f64(), matches.len(), top);

        match matches.first() {
            Some(best) => info!(
                filename = %best.filename,
                similarity = best.similarity,
                "Retrieved case"
            ),
            None => info!("No cases stored; nothing retrieved"),
        }

        Ok(matches)
    }
}
