//! Case stores: the similarity-search seam of the retrieval pipeline

use crate::embeddings::check_dimension;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::RwLock;

/// A stored case ranked against a query vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseMatch {
    pub filename: String,
    pub summary: String,
    /// `1 - cosine_distance`
    pub similarity: f64,
}

/// Storage of summarized cases with nearest-neighbor lookup
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Rank stored cases by cosine similarity, highest first
    async fn nearest(&self, embedding: &[f32], limit: usize) -> Result<Vec<CaseMatch>>;

    /// Insert a summarized case with its embedding
    async fn insert_case(&self, filename: &str, summary: &str, embedding: &[f32]) -> Result<()>;

    /// Filenames of every stored case
    async fn known_filenames(&self) -> Result<HashSet<String>>;

    /// Number of stored cases
    async fn count(&self) -> Result<u64>;

    /// Check the backing store is reachable
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

struct StoredCase {
    filename: String,
    summary: String,
    embedding: Vec<f32>,
}

/// In-process case store
///
/// Computes the same `1 - cosine_distance` score pgvector does. Used by tests
/// and for running the pipeline without a database.
pub struct InMemoryCaseStore {
    dimension: usize,
    cases: RwLock<Vec<StoredCase>>,
}

impl InMemoryCaseStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            cases: RwLock::new(Vec::new()),
        }
    }

    fn poisoned() -> AppError {
        AppError::Internal {
            message: "in-memory case store lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl CaseStore for InMemoryCaseStore {
    async fn nearest(&self, embedding: &[f32], limit: usize) -> Result<Vec<CaseMatch>> {
        check_dimension(embedding, self.dimension)?;

        let cases = self.cases.read().map_err(|_| Self::poisoned())?;
        let mut ranked: Vec<CaseMatch> = cases
            .iter()
            .map(|case| CaseMatch {
                filename: case.filename.clone(),
                summary: case.summary.clone(),
                similarity: cosine_similarity(&case.embedding, embedding),
            })
            .collect();

        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn insert_case(&self, filename: &str, summary: &str, embedding: &[f32]) -> Result<()> {
        check_dimension(embedding, self.dimension)?;

        self.cases
            .write()
            .map_err(|_| Self::poisoned())?
            .push(StoredCase {
                filename: filename.to_string(),
                summary: summary.to_string(),
                embedding: embedding.to_vec(),
            });
        Ok(())
    }

    async fn known_filenames(&self) -> Result<HashSet<String>> {
        let cases = self.cases.read().map_err(|_| Self::poisoned())?;
        Ok(cases.iter().map(|case| case.filename.clone()).collect())
    }

    async fn count(&self) -> Result<u64> {
        let cases = self.cases.read().map_err(|_| Self::poisoned())?;
        Ok(cases.len() as u64)
    }
}

/// Cosine similarity in f64; zero-length vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
