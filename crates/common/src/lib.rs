//! Imole Common Library
//!
//! Shared code for the Imole legal-assistance pipeline:
//! - Configuration management
//! - Error types and handling
//! - Database pool, `legal_cases` repository and case stores
//! - Embedding and chat-model client abstractions
//! - The retrieval pipeline (augment, embed, retrieve, respond)
//! - Metrics and JSON file helpers

pub mod config;
pub mod context;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod files;
pub mod llm;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use context::{RagAnswer, RagPipeline};
pub use db::{CaseMatch, CaseStore, DbPool, InMemoryCaseStore, Repository};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::{ChatModel, ChatRequest};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Default embedding dimension, fixed by the `legal_cases.embedding` column
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
