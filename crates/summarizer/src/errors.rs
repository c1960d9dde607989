//! Summarizer error types

use imole_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SummarizerError {
    #[error("Invalid summary store key {0:?} (expected document_<n>)")]
    InvalidKey(String),

    #[error("Corrupt journal {path} at line {line}: {source}")]
    Journal {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to list documents in {path}: {source}")]
    Documents {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Document is empty")]
    EmptyDocument,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    App(#[from] AppError),
}

impl SummarizerError {
    pub fn is_store_locked(&self) -> bool {
        matches!(self, SummarizerError::App(AppError::StoreLocked { .. }))
    }
}
