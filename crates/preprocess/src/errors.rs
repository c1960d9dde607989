//! Preprocessing error types

use imole_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Failed to read corpus {path}: {source}")]
    Corpus {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to simplify {case_id}: {source}")]
    Simplify {
        case_id: String,
        #[source]
        source: AppError,
    },

    #[error(transparent)]
    App(#[from] AppError),
}
