//! Imole summarizer
//!
//! Batch summarization of case documents into the local summary store, and
//! loading of stored summaries into the `legal_cases` vector table.

pub mod errors;
pub mod processor;
pub mod store;
pub mod summarize;
pub mod uploader;

pub use errors::SummarizerError;
pub use processor::{BatchJob, BatchReport};
pub use store::{DocumentKey, SummaryEntry, SummaryStore};
pub use summarize::Summarizer;
pub use uploader::{UploadReport, Uploader};
