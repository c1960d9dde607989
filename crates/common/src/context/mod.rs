//! Retrieval-augmented answering
//!
//! The chat path is linear:
//! - Query augmentation (hypothetical case-document answer)
//! - Embedding + nearest-case lookup
//! - Formatted, empathetic response grounded on the retrieved summary

mod augmenter;
mod pipeline;
mod responder;
mod retriever;

pub use augmenter::{QueryAugmenter, AUGMENT_SYSTEM_PROMPT};
pub use pipeline::{RagAnswer, RagPipeline};
pub use responder::{build_system_prompt, Responder, NO_MATCH_CONTEXT};
pub use retriever::CaseRetriever;
