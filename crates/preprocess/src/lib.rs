//! Imole preprocessing
//!
//! Turns the raw AILA query corpus into `queries.json`, then rewrites each
//! case into the kind of question a member of the public would type.

pub mod errors;
pub mod extractor;
pub mod simplifier;

pub use errors::PreprocessError;
pub use extractor::{extract_queries, read_corpus, QuerySet};
pub use simplifier::QuerySimplifier;
