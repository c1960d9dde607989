//! SeaORM entity models
//!
//! The `embedding` column is a pgvector `vector(1536)` and is only touched
//! through raw statements in the repository; the entity maps the text columns.

mod legal_case;

pub use legal_case::{
    ActiveModel as LegalCaseActiveModel, Column as LegalCaseColumn, Entity as LegalCaseEntity,
    Model as LegalCase,
};
