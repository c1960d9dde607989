//! Chat handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use imole_common::errors::{AppError, Result};

/// Chat request, as posted by the web front-end
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 4000))]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub case: Option<CaseRef>,
}

/// The case the answer was grounded on
#[derive(Debug, Serialize)]
pub struct CaseRef {
    pub filename: String,
    pub similarity: f64,
}

/// Answer a legal question
pub async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>> {
    let Json(request) = payload.map_err(|e| AppError::InvalidFormat {
        message: e.body_text(),
    })?;

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("query".to_string()),
    })?;

    if request.query.trim().is_empty() {
        return Err(AppError::Validation {
            message: "query must not be blank".to_string(),
            field: Some("query".to_string()),
        });
    }

    let start = Instant::now();
    let answer = state.pipeline.answer(&request.query).await?;

    tracing::info!(
        latency_ms = start.elapsed().as_millis() as u64,
        filename = answer.case.as_ref().map(|c| c.filename.as_str()),
        similarity = answer.case.as_ref().map(|c| c.similarity),
        "Chat answered"
    );

    Ok(Json(ChatResponse {
        response: answer.response,
        case: answer.case.map(|c| CaseRef {
            filename: c.filename,
            similarity: c.similarity,
        }),
    }))
}
