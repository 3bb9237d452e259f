use axum::extract::State;
use serde::Serialize;
use serde_json::json;

use crate::http::AppState;
use crate::http::response::{ApiResponse, ApiResult};

/// Which capability backs each stage of the assistant.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagStatus {
    pub embedding: &'static str,
    pub vector_index: &'static str,
    pub generation: &'static str,
}

pub async fn health(State(state): State<AppState>) -> ApiResult {
    Ok(ApiResponse::ok(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "rag": state.rag_status,
    }))
    .with_message(format!("{} API is running", state.config.app_name)))
}
