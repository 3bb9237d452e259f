//! Knowledge-base documents: upload (ingest), list, delete.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use serde_json::json;

use super::{extension_of, read_capped};
use crate::access::{self, Operation, Resource, Subject};
use crate::error::AppError;
use crate::http::AppState;
use crate::http::extract::AuthUser;
use crate::http::response::{ApiResponse, ApiResult};

pub async fn list(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    Ok(ApiResponse::ok(json!({ "documents": state.knowledge.list(&user)? })))
}

pub async fn upload(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    access::require(&Subject::of(&user), Operation::ManageKnowledge, &Resource::none())?;
    let invalid = |e: &dyn std::fmt::Display| AppError::Validation(format!("Invalid multipart body: {e}"));
    let mut multipart = multipart.map_err(|e| invalid(&e))?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| invalid(&e))? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        if extension_of(&name).as_deref() != Some(".pdf") {
            return Err(AppError::Validation("Only PDF files are allowed for knowledge base.".into()));
        }
        let bytes = read_capped(field, state.config.server.max_knowledge_bytes).await?;
        upload = Some((name, bytes));
        break;
    }
    let Some((name, bytes)) = upload.filter(|(_, b)| !b.is_empty()) else {
        return Err(AppError::Validation("No PDF file uploaded.".into()));
    };

    let doc = state.knowledge.ingest(&user, &name, bytes).await?;
    Ok(ApiResponse::created(json!({ "doc": doc })).with_message("Document uploaded and indexed successfully."))
}

pub async fn remove(State(state): State<AppState>, AuthUser(user): AuthUser, Path(id): Path<String>) -> ApiResult {
    state.knowledge.delete(&user, &id).await?;
    Ok(ApiResponse::message("Document deleted successfully."))
}
