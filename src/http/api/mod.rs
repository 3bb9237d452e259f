//! Route handlers, one module per resource.

pub mod analytics;
pub mod auth;
pub mod categories;
pub mod chatbot;
pub mod complaints;
pub mod health;
pub mod knowledge;
pub mod users;

use axum::extract::multipart::Field;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Serialize;

use super::AppState;
use super::extract::client_key;
use crate::error::AppError;

const MB: usize = 1024 * 1024;

pub async fn not_found() -> AppError {
    AppError::NotFound("Route not found.".into())
}

/// Caller identity for rate limiting.
pub struct ClientKey(pub String);

impl FromRequestParts<AppState> for ClientKey {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(ClientKey(client_key(parts, state.config.server.trust_proxy)))
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub pages: u64,
}

impl Pagination {
    pub fn new(total: u64, page: u32, limit: u32) -> Self {
        Self { total, page, pages: total.div_ceil(u64::from(limit.max(1))) }
    }
}

fn multipart_error(e: impl std::fmt::Display) -> AppError {
    AppError::Validation(format!("Invalid multipart body: {e}"))
}

/// Read a file field, failing as soon as it grows past `cap` bytes.
pub(crate) async fn read_capped(mut field: Field<'_>, cap: usize) -> Result<Vec<u8>, AppError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if bytes.len() + chunk.len() > cap {
            return Err(AppError::Validation(format!(
                "File too large. Maximum size is {}MB.",
                cap.div_ceil(MB)
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

pub(crate) async fn read_text(field: Field<'_>) -> Result<String, AppError> {
    field.text().await.map_err(multipart_error)
}

/// Lower-cased extension of an uploaded file name, including the dot.
pub(crate) fn extension_of(file_name: &str) -> Option<String> {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}
