//! Application-wide error types.
//!
//! Every fallible path in the service funnels into [`AppError`]. The HTTP
//! boundary translates it exactly once into the `{success:false, message}`
//! envelope (see `http::response`).

use thiserror::Error;

use crate::store::ComplaintStatus;

#[derive(Debug, Error)]
pub enum AppError {
    // ── request / domain errors ───────────────────────────────────────────
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    AccessDenied(String),

    #[error("Staff can only set status to: {}", join_statuses(.allowed))]
    ForbiddenTransition { allowed: Vec<ComplaintStatus> },

    #[error("{0}")]
    InvalidTransition(String),

    #[error("No changes specified. Provide a status or remarks.")]
    NoChangesSpecified,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Could not extract any text from the PDF. It might be a scanned image or empty.")]
    UnextractableDocument,

    #[error("No valid text chunks were found in the document (chunks too small).")]
    NoIngestibleContent,

    #[error("external service unavailable: {0}")]
    ExternalServiceUnavailable(String),

    #[error("{0}")]
    RateLimited(String),

    // ── ambient errors ────────────────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// `true` for errors whose detail must not reach the client.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AppError::Config(_)
                | AppError::Logger(_)
                | AppError::Store(_)
                | AppError::Server(_)
                | AppError::Io(_)
        )
    }
}

fn join_statuses(statuses: &[ComplaintStatus]) -> String {
    statuses
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Store(e.to_string())
    }
}
