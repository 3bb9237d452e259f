//! `{success, message?, data?}` envelope and the single place where
//! [`AppError`] becomes an HTTP status.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;

pub type ApiResult = Result<ApiResponse, AppError>;

#[derive(Serialize)]
struct Envelope<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
}

/// Successful response.
#[derive(Debug)]
pub struct ApiResponse {
    status: StatusCode,
    message: Option<String>,
    data: Option<Value>,
    cookies: Vec<String>,
}

impl ApiResponse {
    pub fn ok(data: Value) -> Self {
        Self { status: StatusCode::OK, message: None, data: Some(data), cookies: Vec::new() }
    }

    pub fn created(data: Value) -> Self {
        Self { status: StatusCode::CREATED, ..Self::ok(data) }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self { status: StatusCode::OK, message: Some(message.into()), data: None, cookies: Vec::new() }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Append a raw `Set-Cookie` value.
    pub fn with_cookie(mut self, cookie: String) -> Self {
        self.cookies.push(cookie);
        self
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let body = Envelope { success: true, message: self.message.as_deref(), data: self.data.as_ref() };
        let mut response = (self.status, Json(body)).into_response();
        for cookie in self.cookies {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
        response
    }
}

/// Detail of a 5xx error, attached to the response for the logging layer.
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

pub fn status_of(error: &AppError) -> StatusCode {
    match error {
        AppError::Validation(_)
        | AppError::InvalidTransition(_)
        | AppError::NoChangesSpecified
        | AppError::UnextractableDocument
        | AppError::NoIngestibleContent => StatusCode::BAD_REQUEST,
        AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
        AppError::AccessDenied(_) | AppError::ForbiddenTransition { .. } => StatusCode::FORBIDDEN,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Conflict(_) => StatusCode::CONFLICT,
        AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        AppError::ExternalServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Config(_) | AppError::Logger(_) | AppError::Store(_) | AppError::Server(_) | AppError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_of(&self);
        let message = match &self {
            e if e.is_internal() => "Internal Server Error".to_string(),
            AppError::ExternalServiceUnavailable(_) => {
                "A required external service is unavailable. Please try again later.".to_string()
            }
            e => e.to_string(),
        };
        let body = Envelope { success: false, message: Some(&message), data: None };
        let mut response = (status, Json(body)).into_response();
        if status.is_server_error() {
            response.extensions_mut().insert(InternalErrorDetail(format!("{self:?}")));
        }
        response
    }
}
