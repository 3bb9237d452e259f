//! Complaint submission, listings and lifecycle transitions.

use std::path::PathBuf;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use rand_core::{OsRng, RngCore};
use serde::Deserialize;
use serde_json::json;
use tokio::fs;
use tracing::{debug, warn};

use super::{ClientKey, Pagination, extension_of, read_capped, read_text};
use crate::access::{self, Operation, Resource, Subject};
use crate::error::AppError;
use crate::http::AppState;
use crate::http::extract::{ApiJson, ApiQuery, AuthUser};
use crate::http::response::{ApiResponse, ApiResult};
use crate::http::validate::Validator;
use crate::lifecycle::{Submission, UpdateRequest};
use crate::store::{ComplaintFilter, ComplaintStatus, PageRequest, User};

const BLOCKED_EXTENSIONS: &[&str] = &[
    ".exe", ".bat", ".cmd", ".sh", ".ps1", ".vbs", ".js", ".jsx", ".msi", ".dll", ".com", ".scr",
    ".pif", ".hta", ".cpl", ".msc", ".inf", ".reg", ".ws", ".wsf", ".wsc", ".wsh",
];

struct Attachment {
    extension: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct SubmitForm {
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    file: Option<Attachment>,
}

async fn read_form(mut multipart: Multipart, cap: usize) -> Result<SubmitForm, AppError> {
    let mut form = SubmitForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => form.title = Some(read_text(field).await?),
            "description" => form.description = Some(read_text(field).await?),
            "category" => form.category = Some(read_text(field).await?),
            "file" => {
                if form.file.is_some() {
                    return Err(AppError::Validation("Only one file may be attached.".into()));
                }
                let extension = field.file_name().and_then(extension_of).unwrap_or_default();
                if BLOCKED_EXTENSIONS.contains(&extension.as_str()) {
                    return Err(AppError::Validation(
                        "File type not allowed. Executable and script files are blocked.".into(),
                    ));
                }
                let bytes = read_capped(field, cap).await?;
                if !bytes.is_empty() {
                    form.file = Some(Attachment { extension, bytes });
                }
            }
            other => debug!(field = other, "ignoring unknown form field"),
        }
    }
    Ok(form)
}

async fn store_attachment(state: &AppState, file: &Attachment) -> Result<(PathBuf, String), AppError> {
    let dir = state.config.uploads_dir();
    fs::create_dir_all(&dir).await?;
    let name = format!(
        "file-{}-{}{}",
        chrono::Utc::now().timestamp_millis(),
        OsRng.next_u32() % 1_000_000_000,
        file.extension
    );
    let path = dir.join(&name);
    fs::write(&path, &file.bytes).await?;
    Ok((path, format!("/uploads/{name}")))
}

pub async fn submit(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ClientKey(key): ClientKey,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    access::require(&Subject::of(&user), Operation::SubmitComplaint, &Resource::none())?;
    state.limits.submit.check(&key)?;

    let multipart = multipart.map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?;
    let form = read_form(multipart, state.config.server.max_upload_bytes).await?;

    let mut v = Validator::new();
    let title = v.required_len(form.title.as_deref(), "Title", 3, 200).map(str::to_string);
    let description = v
        .required_len(form.description.as_deref(), "Description", 10, 5000)
        .map(str::to_string);
    let category = form.category.as_deref().map(str::trim).filter(|c| !c.is_empty());
    if category.is_none() {
        v.push("Category is required");
    }
    v.finish()?;
    let (Some(title), Some(description), Some(category_id)) = (title, description, category) else {
        return Err(AppError::Validation("Invalid complaint".into()));
    };

    let stored = match &form.file {
        Some(file) => Some(store_attachment(&state, file).await?),
        None => None,
    };
    let submission = Submission {
        title,
        description,
        category_id: category_id.to_string(),
        file_url: stored.as_ref().map(|(_, url)| url.clone()),
    };

    match state.lifecycle.submit(&user, submission) {
        Ok(complaint) => Ok(ApiResponse::created(json!({ "complaint": complaint }))
            .with_message("Complaint submitted successfully.")),
        Err(e) => {
            if let Some((path, _)) = stored {
                if let Err(rm) = fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %rm, "failed to remove orphaned attachment");
                }
            }
            Err(e)
        }
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    status: Option<String>,
    category: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

fn parse_status(raw: Option<&str>) -> Result<Option<ComplaintStatus>, AppError> {
    raw.filter(|s| !s.is_empty()).map(str::parse::<ComplaintStatus>).transpose()
}

fn list(state: &AppState, filter: ComplaintFilter, query: &ListQuery, default_limit: u32) -> ApiResult {
    let page = PageRequest::new(query.page, query.limit, default_limit);
    let result = state.db.list_complaints(&filter, page)?;
    Ok(ApiResponse::ok(json!({
        "complaints": result.items,
        "pagination": Pagination::new(result.total, page.page, page.limit),
    })))
}

fn gate(user: &User, op: Operation) -> Result<(), AppError> {
    access::require(&Subject::of(user), op, &Resource::none())
}

pub async fn my(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    gate(&user, Operation::ListOwnComplaints)?;
    let filter = ComplaintFilter {
        student_id: Some(user.id.clone()),
        status: parse_status(query.status.as_deref())?,
        ..Default::default()
    };
    list(&state, filter, &query, 10)
}

pub async fn assigned(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    gate(&user, Operation::ListAssignedComplaints)?;
    let filter = ComplaintFilter {
        category_id: user.assigned_category_id().map(str::to_string),
        status: parse_status(query.status.as_deref())?,
        ..Default::default()
    };
    list(&state, filter, &query, 20)
}

pub async fn all(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    gate(&user, Operation::ListAllComplaints)?;
    let filter = ComplaintFilter {
        category_id: query.category.clone().filter(|c| !c.is_empty()),
        status: parse_status(query.status.as_deref())?,
        ..Default::default()
    };
    list(&state, filter, &query, 20)
}

pub async fn detail(State(state): State<AppState>, AuthUser(user): AuthUser, Path(id): Path<String>) -> ApiResult {
    let complaint = state.db.complaint(&id)?;
    access::require(&Subject::of(&user), Operation::ReadComplaint, &Resource::complaint(&complaint))?;
    Ok(ApiResponse::ok(json!({ "complaint": complaint })))
}

#[derive(Deserialize)]
pub struct UpdateBody {
    status: Option<String>,
    remarks: Option<String>,
}

/// `PUT /complaints/{id}` and `PATCH /complaints/{id}/status`.
pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateBody>,
) -> ApiResult {
    let mut v = Validator::new();
    let status = v.parse::<ComplaintStatus>(body.status.as_deref());
    let remarks = v.optional_len(body.remarks.as_deref(), "Remarks", 0, 2000).map(str::to_string);
    v.finish()?;

    let complaint = state.lifecycle.update(&user, &id, UpdateRequest { status, remarks })?;
    Ok(ApiResponse::ok(json!({ "complaint": complaint })).with_message("Complaint updated successfully."))
}

pub async fn confirm(State(state): State<AppState>, AuthUser(user): AuthUser, Path(id): Path<String>) -> ApiResult {
    let complaint = state.lifecycle.confirm(&user, &id)?;
    Ok(ApiResponse::ok(json!({ "complaint": complaint }))
        .with_message("Complaint marked as resolved. Thank you for your feedback."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_parsing() {
        assert_eq!(parse_status(None).unwrap(), None);
        assert_eq!(parse_status(Some("")).unwrap(), None);
        assert_eq!(parse_status(Some("Resolved")).unwrap(), Some(ComplaintStatus::Resolved));
        assert!(parse_status(Some("Done")).is_err());
    }

    #[test]
    fn scripts_are_blocked() {
        for name in ["setup.EXE", "run.sh", "app.js", "macro.vbs"] {
            let ext = extension_of(name).unwrap();
            assert!(BLOCKED_EXTENSIONS.contains(&ext.as_str()), "{name}");
        }
        assert!(!BLOCKED_EXTENSIONS.contains(&".png"));
        assert!(!BLOCKED_EXTENSIONS.contains(&".pdf"));
    }
}
