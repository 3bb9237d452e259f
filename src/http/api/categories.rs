use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::access::{self, Operation, Resource, Subject};
use crate::http::AppState;
use crate::http::extract::{ApiJson, AuthUser};
use crate::http::response::{ApiResponse, ApiResult};
use crate::http::validate::Validator;

#[derive(Deserialize)]
pub struct CategoryBody {
    name: Option<String>,
    description: Option<String>,
}

pub async fn list(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    access::require(&Subject::of(&user), Operation::ListCategories, &Resource::none())?;
    Ok(ApiResponse::ok(json!({ "categories": state.db.list_categories()? })))
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<CategoryBody>,
) -> ApiResult {
    access::require(&Subject::of(&user), Operation::ManageCategories, &Resource::none())?;
    let mut v = Validator::new();
    let name = v.required_len(body.name.as_deref(), "Name", 2, 100);
    let description = v.optional_len(body.description.as_deref(), "Description", 0, 500);
    v.finish()?;

    let category = state.db.create_category(name.unwrap_or_default(), description.unwrap_or_default())?;
    info!(category_id = %category.id, name = %category.name, "category created");
    Ok(ApiResponse::created(json!({ "category": category })).with_message("Category created successfully."))
}

pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CategoryBody>,
) -> ApiResult {
    access::require(&Subject::of(&user), Operation::ManageCategories, &Resource::none())?;
    let mut v = Validator::new();
    let name = v.optional_len(body.name.as_deref(), "Name", 2, 100);
    let description = v.optional_len(body.description.as_deref(), "Description", 0, 500);
    v.finish()?;

    let category = state.db.update_category(&id, name, description)?;
    Ok(ApiResponse::ok(json!({ "category": category })).with_message("Category updated successfully."))
}

pub async fn remove(State(state): State<AppState>, AuthUser(user): AuthUser, Path(id): Path<String>) -> ApiResult {
    access::require(&Subject::of(&user), Operation::ManageCategories, &Resource::none())?;
    state.db.delete_category(&id)?;
    info!(category_id = %id, "category deleted");
    Ok(ApiResponse::message("Category deleted successfully."))
}
