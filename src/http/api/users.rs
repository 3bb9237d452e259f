//! Admin user management and the staff directory.

use axum::extract::{Path, State};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use tracing::info;

use super::Pagination;
use crate::access::{self, Operation, Resource, Subject};
use crate::error::AppError;
use crate::http::AppState;
use crate::http::extract::{ApiJson, ApiQuery, AuthUser};
use crate::http::response::{ApiResponse, ApiResult};
use crate::http::validate::Validator;
use crate::store::{PageRequest, Role, UserUpdate};

#[derive(Deserialize)]
pub struct UserListQuery {
    role: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

pub async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> ApiResult {
    access::require(&Subject::of(&user), Operation::ListUsers, &Resource::none())?;
    let role = query
        .role
        .as_deref()
        .filter(|r| !r.is_empty())
        .map(str::parse::<Role>)
        .transpose()?;
    let page = PageRequest::new(query.page, query.limit, 20);
    let result = state.db.list_users(role, page)?;
    Ok(ApiResponse::ok(json!({
        "users": result.items,
        "pagination": Pagination::new(result.total, page.page, page.limit),
    })))
}

pub async fn staff(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    access::require(&Subject::of(&user), Operation::ListStaff, &Resource::none())?;
    Ok(ApiResponse::ok(json!({ "staff": state.db.list_staff()? })))
}

/// Present-but-null stays distinguishable from absent.
fn nullable<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<String>>, D::Error> {
    Option::<String>::deserialize(d).map(Some)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBody {
    name: Option<String>,
    role: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    assigned_category: Option<Option<String>>,
}

pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UserBody>,
) -> ApiResult {
    access::require(&Subject::of(&user), Operation::ManageUsers, &Resource::none())?;
    let mut v = Validator::new();
    let name = v.optional_len(body.name.as_deref(), "Name", 2, 100).map(str::to_string);
    let role = v.parse::<Role>(body.role.as_deref());
    v.finish()?;

    let assigned_category = body
        .assigned_category
        .map(|c| c.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));
    let updated = state.db.update_user(&id, UserUpdate { name, role, assigned_category })?;
    info!(user_id = %updated.id, role = %updated.role, by = %user.id, "user updated");
    Ok(ApiResponse::ok(json!({ "user": updated })).with_message("User updated successfully."))
}

pub async fn remove(State(state): State<AppState>, AuthUser(user): AuthUser, Path(id): Path<String>) -> ApiResult {
    access::require(&Subject::of(&user), Operation::ManageUsers, &Resource::none())?;
    if id == user.id {
        return Err(AppError::Validation("You cannot delete your own account.".into()));
    }
    state.db.delete_user(&id)?;
    info!(user_id = %id, by = %user.id, "user deleted");
    Ok(ApiResponse::message("User deleted successfully."))
}
