use axum::extract::State;
use serde::Deserialize;
use serde_json::json;

use crate::access::{self, Operation, Resource, Subject};
use crate::http::AppState;
use crate::http::extract::{ApiJson, AuthUser};
use crate::http::response::{ApiResponse, ApiResult};
use crate::http::validate::Validator;

#[derive(Deserialize)]
pub struct ChatBody {
    message: Option<String>,
}

/// Always answers; capability failures become a polite reply.
pub async fn chat(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<ChatBody>,
) -> ApiResult {
    access::require(&Subject::of(&user), Operation::UseChatbot, &Resource::none())?;
    let mut v = Validator::new();
    let message = v.required_len(body.message.as_deref(), "Message", 1, 1000);
    v.finish()?;

    let reply = state.chat.reply(message.unwrap_or_default()).await;
    Ok(ApiResponse::ok(json!(reply)))
}
