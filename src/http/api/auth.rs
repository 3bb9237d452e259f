//! Registration, password login, token refresh and Google sign-in.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::ClientKey;
use crate::auth::google::{GoogleOAuth, STATE_COOKIE, STATE_TTL_SECONDS};
use crate::auth::{REFRESH_COOKIE, Session};
use crate::error::AppError;
use crate::http::AppState;
use crate::http::extract::{ApiJson, ApiQuery, AuthUser, cookie};
use crate::http::response::{ApiResponse, ApiResult};
use crate::http::validate::Validator;

#[derive(Deserialize)]
pub struct RegisterBody {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginBody {
    email: Option<String>,
    password: Option<String>,
}

fn session_response(state: &AppState, session: Session, message: &str) -> ApiResponse {
    let user = &session.user;
    ApiResponse::ok(json!({
        "user": { "id": user.id, "name": user.name, "email": user.email, "role": user.role },
        "accessToken": session.access_token,
    }))
    .with_message(message)
    .with_cookie(state.auth.keys().refresh_cookie(&session.refresh_token))
}

pub async fn register(
    State(state): State<AppState>,
    ClientKey(key): ClientKey,
    ApiJson(body): ApiJson<RegisterBody>,
) -> ApiResult {
    state.limits.auth.check(&key)?;

    let mut v = Validator::new();
    let name = v.required_len(body.name.as_deref(), "Name", 2, 100);
    let email = v.email(body.email.as_deref());
    let password = v.required_len(body.password.as_deref(), "Password", 6, 128);
    v.finish()?;
    let (Some(name), Some(email), Some(password)) = (name, email, password) else {
        return Err(AppError::Validation("Invalid registration details".into()));
    };

    let session = state.auth.register(name, email, password).await?;
    Ok(session_response(&state, session, "Registration successful.").with_status(StatusCode::CREATED))
}

pub async fn login(
    State(state): State<AppState>,
    ClientKey(key): ClientKey,
    ApiJson(body): ApiJson<LoginBody>,
) -> ApiResult {
    state.limits.auth.check(&key)?;

    let mut v = Validator::new();
    let email = v.email(body.email.as_deref());
    let password = body.password.as_deref().filter(|p| !p.is_empty());
    if password.is_none() {
        v.push("Password is required");
    }
    v.finish()?;
    let (Some(email), Some(password)) = (email, password) else {
        return Err(AppError::Validation("Invalid login details".into()));
    };

    let session = state.auth.login(email, password).await?;
    Ok(session_response(&state, session, "Login successful."))
}

pub struct RefreshCookie(Option<String>);

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for RefreshCookie {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RefreshCookie(cookie(parts, REFRESH_COOKIE).map(str::to_string)))
    }
}

/// Rotate the refresh cookie. A failed refresh clears it.
pub async fn refresh(State(state): State<AppState>, RefreshCookie(token): RefreshCookie) -> Response {
    match state.auth.refresh(token.as_deref()) {
        Ok(session) => ApiResponse::ok(json!({ "accessToken": session.access_token }))
            .with_cookie(state.auth.keys().refresh_cookie(&session.refresh_token))
            .into_response(),
        Err(e) => {
            let mut response = e.into_response();
            if let Ok(value) = state.auth.keys().clear_cookie().parse() {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            response
        }
    }
}

pub async fn logout(State(state): State<AppState>) -> ApiResult {
    Ok(ApiResponse::message("Logged out successfully.").with_cookie(state.auth.keys().clear_cookie()))
}

pub async fn me(AuthUser(user): AuthUser) -> ApiResult {
    Ok(ApiResponse::ok(json!({ "user": user })))
}

fn google(state: &AppState) -> Result<&GoogleOAuth, AppError> {
    state
        .google
        .as_ref()
        .ok_or_else(|| AppError::NotFound("Google sign-in is not enabled.".into()))
}

fn state_cookie(state: &AppState, value: &str, max_age: i64) -> String {
    let flags = if state.config.server.environment.is_production() {
        "Secure; SameSite=None"
    } else {
        "SameSite=Lax"
    };
    format!("{STATE_COOKIE}={value}; HttpOnly; Path=/api/auth/google; Max-Age={max_age}; {flags}")
}

fn with_cookie(mut response: Response, cookie: &str) -> Response {
    if let Ok(value) = cookie.parse() {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

pub async fn google_start(State(state): State<AppState>) -> Result<Response, AppError> {
    let oauth = google(&state)?;
    let nonce = GoogleOAuth::new_state();
    let url = oauth.authorize_url(&nonce)?;
    Ok(with_cookie(
        Redirect::to(url.as_str()).into_response(),
        &state_cookie(&state, &nonce, STATE_TTL_SECONDS),
    ))
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

pub struct StateCookie(Option<String>);

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for StateCookie {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(StateCookie(cookie(parts, STATE_COOKIE).map(str::to_string)))
    }
}

async fn complete_google(
    state: &AppState,
    oauth: &GoogleOAuth,
    expected: Option<String>,
    query: CallbackQuery,
) -> Result<Session, AppError> {
    if let Some(error) = query.error {
        return Err(AppError::Authentication(format!("google returned {error}")));
    }
    match (expected, query.state) {
        (Some(e), Some(q)) if GoogleOAuth::state_matches(&e, &q) => {}
        _ => return Err(AppError::Authentication("OAuth state mismatch.".into())),
    }
    let code = query
        .code
        .ok_or_else(|| AppError::Authentication("Missing authorization code.".into()))?;
    let profile = oauth.exchange(&code).await?;
    state.auth.google_login(&profile)
}

/// Finish Google sign-in and hand the access token to the front-end.
pub async fn google_callback(
    State(state): State<AppState>,
    StateCookie(expected): StateCookie,
    ApiQuery(query): ApiQuery<CallbackQuery>,
) -> Result<Response, AppError> {
    let oauth = google(&state)?;
    let client_url = state.config.server.client_url.trim_end_matches('/');

    let response = match complete_google(&state, oauth, expected, query).await {
        Ok(session) => {
            let target = format!("{client_url}/auth/google/callback?token={}", session.access_token);
            with_cookie(
                Redirect::to(&target).into_response(),
                &state.auth.keys().refresh_cookie(&session.refresh_token),
            )
        }
        Err(e) => {
            warn!(error = %e, "google sign-in failed");
            Redirect::to(&format!("{client_url}/login?error=oauth_failed")).into_response()
        }
    };
    Ok(with_cookie(response, &state_cookie(&state, "", 0)))
}
