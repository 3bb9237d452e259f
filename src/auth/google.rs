//! Google OAuth 2.0 authorization-code flow.

use std::time::Duration;

use rand_core::{OsRng, RngCore};
use reqwest::{Client, Url};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::error;

use crate::config::{Config, GoogleCredentials};
use crate::error::AppError;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

pub const STATE_COOKIE: &str = "oauthState";
/// Lifetime of the `state` cookie.
pub const STATE_TTL_SECONDS: i64 = 600;

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Clone)]
pub struct GoogleOAuth {
    client: Client,
    credentials: GoogleCredentials,
    redirect_uri: String,
}

impl GoogleOAuth {
    /// `None` unless both client id and secret are configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, AppError> {
        let Some(credentials) = config.google.clone() else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Some(Self { client, credentials, redirect_uri: config.auth.google_redirect_uri.clone() }))
    }

    pub fn new_state() -> String {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Constant-time comparison of the cookie `state` with the callback's.
    pub fn state_matches(expected: &str, received: &str) -> bool {
        expected.as_bytes().ct_eq(received.as_bytes()).into()
    }

    pub fn authorize_url(&self, state: &str) -> Result<Url, AppError> {
        Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.credentials.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
                ("prompt", "select_account"),
            ],
        )
        .map_err(|e| AppError::Server(format!("build authorize url: {e}")))
    }

    /// Exchange an authorization code for the signed-in user's profile.
    pub async fn exchange(&self, code: &str) -> Result<GoogleProfile, AppError> {
        let unavailable = |what: &str, e: &dyn std::fmt::Display| {
            error!(error = %e, "google {what} failed");
            AppError::ExternalServiceUnavailable(format!("google {what} failed"))
        };

        let token: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable("token exchange", &e))?
            .json()
            .await
            .map_err(|e| unavailable("token exchange", &e))?;

        self.client
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable("profile fetch", &e))?
            .json::<GoogleProfile>()
            .await
            .map_err(|e| unavailable("profile fetch", &e))
    }
}
