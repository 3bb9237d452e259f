//! Accounts and sessions.
//!
//! Two HS256 JWTs: a short-lived access token sent as a bearer header, and a
//! long-lived refresh token kept in an http-only `refreshToken` cookie and
//! rotated on every refresh. Each uses its own secret.

pub mod google;
pub mod password;
pub mod rate_limit;

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::store::{Database, NewUser, Role, User};

pub const REFRESH_COOKIE: &str = "refreshToken";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub role: Role,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub exp: i64,
}

/// An issued credential pair.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct TokenKeys {
    access_enc: EncodingKey,
    access_dec: DecodingKey,
    refresh_enc: EncodingKey,
    refresh_dec: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    secure_cookie: bool,
}

impl TokenKeys {
    pub fn new(config: &Config) -> Self {
        Self {
            access_enc: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_dec: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            refresh_enc: EncodingKey::from_secret(config.jwt_refresh_secret.as_bytes()),
            refresh_dec: DecodingKey::from_secret(config.jwt_refresh_secret.as_bytes()),
            access_ttl: Duration::minutes(config.auth.access_ttl_minutes),
            refresh_ttl: Duration::days(config.auth.refresh_ttl_days),
            secure_cookie: config.server.environment.is_production(),
        }
    }

    pub fn issue_access(&self, user: &User) -> Result<String, AppError> {
        let claims = AccessClaims {
            sub: user.id.clone(),
            role: user.role,
            exp: (Utc::now() + self.access_ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.access_enc)
            .map_err(|e| AppError::Server(format!("sign access token: {e}")))
    }

    pub fn issue_refresh(&self, user: &User) -> Result<String, AppError> {
        let claims = RefreshClaims { sub: user.id.clone(), exp: (Utc::now() + self.refresh_ttl).timestamp() };
        encode(&Header::default(), &claims, &self.refresh_enc)
            .map_err(|e| AppError::Server(format!("sign refresh token: {e}")))
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AppError> {
        decode::<AccessClaims>(token, &self.access_dec, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::Authentication("Token expired.".into()),
                _ => AppError::Authentication("Invalid token.".into()),
            })
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AppError> {
        decode::<RefreshClaims>(token, &self.refresh_dec, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| AppError::Authentication("Invalid refresh token.".into()))
    }

    /// `Set-Cookie` value carrying a fresh refresh token.
    pub fn refresh_cookie(&self, token: &str) -> String {
        self.cookie(token, self.refresh_ttl.num_seconds())
    }

    /// `Set-Cookie` value that expires the refresh cookie.
    pub fn clear_cookie(&self) -> String {
        self.cookie("", 0)
    }

    fn cookie(&self, value: &str, max_age: i64) -> String {
        let flags = if self.secure_cookie { "Secure; SameSite=None" } else { "SameSite=Lax" };
        format!("{REFRESH_COOKIE}={value}; HttpOnly; Path=/; Max-Age={max_age}; {flags}")
    }
}

/// Read one cookie out of a `Cookie` request header.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct AuthService {
    db: Arc<Database>,
    keys: TokenKeys,
}

impl AuthService {
    pub fn new(db: Arc<Database>, keys: TokenKeys) -> Self {
        Self { db, keys }
    }

    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    fn session(&self, user: User) -> Result<Session, AppError> {
        Ok(Session {
            access_token: self.keys.issue_access(&user)?,
            refresh_token: self.keys.issue_refresh(&user)?,
            user,
        })
    }

    /// Self-registration always creates a student.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<Session, AppError> {
        let email = email.trim().to_lowercase();
        if self.db.find_user_by_email(&email)?.is_some() {
            return Err(AppError::Validation("User with this email already exists.".into()));
        }
        let password_hash = password::hash(password.to_string()).await?;
        let user = self.db.create_user(NewUser {
            name: name.trim().to_string(),
            email,
            password_hash: Some(password_hash),
            role: Role::Student,
            google_id: None,
        })?;
        info!(user_id = %user.id, "user registered");
        self.session(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let invalid = || AppError::Authentication("Invalid email or password.".into());
        let user = self.db.find_user_by_email(&email.trim().to_lowercase())?.ok_or_else(invalid)?;
        let Some(stored) = user.password_hash.clone() else {
            return Err(AppError::Authentication(
                "This account uses Google login. Please sign in with Google.".into(),
            ));
        };
        if !password::verify(password.to_string(), stored).await? {
            return Err(invalid());
        }
        self.session(user)
    }

    /// Exchange a refresh token for a new pair.
    pub fn refresh(&self, refresh_token: Option<&str>) -> Result<Session, AppError> {
        let token = refresh_token.ok_or_else(|| AppError::Authentication("No refresh token provided.".into()))?;
        let claims = self.keys.verify_refresh(token)?;
        let user = self
            .db
            .find_user(&claims.sub)?
            .ok_or_else(|| AppError::Authentication("User not found.".into()))?;
        self.session(user)
    }

    /// Resolve a bearer token to the current user record.
    pub fn authenticate(&self, access_token: &str) -> Result<User, AppError> {
        let claims = self.keys.verify_access(access_token)?;
        self.db
            .find_user(&claims.sub)?
            .ok_or_else(|| AppError::Authentication("User not found.".into()))
    }

    /// Find by Google id, else link an existing account by verified email,
    /// else create a password-less student.
    pub fn google_login(&self, profile: &google::GoogleProfile) -> Result<Session, AppError> {
        if let Some(user) = self.db.find_user_by_google_id(&profile.sub)? {
            return self.session(user);
        }
        let email = profile.email.trim().to_lowercase();
        let user = match self.db.find_user_by_email(&email)? {
            Some(_) if !profile.email_verified => {
                warn!(google_sub = %profile.sub, "refusing to link Google account with unverified email");
                return Err(AppError::Authentication(
                    "Google account email is not verified.".into(),
                ));
            }
            Some(existing) => self.db.link_google_id(&existing.id, &profile.sub)?,
            None => {
                let user = self.db.create_user(NewUser {
                    name: profile.name.clone().unwrap_or_else(|| email.clone()),
                    email,
                    password_hash: None,
                    role: Role::Student,
                    google_id: Some(profile.sub.clone()),
                })?;
                info!(user_id = %user.id, "user created from Google sign-in");
                user
            }
        };
        self.session(user)
    }
}
