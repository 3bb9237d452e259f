//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the file named by `CAMPUS_DESK_CONFIG`),
//! then applies `CAMPUS_DESK_WORK_DIR`, `CAMPUS_DESK_LOG_LEVEL` and
//! `CAMPUS_DESK_BIND`. Secrets (JWT keys, provider API keys) are only ever
//! sourced from the environment, never from TOML.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use rand_core::{OsRng, RngCore};
use serde::Deserialize;

use crate::error::AppError;

const DB_FILENAME: &str = "campus-desk.db";
const UPLOADS_DIR: &str = "uploads";
const KNOWLEDGE_DIR: &str = "knowledge";
const OUTBOX_DIR: &str = "outbox";

/// Deployment environment. Controls cookie flags, error detail and log colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address the API listens on.
    pub bind: String,
    /// Front-end origin, used for CORS and OAuth redirects.
    pub client_url: String,
    pub environment: Environment,
    /// Cap for complaint attachments.
    pub max_upload_bytes: usize,
    /// Cap for knowledge-base PDFs.
    pub max_knowledge_bytes: usize,
    /// Key rate limits on the first `X-Forwarded-For` hop instead of the
    /// peer address. Only enable behind a proxy that overwrites the header.
    pub trust_proxy: bool,
}

/// A fixed-window request budget: `max_requests` per `window_seconds`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
}

/// Token lifetimes, rate limits and federated-login settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    /// Applies to register + login.
    pub auth_limit: RateLimitConfig,
    /// Applies to complaint submission.
    pub submit_limit: RateLimitConfig,
    /// Callback URL registered with Google.
    pub google_redirect_uri: String,
}

/// Google Gemini settings (`[llm.gemini]`), shared by generation and embeddings.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

/// OpenAI / OpenAI-compatible settings (`[llm.openai]`).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Full embeddings endpoint URL.
    pub embeddings_url: String,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

/// Generation provider selection.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// `"none"`, `"dummy"`, `"gemini"` or `"openai"`. Named `default` in TOML.
    pub provider: String,
    pub gemini: GeminiConfig,
    pub openai: OpenAiConfig,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// `"none"`, `"dummy"`, `"gemini"` or `"openai"`.
    pub provider: String,
    pub dimensions: usize,
}

#[derive(Debug, Clone)]
pub struct PineconeConfig {
    /// Index host, e.g. `https://campus-knowledge-abc123.svc.pinecone.io`.
    pub host: String,
    pub namespace: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct VectorConfig {
    /// `"none"`, `"memory"` or `"pinecone"`.
    pub provider: String,
    pub pinecone: PineconeConfig,
}

/// Retrieval and ingestion tuning.
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub top_k: usize,
    pub chunk_size: usize,
    pub min_chunk_chars: usize,
    /// Closed label set offered to the classifier, catch-all included.
    pub categories: Vec<String>,
    pub catch_all: String,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    /// `"disabled"`, `"outbox"` or `"http"`.
    pub transport: String,
    pub from: String,
    /// Relay endpoint for the `http` transport.
    pub http_endpoint: String,
}

/// Secrets resolved from the environment.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub jwt_secret: Option<String>,
    pub jwt_refresh_secret: Option<String>,
    pub llm_api_key: Option<String>,
    pub pinecone_api_key: Option<String>,
    pub pinecone_host: Option<String>,
    pub mail_api_key: Option<String>,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let var = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            jwt_secret: var("JWT_SECRET"),
            jwt_refresh_secret: var("JWT_REFRESH_SECRET"),
            llm_api_key: var("LLM_API_KEY"),
            pinecone_api_key: var("PINECONE_API_KEY"),
            pinecone_host: var("PINECONE_HOST"),
            mail_api_key: var("MAIL_API_KEY"),
            google_client_id: var("GOOGLE_CLIENT_ID"),
            google_client_secret: var("GOOGLE_CLIENT_SECRET"),
        }
    }
}

/// Google OAuth client credentials, present only when both halves are set.
#[derive(Debug, Clone)]
pub struct GoogleCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Fully-resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    /// Root for the database, uploads and the mail outbox (no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub vector: VectorConfig,
    pub rag: RagConfig,
    pub mail: MailConfig,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub llm_api_key: Option<String>,
    pub pinecone_api_key: Option<String>,
    pub mail_api_key: Option<String>,
    pub google: Option<GoogleCredentials>,
}

impl Config {
    pub fn db_path(&self) -> PathBuf {
        self.work_dir.join(DB_FILENAME)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.work_dir.join(UPLOADS_DIR)
    }

    pub fn knowledge_dir(&self) -> PathBuf {
        self.uploads_dir().join(KNOWLEDGE_DIR)
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.work_dir.join(OUTBOX_DIR)
    }
}

/// Overrides collected from the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub work_dir: Option<String>,
    pub log_level: Option<String>,
    pub bind: Option<String>,
    pub secrets: Secrets,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            work_dir: env::var("CAMPUS_DESK_WORK_DIR").ok(),
            log_level: env::var("CAMPUS_DESK_LOG_LEVEL").ok(),
            bind: env::var("CAMPUS_DESK_BIND").ok(),
            secrets: Secrets::from_env(),
        }
    }
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    server: RawServer,
    #[serde(default)]
    auth: RawAuth,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    embedding: RawEmbedding,
    #[serde(default)]
    vector: RawVector,
    #[serde(default)]
    rag: RawRag,
    #[serde(default)]
    mail: RawMail,
}

#[derive(Deserialize)]
struct RawServer {
    #[serde(default = "default_app_name")]
    app_name: String,
    work_dir: String,
    log_level: String,
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_client_url")]
    client_url: String,
    #[serde(default = "default_environment")]
    environment: Environment,
    #[serde(default = "default_max_upload_bytes")]
    max_upload_bytes: usize,
    #[serde(default = "default_max_knowledge_bytes")]
    max_knowledge_bytes: usize,
    #[serde(default)]
    trust_proxy: bool,
}

#[derive(Deserialize)]
struct RawAuth {
    #[serde(default = "default_access_ttl_minutes")]
    access_ttl_minutes: i64,
    #[serde(default = "default_refresh_ttl_days")]
    refresh_ttl_days: i64,
    #[serde(default = "default_auth_limit")]
    auth_limit: RawRateLimit,
    #[serde(default = "default_submit_limit")]
    submit_limit: RawRateLimit,
    #[serde(default = "default_google_redirect_uri")]
    google_redirect_uri: String,
}

impl Default for RawAuth {
    fn default() -> Self {
        Self {
            access_ttl_minutes: default_access_ttl_minutes(),
            refresh_ttl_days: default_refresh_ttl_days(),
            auth_limit: default_auth_limit(),
            submit_limit: default_submit_limit(),
            google_redirect_uri: default_google_redirect_uri(),
        }
    }
}

#[derive(Deserialize, Clone, Copy)]
struct RawRateLimit {
    max_requests: u32,
    window_seconds: u64,
}

#[derive(Deserialize)]
struct RawLlm {
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    gemini: RawGemini,
    #[serde(default)]
    openai: RawOpenAi,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            gemini: RawGemini::default(),
            openai: RawOpenAi::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawGemini {
    #[serde(default = "default_gemini_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_gemini_model")]
    model: String,
    #[serde(default = "default_gemini_embedding_model")]
    embedding_model: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawGemini {
    fn default() -> Self {
        Self {
            api_base_url: default_gemini_api_base_url(),
            model: default_gemini_model(),
            embedding_model: default_gemini_embedding_model(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawOpenAi {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_embeddings_url")]
    embeddings_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_openai_embedding_model")]
    embedding_model: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAi {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            embeddings_url: default_openai_embeddings_url(),
            model: default_openai_model(),
            embedding_model: default_openai_embedding_model(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawEmbedding {
    #[serde(default = "default_embedding_provider")]
    provider: String,
    #[serde(default = "default_dimensions")]
    dimensions: usize,
}

impl Default for RawEmbedding {
    fn default() -> Self {
        Self { provider: default_embedding_provider(), dimensions: default_dimensions() }
    }
}

#[derive(Deserialize)]
struct RawVector {
    #[serde(default = "default_vector_provider")]
    provider: String,
    #[serde(default)]
    pinecone: RawPinecone,
}

impl Default for RawVector {
    fn default() -> Self {
        Self { provider: default_vector_provider(), pinecone: RawPinecone::default() }
    }
}

#[derive(Deserialize, Default)]
struct RawPinecone {
    #[serde(default)]
    host: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

#[derive(Deserialize)]
struct RawRag {
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,
    #[serde(default = "default_min_chunk_chars")]
    min_chunk_chars: usize,
    #[serde(default = "default_rag_categories")]
    categories: Vec<String>,
    #[serde(default = "default_catch_all")]
    catch_all: String,
}

impl Default for RawRag {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            chunk_size: default_chunk_size(),
            min_chunk_chars: default_min_chunk_chars(),
            categories: default_rag_categories(),
            catch_all: default_catch_all(),
        }
    }
}

#[derive(Deserialize)]
struct RawMail {
    #[serde(default = "default_mail_transport")]
    transport: String,
    #[serde(default = "default_mail_from")]
    from: String,
    #[serde(default)]
    http_endpoint: String,
}

impl Default for RawMail {
    fn default() -> Self {
        Self {
            transport: default_mail_transport(),
            from: default_mail_from(),
            http_endpoint: String::new(),
        }
    }
}

fn default_app_name() -> String { "Campus Desk".to_string() }
fn default_bind() -> String { "127.0.0.1:5000".to_string() }
fn default_client_url() -> String { "http://localhost:5173".to_string() }
fn default_environment() -> Environment { Environment::Development }
fn default_max_upload_bytes() -> usize { 10 * 1024 * 1024 }
fn default_max_knowledge_bytes() -> usize { 20 * 1024 * 1024 }
fn default_access_ttl_minutes() -> i64 { 15 }
fn default_refresh_ttl_days() -> i64 { 7 }
fn default_auth_limit() -> RawRateLimit { RawRateLimit { max_requests: 20, window_seconds: 15 * 60 } }
fn default_submit_limit() -> RawRateLimit { RawRateLimit { max_requests: 10, window_seconds: 15 * 60 } }
fn default_google_redirect_uri() -> String { "http://localhost:5000/api/auth/google/callback".to_string() }
fn default_llm_provider() -> String { "dummy".to_string() }
fn default_gemini_api_base_url() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }
fn default_gemini_model() -> String { "gemini-flash-latest".to_string() }
fn default_gemini_embedding_model() -> String { "gemini-embedding-001".to_string() }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_embeddings_url() -> String { "https://api.openai.com/v1/embeddings".to_string() }
fn default_openai_model() -> String { "gpt-4o-mini".to_string() }
fn default_openai_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_temperature() -> f32 { 0.2 }
fn default_timeout_seconds() -> u64 { 60 }
fn default_embedding_provider() -> String { "none".to_string() }
fn default_dimensions() -> usize { 768 }
fn default_vector_provider() -> String { "none".to_string() }
fn default_top_k() -> usize { 5 }
fn default_chunk_size() -> usize { 1000 }
fn default_min_chunk_chars() -> usize { 20 }
fn default_catch_all() -> String { "Other".to_string() }
fn default_mail_transport() -> String { "disabled".to_string() }
fn default_mail_from() -> String { "Campus Desk <no-reply@campus-desk.local>".to_string() }

fn default_rag_categories() -> Vec<String> {
    [
        "Dormitory Issues",
        "Laboratory Equipment",
        "Internet & Network",
        "Classroom Facilities",
        "Other",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Load config from the default location, then apply env-var overrides.
pub fn load() -> Result<Config, AppError> {
    let path = env::var("CAMPUS_DESK_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    load_from(Path::new(&path), EnvOverrides::from_env())
}

/// Internal loader. Accepts an explicit path and overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(path: &Path, overrides: EnvOverrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let s = parsed.server;
    let work_dir = expand_home(overrides.work_dir.as_deref().unwrap_or(&s.work_dir));
    let log_level = overrides.log_level.unwrap_or(s.log_level);
    let bind = overrides.bind.unwrap_or(s.bind);
    let secrets = overrides.secrets;

    let jwt_secret = resolve_secret("JWT_SECRET", secrets.jwt_secret, s.environment)?;
    let jwt_refresh_secret =
        resolve_secret("JWT_REFRESH_SECRET", secrets.jwt_refresh_secret, s.environment)?;

    let rag = parsed.rag;
    if rag.chunk_size == 0 {
        return Err(AppError::Config("rag.chunk_size must be > 0".into()));
    }
    if !rag.categories.iter().any(|c| c == &rag.catch_all) {
        return Err(AppError::Config(format!(
            "rag.categories must include the catch-all label '{}'",
            rag.catch_all
        )));
    }

    let pinecone = parsed.vector.pinecone;
    let google = match (secrets.google_client_id, secrets.google_client_secret) {
        (Some(client_id), Some(client_secret)) => Some(GoogleCredentials { client_id, client_secret }),
        _ => None,
    };

    Ok(Config {
        app_name: s.app_name,
        work_dir,
        log_level,
        server: ServerConfig {
            bind,
            client_url: s.client_url,
            environment: s.environment,
            max_upload_bytes: s.max_upload_bytes,
            max_knowledge_bytes: s.max_knowledge_bytes,
            trust_proxy: s.trust_proxy,
        },
        auth: AuthConfig {
            access_ttl_minutes: parsed.auth.access_ttl_minutes,
            refresh_ttl_days: parsed.auth.refresh_ttl_days,
            auth_limit: parsed.auth.auth_limit.into(),
            submit_limit: parsed.auth.submit_limit.into(),
            google_redirect_uri: parsed.auth.google_redirect_uri,
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            gemini: GeminiConfig {
                api_base_url: parsed.llm.gemini.api_base_url,
                model: parsed.llm.gemini.model,
                embedding_model: parsed.llm.gemini.embedding_model,
                temperature: parsed.llm.gemini.temperature,
                timeout_seconds: parsed.llm.gemini.timeout_seconds,
            },
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                embeddings_url: parsed.llm.openai.embeddings_url,
                model: parsed.llm.openai.model,
                embedding_model: parsed.llm.openai.embedding_model,
                temperature: parsed.llm.openai.temperature,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
        },
        embedding: EmbeddingConfig {
            provider: parsed.embedding.provider,
            dimensions: parsed.embedding.dimensions,
        },
        vector: VectorConfig {
            provider: parsed.vector.provider,
            pinecone: PineconeConfig {
                host: secrets.pinecone_host.unwrap_or(pinecone.host),
                namespace: pinecone.namespace,
                timeout_seconds: pinecone.timeout_seconds.unwrap_or(30),
            },
        },
        rag: RagConfig {
            top_k: rag.top_k,
            chunk_size: rag.chunk_size,
            min_chunk_chars: rag.min_chunk_chars,
            categories: rag.categories,
            catch_all: rag.catch_all,
        },
        mail: MailConfig {
            transport: parsed.mail.transport,
            from: parsed.mail.from,
            http_endpoint: parsed.mail.http_endpoint,
        },
        jwt_secret,
        jwt_refresh_secret,
        llm_api_key: secrets.llm_api_key,
        pinecone_api_key: secrets.pinecone_api_key,
        mail_api_key: secrets.mail_api_key,
        google,
    })
}

impl From<RawRateLimit> for RateLimitConfig {
    fn from(raw: RawRateLimit) -> Self {
        Self { max_requests: raw.max_requests, window_seconds: raw.window_seconds }
    }
}

/// Production refuses to start without a signing secret. Development falls
/// back to a per-process random key, so tokens die with the process.
fn resolve_secret(
    name: &str,
    value: Option<String>,
    environment: Environment,
) -> Result<String, AppError> {
    match value {
        Some(v) => Ok(v),
        None if environment.is_production() => {
            Err(AppError::Config(format!("{name} must be set in production")))
        }
        None => {
            let mut bytes = [0u8; 32];
            OsRng.fill_bytes(&mut bytes);
            Ok(hex::encode(bytes))
        }
    }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

impl Config {
    /// Safe `Config` for tests: dummy generation, no network capabilities,
    /// disabled mail, fixed secrets.
    pub fn test_default(work_dir: &Path) -> Self {
        Self {
            app_name: "Campus Desk".into(),
            work_dir: work_dir.to_path_buf(),
            log_level: "info".into(),
            server: ServerConfig {
                bind: "127.0.0.1:0".into(),
                client_url: default_client_url(),
                environment: Environment::Development,
                max_upload_bytes: default_max_upload_bytes(),
                max_knowledge_bytes: default_max_knowledge_bytes(),
                trust_proxy: false,
            },
            auth: AuthConfig {
                access_ttl_minutes: default_access_ttl_minutes(),
                refresh_ttl_days: default_refresh_ttl_days(),
                auth_limit: default_auth_limit().into(),
                submit_limit: default_submit_limit().into(),
                google_redirect_uri: default_google_redirect_uri(),
            },
            llm: LlmConfig {
                provider: "dummy".into(),
                gemini: GeminiConfig {
                    api_base_url: "http://localhost:0".into(),
                    model: "test-model".into(),
                    embedding_model: "test-embedding".into(),
                    temperature: 0.0,
                    timeout_seconds: 1,
                },
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    embeddings_url: "http://localhost:0/v1/embeddings".into(),
                    model: "test-model".into(),
                    embedding_model: "test-embedding".into(),
                    temperature: 0.0,
                    timeout_seconds: 1,
                },
            },
            embedding: EmbeddingConfig { provider: "none".into(), dimensions: 16 },
            vector: VectorConfig {
                provider: "none".into(),
                pinecone: PineconeConfig {
                    host: String::new(),
                    namespace: String::new(),
                    timeout_seconds: 1,
                },
            },
            rag: RagConfig {
                top_k: default_top_k(),
                chunk_size: default_chunk_size(),
                min_chunk_chars: default_min_chunk_chars(),
                categories: default_rag_categories(),
                catch_all: default_catch_all(),
            },
            mail: MailConfig {
                transport: "disabled".into(),
                from: default_mail_from(),
                http_endpoint: String::new(),
            },
            jwt_secret: "test-access-secret".into(),
            jwt_refresh_secret: "test-refresh-secret".into(),
            llm_api_key: None,
            pinecone_api_key: None,
            mail_api_key: None,
            google: None,
        }
    }
}
