//! HTTP API, static uploads and the WebSocket endpoint, served by axum.
//!
//! ## URL layout
//!
//! ```text
//! POST /api/auth/register | login | refresh | logout
//! GET  /api/auth/me | google | google/callback
//! POST /api/complaints                 GET /api/complaints/my | assigned | all
//! GET  /api/complaints/{id}            PUT /api/complaints/{id}
//! PATCH /api/complaints/{id}/status    POST /api/complaints/{id}/confirm
//! GET|POST /api/categories             PUT|DELETE /api/categories/{id}
//! GET  /api/users | users/staff        PUT|DELETE /api/users/{id}
//! GET  /api/analytics                  POST /api/chatbot
//! GET|POST /api/knowledge              DELETE /api/knowledge/{id}
//! GET  /api/health
//! GET  /ws
//! GET  /uploads/*                      (read-only files)
//! ```

pub mod api;
pub mod extract;
pub mod response;
pub mod validate;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderValue, Method, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::google::GoogleOAuth;
use crate::auth::rate_limit::RateLimits;
use crate::auth::{AuthService, TokenKeys};
use crate::chat::ChatEngine;
use crate::config::Config;
use crate::embed::Embedder;
use crate::error::AppError;
use crate::knowledge::KnowledgeService;
use crate::lifecycle::LifecycleEngine;
use crate::llm::LlmProvider;
use crate::notify::EventBus;
use crate::notify::realtime::Hub;
use crate::runtime::{Component, ComponentFuture};
use crate::store::Database;
use crate::vector::VectorIndex;
use response::InternalErrorDetail;

/// Multipart overhead allowed on top of the largest file cap.
const BODY_SLACK: usize = 1024 * 1024;

/// The external capabilities, built once at startup.
#[derive(Clone)]
pub struct Capabilities {
    pub embedder: Embedder,
    pub index: VectorIndex,
    pub llm: LlmProvider,
}

/// Router state shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub auth: AuthService,
    pub lifecycle: Arc<LifecycleEngine>,
    pub knowledge: KnowledgeService,
    pub chat: ChatEngine,
    pub hub: Arc<Hub>,
    pub limits: RateLimits,
    pub google: Option<GoogleOAuth>,
    pub rag_status: api::health::RagStatus,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        db: Arc<Database>,
        bus: EventBus,
        hub: Arc<Hub>,
        caps: Capabilities,
        shutdown: CancellationToken,
    ) -> Result<Self, AppError> {
        let rag_status = api::health::RagStatus {
            embedding: caps.embedder.name(),
            vector_index: caps.index.name(),
            generation: caps.llm.name(),
        };
        Ok(Self {
            auth: AuthService::new(db.clone(), TokenKeys::new(&config)),
            lifecycle: Arc::new(LifecycleEngine::new(db.clone(), bus)),
            knowledge: KnowledgeService::new(
                db.clone(),
                caps.embedder.clone(),
                caps.index.clone(),
                config.knowledge_dir(),
                config.rag.chunk_size,
                config.rag.min_chunk_chars,
            ),
            chat: ChatEngine::new(&config, caps.embedder, caps.index, caps.llm),
            limits: RateLimits::new(&config.auth.auth_limit, &config.auth.submit_limit)?,
            google: GoogleOAuth::from_config(&config)?,
            rag_status,
            hub,
            db,
            config,
            shutdown,
        })
    }
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let cors = CorsLayer::new()
        .allow_origin(
            HeaderValue::from_str(&state.config.server.client_url)
                .map_err(|e| AppError::Config(format!("invalid client_url: {e}")))?,
        )
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let body_limit = state.config.server.max_upload_bytes.max(state.config.server.max_knowledge_bytes) + BODY_SLACK;
    let uploads = ServeDir::new(state.config.uploads_dir());

    Ok(Router::new()
        .route("/api/auth/register",                post(api::auth::register))
        .route("/api/auth/login",                   post(api::auth::login))
        .route("/api/auth/refresh",                 post(api::auth::refresh))
        .route("/api/auth/logout",                  post(api::auth::logout))
        .route("/api/auth/me",                      get(api::auth::me))
        .route("/api/auth/google",                  get(api::auth::google_start))
        .route("/api/auth/google/callback",         get(api::auth::google_callback))
        .route("/api/complaints",                   post(api::complaints::submit))
        .route("/api/complaints/my",                get(api::complaints::my))
        .route("/api/complaints/assigned",          get(api::complaints::assigned))
        .route("/api/complaints/all",               get(api::complaints::all))
        .route("/api/complaints/{id}",              get(api::complaints::detail).put(api::complaints::update))
        .route("/api/complaints/{id}/status",       patch(api::complaints::update))
        .route("/api/complaints/{id}/confirm",      post(api::complaints::confirm))
        .route("/api/categories",                   get(api::categories::list).post(api::categories::create))
        .route("/api/categories/{id}",              put(api::categories::update).delete(api::categories::remove))
        .route("/api/users",                        get(api::users::list))
        .route("/api/users/staff",                  get(api::users::staff))
        .route("/api/users/{id}",                   put(api::users::update).delete(api::users::remove))
        .route("/api/analytics",                    get(api::analytics::overview))
        .route("/api/chatbot",                      post(api::chatbot::chat))
        .route("/api/knowledge",                    get(api::knowledge::list).post(api::knowledge::upload))
        .route("/api/knowledge/{id}",               delete(api::knowledge::remove))
        .route("/api/health",                       get(api::health::health))
        .route("/ws",                               get(ws::upgrade))
        .nest_service("/uploads", uploads)
        .fallback(api::not_found)
        .layer(middleware::from_fn_with_state(state.clone(), log_server_errors))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Log 5xx responses. Outside production the underlying error is included.
async fn log_server_errors(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;
    if let Some(InternalErrorDetail(detail)) = response.extensions().get::<InternalErrorDetail>() {
        let status = response.status().as_u16();
        if state.config.server.environment.is_production() {
            error!(%method, %path, status, "request failed");
        } else {
            error!(%method, %path, status, %detail, "request failed");
        }
    }
    response
}

// ── Component ─────────────────────────────────────────────────────────────────

pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl Component for HttpServer {
    fn id(&self) -> &str {
        "http"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_http(self.state, shutdown))
    }
}

async fn run_http(state: AppState, shutdown: CancellationToken) -> Result<(), AppError> {
    let bind = state.config.server.bind.clone();
    let uploads = state.config.uploads_dir();
    if let Err(e) = tokio::fs::create_dir_all(&uploads).await {
        warn!(path = %uploads.display(), "cannot create uploads dir: {e}");
    }

    let router = build_router(state)?;
    let listener = TcpListener::bind(&bind)
        .await
        .map_err(|e| AppError::Server(format!("bind failed on {bind}: {e}")))?;

    info!(%bind, "http server listening");

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Server(format!("http server error: {e}")))?;

    info!("http server shut down");
    Ok(())
}
