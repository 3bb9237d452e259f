//! Campus Desk API server entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Init logger once
//!   4. Open the database
//!   5. Build capabilities (generation, embeddings, vector index, mail)
//!   6. Build the event bus and the real-time hub
//!   7. Spawn components: HTTP server, real-time fan-out, email worker
//!   8. Spawn Ctrl-C → shutdown signal watcher
//!   9. Join components

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use campus_desk::config;
use campus_desk::embed::Embedder;
use campus_desk::error::AppError;
use campus_desk::http::{AppState, Capabilities, HttpServer};
use campus_desk::llm::providers;
use campus_desk::logger;
use campus_desk::notify::EventBus;
use campus_desk::notify::mailer::{EmailWorker, Mailer};
use campus_desk::notify::realtime::{Hub, RealtimeFanout};
use campus_desk::runtime::{self, Component};
use campus_desk::store::Database;
use campus_desk::vector::VectorIndex;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let config = config::load()?;
    let prefer_level = std::env::var("CAMPUS_DESK_LOG_LEVEL").is_ok();
    logger::init(&config.log_level, prefer_level, config.server.environment)?;

    info!(
        app = %config.app_name,
        work_dir = %config.work_dir.display(),
        environment = ?config.server.environment,
        "config loaded"
    );

    std::fs::create_dir_all(&config.work_dir)?;
    let db = Arc::new(Database::open(&config.db_path())?);

    let caps = Capabilities {
        llm: providers::build(&config.llm, config.llm_api_key.clone())?,
        embedder: Embedder::build(&config)?,
        index: VectorIndex::build(&config)?,
    };
    let mailer = Mailer::build(&config.mail, config.outbox_dir(), config.mail_api_key.clone())?;

    info!(
        generation = caps.llm.name(),
        embedding = caps.embedder.name(),
        vector_index = caps.index.name(),
        mail = mailer.is_configured(),
        "capabilities ready"
    );
    if !(caps.llm.is_configured() && caps.embedder.is_configured() && caps.index.is_configured()) {
        warn!("assistant capabilities incomplete; chat will answer with a greeting only");
    }

    let shutdown = CancellationToken::new();
    let bus = EventBus::new();
    let hub = Arc::new(Hub::new());
    let config = Arc::new(config);

    let state = AppState::new(config.clone(), db, bus.clone(), hub.clone(), caps, shutdown.clone())?;

    // Workers subscribe before the server starts so no event is missed.
    let components: Vec<Box<dyn Component>> = vec![
        Box::new(RealtimeFanout::new(hub, &bus)),
        Box::new(EmailWorker::new(mailer, config.app_name.clone(), &bus)),
        Box::new(HttpServer::new(state)),
    ];

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    let handle = runtime::spawn_components(components, shutdown.clone());
    let result = handle.join().await;
    shutdown.cancel();
    info!("shutdown complete");
    result
}
