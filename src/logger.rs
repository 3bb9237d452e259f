//! Process-wide tracing setup for the API server and the seed tool.
//!
//! The filter comes from `log_level` in config or `RUST_LOG`. Which one wins
//! depends on whether `CAMPUS_DESK_LOG_LEVEL` was set explicitly.

use tracing_subscriber::EnvFilter;

use crate::config::Environment;
use crate::error::AppError;

/// Install the global subscriber, writing to stderr.
///
/// Development gets coloured output; production writes plain lines.
pub fn init(level: &str, prefer_level: bool, environment: Environment) -> Result<(), AppError> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = resolve_filter(level, rust_log.as_deref(), prefer_level)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!environment.is_production())
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

/// Pick between the configured `level` and `RUST_LOG`.
///
/// Both accept a bare level or full directives such as
/// `campus_desk=debug,tower_http=info`. The preferred source is tried first
/// and the other one only if it fails to parse. A blank `RUST_LOG` counts as
/// unset.
pub fn resolve_filter(level: &str, rust_log: Option<&str>, prefer_level: bool) -> Result<EnvFilter, AppError> {
    let rust_log = rust_log.map(str::trim).filter(|v| !v.is_empty());
    let from_level = || EnvFilter::try_new(level).map_err(|e| format!("log_level '{level}': {e}"));
    let from_env = || match rust_log {
        Some(v) => EnvFilter::try_new(v).map_err(|e| format!("RUST_LOG '{v}': {e}")),
        None => Err("RUST_LOG unset".to_string()),
    };

    let resolved = if prefer_level {
        from_level().or_else(|a| from_env().map_err(|b| format!("{a}; {b}")))
    } else {
        from_env().or_else(|a| from_level().map_err(|b| format!("{a}; {b}")))
    };
    resolved.map_err(AppError::Logger)
}
