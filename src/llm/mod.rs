//! Text generation provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations; add a
//! variant + module in `providers/` for each backend. Instances are shared
//! immutable capabilities, clone them freely.

pub mod providers;

use thiserror::Error;

use crate::error::AppError;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider not configured")]
    NotConfigured,
    #[error("provider request failed: {0}")]
    Request(String),
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::UnknownProvider(name) => AppError::Config(format!("unknown provider: {name}")),
            other => AppError::ExternalServiceUnavailable(other.to_string()),
        }
    }
}

/// All available generation backends.
///
/// Enum dispatch keeps the call sites free of trait objects.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// No backend configured; every call fails with `NotConfigured`.
    Unconfigured,
    Dummy(providers::dummy::DummyProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
    Gemini(providers::gemini::GeminiProvider),
}

impl LlmProvider {
    pub fn is_configured(&self) -> bool {
        !matches!(self, LlmProvider::Unconfigured)
    }

    /// Short backend name for health output and logs.
    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Unconfigured => "none",
            LlmProvider::Dummy(_) => "dummy",
            LlmProvider::OpenAiCompatible(_) => "openai",
            LlmProvider::Gemini(_) => "gemini",
        }
    }

    /// One round-trip: `content` as the user turn, `system` as instructions.
    pub async fn complete(&self, content: &str, system: Option<&str>) -> Result<String, ProviderError> {
        match self {
            LlmProvider::Unconfigured => Err(ProviderError::NotConfigured),
            LlmProvider::Dummy(p) => p.complete(content).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(content, system).await,
            LlmProvider::Gemini(p) => p.complete(content, system).await,
        }
    }
}
