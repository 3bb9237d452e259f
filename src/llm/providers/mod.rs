//! LLM provider implementations.
//!
//! `build(config, api_key)` is the factory, called at startup.

pub mod dummy;
pub mod gemini;
pub mod openai_compatible;

use crate::config::LlmConfig;
use crate::llm::{LlmProvider, ProviderError};

/// Construct a `LlmProvider` from config and an optional API key.
///
/// `api_key` comes from `LLM_API_KEY` (never TOML). Hosted backends without
/// a key resolve to [`LlmProvider::Unconfigured`] so the chat path degrades
/// to its fallback reply instead of failing at startup.
pub fn build(config: &LlmConfig, api_key: Option<String>) -> Result<LlmProvider, ProviderError> {
    match config.provider.as_str() {
        "none" | "" => Ok(LlmProvider::Unconfigured),
        "dummy" => Ok(LlmProvider::Dummy(dummy::DummyProvider::default())),
        "openai" | "openai-compatible" => {
            let oai = &config.openai;
            let p = openai_compatible::OpenAiCompatibleProvider::new(
                oai.api_base_url.clone(),
                oai.model.clone(),
                oai.temperature,
                oai.timeout_seconds,
                api_key,
            )?;
            Ok(LlmProvider::OpenAiCompatible(p))
        }
        "gemini" => {
            let Some(key) = api_key else {
                return Ok(LlmProvider::Unconfigured);
            };
            let g = &config.gemini;
            let p = gemini::GeminiProvider::new(
                g.api_base_url.clone(),
                g.model.clone(),
                g.temperature,
                g.timeout_seconds,
                key,
            )?;
            Ok(LlmProvider::Gemini(p))
        }
        _ => Err(ProviderError::UnknownProvider(config.provider.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn gemini_without_key_is_unconfigured() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut cfg = Config::test_default(dir.path()).llm;
        cfg.provider = "gemini".into();
        assert!(!build(&cfg, None).unwrap().is_configured());
        assert!(build(&cfg, Some("k".into())).unwrap().is_configured());
    }

    #[test]
    fn unknown_provider_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut cfg = Config::test_default(dir.path()).llm;
        cfg.provider = "qwen".into();
        assert!(matches!(build(&cfg, None), Err(ProviderError::UnknownProvider(_))));
    }
}
