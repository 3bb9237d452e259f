//! Text embedding capability.
//!
//! Same shape as [`crate::llm::LlmProvider`]: an enum over backends, built
//! once at startup, with an explicit `Unconfigured` variant that callers
//! check through [`Embedder::is_configured`].

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error};

use crate::config::Config;
use crate::llm::ProviderError;
use crate::llm::providers::openai_compatible::check_status;

#[derive(Debug, Clone)]
pub enum Embedder {
    Unconfigured,
    Dummy(DummyEmbedder),
    Gemini(GeminiEmbedder),
    OpenAi(OpenAiEmbedder),
}

impl Embedder {
    /// Build from `[embedding]`, reusing the `[llm]` provider sub-tables for
    /// endpoints and models. Hosted Gemini without a key is unconfigured.
    pub fn build(config: &Config) -> Result<Self, ProviderError> {
        let dims = config.embedding.dimensions;
        match config.embedding.provider.as_str() {
            "none" | "" => Ok(Embedder::Unconfigured),
            "dummy" => Ok(Embedder::Dummy(DummyEmbedder { dimensions: dims })),
            "gemini" => {
                let Some(key) = config.llm_api_key.clone() else {
                    return Ok(Embedder::Unconfigured);
                };
                let g = &config.llm.gemini;
                Ok(Embedder::Gemini(GeminiEmbedder {
                    client: http_client(g.timeout_seconds)?,
                    api_base_url: g.api_base_url.clone(),
                    model: g.embedding_model.clone(),
                    dimensions: dims,
                    api_key: key,
                }))
            }
            "openai" => {
                let o = &config.llm.openai;
                Ok(Embedder::OpenAi(OpenAiEmbedder {
                    client: http_client(o.timeout_seconds)?,
                    url: o.embeddings_url.clone(),
                    model: o.embedding_model.clone(),
                    dimensions: dims,
                    api_key: config.llm_api_key.clone(),
                }))
            }
            other => Err(ProviderError::UnknownProvider(other.to_string())),
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, Embedder::Unconfigured)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Embedder::Unconfigured => "none",
            Embedder::Dummy(_) => "dummy",
            Embedder::Gemini(_) => "gemini",
            Embedder::OpenAi(_) => "openai",
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let vector = match self {
            Embedder::Unconfigured => return Err(ProviderError::NotConfigured),
            Embedder::Dummy(e) => e.embed(text),
            Embedder::Gemini(e) => e.embed(text).await?,
            Embedder::OpenAi(e) => e.embed(text).await?,
        };
        if vector.is_empty() {
            return Err(ProviderError::Request("embedding response was empty".into()));
        }
        Ok(vector)
    }
}

fn http_client(timeout_seconds: u64) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))
}

// ── Dummy ─────────────────────────────────────────────────────────────────────

/// Deterministic bag-of-words embedding: each lowercase token is hashed into
/// one of `dimensions` buckets and the result is L2-normalised. Texts that
/// share words land close together, which is all the tests need.
#[derive(Debug, Clone)]
pub struct DummyEmbedder {
    pub dimensions: usize,
}

impl DummyEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let dims = self.dimensions.max(1);
        let mut v = vec![0f32; dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
        {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
            ]) as usize
                % dims;
            v[bucket] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        } else {
            v[0] = 1.0;
        }
        v
    }
}

// ── Gemini ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    client: Client,
    api_base_url: String,
    model: String,
    dimensions: usize,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiEmbedRequest<'a> {
    content: GeminiContent<'a>,
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GeminiEmbedResponse {
    embedding: GeminiValues,
}

#[derive(Deserialize)]
struct GeminiValues {
    values: Vec<f32>,
}

impl GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!(
            "{}/models/{}:embedContent",
            self.api_base_url.trim_end_matches('/'),
            self.model
        );
        let payload = GeminiEmbedRequest {
            content: GeminiContent { parts: vec![GeminiPart { text }] },
            output_dimensionality: self.dimensions,
        };
        debug!(model = %self.model, text_len = text.len(), "requesting Gemini embedding");
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "embedding request failed (transport)");
                ProviderError::Request(e.to_string())
            })?;
        let parsed = check_status(response)
            .await?
            .json::<GeminiEmbedResponse>()
            .await
            .map_err(|e| ProviderError::Request(format!("failed to parse embedding response: {e}")))?;
        Ok(parsed.embedding.values)
    }
}

// ── OpenAI ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    url: String,
    model: String,
    dimensions: usize,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let payload = OpenAiEmbedRequest { model: &self.model, input: text, dimensions: self.dimensions };
        let mut req = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req.send().await.map_err(|e| {
            error!(error = %e, "embedding request failed (transport)");
            ProviderError::Request(e.to_string())
        })?;
        let parsed = check_status(response)
            .await?
            .json::<OpenAiEmbedResponse>()
            .await
            .map_err(|e| ProviderError::Request(format!("failed to parse embedding response: {e}")))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::Request("embedding response had no data".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn dummy_is_deterministic_and_normalised() {
        let e = DummyEmbedder { dimensions: 32 };
        let a = e.embed("Wifi is down in the library");
        assert_eq!(a, e.embed("wifi IS down in the library"));
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn dummy_similarity_tracks_shared_words() {
        let e = DummyEmbedder { dimensions: 256 };
        let q = e.embed("library opening hours");
        let near = e.embed("The library opening hours are 8am to 10pm");
        let far = e.embed("Cafeteria serves lunch from noon");
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }

    #[test]
    fn empty_text_still_yields_a_unit_vector() {
        let v = DummyEmbedder { dimensions: 4 }.embed("   ");
        assert_eq!(v, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn unconfigured_refuses() {
        assert!(!Embedder::Unconfigured.is_configured());
        assert!(matches!(Embedder::Unconfigured.embed("x").await, Err(ProviderError::NotConfigured)));
    }

    #[test]
    fn build_follows_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut cfg = Config::test_default(dir.path());
        assert!(!Embedder::build(&cfg).unwrap().is_configured());
        cfg.embedding.provider = "dummy".into();
        assert_eq!(Embedder::build(&cfg).unwrap().name(), "dummy");
        cfg.embedding.provider = "gemini".into();
        assert!(!Embedder::build(&cfg).unwrap().is_configured());
        cfg.llm_api_key = Some("key".into());
        assert_eq!(Embedder::build(&cfg).unwrap().name(), "gemini");
    }

    #[test]
    fn gemini_request_shape() {
        let req = GeminiEmbedRequest {
            content: GeminiContent { parts: vec![GeminiPart { text: "hello" }] },
            output_dimensionality: 768,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["outputDimensionality"], 768);
        assert_eq!(v["content"]["parts"][0]["text"], "hello");
    }
}
