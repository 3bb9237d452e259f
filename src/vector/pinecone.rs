//! Pinecone data-plane client (`/vectors/upsert`, `/query`, `/vectors/delete`).

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{ChunkMetadata, IndexError, VectorMatch, VectorRecord};

const API_VERSION: &str = "2024-07";
/// Pinecone caps upsert requests; stay well under it.
const UPSERT_BATCH: usize = 100;

#[derive(Debug, Clone)]
pub struct PineconeIndex {
    client: Client,
    host: String,
    namespace: String,
    api_key: String,
}

impl PineconeIndex {
    pub fn new(host: String, namespace: String, api_key: String, timeout_seconds: u64) -> Result<Self, IndexError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| IndexError::Request(format!("failed to build HTTP client: {e}")))?;
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{host}")
        };
        Ok(Self { client, host: host.trim_end_matches('/').to_string(), namespace, api_key })
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(&self, path: &str, body: &B) -> Result<R, IndexError> {
        let url = format!("{}{path}", self.host);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(%url, error = %e, "pinecone request failed (transport)");
                IndexError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%url, %status, "pinecone returned HTTP error");
            return Err(IndexError::Request(format!("HTTP {status}: {body}")));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| IndexError::Request(format!("failed to parse pinecone response: {e}")))
    }

    pub async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), IndexError> {
        for batch in records.chunks(UPSERT_BATCH) {
            let body = UpsertRequest {
                vectors: batch
                    .iter()
                    .map(|r| WireVector { id: &r.id, values: &r.values, metadata: &r.metadata })
                    .collect(),
                namespace: &self.namespace,
            };
            let resp: UpsertResponse = self.post("/vectors/upsert", &body).await?;
            debug!(upserted = resp.upserted_count, "pinecone upsert batch done");
        }
        Ok(())
    }

    pub async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>, IndexError> {
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            namespace: &self.namespace,
        };
        let resp: QueryResponse = self.post("/query", &body).await?;
        Ok(resp
            .matches
            .into_iter()
            .filter_map(|m| {
                m.metadata.map(|metadata| VectorMatch { id: m.id, score: m.score, metadata })
            })
            .collect())
    }

    pub async fn delete_many(&self, ids: &[String]) -> Result<(), IndexError> {
        let body = DeleteRequest { ids, namespace: &self.namespace };
        let _: serde_json::Value = self.post("/vectors/delete", &body).await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct WireVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a ChunkMetadata,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<WireVector<'a>>,
    namespace: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    namespace: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: f32,
    metadata: Option<ChunkMetadata>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
    namespace: &'a str,
}
