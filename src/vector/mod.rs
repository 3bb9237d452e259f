//! Vector index capability: upsert, nearest-neighbour query, delete by id.
//!
//! Backends:
//! - `memory`: in-process cosine index, for development and tests;
//! - `pinecone`: the Pinecone data-plane REST API.
//!
//! Like the other capabilities it is an enum with an explicit
//! `Unconfigured` variant.

pub mod memory;
pub mod pinecone;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::error::AppError;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector index not configured")]
    NotConfigured,
    #[error("vector index unavailable")]
    Offline,
    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    Dimension { expected: usize, got: usize },
    #[error("vector index request failed: {0}")]
    Request(String),
}

impl From<IndexError> for AppError {
    fn from(e: IndexError) -> Self {
        AppError::ExternalServiceUnavailable(e.to_string())
    }
}

/// Metadata stored alongside every chunk vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub text: String,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone)]
pub enum VectorIndex {
    Unconfigured,
    Memory(memory::MemoryIndex),
    Pinecone(pinecone::PineconeIndex),
}

impl VectorIndex {
    /// Build from `[vector]`. Pinecone without an API key or host resolves
    /// to `Unconfigured`.
    pub fn build(config: &Config) -> Result<Self, AppError> {
        match config.vector.provider.as_str() {
            "none" | "" => Ok(VectorIndex::Unconfigured),
            "memory" => Ok(VectorIndex::Memory(memory::MemoryIndex::new())),
            "pinecone" => {
                let pc = &config.vector.pinecone;
                match (&config.pinecone_api_key, pc.host.is_empty()) {
                    (Some(key), false) => Ok(VectorIndex::Pinecone(pinecone::PineconeIndex::new(
                        pc.host.clone(),
                        pc.namespace.clone(),
                        key.clone(),
                        pc.timeout_seconds,
                    )?)),
                    _ => Ok(VectorIndex::Unconfigured),
                }
            }
            other => Err(AppError::Config(format!("unknown vector provider: {other}"))),
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, VectorIndex::Unconfigured)
    }

    pub fn name(&self) -> &'static str {
        match self {
            VectorIndex::Unconfigured => "none",
            VectorIndex::Memory(_) => "memory",
            VectorIndex::Pinecone(_) => "pinecone",
        }
    }

    pub async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), IndexError> {
        match self {
            VectorIndex::Unconfigured => Err(IndexError::NotConfigured),
            VectorIndex::Memory(idx) => idx.upsert(records),
            VectorIndex::Pinecone(idx) => idx.upsert(records).await,
        }
    }

    /// The `top_k` nearest records, most similar first.
    pub async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>, IndexError> {
        match self {
            VectorIndex::Unconfigured => Err(IndexError::NotConfigured),
            VectorIndex::Memory(idx) => idx.query(vector, top_k),
            VectorIndex::Pinecone(idx) => idx.query(vector, top_k).await,
        }
    }

    pub async fn delete_many(&self, ids: &[String]) -> Result<(), IndexError> {
        if ids.is_empty() {
            return Ok(());
        }
        match self {
            VectorIndex::Unconfigured => Err(IndexError::NotConfigured),
            VectorIndex::Memory(idx) => idx.delete_many(ids),
            VectorIndex::Pinecone(idx) => idx.delete_many(ids).await,
        }
    }
}
