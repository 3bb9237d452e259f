//! In-process cosine similarity index.
//!
//! Brute-force scan over every stored vector. Contents are lost on restart;
//! re-ingest documents after switching to it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use super::{ChunkMetadata, IndexError, VectorMatch, VectorRecord};

#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    entries: Arc<RwLock<HashMap<String, (Vec<f32>, ChunkMetadata)>>>,
    offline: Arc<AtomicBool>,
}

/// Cosine similarity in `[-1, 1]`; zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with [`IndexError::Offline`]
    /// until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().map(|e| e.contains_key(id)).unwrap_or(false)
    }

    fn check_online(&self) -> Result<(), IndexError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(IndexError::Offline)
        } else {
            Ok(())
        }
    }

    pub fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), IndexError> {
        self.check_online()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| IndexError::Request("memory index lock poisoned".into()))?;

        let expected = entries.values().next().map(|(v, _)| v.len());
        for record in records {
            if let Some(expected) = expected {
                if record.values.len() != expected {
                    return Err(IndexError::Dimension { expected, got: record.values.len() });
                }
            }
            entries.insert(record.id, (record.values, record.metadata));
        }
        Ok(())
    }

    pub fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>, IndexError> {
        self.check_online()?;
        let entries = self
            .entries
            .read()
            .map_err(|_| IndexError::Request("memory index lock poisoned".into()))?;

        let mut scored: Vec<VectorMatch> = entries
            .iter()
            .map(|(id, (values, metadata))| VectorMatch {
                id: id.clone(),
                score: cosine_similarity(vector, values),
                metadata: metadata.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(top_k);
        Ok(scored)
    }

    pub fn delete_many(&self, ids: &[String]) -> Result<(), IndexError> {
        self.check_online()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| IndexError::Request("memory index lock poisoned".into()))?;
        for id in ids {
            entries.remove(id);
        }
        Ok(())
    }
}
