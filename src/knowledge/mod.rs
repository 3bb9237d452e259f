//! Knowledge base: PDF ingestion into the vector index and its removal.
//!
//! Ingestion runs extract → chunk → embed → upsert → record. It is not
//! transactional: a failure after the upsert leaves orphan vectors, which a
//! re-ingest overwrites. Deletion runs in the reverse order and stops at the
//! first external failure so the metadata row is never lost while vectors
//! remain.

pub mod chunk;
pub mod pdf;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::{StreamExt, TryStreamExt, stream};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::access::{self, Operation, Resource, Subject};
use crate::embed::Embedder;
use crate::error::AppError;
use crate::store::{Database, KnowledgeDoc, NewKnowledgeDoc, User};
use crate::vector::{ChunkMetadata, VectorIndex, VectorRecord};

/// Concurrent embedding requests per document.
const EMBED_CONCURRENCY: usize = 4;

#[derive(Clone)]
pub struct KnowledgeService {
    db: Arc<Database>,
    embedder: Embedder,
    index: VectorIndex,
    dir: PathBuf,
    chunk_size: usize,
    min_chunk_chars: usize,
}

impl KnowledgeService {
    pub fn new(
        db: Arc<Database>,
        embedder: Embedder,
        index: VectorIndex,
        dir: PathBuf,
        chunk_size: usize,
        min_chunk_chars: usize,
    ) -> Self {
        Self { db, embedder, index, dir, chunk_size, min_chunk_chars }
    }

    pub fn is_configured(&self) -> bool {
        self.embedder.is_configured() && self.index.is_configured()
    }

    pub fn list(&self, actor: &User) -> Result<Vec<KnowledgeDoc>, AppError> {
        access::require(&Subject::of(actor), Operation::ManageKnowledge, &Resource::none())?;
        self.db.list_knowledge_docs()
    }

    /// Store `bytes` under the knowledge directory and ingest it. The stored
    /// file is removed again if any later step fails.
    pub async fn ingest(&self, actor: &User, original_name: &str, bytes: Vec<u8>) -> Result<KnowledgeDoc, AppError> {
        access::require(&Subject::of(actor), Operation::ManageKnowledge, &Resource::none())?;
        if !self.is_configured() {
            return Err(AppError::ExternalServiceUnavailable(
                "Knowledge base is not configured. Set up embedding and vector index providers.".into(),
            ));
        }

        let path = self.store_file(&bytes).await?;
        match self.ingest_stored(actor, original_name, &path, bytes).await {
            Ok(doc) => Ok(doc),
            Err(e) => {
                if let Err(rm) = fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %rm, "failed to remove upload after failed ingestion");
                }
                Err(e)
            }
        }
    }

    async fn ingest_stored(
        &self,
        actor: &User,
        original_name: &str,
        path: &Path,
        bytes: Vec<u8>,
    ) -> Result<KnowledgeDoc, AppError> {
        let file_size = bytes.len() as u64;
        let text = tokio::task::spawn_blocking(move || pdf::extract_text(&bytes))
            .await
            .map_err(|e| AppError::Server(format!("pdf extraction task failed: {e}")))??;
        if text.trim().is_empty() {
            return Err(AppError::UnextractableDocument);
        }

        let chunks = chunk::split(&text, self.chunk_size, self.min_chunk_chars);
        if chunks.is_empty() {
            return Err(AppError::NoIngestibleContent);
        }
        debug!(file = %original_name, chars = text.len(), chunks = chunks.len(), "document chunked");

        let batch = uuid::Uuid::now_v7().simple().to_string();
        let records: Vec<VectorRecord> = stream::iter(chunks)
            .map(|c| {
                let id = format!("{batch}_{}", c.index);
                async move {
                    let values = self.embedder.embed(&c.text).await?;
                    Ok::<_, AppError>(VectorRecord {
                        id,
                        values,
                        metadata: ChunkMetadata { text: c.text, source: original_name.to_string() },
                    })
                }
            })
            .buffered(EMBED_CONCURRENCY)
            .try_collect()
            .await?;

        let vector_ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        self.index.upsert(records).await?;

        let doc = self.db.insert_knowledge_doc(NewKnowledgeDoc {
            original_name: original_name.to_string(),
            stored_path: path.to_string_lossy().into_owned(),
            uploaded_by: actor.id.clone(),
            vector_ids,
            file_size,
        })?;
        info!(doc_id = %doc.id, file = %doc.original_name, chunks = doc.chunk_count, "document ingested");
        Ok(doc)
    }

    /// Remove a document: index vectors first, then the backing file, then
    /// the row. An index failure aborts with nothing removed locally.
    pub async fn delete(&self, actor: &User, id: &str) -> Result<(), AppError> {
        access::require(&Subject::of(actor), Operation::ManageKnowledge, &Resource::none())?;
        let doc = self.db.knowledge_doc(id)?;

        self.index.delete_many(&doc.vector_ids).await?;

        let path = Path::new(&doc.stored_path);
        if fs::try_exists(path).await.unwrap_or(false) {
            if let Err(e) = fs::remove_file(path).await {
                warn!(doc_id = %doc.id, path = %path.display(), error = %e, "failed to remove knowledge file");
            }
        }

        self.db.delete_knowledge_doc(&doc.id)?;
        info!(doc_id = %doc.id, vectors = doc.vector_ids.len(), "document deleted");
        Ok(())
    }

    async fn store_file(&self, bytes: &[u8]) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.dir).await?;
        let millis = chrono::Utc::now().timestamp_millis();
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("knowledge-{millis}.pdf")
            } else {
                format!("knowledge-{millis}-{attempt}.pdf")
            };
            let path = self.dir.join(name);
            match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(mut file) => {
                    tokio::io::AsyncWriteExt::write_all(&mut file, bytes).await?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
