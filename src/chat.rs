//! Retrieval-augmented chat: embed the question, pull the nearest chunks from
//! the vector index, answer from them, and suggest a complaint category.
//!
//! [`ChatEngine::reply`] never fails. Missing capabilities produce a static
//! greeting, and any provider error collapses into one apology.

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::embed::Embedder;
use crate::error::AppError;
use crate::llm::LlmProvider;
use crate::vector::VectorIndex;

const NO_CONTEXT: &str = "No specific documentation found for this query.";
const APOLOGY: &str = "❌ I encountered an error processing your request. Please try again later.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub reply: String,
    pub suggested_category: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatEngine {
    embedder: Embedder,
    index: VectorIndex,
    llm: LlmProvider,
    app_name: String,
    top_k: usize,
    labels: Vec<String>,
    catch_all: String,
}

impl ChatEngine {
    pub fn new(config: &Config, embedder: Embedder, index: VectorIndex, llm: LlmProvider) -> Self {
        Self {
            embedder,
            index,
            llm,
            app_name: config.app_name.clone(),
            top_k: config.rag.top_k,
            labels: config.rag.categories.clone(),
            catch_all: config.rag.catch_all.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.embedder.is_configured() && self.index.is_configured() && self.llm.is_configured()
    }

    pub fn greeting(&self) -> String {
        format!(
            "👋 **Hi there!** This is the {} assistant.\n\n\
             Ask me about dormitories, laboratories, the campus network or classrooms, \
             and describe any problem you are having.",
            self.app_name
        )
    }

    pub async fn reply(&self, message: &str) -> ChatReply {
        if !self.is_configured() {
            return ChatReply { reply: self.greeting(), suggested_category: None };
        }
        match self.answer(message).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "chat request failed");
                ChatReply { reply: APOLOGY.to_string(), suggested_category: None }
            }
        }
    }

    async fn answer(&self, message: &str) -> Result<ChatReply, AppError> {
        let query = self.embedder.embed(message).await?;
        let matches = self.index.query(&query, self.top_k).await?;
        debug!(matches = matches.len(), "retrieved context");

        let context = matches
            .iter()
            .map(|m| m.metadata.text.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");

        let system = format!(
            "You are the {} assistant, helping university students and staff.\n\
             Answer the question from the provided context. If the context does not contain \
             the answer, use general knowledge and say that it is not from official documentation.\n\
             Keep answers concise and use markdown (bold, lists).",
            self.app_name
        );
        let prompt = format!(
            "Context:\n{}\n\nQuestion: {message}\n\nAnswer:",
            if context.is_empty() { NO_CONTEXT } else { context.as_str() }
        );
        let reply = self.llm.complete(&prompt, Some(&system)).await?;

        let classify = format!(
            "Which category fits this message best? Choose ONLY ONE from: {}. \
             Give only the category name.\n\nMessage: {message}",
            self.labels.join(", ")
        );
        let label = self.llm.complete(&classify, None).await?;

        Ok(ChatReply {
            reply: reply.trim().to_string(),
            suggested_category: self.match_label(&label),
        })
    }

    /// Map a model answer onto one of the configured labels. The catch-all
    /// and anything unrecognised map to `None`.
    fn match_label(&self, raw: &str) -> Option<String> {
        let cleaned = raw.trim().trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '.');
        self.labels
            .iter()
            .find(|l| l.eq_ignore_ascii_case(cleaned))
            .filter(|l| **l != self.catch_all)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::DummyEmbedder;
    use crate::llm::providers::dummy::DummyProvider;
    use crate::vector::memory::MemoryIndex;
    use crate::vector::{ChunkMetadata, VectorRecord};
    use tempfile::TempDir;

    fn config() -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        let cfg = Config::test_default(dir.path());
        (dir, cfg)
    }

    fn embedder() -> Embedder {
        Embedder::Dummy(DummyEmbedder { dimensions: 64 })
    }

    async fn seeded_index(embedder: &Embedder, texts: &[&str]) -> MemoryIndex {
        let idx = MemoryIndex::new();
        for (i, t) in texts.iter().enumerate() {
            idx.upsert(vec![VectorRecord {
                id: format!("doc_{i}"),
                values: embedder.embed(t).await.unwrap(),
                metadata: ChunkMetadata { text: t.to_string(), source: "handbook.pdf".into() },
            }])
            .unwrap();
        }
        idx
    }

    #[tokio::test]
    async fn unconfigured_capabilities_return_greeting() {
        let (_d, cfg) = config();
        let engine = ChatEngine::new(
            &cfg,
            Embedder::Unconfigured,
            VectorIndex::Memory(MemoryIndex::new()),
            LlmProvider::Dummy(DummyProvider::default()),
        );
        let out = engine.reply("hello").await;
        assert_eq!(out.reply, engine.greeting());
        assert!(out.reply.contains("Campus Desk"));
        assert_eq!(out.suggested_category, None);
    }

    #[tokio::test]
    async fn retrieved_context_reaches_the_prompt() {
        let (_d, cfg) = config();
        let e = embedder();
        let idx = seeded_index(&e, &["The library wifi password rotates every Monday."]).await;
        let engine = ChatEngine::new(&cfg, e, VectorIndex::Memory(idx), LlmProvider::Dummy(DummyProvider::default()));

        let out = engine.reply("When does the wifi password change?").await;
        assert!(out.reply.starts_with("[echo] Context:"));
        assert!(out.reply.contains("rotates every Monday"));
        assert_eq!(out.suggested_category, None);
    }

    #[tokio::test]
    async fn empty_index_uses_placeholder_context() {
        let (_d, cfg) = config();
        let engine = ChatEngine::new(
            &cfg,
            embedder(),
            VectorIndex::Memory(MemoryIndex::new()),
            LlmProvider::Dummy(DummyProvider::default()),
        );
        let out = engine.reply("anything").await;
        assert!(out.reply.contains(NO_CONTEXT));
    }

    #[tokio::test]
    async fn suggestion_is_matched_and_catch_all_suppressed() {
        let (_d, cfg) = config();
        let llm = LlmProvider::Dummy(DummyProvider::scripted([
            "Call maintenance.",
            "  internet & network.\n",
            "Some answer",
            "Other",
            "Some answer",
            "Parking",
        ]));
        let engine = ChatEngine::new(&cfg, embedder(), VectorIndex::Memory(MemoryIndex::new()), llm);

        let out = engine.reply("The wifi in block C is down").await;
        assert_eq!(out.reply, "Call maintenance.");
        assert_eq!(out.suggested_category.as_deref(), Some("Internet & Network"));
        assert_eq!(engine.reply("hm").await.suggested_category, None);
        assert_eq!(engine.reply("where do I park").await.suggested_category, None);
    }

    #[tokio::test]
    async fn index_outage_yields_apology() {
        let (_d, cfg) = config();
        let idx = MemoryIndex::new();
        idx.set_offline(true);
        let engine = ChatEngine::new(&cfg, embedder(), VectorIndex::Memory(idx), LlmProvider::Dummy(DummyProvider::default()));
        let out = engine.reply("hello").await;
        assert_eq!(out.reply, APOLOGY);
        assert_eq!(out.suggested_category, None);
    }
}
