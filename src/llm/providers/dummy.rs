//! Dummy LLM provider: echoes input back prefixed with `[echo]`, or plays
//! back scripted replies in order when some were queued.
//! Used for exercising the chat pipeline without a real API key.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::llm::ProviderError;

#[derive(Debug, Clone, Default)]
pub struct DummyProvider {
    script: Arc<Mutex<VecDeque<String>>>,
}

impl DummyProvider {
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { script: Arc::new(Mutex::new(replies.into_iter().map(Into::into).collect())) }
    }

    pub async fn complete(&self, content: &str) -> Result<String, ProviderError> {
        let scripted = self.script.lock().ok().and_then(|mut q| q.pop_front());
        Ok(scripted.unwrap_or_else(|| format!("[echo] {content}")))
    }
}
