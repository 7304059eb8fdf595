//! Test doubles for the embedding and generation backends.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use legal_rag::agent::{AgentHandle, Backends};
use legal_rag::config::Config;
use legal_rag::embedding::EmbeddingProvider;
use legal_rag::error::BackendError;
use legal_rag::generation::GenerationBackend;
use legal_rag::persona::PersonaStore;

/// Terms the mock embedder counts, as whole words. None of them occurs as a
/// word in the legal prompt template, so a query vector reflects only the
/// user's words.
pub const VOCABULARY: &[&str] = &["zephyrium", "lease", "patent", "merger", "arbitration"];

/// Embeds text as `[1.0, whole-word count of each VOCABULARY term]`.
#[derive(Default)]
pub struct VocabularyEmbedder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl EmbeddingProvider for VocabularyEmbedder {
    fn model_name(&self) -> &str {
        "vocabulary"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                provider: "vocabulary".into(),
                status: 503,
                message: "embedding service unavailable".into(),
            });
        }
        Ok(texts
            .iter()
            .map(|t| vocabulary_vector(t))
            .collect())
    }
}

pub fn vocabulary_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    std::iter::once(1.0)
        .chain(
            VOCABULARY
                .iter()
                .map(|term| words.iter().filter(|w| *w == term).count() as f32),
        )
        .collect()
}

/// Returns a fixed answer and records every prompt it receives.
pub struct RecordingLlm {
    pub answer: String,
    pub prompts: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl RecordingLlm {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl GenerationBackend for RecordingLlm {
    fn model_name(&self) -> &str {
        "recording"
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::InvalidResponse {
                provider: "recording".into(),
                message: "no choices in response".into(),
            });
        }
        Ok(self.answer.clone())
    }
}

pub struct Harness {
    pub config: Arc<Config>,
    pub embedder: Arc<VocabularyEmbedder>,
    pub llm: Arc<RecordingLlm>,
    pub persona: Arc<PersonaStore>,
}

impl Harness {
    pub fn new(document_dir: &Path, top_k: usize) -> Self {
        let mut config = Config::default();
        config.documents.dir = document_dir.to_path_buf();
        config.retrieval.similarity_top_k = top_k;
        let config = Arc::new(config);

        Self {
            persona: Arc::new(PersonaStore::new(config.persona.clone())),
            config,
            embedder: Arc::new(VocabularyEmbedder::default()),
            llm: Arc::new(RecordingLlm::new("  The documents address the question.\n")),
        }
    }

    pub fn backends(&self) -> Backends {
        Backends {
            embedder: self.embedder.clone(),
            llm: self.llm.clone(),
        }
    }

    /// A handle with its first agent already built.
    pub async fn handle(&self) -> AgentHandle {
        let handle = AgentHandle::new(self.config.clone(), self.backends(), self.persona.clone());
        handle.reinitialize().await.expect("initial index build");
        handle
    }
}
