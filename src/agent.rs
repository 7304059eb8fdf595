//! Legal query agent.
//!
//! [`LegalAgent`] answers one query at a time against a fixed
//! [`RetrievalIndex`]: legal prompt → embed → top-k retrieve → QA prompt →
//! generate → append disclaimer. It never mutates itself, so any number of
//! queries can run on it concurrently.
//!
//! [`AgentHandle`] owns the active agent and replaces it after corpus
//! changes. Concurrency policy:
//!
//! - A query clones the current `Arc<LegalAgent>` when it starts and runs to
//!   completion on that snapshot, even if a rebuild swaps in a new agent
//!   meanwhile.
//! - Rebuilds are serialized by a single-writer lock. The new agent is built
//!   next to the old one and swapped in with one short write; readers are
//!   never blocked by indexing.
//! - A failed rebuild leaves the previous agent serving and marks the handle
//!   [`AgentState::Failed`] until the next successful rebuild.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::corpus::Corpus;
use crate::embedding::{EmbeddingProvider, TogetherEmbedding};
use crate::error::{LegalRagError, Result};
use crate::generation::{GenerationBackend, TogetherLlm};
use crate::index::{RetrievalIndex, RetrievedChunk};
use crate::persona::PersonaStore;
use crate::prompt::{format_response, legal_prompt, qa_prompt};

/// The embedding and generation backends shared by every agent instance.
#[derive(Clone)]
pub struct Backends {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub llm: Arc<dyn GenerationBackend>,
}

impl Backends {
    /// Builds the Together AI backends.
    ///
    /// A missing credential is a [`LegalRagError::Configuration`] error; a
    /// client that cannot be constructed is a
    /// [`LegalRagError::Initialization`] error.
    pub fn together(config: &Config) -> Result<Self> {
        let api_key = config.api_key()?;

        let embedder = TogetherEmbedding::new(&config.embedding, api_key.clone())
            .map_err(|e| LegalRagError::Initialization(e.to_string()))?;
        let llm = TogetherLlm::new(&config.generation, api_key)
            .map_err(|e| LegalRagError::Initialization(e.to_string()))?;

        Ok(Self {
            embedder: Arc::new(embedder),
            llm: Arc::new(llm),
        })
    }
}

pub struct LegalAgent {
    config: Arc<Config>,
    backends: Backends,
    persona: Arc<PersonaStore>,
    index: RetrievalIndex,
}

impl LegalAgent {
    /// Loads the corpus and builds a fresh index over it.
    ///
    /// Any failure is a [`LegalRagError::Initialization`] error.
    pub async fn build(
        config: Arc<Config>,
        backends: Backends,
        persona: Arc<PersonaStore>,
    ) -> Result<Self> {
        let corpus = Corpus::new(&config.documents.dir);
        let loader = corpus.clone();
        let documents = tokio::task::spawn_blocking(move || loader.load_documents())
            .await
            .map_err(|e| LegalRagError::Initialization(format!("corpus loader panicked: {}", e)))?
            .map_err(|e| LegalRagError::Initialization(e.to_string()))?;
        if documents.is_empty() {
            warn!(dir = %corpus.dir().display(), "no indexable documents in corpus");
        }

        let index = RetrievalIndex::build(
            &documents,
            backends.embedder.as_ref(),
            config.chunking.max_tokens,
            config.embedding.batch_size,
        )
        .await
        .map_err(|e| LegalRagError::Initialization(format!("failed to build index: {}", e)))?;

        Ok(Self {
            config,
            backends,
            persona,
            index,
        })
    }

    pub fn index(&self) -> &RetrievalIndex {
        &self.index
    }

    /// Returns the chunks retrieved for `query_text`, without generating.
    pub async fn retrieve(&self, query_text: &str) -> Result<Vec<RetrievedChunk>> {
        let query_text = validate_query(query_text)?;
        let prompt = legal_prompt(query_text, &self.persona.disclaimer());
        self.retrieve_for_prompt(&prompt).await
    }

    async fn retrieve_for_prompt(&self, prompt: &str) -> Result<Vec<RetrievedChunk>> {
        let query_vec = self
            .backends
            .embedder
            .embed(prompt)
            .await
            .map_err(|e| {
                error!(error = %e, "query embedding failed");
                LegalRagError::QueryProcessing(format!("query embedding failed: {}", e))
            })?;
        Ok(self
            .index
            .retrieve(&query_vec, self.config.retrieval.similarity_top_k))
    }

    /// Answers `query_text` from the indexed corpus.
    ///
    /// Empty or whitespace-only queries fail with
    /// [`LegalRagError::InvalidInput`] before any backend call. Retrieval and
    /// generation failures are [`LegalRagError::QueryProcessing`] and leave
    /// the agent usable.
    pub async fn query(&self, query_text: &str) -> Result<String> {
        let query_text = validate_query(query_text)?;

        let disclaimer = self.persona.disclaimer();
        let prompt = legal_prompt(query_text, &disclaimer);
        let context = self.retrieve_for_prompt(&prompt).await?;

        let generated = self
            .backends
            .llm
            .complete(&qa_prompt(&context, &prompt))
            .await
            .map_err(|e| {
                error!(error = %e, "generation failed");
                LegalRagError::QueryProcessing(format!("generation failed: {}", e))
            })?;

        info!(
            retrieved = context.len(),
            answer_chars = generated.len(),
            "answered query"
        );

        Ok(format_response(&generated, &disclaimer))
    }
}

fn validate_query(query_text: &str) -> Result<&str> {
    let trimmed = query_text.trim();
    if trimmed.is_empty() {
        return Err(LegalRagError::InvalidInput(
            "query must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Lifecycle of the agent owned by an [`AgentHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Uninitialized,
    Initializing,
    Ready,
    Reinitializing,
    Failed,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Uninitialized => "uninitialized",
            AgentState::Initializing => "initializing",
            AgentState::Ready => "ready",
            AgentState::Reinitializing => "reinitializing",
            AgentState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Shared owner of the active [`LegalAgent`].
pub struct AgentHandle {
    config: Arc<Config>,
    backends: Backends,
    persona: Arc<PersonaStore>,
    current: RwLock<Option<Arc<LegalAgent>>>,
    state: RwLock<AgentState>,
    rebuild: Mutex<()>,
}

impl AgentHandle {
    pub fn new(config: Arc<Config>, backends: Backends, persona: Arc<PersonaStore>) -> Self {
        Self {
            config,
            backends,
            persona,
            current: RwLock::new(None),
            state: RwLock::new(AgentState::Uninitialized),
            rebuild: Mutex::new(()),
        }
    }

    /// Builds the Together backends and the first agent.
    pub async fn start(config: Arc<Config>, persona: Arc<PersonaStore>) -> Result<Self> {
        let backends = Backends::together(&config)?;
        let handle = Self::new(config, backends, persona);
        handle.reinitialize().await?;
        Ok(handle)
    }

    pub fn persona(&self) -> &Arc<PersonaStore> {
        &self.persona
    }

    pub fn state(&self) -> AgentState {
        *self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: AgentState) {
        *self.state.write().unwrap_or_else(|p| p.into_inner()) = state;
    }

    /// The agent queries should run against, if one has been built.
    pub fn snapshot(&self) -> Option<Arc<LegalAgent>> {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn require_snapshot(&self) -> Result<Arc<LegalAgent>> {
        self.snapshot().ok_or_else(|| {
            LegalRagError::QueryProcessing(format!("agent is not available ({})", self.state()))
        })
    }

    pub async fn query(&self, query_text: &str) -> Result<String> {
        validate_query(query_text)?;
        self.require_snapshot()?.query(query_text).await
    }

    pub async fn retrieve(&self, query_text: &str) -> Result<Vec<RetrievedChunk>> {
        validate_query(query_text)?;
        self.require_snapshot()?.retrieve(query_text).await
    }

    /// Discards the current index and builds a new agent from the corpus.
    ///
    /// Concurrent calls run one after another; each one indexes the corpus as
    /// it is when that call acquires the lock.
    pub async fn reinitialize(&self) -> Result<()> {
        let _guard = self.rebuild.lock().await;

        let had_agent = self.snapshot().is_some();
        self.set_state(if had_agent {
            AgentState::Reinitializing
        } else {
            AgentState::Initializing
        });

        match LegalAgent::build(
            self.config.clone(),
            self.backends.clone(),
            self.persona.clone(),
        )
        .await
        {
            Ok(agent) => {
                let chunks = agent.index().len();
                *self.current.write().unwrap_or_else(|p| p.into_inner()) = Some(Arc::new(agent));
                self.set_state(AgentState::Ready);
                info!(chunks, "agent ready");
                Ok(())
            }
            Err(e) => {
                self.set_state(AgentState::Failed);
                error!(error = %e, kept_previous = had_agent, "agent initialization failed");
                Err(e)
            }
        }
    }
}
