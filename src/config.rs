//! Service configuration.
//!
//! Configuration is read from an optional TOML file; every section has
//! defaults, so an absent file yields the stock legal assistant setup
//! (Together AI models, `./Documents` corpus, port 8000). A few settings can
//! be overridden from the environment:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `LEGAL_RAG_DOCUMENT_DIR` | `[documents].dir` |
//! | `LEGAL_RAG_BIND` | `[server].bind` |
//!
//! The generation credential is never stored in the file; it is read from
//! the variable named by `[generation].api_key_env` (`TOGETHER_API_KEY`).
//!
//! ```toml
//! [documents]
//! dir = "./Documents"
//!
//! [generation]
//! model = "mistralai/Mixtral-8x7B-Instruct-v0.1"
//! temperature = 0.0
//! max_tokens = 512
//!
//! [retrieval]
//! similarity_top_k = 5
//!
//! [persona]
//! role = "AI Legal Assistant"
//! disclaimer = "Not a substitute for licensed legal counsel."
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::LegalRagError;
use crate::persona::DISCLAIMER_KEY;

pub const DOCUMENT_DIR_ENV: &str = "LEGAL_RAG_DOCUMENT_DIR";
pub const BIND_ENV: &str = "LEGAL_RAG_BIND";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub documents: DocumentsConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub retrieval: RetrievalConfig,
    pub chunking: ChunkingConfig,
    pub server: ServerConfig,
    pub persona: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            documents: DocumentsConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            retrieval: RetrievalConfig::default(),
            chunking: ChunkingConfig::default(),
            server: ServerConfig::default(),
            persona: default_persona(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DocumentsConfig {
    pub dir: PathBuf,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./Documents"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub base_url: String,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "togethercomputer/m2-bert-80M-8k-retrieval".to_string(),
            base_url: default_base_url(),
            batch_size: 32,
            max_retries: 0,
            timeout_secs: 60,
        }
    }
}

/// LLM endpoint and sampling parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub top_k: u32,
    pub repetition_penalty: f64,
    /// Chat-completions endpoint when true; otherwise the raw completions
    /// endpoint with an `[INST]`-wrapped prompt.
    pub chat_model: bool,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "mistralai/Mixtral-8x7B-Instruct-v0.1".to_string(),
            base_url: default_base_url(),
            api_key_env: "TOGETHER_API_KEY".to_string(),
            temperature: 0.0,
            max_tokens: 512,
            top_p: 0.9,
            top_k: 35,
            repetition_penalty: 1.1,
            chat_model: true,
            max_retries: 0,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub similarity_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_top_k: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: 512 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            static_dir: PathBuf::from("static"),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

fn default_base_url() -> String {
    "https://api.together.xyz/v1".to_string()
}

/// The persona the assistant starts with when none is configured.
pub fn default_persona() -> BTreeMap<String, String> {
    [
        ("role", "AI Legal Assistant"),
        ("expertise", "Legal document analysis and consultation"),
        ("tone", "Professional and formal"),
        (
            "context",
            "Specialized in analyzing legal documents and providing legal insights",
        ),
        (
            "disclaimer",
            "This AI provides legal information based on available documents but does not \
             substitute for licensed legal counsel.",
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Config {
    /// Reads the generation credential from the environment.
    ///
    /// A missing or blank key is a [`LegalRagError::Configuration`] error;
    /// there is no way to serve queries without it.
    pub fn api_key(&self) -> Result<String, LegalRagError> {
        let var = &self.generation.api_key_env;
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(LegalRagError::Configuration(format!(
                "{} environment variable is not set",
                var
            ))),
        }
    }

    /// Falls back to the default persona when none is configured, and to the
    /// default disclaimer when a configured persona omits one.
    pub fn complete_persona(&mut self) {
        if self.persona.is_empty() {
            self.persona = default_persona();
            return;
        }
        if !self.persona.contains_key(DISCLAIMER_KEY) {
            warn!("[persona] has no disclaimer, using the default");
            if let Some(disclaimer) = default_persona().remove(DISCLAIMER_KEY) {
                self.persona.insert(DISCLAIMER_KEY.to_string(), disclaimer);
            }
        }
    }

    /// Applies `LEGAL_RAG_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var(DOCUMENT_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.documents.dir = PathBuf::from(dir);
            }
        }
        if let Ok(bind) = std::env::var(BIND_ENV) {
            if !bind.trim().is_empty() {
                self.server.bind = bind;
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.generation.temperature < 0.0 {
            bail!("generation.temperature must be >= 0");
        }
        if !(self.generation.top_p > 0.0 && self.generation.top_p <= 1.0) {
            bail!("generation.top_p must be in (0.0, 1.0]");
        }
        if self.generation.max_tokens == 0 {
            bail!("generation.max_tokens must be > 0");
        }
        if self.retrieval.similarity_top_k == 0 {
            bail!("retrieval.similarity_top_k must be >= 1");
        }
        if self.chunking.max_tokens == 0 {
            bail!("chunking.max_tokens must be > 0");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        Ok(())
    }
}

/// Loads configuration from `path`, or defaults when `path` is `None`.
///
/// Environment overrides are applied after parsing and the result is
/// validated.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };

    config.complete_persona();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Creates the document directory if it is missing, then checks it with
/// [`validate_document_dir`].
pub fn prepare_document_dir(dir: &Path) -> Result<(), LegalRagError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| {
            LegalRagError::Configuration(format!(
                "cannot create document directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        info!(dir = %dir.display(), "created document directory");
    }
    validate_document_dir(dir)
}

/// Checks the document directory invariant: it must exist and be a
/// directory. An empty directory only produces a warning.
pub fn validate_document_dir(dir: &Path) -> Result<(), LegalRagError> {
    if !dir.exists() {
        return Err(LegalRagError::Configuration(format!(
            "document directory does not exist: {}",
            dir.display()
        )));
    }
    if !dir.is_dir() {
        return Err(LegalRagError::Configuration(format!(
            "document path is not a directory: {}",
            dir.display()
        )));
    }
    let is_empty = std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .map_err(|e| {
            LegalRagError::Configuration(format!(
                "cannot read document directory {}: {}",
                dir.display(),
                e
            ))
        })?;
    if is_empty {
        warn!(dir = %dir.display(), "document directory is empty");
    }
    Ok(())
}
