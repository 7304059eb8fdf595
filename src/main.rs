//! # Legal RAG CLI (`legal-rag`)
//!
//! ## Usage
//!
//! ```bash
//! legal-rag [--config ./legal-rag.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `legal-rag serve` | Start the HTTP API and web interface |
//! | `legal-rag ask "<query>"...` | Answer queries from the command line |
//! | `legal-rag documents` | List the documents in the corpus |
//!
//! `TOGETHER_API_KEY` must be set (directly or in a `.env` file) for `serve`
//! and `ask`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use legal_rag::agent::AgentHandle;
use legal_rag::config::{load_config, prepare_document_dir};
use legal_rag::corpus::Corpus;
use legal_rag::persona::PersonaStore;
use legal_rag::server::run_server;

/// Queries asked by `ask` when none are given.
const SAMPLE_QUERIES: &[&str] = &[
    "What is this document about and what are its legal implications?",
    "What are the key legal requirements outlined in the document?",
    "Are there any potential legal risks or compliance issues mentioned?",
];

/// Legal RAG: answers legal questions from a local document corpus.
#[derive(Parser)]
#[command(name = "legal-rag", version, about)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and web interface.
    Serve {
        /// Bind address, e.g. `127.0.0.1:8000`. Overrides the config file.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Answer one or more queries and print the responses.
    ///
    /// Runs a few sample questions when no query is given.
    Ask {
        queries: Vec<String>,

        /// Also print the retrieved source chunks.
        #[arg(long)]
        sources: bool,
    },

    /// List the documents in the corpus.
    Documents,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _ = dotenvy::dotenv();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            run_server(config).await?;
        }
        Commands::Ask { queries, sources } => {
            prepare_document_dir(&config.documents.dir)?;
            let config = Arc::new(config);
            let persona = Arc::new(PersonaStore::new(config.persona.clone()));
            let agent = AgentHandle::start(config, persona)
                .await
                .context("failed to initialize the legal agent")?;

            let queries: Vec<String> = if queries.is_empty() {
                SAMPLE_QUERIES.iter().map(|q| q.to_string()).collect()
            } else {
                queries
            };

            for query in &queries {
                println!("\nQuery: {}", query);
                println!("{}", "-".repeat(80));
                if sources {
                    for chunk in agent.retrieve(query).await? {
                        println!("[{:.3}] {}#{}", chunk.score, chunk.document, chunk.chunk_index);
                    }
                    println!("{}", "-".repeat(80));
                }
                match agent.query(query).await {
                    Ok(response) => println!("Response:\n{}\n", response),
                    Err(e) if e.is_recoverable() => eprintln!("Error: {}\n", e),
                    Err(e) => return Err(e.into()),
                }
                println!("{}", "=".repeat(80));
            }
        }
        Commands::Documents => {
            let corpus = Corpus::new(&config.documents.dir);
            let documents = corpus.list()?;
            if documents.is_empty() {
                println!("No documents in {}", corpus.dir().display());
            }
            for doc in documents {
                println!("{:>12}  {}", doc.size_formatted, doc.name);
            }
        }
    }

    Ok(())
}
