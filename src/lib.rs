//! # Legal RAG
//!
//! A retrieval-augmented legal document assistant.
//!
//! Documents in a local corpus directory are extracted, chunked and embedded
//! into an in-memory index. A query is wrapped in a legal-analysis prompt,
//! the most similar chunks are retrieved, and a hosted LLM writes the answer,
//! which always ends with the persona's disclaimer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//! │   Corpus    │──▶│ Extract+Chunk │──▶│   Index    │
//! │ ./Documents │   │   +Embed     │   │ (in-memory)│
//! └─────────────┘   └──────────────┘   └─────┬──────┘
//!                                            │
//!                    ┌───────────────────────┤
//!                    ▼                       ▼
//!              ┌──────────┐           ┌────────────┐
//!              │   CLI    │           │ HTTP (axum)│
//!              │ (ask)    │           │  /api/*    │
//!              └──────────┘           └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML/env configuration and directory validation |
//! | [`error`] | Error taxonomy |
//! | [`persona`] | Persona/context store |
//! | [`corpus`] | Document upload, listing, deletion and loading |
//! | [`extract`] | PDF/DOCX/RTF/DOC text extraction |
//! | [`chunk`] | Paragraph-boundary chunking |
//! | [`embedding`] | Embedding backend trait and Together client |
//! | [`generation`] | Generation backend trait and Together client |
//! | [`index`] | In-memory vector index |
//! | [`prompt`] | Prompt templates |
//! | [`agent`] | Query agent and rebuild handle |
//! | [`server`] | HTTP API |

pub mod agent;
pub mod chunk;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod index;
pub mod persona;
pub mod prompt;
pub mod server;
