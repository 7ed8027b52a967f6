//! Svar - hybrid graph and vector RAG over Q&A transcripts
//!
//! Answers questions from a knowledge graph built out of transcribed Q&A videos.
//!
//! The name "Svar" is the Norwegian/Scandinavian word for "answer."
//!
//! # Overview
//!
//! Each past question is stored with its answer body, the body's topic tags and an
//! embedding of the question. A chat request:
//! - classifies the question into tags from a controlled vocabulary
//! - finds similar past questions by vector search
//! - finds bodies sharing the most tags
//! - merges both into one context block and asks an LLM to answer from it
//!
//! # Architecture
//!
//! - `config` - Settings, prompts and the tag vocabulary
//! - `embedding` - Embedding generation
//! - `graph_store` - Question/body/tag graph with a vector index
//! - `text_source` - Resolution of body text (inline or linked)
//! - `retrieval` - Tag classifier, vector and tag retrievers, context merger
//! - `rag` - Answer generation and the chat pipeline
//! - `ingest` - Loading Q&A records into the graph
//! - `orchestrator` - Component wiring
//!
//! # Example
//!
//! ```rust,no_run
//! use svar::config::{LlmProvider, Settings};
//! use svar::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let reply = orchestrator
//!         .rag_engine()
//!         .chat("Is salt ok while fasting?", LlmProvider::OpenAI)
//!         .await?;
//!     println!("{}", reply.response);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod graph_store;
pub mod ingest;
pub mod openai;
pub mod orchestrator;
pub mod rag;
pub mod retrieval;
pub mod text_source;

pub use error::{Result, SvarError};
