//! RAG (Retrieval-Augmented Generation) over the Q&A graph.
//!
//! A chat request classifies the question into tags and embeds it, runs both
//! retrieval paths concurrently, merges their bodies into one context block and
//! asks an LLM to answer from that context only.

mod engine;
pub mod generator;

pub use engine::{ChatReply, ChatStage, RagEngine, RagOptions, Retrieval};
pub use generator::{AnswerGenerator, OpenAIGenerator};
