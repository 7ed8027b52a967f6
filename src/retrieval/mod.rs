//! Hybrid retrieval: vector search over questions and tag overlap over bodies.
//!
//! The two paths are independent. [`merge::assemble_context`] combines them into
//! the bounded context block handed to the answer generator.

pub mod classifier;
pub mod merge;
pub mod tags;
pub mod vector;

pub use classifier::{OpenAITagClassifier, TagClassifier};
pub use merge::{
    assemble_context, AssembledContext, ContextOrigin, ContextOutcome, ContextSource,
    NO_CONTEXT_MESSAGE,
};
pub use tags::TagRetriever;
pub use vector::VectorRetriever;

use crate::error::SvarError;
use crate::graph_store::Body;
use serde::Serialize;
use std::collections::BTreeSet;

/// A question found by vector search, with its linked body and tags.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionMatch {
    pub question_id: String,
    pub question_text: String,
    /// Cosine similarity to the query.
    pub score: f32,
    pub body: Body,
    /// The body's full tag set.
    pub tags: Vec<String>,
    pub topic: Option<String>,
}

/// A body found by tag overlap.
#[derive(Debug, Clone, Serialize)]
pub struct BodyMatch {
    pub body: Body,
    /// Query tags this body carries. Always a subset of the query tags.
    pub matched_tags: BTreeSet<String>,
    /// `matched_tags.len()`.
    pub match_count: usize,
}

/// Normalize store-level errors to `StoreUnavailable`.
pub(crate) fn store_error(err: SvarError) -> SvarError {
    match err {
        SvarError::Database(e) => SvarError::StoreUnavailable(e.to_string()),
        other => other,
    }
}
