//! Graph store abstraction for Svar.
//!
//! The store holds `Question`, `Body`, `Tag` and `Topic` nodes linked by
//! `HAS_BODY`, `HAS_TAG` and `HAS_TOPIC` edges, plus a vector index over question
//! embeddings. Retrieval only reads from it; the ingest loader is the sole writer.

mod memory;
mod sqlite;

pub use memory::MemoryGraphStore;
pub use sqlite::SqliteGraphStore;

#[cfg(test)]
pub(crate) use testing::UnavailableStore;

use crate::error::{Result, SvarError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Name of the vector index over `Question.embedding`.
pub const QUESTION_VECTOR_INDEX: &str = "question_embedding";

/// Similarity function used by the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityMetric {
    Cosine,
}

impl SimilarityMetric {
    /// Score two vectors; higher is more similar.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            SimilarityMetric::Cosine => cosine_similarity(a, b),
        }
    }
}

/// The one metric every vector search uses.
pub const SIMILARITY_METRIC: SimilarityMetric = SimilarityMetric::Cosine;

/// A question node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Unique, stable question ID.
    pub id: String,
    /// The question text.
    pub text: String,
    /// Date of the source video, as recorded at ingestion.
    pub date: Option<String>,
    /// Embedding of `text`.
    pub embedding: Vec<f32>,
}

/// A body node: the answer content linked to a question.
///
/// Text is either stored inline or referenced by `text_link`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    /// Unique body ID.
    pub id: String,
    /// Inline text, when stored in the graph.
    pub text: Option<String>,
    /// Pointer to externally stored text.
    pub text_link: Option<String>,
    /// Date of the source video.
    pub date: Option<String>,
}

impl Body {
    /// A short label for logs: the link if present, else the ID.
    pub fn label(&self) -> &str {
        self.text_link.as_deref().unwrap_or(&self.id)
    }
}

/// A question with everything hanging off it, written in one step.
#[derive(Debug, Clone)]
pub struct QuestionRecord {
    pub question: Question,
    pub body: Body,
    /// Topic name; created if missing.
    pub topic: Option<String>,
    /// Tag words; created if missing. Callers filter against the vocabulary.
    pub tags: Vec<String>,
}

/// One vector index hit.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    /// Matched question ID.
    pub question_id: String,
    /// Matched question text.
    pub question_text: String,
    /// Similarity under [`SIMILARITY_METRIC`].
    pub score: f32,
}

/// Node counts, for `svar stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub questions: usize,
    pub bodies: usize,
    pub tags: usize,
    pub topics: usize,
    pub tag_edges: usize,
}

/// Trait for graph store implementations.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Nearest questions to `query`, most similar first. Equal scores keep insertion order.
    ///
    /// A query whose width differs from the indexed embeddings is an `Embedding` error.
    async fn vector_search(&self, index: &str, query: &[f32], top_k: usize) -> Result<Vec<VectorHit>>;

    /// Follow `HAS_BODY` from a question.
    async fn body_for_question(&self, question_id: &str) -> Result<Option<Body>>;

    /// Follow `HAS_TAG` from a body. Distinct words, sorted.
    async fn tags_for_body(&self, body_id: &str) -> Result<Vec<String>>;

    /// Bodies linked to a tag, in edge order. A duplicated edge yields the body twice.
    async fn bodies_with_tag(&self, tag: &str) -> Result<Vec<Body>>;

    /// Follow `HAS_TOPIC` from a question.
    async fn topic_for_question(&self, question_id: &str) -> Result<Option<String>>;

    /// Number of questions in the vector index.
    async fn question_count(&self) -> Result<usize>;

    /// Embedding width fixed by the first stored question. `None` while empty.
    async fn index_dimensions(&self) -> Result<Option<usize>>;

    /// Node and edge counts.
    async fn stats(&self) -> Result<GraphStats>;

    /// Create a question. Its embedding must match the store's dimension.
    async fn insert_question(&self, question: &Question) -> Result<()>;

    /// Create a body.
    async fn insert_body(&self, body: &Body) -> Result<()>;

    /// Link a question to its single body.
    async fn link_body(&self, question_id: &str, body_id: &str) -> Result<()>;

    /// Idempotent upsert of a tag node.
    async fn get_or_create_tag(&self, word: &str) -> Result<String>;

    /// Append a `HAS_TAG` edge. Edges are not deduplicated.
    async fn link_tag(&self, body_id: &str, word: &str) -> Result<()>;

    /// Idempotent upsert of a topic node.
    async fn get_or_create_topic(&self, name: &str) -> Result<String>;

    /// Set a question's topic.
    async fn link_topic(&self, question_id: &str, name: &str) -> Result<()>;

    /// Write a question, its body, topic and tags. Either all of it lands or none does.
    async fn insert_record(&self, record: &QuestionRecord) -> Result<()>;
}

/// Reject a query vector that cannot be compared with the index.
pub(crate) fn check_query_width(indexed: Option<usize>, query: &[f32]) -> Result<()> {
    match indexed {
        Some(dims) if dims != query.len() => Err(SvarError::Embedding(format!(
            "Query has {} dimensions but the index was built with {}; \
             the embedding model differs from the one used at ingest",
            query.len(),
            dims
        ))),
        _ => Ok(()),
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Rank scored items by similarity, descending. The sort is stable.
pub(crate) fn rank_hits(mut hits: Vec<VectorHit>, top_k: usize) -> Vec<VectorHit> {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(top_k);
    hits
}

#[cfg(test)]
mod testing {
    use super::*;

    /// A store whose backend is down.
    pub(crate) struct UnavailableStore;

    fn down<T>() -> Result<T> {
        Err(SvarError::StoreUnavailable("connection refused".to_string()))
    }

    #[async_trait]
    impl GraphStore for UnavailableStore {
        async fn vector_search(&self, _: &str, _: &[f32], _: usize) -> Result<Vec<VectorHit>> {
            down()
        }
        async fn body_for_question(&self, _: &str) -> Result<Option<Body>> {
            down()
        }
        async fn tags_for_body(&self, _: &str) -> Result<Vec<String>> {
            down()
        }
        async fn bodies_with_tag(&self, _: &str) -> Result<Vec<Body>> {
            down()
        }
        async fn topic_for_question(&self, _: &str) -> Result<Option<String>> {
            down()
        }
        async fn question_count(&self) -> Result<usize> {
            down()
        }
        async fn index_dimensions(&self) -> Result<Option<usize>> {
            down()
        }
        async fn stats(&self) -> Result<GraphStats> {
            down()
        }
        async fn insert_question(&self, _: &Question) -> Result<()> {
            down()
        }
        async fn insert_body(&self, _: &Body) -> Result<()> {
            down()
        }
        async fn link_body(&self, _: &str, _: &str) -> Result<()> {
            down()
        }
        async fn get_or_create_tag(&self, _: &str) -> Result<String> {
            down()
        }
        async fn link_tag(&self, _: &str, _: &str) -> Result<()> {
            down()
        }
        async fn get_or_create_topic(&self, _: &str) -> Result<String> {
            down()
        }
        async fn link_topic(&self, _: &str, _: &str) -> Result<()> {
            down()
        }
        async fn insert_record(&self, _: &QuestionRecord) -> Result<()> {
            down()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);

        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_metric_is_cosine() {
        assert_eq!(SIMILARITY_METRIC, SimilarityMetric::Cosine);
        // Cosine ignores magnitude.
        assert!((SIMILARITY_METRIC.score(&[2.0, 0.0], &[5.0, 0.0]) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_query_width_must_match_index() {
        assert!(check_query_width(None, &[1.0, 0.0, 0.0]).is_ok());
        assert!(check_query_width(Some(3), &[1.0, 0.0, 0.0]).is_ok());
        assert!(matches!(
            check_query_width(Some(2), &[1.0, 0.0, 0.0]),
            Err(SvarError::Embedding(_))
        ));
    }

    #[test]
    fn test_rank_hits_is_stable() {
        let hit = |id: &str, score: f32| VectorHit {
            question_id: id.to_string(),
            question_text: String::new(),
            score,
        };
        let ranked = rank_hits(vec![hit("a", 0.5), hit("b", 0.9), hit("c", 0.5)], 3);
        let ids: Vec<_> = ranked.iter().map(|h| h.question_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
