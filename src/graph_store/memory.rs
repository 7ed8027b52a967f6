//! In-memory graph store implementation.
//!
//! Useful for testing and small datasets.

use super::{
    check_query_width, rank_hits, Body, GraphStats, GraphStore, Question, QuestionRecord,
    VectorHit, QUESTION_VECTOR_INDEX, SIMILARITY_METRIC,
};
use crate::error::{Result, SvarError};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Graph {
    /// Questions in insertion order.
    questions: Vec<Question>,
    question_index: HashMap<String, usize>,
    bodies: HashMap<String, Body>,
    /// question id -> body id
    has_body: HashMap<String, String>,
    /// (body id, tag word) in insertion order.
    has_tag: Vec<(String, String)>,
    tags: BTreeSet<String>,
    topics: BTreeSet<String>,
    /// question id -> topic name
    has_topic: HashMap<String, String>,
    dimensions: Option<usize>,
}

impl Graph {
    fn check_question(&self, question: &Question) -> Result<()> {
        if self.question_index.contains_key(&question.id) {
            return Err(SvarError::InvalidInput(format!("Question {} already exists", question.id)));
        }
        match self.dimensions {
            Some(dims) if dims != question.embedding.len() => Err(SvarError::InvalidInput(format!(
                "Question {} has {} dimensions, index uses {}",
                question.id,
                question.embedding.len(),
                dims
            ))),
            _ => Ok(()),
        }
    }

    fn check_body(&self, body: &Body) -> Result<()> {
        if self.bodies.contains_key(&body.id) {
            return Err(SvarError::InvalidInput(format!("Body {} already exists", body.id)));
        }
        Ok(())
    }

    /// Callers run `check_question` first.
    fn push_question(&mut self, question: &Question) {
        self.dimensions.get_or_insert(question.embedding.len());
        self.question_index
            .insert(question.id.clone(), self.questions.len());
        self.questions.push(question.clone());
    }
}

/// In-memory graph store.
pub struct MemoryGraphStore {
    graph: RwLock<Graph>,
}

impl MemoryGraphStore {
    /// Create a new in-memory graph store.
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(Graph::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Graph>> {
        self.graph
            .read()
            .map_err(|e| SvarError::StoreUnavailable(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Graph>> {
        self.graph
            .write()
            .map_err(|e| SvarError::StoreUnavailable(format!("Failed to acquire lock: {}", e)))
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn vector_search(&self, index: &str, query: &[f32], top_k: usize) -> Result<Vec<VectorHit>> {
        if index != QUESTION_VECTOR_INDEX {
            return Err(SvarError::InvalidInput(format!("Unknown vector index: {}", index)));
        }

        let graph = self.read()?;
        check_query_width(graph.dimensions, query)?;
        let hits = graph
            .questions
            .iter()
            .map(|q| VectorHit {
                question_id: q.id.clone(),
                question_text: q.text.clone(),
                score: SIMILARITY_METRIC.score(query, &q.embedding),
            })
            .collect();

        Ok(rank_hits(hits, top_k))
    }

    async fn body_for_question(&self, question_id: &str) -> Result<Option<Body>> {
        let graph = self.read()?;
        Ok(graph
            .has_body
            .get(question_id)
            .and_then(|body_id| graph.bodies.get(body_id))
            .cloned())
    }

    async fn tags_for_body(&self, body_id: &str) -> Result<Vec<String>> {
        let graph = self.read()?;
        let tags: BTreeSet<String> = graph
            .has_tag
            .iter()
            .filter(|(b, _)| b == body_id)
            .map(|(_, t)| t.clone())
            .collect();
        Ok(tags.into_iter().collect())
    }

    async fn bodies_with_tag(&self, tag: &str) -> Result<Vec<Body>> {
        let graph = self.read()?;
        Ok(graph
            .has_tag
            .iter()
            .filter(|(_, t)| t == tag)
            .filter_map(|(b, _)| graph.bodies.get(b).cloned())
            .collect())
    }

    async fn topic_for_question(&self, question_id: &str) -> Result<Option<String>> {
        let graph = self.read()?;
        Ok(graph.has_topic.get(question_id).cloned())
    }

    async fn question_count(&self) -> Result<usize> {
        Ok(self.read()?.questions.len())
    }

    async fn index_dimensions(&self) -> Result<Option<usize>> {
        Ok(self.read()?.dimensions)
    }

    async fn stats(&self) -> Result<GraphStats> {
        let graph = self.read()?;
        Ok(GraphStats {
            questions: graph.questions.len(),
            bodies: graph.bodies.len(),
            tags: graph.tags.len(),
            topics: graph.topics.len(),
            tag_edges: graph.has_tag.len(),
        })
    }

    async fn insert_question(&self, question: &Question) -> Result<()> {
        let mut graph = self.write()?;
        graph.check_question(question)?;
        graph.push_question(question);
        Ok(())
    }

    async fn insert_body(&self, body: &Body) -> Result<()> {
        let mut graph = self.write()?;
        graph.check_body(body)?;
        graph.bodies.insert(body.id.clone(), body.clone());
        Ok(())
    }

    async fn link_body(&self, question_id: &str, body_id: &str) -> Result<()> {
        let mut graph = self.write()?;
        if !graph.question_index.contains_key(question_id) {
            return Err(SvarError::InvalidInput(format!("Unknown question: {}", question_id)));
        }
        if !graph.bodies.contains_key(body_id) {
            return Err(SvarError::InvalidInput(format!("Unknown body: {}", body_id)));
        }
        if graph.has_body.contains_key(question_id) {
            return Err(SvarError::InvalidInput(format!(
                "Question {} already has a body",
                question_id
            )));
        }
        graph.has_body.insert(question_id.to_string(), body_id.to_string());
        Ok(())
    }

    async fn get_or_create_tag(&self, word: &str) -> Result<String> {
        let mut graph = self.write()?;
        graph.tags.insert(word.to_string());
        Ok(word.to_string())
    }

    async fn link_tag(&self, body_id: &str, word: &str) -> Result<()> {
        let mut graph = self.write()?;
        if !graph.bodies.contains_key(body_id) {
            return Err(SvarError::InvalidInput(format!("Unknown body: {}", body_id)));
        }
        if !graph.tags.contains(word) {
            return Err(SvarError::InvalidInput(format!("Unknown tag: {}", word)));
        }
        graph.has_tag.push((body_id.to_string(), word.to_string()));
        Ok(())
    }

    async fn get_or_create_topic(&self, name: &str) -> Result<String> {
        let mut graph = self.write()?;
        graph.topics.insert(name.to_string());
        Ok(name.to_string())
    }

    async fn link_topic(&self, question_id: &str, name: &str) -> Result<()> {
        let mut graph = self.write()?;
        if !graph.question_index.contains_key(question_id) {
            return Err(SvarError::InvalidInput(format!("Unknown question: {}", question_id)));
        }
        if !graph.topics.contains(name) {
            return Err(SvarError::InvalidInput(format!("Unknown topic: {}", name)));
        }
        graph.has_topic.insert(question_id.to_string(), name.to_string());
        Ok(())
    }

    async fn insert_record(&self, record: &QuestionRecord) -> Result<()> {
        let mut graph = self.write()?;

        // Validate everything before the first mutation.
        graph.check_question(&record.question)?;
        graph.check_body(&record.body)?;

        let question_id = record.question.id.clone();
        let body_id = record.body.id.clone();

        graph.push_question(&record.question);
        graph.bodies.insert(body_id.clone(), record.body.clone());
        graph.has_body.insert(question_id.clone(), body_id.clone());

        if let Some(topic) = &record.topic {
            graph.topics.insert(topic.clone());
            graph.has_topic.insert(question_id, topic.clone());
        }
        for tag in &record.tags {
            graph.tags.insert(tag.clone());
            graph.has_tag.push((body_id.clone(), tag.clone()));
        }
        Ok(())
    }
}
