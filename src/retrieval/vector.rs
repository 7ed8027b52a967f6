//! Vector retrieval over question embeddings.

use super::{store_error, QuestionMatch};
use crate::embedding::Embedder;
use crate::error::{Result, SvarError};
use crate::graph_store::{check_query_width, GraphStore, QUESTION_VECTOR_INDEX};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Finds prior questions similar to the query and resolves their bodies and tags.
pub struct VectorRetriever {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
}

impl VectorRetriever {
    /// Create a new vector retriever.
    pub fn new(store: Arc<dyn GraphStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Return up to `top_k` questions nearest to `query`, most similar first.
    ///
    /// An empty or unreachable index yields an empty result. Only embedding
    /// failures are reported as errors, including a query embedding whose width
    /// differs from the one the index was built with.
    #[instrument(skip(self), fields(query = %query))]
    pub async fn search_by_vector(&self, query: &str, top_k: usize) -> Result<Vec<QuestionMatch>> {
        if query.trim().is_empty() {
            return Err(SvarError::InvalidInput("Query must not be empty".to_string()));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await.map_err(|e| match e {
            SvarError::Embedding(_) => e,
            other => SvarError::Embedding(other.to_string()),
        })?;

        if embedding.len() != self.embedder.dimensions() {
            return Err(SvarError::Embedding(format!(
                "Query embedding has {} dimensions, expected {}",
                embedding.len(),
                self.embedder.dimensions()
            )));
        }

        match self.store.index_dimensions().await {
            Ok(indexed) => check_query_width(indexed, &embedding)?,
            Err(e) => {
                warn!("Vector index unavailable, continuing without it: {}", store_error(e));
                return Ok(Vec::new());
            }
        }

        match self.lookup(&embedding, top_k).await {
            Ok(matches) => {
                info!("Vector search matched {} questions", matches.len());
                Ok(matches)
            }
            Err(e @ SvarError::Embedding(_)) => Err(e),
            Err(e) => {
                warn!("Vector index unavailable, continuing without it: {}", store_error(e));
                Ok(Vec::new())
            }
        }
    }

    async fn lookup(&self, embedding: &[f32], top_k: usize) -> Result<Vec<QuestionMatch>> {
        let hits = self
            .store
            .vector_search(QUESTION_VECTOR_INDEX, embedding, top_k)
            .await?;

        if hits.is_empty() {
            warn!("No similar questions found");
            return Ok(Vec::new());
        }

        let mut matches = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(body) = self.store.body_for_question(&hit.question_id).await? else {
                warn!("Question {} has no body, skipping", hit.question_id);
                continue;
            };

            let tags = self.store.tags_for_body(&body.id).await?;
            let topic = self.store.topic_for_question(&hit.question_id).await?;

            debug!(
                "Matched question {} ({:.3}): {}",
                hit.question_id, hit.score, hit.question_text
            );

            matches.push(QuestionMatch {
                question_id: hit.question_id,
                question_text: hit.question_text,
                score: hit.score,
                body,
                tags,
                topic,
            });
        }

        Ok(matches)
    }
}
