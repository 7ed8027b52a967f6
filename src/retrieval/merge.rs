//! Merging retrieval results into the generator's context block.

use super::{BodyMatch, QuestionMatch};
use crate::graph_store::Body;
use crate::text_source::TextFetcher;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Reply used when neither retrieval path produced usable context.
pub const NO_CONTEXT_MESSAGE: &str =
    "Sorry, I couldn't find enough information to answer your question.";

/// Which retrieval path first reached a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextOrigin {
    Vector,
    Tags,
}

impl std::fmt::Display for ContextOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextOrigin::Vector => write!(f, "vector"),
            ContextOrigin::Tags => write!(f, "tags"),
        }
    }
}

/// A body that made it into the context, for display.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSource {
    pub body_id: String,
    pub origin: ContextOrigin,
    /// The matched question, for bodies reached by vector search.
    pub question: Option<String>,
    /// Body tags (vector path) or matched query tags (tag path).
    pub tags: Vec<String>,
    pub label: String,
}

/// The context block and where it came from.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub text: String,
    pub sources: Vec<ContextSource>,
}

/// Result of context assembly.
#[derive(Debug, Clone)]
pub enum ContextOutcome {
    Ready(AssembledContext),
    NoContext,
}

impl ContextOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ContextOutcome::Ready(_))
    }
}

/// Union both paths' bodies: vector hits first, then tag-only hits, each body once.
pub(crate) fn union_bodies(
    vector_matches: &[QuestionMatch],
    tag_matches: &[BodyMatch],
    max_bodies: Option<usize>,
) -> Vec<(Body, ContextSource)> {
    let mut seen = HashSet::new();
    let mut union = Vec::new();

    for m in vector_matches {
        if seen.insert(m.body.id.clone()) {
            union.push((
                m.body.clone(),
                ContextSource {
                    body_id: m.body.id.clone(),
                    origin: ContextOrigin::Vector,
                    question: Some(m.question_text.clone()),
                    tags: m.tags.clone(),
                    label: m.body.label().to_string(),
                },
            ));
        }
    }

    for m in tag_matches {
        if seen.insert(m.body.id.clone()) {
            union.push((
                m.body.clone(),
                ContextSource {
                    body_id: m.body.id.clone(),
                    origin: ContextOrigin::Tags,
                    question: None,
                    tags: m.matched_tags.iter().cloned().collect(),
                    label: m.body.label().to_string(),
                },
            ));
        }
    }

    if let Some(max) = max_bodies {
        if union.len() > max {
            debug!("Capping context at {} of {} bodies", max, union.len());
            union.truncate(max);
        }
    }

    union
}

/// Format the user prompt handed to the answer generator.
pub fn format_context(query: &str, texts: &[String]) -> String {
    let mut context = format!("User question: {}\n\nContext:\n", query);
    for (i, text) in texts.iter().enumerate() {
        context.push_str(&format!("---\nContext {}:\n{}...\n", i + 1, text));
    }
    context
}

/// Merge both retrieval paths, resolve body texts and build the context block.
///
/// Bodies whose text cannot be fetched are dropped. If nothing is left the
/// outcome is [`ContextOutcome::NoContext`].
pub async fn assemble_context(
    query: &str,
    vector_matches: &[QuestionMatch],
    tag_matches: &[BodyMatch],
    max_bodies: Option<usize>,
    fetcher: &dyn TextFetcher,
) -> ContextOutcome {
    let union = union_bodies(vector_matches, tag_matches, max_bodies);
    if union.is_empty() {
        info!("No bodies from either retrieval path");
        return ContextOutcome::NoContext;
    }

    let fetched = join_all(union.iter().map(|(body, _)| fetcher.fetch(body))).await;

    let mut texts = Vec::with_capacity(union.len());
    let mut sources = Vec::with_capacity(union.len());
    for ((body, source), result) in union.into_iter().zip(fetched) {
        match result {
            Ok(text) => {
                texts.push(text);
                sources.push(source);
            }
            Err(e) => warn!("Dropping body {} ({}): {}", body.id, body.label(), e),
        }
    }

    if texts.is_empty() {
        warn!("Every body text fetch failed");
        return ContextOutcome::NoContext;
    }

    info!("Assembled context from {} bodies", texts.len());
    ContextOutcome::Ready(AssembledContext {
        text: format_context(query, &texts),
        sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SvarError};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns inline text, fails for bodies without it.
    #[derive(Default)]
    struct InlineFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextFetcher for InlineFetcher {
        async fn fetch(&self, body: &Body) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            body.text
                .clone()
                .ok_or_else(|| SvarError::TextFetch(format!("{} unreachable", body.id)))
        }
    }

    fn body(id: &str) -> Body {
        Body {
            id: id.to_string(),
            text: Some(format!("text {}", id)),
            text_link: None,
            date: None,
        }
    }

    fn linked_only(id: &str) -> Body {
        Body {
            id: id.to_string(),
            text: None,
            text_link: Some(format!("https://docs.example.com/{}", id)),
            date: None,
        }
    }

    fn vector_hit(body: Body) -> QuestionMatch {
        QuestionMatch {
            question_id: format!("q-{}", body.id),
            question_text: format!("question for {}", body.id),
            score: 0.9,
            body,
            tags: vec!["Salt".to_string()],
            topic: None,
        }
    }

    fn tag_hit(body: Body) -> BodyMatch {
        let matched_tags: BTreeSet<String> = ["Salt".to_string()].into_iter().collect();
        BodyMatch {
            body,
            match_count: matched_tags.len(),
            matched_tags,
        }
    }

    fn source_ids(outcome: &ContextOutcome) -> Vec<String> {
        match outcome {
            ContextOutcome::Ready(ctx) => ctx.sources.iter().map(|s| s.body_id.clone()).collect(),
            ContextOutcome::NoContext => Vec::new(),
        }
    }

    #[test]
    fn test_format_context() {
        let text = format_context("Is salt ok?", &["first".to_string(), "second".to_string()]);
        assert_eq!(
            text,
            "User question: Is salt ok?\n\nContext:\n---\nContext 1:\nfirst...\n---\nContext 2:\nsecond...\n"
        );
    }

    #[test]
    fn test_union_keeps_vector_position_for_shared_body() {
        let union = union_bodies(
            &[vector_hit(body("b1")), vector_hit(body("b2"))],
            &[tag_hit(body("b3")), tag_hit(body("b2"))],
            None,
        );

        let ids: Vec<_> = union.iter().map(|(b, _)| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2", "b3"]);
        assert_eq!(union[1].1.origin, ContextOrigin::Vector);
        assert_eq!(union[2].1.origin, ContextOrigin::Tags);
        assert!(union[2].1.question.is_none());
    }

    #[test]
    fn test_union_is_capped() {
        let union = union_bodies(
            &[vector_hit(body("b1"))],
            &[tag_hit(body("b2")), tag_hit(body("b3"))],
            Some(2),
        );
        assert_eq!(union.len(), 2);
        assert_eq!(union[1].0.id, "b2");
    }

    #[tokio::test]
    async fn test_empty_union_is_no_context() {
        let fetcher = InlineFetcher::default();
        let outcome = assemble_context("q", &[], &[], None, &fetcher).await;

        assert!(!outcome.is_ready());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_dropped() {
        let fetcher = InlineFetcher::default();
        let outcome = assemble_context(
            "q",
            &[vector_hit(linked_only("b1"))],
            &[tag_hit(body("b2"))],
            None,
            &fetcher,
        )
        .await;

        assert_eq!(source_ids(&outcome), vec!["b2"]);
        match outcome {
            ContextOutcome::Ready(ctx) => {
                assert!(ctx.text.contains("Context 1:\ntext b2..."));
                assert!(!ctx.text.contains("Context 2:"));
            }
            ContextOutcome::NoContext => panic!("expected context"),
        }
    }

    #[tokio::test]
    async fn test_all_fetches_failing_is_no_context() {
        let fetcher = InlineFetcher::default();
        let outcome =
            assemble_context("q", &[vector_hit(linked_only("b1"))], &[], None, &fetcher).await;

        assert!(matches!(outcome, ContextOutcome::NoContext));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cap_applies_before_fetching() {
        let fetcher = InlineFetcher::default();
        let tags: Vec<_> = (0..5).map(|i| tag_hit(body(&format!("b{}", i)))).collect();

        let outcome = assemble_context("q", &[], &tags, Some(3), &fetcher).await;

        assert_eq!(source_ids(&outcome), vec!["b0", "b1", "b2"]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }
}
