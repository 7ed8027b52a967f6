//! Tag-overlap retrieval over bodies.

use super::{store_error, BodyMatch};
use crate::config::{TieBreakPolicy, Vocabulary};
use crate::error::Result;
use crate::graph_store::GraphStore;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Ranks bodies by how many of the query's tags they carry.
pub struct TagRetriever {
    store: Arc<dyn GraphStore>,
    vocabulary: Arc<Vocabulary>,
    tie_break: TieBreakPolicy,
    /// Canonical priority tags, highest weight first.
    priority_tags: Vec<String>,
}

impl TagRetriever {
    /// Create a retriever using the `include_ties` policy.
    pub fn new(store: Arc<dyn GraphStore>, vocabulary: Arc<Vocabulary>) -> Self {
        Self {
            store,
            vocabulary,
            tie_break: TieBreakPolicy::default(),
            priority_tags: Vec::new(),
        }
    }

    /// Set the tie-break policy.
    pub fn with_tie_break(mut self, tie_break: TieBreakPolicy) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Set the priority tags used by `priority_cap`. Unknown tags are ignored.
    pub fn with_priority_tags(mut self, tags: &[String]) -> Self {
        let mut priority = Vec::new();
        for tag in tags {
            match self.vocabulary.canonical(tag) {
                Some(canonical) if !priority.iter().any(|p| p == canonical) => {
                    priority.push(canonical.to_string())
                }
                Some(_) => {}
                None => warn!("Priority tag '{}' is not in the vocabulary, ignoring", tag),
            }
        }
        self.priority_tags = priority;
        self
    }

    /// Bodies sharing the most tags with `tags`, best first.
    ///
    /// Under `include_ties` the result can exceed `top_k`; under `priority_cap`
    /// it never does.
    #[instrument(skip(self), fields(tags = tags.len()))]
    pub async fn search_by_tags(
        &self,
        tags: &BTreeSet<String>,
        top_k: usize,
    ) -> Result<Vec<BodyMatch>> {
        if tags.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let (known, rejected) = self.vocabulary.partition(tags);
        if !rejected.is_empty() {
            warn!("Ignoring tags outside the vocabulary: {:?}", rejected);
        }
        if known.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<BodyMatch> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for tag in &known {
            let bodies = self.store.bodies_with_tag(tag).await.map_err(store_error)?;
            debug!("Tag '{}' links {} bodies", tag, bodies.len());

            for body in bodies {
                let idx = *positions.entry(body.id.clone()).or_insert_with(|| {
                    candidates.push(BodyMatch {
                        body,
                        matched_tags: BTreeSet::new(),
                        match_count: 0,
                    });
                    candidates.len() - 1
                });
                let candidate = &mut candidates[idx];
                candidate.matched_tags.insert(tag.clone());
                candidate.match_count = candidate.matched_tags.len();
            }
        }

        let selected = select(candidates, top_k, self.tie_break, &self.priority_tags);
        info!(
            "Tag search over {} tags returned {} bodies",
            known.len(),
            selected.len()
        );
        Ok(selected)
    }
}

/// Sum of `len - index` over the priority tags a body matched.
fn priority_score(matched: &BTreeSet<String>, priority_tags: &[String]) -> usize {
    let len = priority_tags.len();
    priority_tags
        .iter()
        .enumerate()
        .filter(|(_, tag)| matched.contains(*tag))
        .map(|(i, _)| len - i)
        .sum()
}

/// Rank candidates (given in discovery order) and apply the tie-break policy.
fn select(
    mut candidates: Vec<BodyMatch>,
    top_k: usize,
    policy: TieBreakPolicy,
    priority_tags: &[String],
) -> Vec<BodyMatch> {
    if top_k == 0 {
        return Vec::new();
    }

    match policy {
        TieBreakPolicy::IncludeTies => {
            candidates.sort_by(|a, b| b.match_count.cmp(&a.match_count));
            if candidates.len() <= top_k {
                return candidates;
            }
            let cutoff = candidates[top_k - 1].match_count;
            candidates.retain(|c| c.match_count >= cutoff);
            candidates
        }
        TieBreakPolicy::PriorityCap => {
            candidates.sort_by_cached_key(|c| {
                (
                    std::cmp::Reverse(c.match_count),
                    std::cmp::Reverse(priority_score(&c.matched_tags, priority_tags)),
                )
            });
            candidates.truncate(top_k);
            candidates
        }
    }
}
