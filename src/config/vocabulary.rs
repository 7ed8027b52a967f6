//! The controlled tag vocabulary.
//!
//! Loaded once at start from a JSON array of strings and shared read-only.

use crate::error::{Result, SvarError};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, warn};

/// Closed set of tags that may be scored during retrieval.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    /// Tags in file order, deduplicated.
    tags: Vec<String>,
    /// Lowercased tag -> index into `tags`.
    lookup: HashMap<String, usize>,
}

impl Vocabulary {
    /// Build a vocabulary from a list of tags.
    ///
    /// Blank entries are rejected. Repeated entries (ignoring case) are collapsed
    /// onto their first spelling.
    pub fn new<I, S>(tags: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Vocabulary::default();

        for tag in tags {
            let tag: String = tag.into();
            let trimmed = tag.trim();
            if trimmed.is_empty() {
                return Err(SvarError::Config("Tag vocabulary contains a blank entry".to_string()));
            }

            let key = trimmed.to_lowercase();
            if vocab.lookup.contains_key(&key) {
                debug!("Skipping duplicate vocabulary tag: {}", trimmed);
                continue;
            }
            vocab.lookup.insert(key, vocab.tags.len());
            vocab.tags.push(trimmed.to_string());
        }

        Ok(vocab)
    }

    /// Load a vocabulary from a JSON file (`["Fasting", "Salt", ...]`).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SvarError::Config(format!(
                "Tag vocabulary not found at {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let tags: Vec<String> = serde_json::from_str(&content)?;
        let vocab = Self::new(tags)?;

        if vocab.is_empty() {
            warn!("Tag vocabulary at {} is empty; tag retrieval is disabled", path.display());
        }
        Ok(vocab)
    }

    /// Map a tag onto its canonical spelling, if it belongs to the vocabulary.
    pub fn canonical(&self, tag: &str) -> Option<&str> {
        self.lookup
            .get(&tag.trim().to_lowercase())
            .map(|&i| self.tags[i].as_str())
    }

    /// Keep only vocabulary tags, returning (kept, rejected).
    pub fn partition<'a, I>(&self, tags: I) -> (BTreeSet<String>, Vec<String>)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut kept = BTreeSet::new();
        let mut rejected = Vec::new();

        for tag in tags {
            match self.canonical(tag) {
                Some(canonical) => {
                    kept.insert(canonical.to_string());
                }
                None => rejected.push(tag.clone()),
            }
        }

        (kept, rejected)
    }

    /// All tags in file order.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
