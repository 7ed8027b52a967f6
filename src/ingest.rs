//! Loading Q&A records into the graph store.
//!
//! Input is a JSON array of records, each a question with its answer body:
//!
//! ```json
//! [{"question": "Is salt ok?", "date": "2024-05-01", "topic": "Electrolytes",
//!   "body": {"text": "...", "date": "2024-05-01", "tags": ["Salt"]}}]
//! ```

use crate::config::Vocabulary;
use crate::embedding::Embedder;
use crate::error::{Result, SvarError};
use crate::graph_store::{Body, GraphStore, Question, QuestionRecord};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// One question and its answer body.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRecord {
    pub question: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    pub body: IngestBody,
}

/// The answer body of an [`IngestRecord`].
#[derive(Debug, Clone, Deserialize)]
pub struct IngestBody {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub text_link: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl IngestRecord {
    fn is_usable(&self) -> bool {
        let has_text = self.body.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        let has_link = self.body.text_link.as_deref().is_some_and(|l| !l.trim().is_empty());
        !self.question.trim().is_empty() && (has_text || has_link)
    }
}

/// Counts from an ingest run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub questions: usize,
    pub bodies: usize,
    pub tags_linked: usize,
    pub tags_skipped: usize,
    pub records_skipped: usize,
}

/// Normalize a record date to `YYYY-MM-DD`.
///
/// Accepts plain dates, compact `YYYYMMDD` and RFC 3339 timestamps. Anything else
/// is dropped with a warning.
fn normalize_date(raw: Option<&str>) -> Option<String> {
    let raw = raw.map(str::trim).filter(|d| !d.is_empty())?;
    let parsed = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| chrono::NaiveDate::parse_from_str(raw, "%Y%m%d"))
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.date_naive())
        });

    match parsed {
        Some(date) => Some(date.format("%Y-%m-%d").to_string()),
        None => {
            warn!("Ignoring unparseable date: {:?}", raw);
            None
        }
    }
}

/// Read records from a JSON file.
pub fn load_records(path: &Path) -> Result<Vec<IngestRecord>> {
    if !path.exists() {
        return Err(SvarError::InvalidInput(format!(
            "Ingest file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Writes records into a graph store, embedding each question.
///
/// Each record is written atomically, so a failure never leaves a question without its body.
pub struct Ingester {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
    vocabulary: Arc<Vocabulary>,
}

impl Ingester {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        vocabulary: Arc<Vocabulary>,
    ) -> Self {
        Self {
            store,
            embedder,
            vocabulary,
        }
    }

    /// Load and ingest a JSON file.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let records = load_records(path)?;
        info!("Loaded {} records from {}", records.len(), path.display());
        self.ingest(&records).await
    }

    /// Ingest records. Tags outside the vocabulary are skipped.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn ingest(&self, records: &[IngestRecord]) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        let usable: Vec<&IngestRecord> = records
            .iter()
            .filter(|r| {
                let ok = r.is_usable();
                if !ok {
                    warn!("Skipping record without question or body text: {:?}", r.question);
                }
                ok
            })
            .collect();
        report.records_skipped = records.len() - usable.len();

        if usable.is_empty() {
            return Ok(report);
        }

        let texts: Vec<String> = usable.iter().map(|r| r.question.trim().to_string()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != usable.len() {
            return Err(SvarError::Embedding(format!(
                "Expected {} embeddings, got {}",
                usable.len(),
                embeddings.len()
            )));
        }

        for ((record, text), embedding) in usable.into_iter().zip(texts).zip(embeddings) {
            let question_id = uuid::Uuid::new_v4().to_string();
            let body_id = uuid::Uuid::new_v4().to_string();

            let (tags, rejected) = self.vocabulary.partition(&record.body.tags);
            if !rejected.is_empty() {
                warn!("Skipping tags outside the vocabulary: {:?}", rejected);
            }

            self.store
                .insert_record(&QuestionRecord {
                    question: Question {
                        id: question_id.clone(),
                        text,
                        date: normalize_date(record.date.as_deref()),
                        embedding,
                    },
                    body: Body {
                        id: body_id,
                        text: record.body.text.clone(),
                        text_link: record.body.text_link.clone(),
                        date: normalize_date(record.body.date.as_deref()),
                    },
                    topic: record
                        .topic
                        .as_deref()
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string),
                    tags: tags.iter().cloned().collect(),
                })
                .await?;

            report.questions += 1;
            report.bodies += 1;
            report.tags_linked += tags.len();
            report.tags_skipped += rejected.len();
            debug!("Ingested question {} with {} tags", question_id, tags.len());
        }

        info!(
            "Ingested {} questions, linked {} tags ({} skipped)",
            report.questions, report.tags_linked, report.tags_skipped
        );
        Ok(report)
    }
}
