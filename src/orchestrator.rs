//! Component wiring for Svar.
//!
//! Builds the shared collaborators from [`Settings`] once and hands out the
//! RAG engine and ingester that use them.

use crate::config::{LlmProvider, Prompts, Settings, Vocabulary};
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{Result, SvarError};
use crate::graph_store::{GraphStore, MemoryGraphStore, SqliteGraphStore};
use crate::ingest::Ingester;
use crate::rag::{AnswerGenerator, OpenAIGenerator, RagEngine, RagOptions};
use crate::retrieval::{OpenAITagClassifier, TagClassifier, TagRetriever, VectorRetriever};
use crate::text_source::{HttpTextFetcher, TextFetcher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Collaborators for [`Orchestrator::with_components`].
pub struct Components {
    pub vocabulary: Arc<Vocabulary>,
    pub store: Arc<dyn GraphStore>,
    pub embedder: Arc<dyn Embedder>,
    pub classifier: Arc<dyn TagClassifier>,
    pub fetcher: Arc<dyn TextFetcher>,
    pub openai: Arc<dyn AnswerGenerator>,
    pub groq: Arc<dyn AnswerGenerator>,
}

/// Shared application context.
pub struct Orchestrator {
    settings: Settings,
    prompts: Prompts,
    components: Components,
}

impl Orchestrator {
    /// Build every component from settings.
    pub fn new(settings: Settings) -> Result<Self> {
        // Load prompts (with optional custom directory and variables)
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let vocabulary = Arc::new(load_vocabulary(&settings)?);
        let store = open_store(&settings)?;

        if settings.embedding.provider != "openai" {
            return Err(SvarError::Config(format!(
                "Unknown embedding provider: {}",
                settings.embedding.provider
            )));
        }
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::with_config(
            &settings.embedding.model,
            settings.embedding.dimensions as usize,
        )?);

        let classifier: Arc<dyn TagClassifier> = Arc::new(
            OpenAITagClassifier::new(&settings.classifier.model, vocabulary.clone())?
                .with_prompts(prompts.clone())
                .with_max_attempts(settings.classifier.max_attempts),
        );

        let fetcher: Arc<dyn TextFetcher> = Arc::new(HttpTextFetcher::new(Duration::from_secs(
            settings.retrieval.fetch_timeout_secs,
        ))?);

        let openai = Arc::new(OpenAIGenerator::new(LlmProvider::OpenAI, &settings.llm)?);
        let groq = Arc::new(OpenAIGenerator::new(LlmProvider::Groq, &settings.llm)?);

        Ok(Self {
            settings,
            prompts,
            components: Components {
                vocabulary,
                store,
                embedder,
                classifier,
                fetcher,
                openai,
                groq,
            },
        })
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(settings: Settings, prompts: Prompts, components: Components) -> Self {
        Self {
            settings,
            prompts,
            components,
        }
    }

    /// Build a RAG engine over the shared components.
    pub fn rag_engine(&self) -> RagEngine {
        let c = &self.components;
        let retrieval = &self.settings.retrieval;

        let vector = VectorRetriever::new(c.store.clone(), c.embedder.clone());
        let tags = TagRetriever::new(c.store.clone(), c.vocabulary.clone())
            .with_tie_break(retrieval.tie_break)
            .with_priority_tags(&retrieval.priority_tags);

        RagEngine::new(vector, tags, c.classifier.clone(), c.fetcher.clone())
            .with_generator(LlmProvider::OpenAI, c.openai.clone())
            .with_generator(LlmProvider::Groq, c.groq.clone())
            .with_prompts(self.prompts.clone())
            .with_options(RagOptions::from_settings(retrieval, &self.settings.rag))
    }

    /// Build an ingester over the shared components.
    pub fn ingester(&self) -> Ingester {
        let c = &self.components;
        Ingester::new(c.store.clone(), c.embedder.clone(), c.vocabulary.clone())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn prompts(&self) -> &Prompts {
        &self.prompts
    }

    pub fn vocabulary(&self) -> Arc<Vocabulary> {
        self.components.vocabulary.clone()
    }

    pub fn store(&self) -> Arc<dyn GraphStore> {
        self.components.store.clone()
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.components.embedder.clone()
    }

    pub fn classifier(&self) -> Arc<dyn TagClassifier> {
        self.components.classifier.clone()
    }
}

/// Load the vocabulary. A missing file leaves tag retrieval disabled.
fn load_vocabulary(settings: &Settings) -> Result<Vocabulary> {
    let path = settings.vocabulary_path();
    if !path.exists() {
        warn!(
            "Tag vocabulary not found at {}, tag retrieval is disabled",
            path.display()
        );
        return Ok(Vocabulary::default());
    }

    let vocabulary = Vocabulary::load(&path)?;
    info!("Loaded {} tags from {}", vocabulary.len(), path.display());
    Ok(vocabulary)
}

fn open_store(settings: &Settings) -> Result<Arc<dyn GraphStore>> {
    match settings.graph_store.provider.as_str() {
        "sqlite" => {
            let path = settings.sqlite_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            info!("Opening graph store at {}", path.display());
            Ok(Arc::new(SqliteGraphStore::new(&path)?))
        }
        "memory" => Ok(Arc::new(MemoryGraphStore::new())),
        other => Err(SvarError::Config(format!("Unknown graph store provider: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_in(dir: &std::path::Path) -> Settings {
        let mut settings = Settings::default();
        settings.general.data_dir = dir.display().to_string();
        settings.graph_store.sqlite_path = dir.join("graph.db").display().to_string();
        settings.tags.vocabulary_path = dir.join("tags_list.json").display().to_string();
        settings
    }

    #[test]
    fn test_new_loads_vocabulary_and_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tags_list.json"), r#"["Salt", "Fasting"]"#).unwrap();

        let orchestrator = Orchestrator::new(settings_in(dir.path())).unwrap();

        assert_eq!(orchestrator.vocabulary().len(), 2);
        assert!(dir.path().join("graph.db").exists());
    }

    #[test]
    fn test_missing_vocabulary_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(dir.path());
        settings.graph_store.provider = "memory".to_string();

        let orchestrator = Orchestrator::new(settings).unwrap();
        assert!(orchestrator.vocabulary().is_empty());
    }

    #[test]
    fn test_unknown_providers_are_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let mut settings = settings_in(dir.path());
        settings.graph_store.provider = "neo4j".to_string();
        assert!(matches!(Orchestrator::new(settings), Err(SvarError::Config(_))));

        let mut settings = settings_in(dir.path());
        settings.graph_store.provider = "memory".to_string();
        settings.embedding.provider = "minilm".to_string();
        assert!(matches!(Orchestrator::new(settings), Err(SvarError::Config(_))));
    }

    #[tokio::test]
    async fn test_stats_through_shared_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(dir.path());
        settings.graph_store.provider = "memory".to_string();

        let orchestrator = Orchestrator::new(settings).unwrap();
        let stats = orchestrator.store().stats().await.unwrap();
        assert_eq!(stats.questions, 0);
        assert_eq!(orchestrator.rag_engine().options().vector_top_k, 2);
    }
}
