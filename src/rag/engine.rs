//! The chat pipeline.

use super::AnswerGenerator;
use crate::config::{FailurePolicy, LlmProvider, Prompts, RagSettings, RetrievalSettings};
use crate::error::{Result, SvarError};
use crate::retrieval::{
    assemble_context, BodyMatch, ContextOutcome, ContextSource, QuestionMatch, TagClassifier,
    TagRetriever, VectorRetriever, NO_CONTEXT_MESSAGE,
};
use crate::text_source::TextFetcher;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Stages a chat request moves through, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStage {
    Received,
    ClassifyingTags,
    Retrieving,
    Merging,
    ContextReady,
    NoContext,
    Generating,
    Done,
    Failed,
}

impl std::fmt::Display for ChatStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChatStage::Received => "received",
            ChatStage::ClassifyingTags => "classifying_tags",
            ChatStage::Retrieving => "retrieving",
            ChatStage::Merging => "merging",
            ChatStage::ContextReady => "context_ready",
            ChatStage::NoContext => "no_context",
            ChatStage::Generating => "generating",
            ChatStage::Done => "done",
            ChatStage::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Stages one request has passed through, in order.
#[derive(Debug, Default)]
struct StageTrail {
    stages: Vec<ChatStage>,
}

impl StageTrail {
    fn enter(&mut self, stage: ChatStage) {
        debug!(stage = %stage, "chat stage");
        self.stages.push(stage);
    }
}

/// Retrieval limits and failure policies.
#[derive(Debug, Clone)]
pub struct RagOptions {
    pub vector_top_k: usize,
    pub tag_top_k: usize,
    pub max_bodies: Option<usize>,
    pub classification_failure: FailurePolicy,
    pub embedding_failure: FailurePolicy,
}

impl RagOptions {
    pub fn from_settings(retrieval: &RetrievalSettings, rag: &RagSettings) -> Self {
        Self {
            vector_top_k: retrieval.vector_top_k,
            tag_top_k: retrieval.tag_top_k,
            max_bodies: retrieval.max_bodies(),
            classification_failure: rag.classification_failure,
            embedding_failure: rag.embedding_failure,
        }
    }
}

impl Default for RagOptions {
    fn default() -> Self {
        Self::from_settings(&RetrievalSettings::default(), &RagSettings::default())
    }
}

/// Everything the retrieval stage found for one question.
#[derive(Debug, Clone)]
pub struct Retrieval {
    /// Tags the classifier assigned (empty when classification degraded).
    pub tags: BTreeSet<String>,
    pub vector_matches: Vec<QuestionMatch>,
    pub tag_matches: Vec<BodyMatch>,
    pub outcome: ContextOutcome,
}

/// The answer to a chat request.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub response: String,
    /// Bodies the answer was generated from, in context order.
    pub sources: Vec<ContextSource>,
    pub outcome: ContextOutcome,
    /// Stages the request passed through, ending in `Done`.
    pub stages: Vec<ChatStage>,
}

/// Result of one retrieval path after its failure policy was applied.
enum PathResult<T> {
    Found(T),
    Degraded(SvarError),
}

impl<T: Default> PathResult<T> {
    fn into_found(self) -> T {
        match self {
            PathResult::Found(value) => value,
            PathResult::Degraded(_) => T::default(),
        }
    }
}

/// Apply a path's failure policy. Store outages are always fatal.
fn settle<T>(path: &str, result: Result<T>, policy: FailurePolicy) -> Result<PathResult<T>> {
    match result {
        Ok(value) => Ok(PathResult::Found(value)),
        Err(e) if e.is_store_failure() => Err(e),
        Err(e) => match policy {
            FailurePolicy::Fail => Err(e),
            FailurePolicy::Degrade => {
                warn!("{} path failed, continuing without it: {}", path, e);
                Ok(PathResult::Degraded(e))
            }
        },
    }
}

/// Hybrid RAG engine.
///
/// Holds only shared, read-only collaborators; every request is independent.
pub struct RagEngine {
    vector: VectorRetriever,
    tags: TagRetriever,
    classifier: Arc<dyn TagClassifier>,
    fetcher: Arc<dyn TextFetcher>,
    openai: Option<Arc<dyn AnswerGenerator>>,
    groq: Option<Arc<dyn AnswerGenerator>>,
    prompts: Prompts,
    options: RagOptions,
}

impl RagEngine {
    /// Create a new RAG engine. Register generators with [`RagEngine::with_generator`].
    pub fn new(
        vector: VectorRetriever,
        tags: TagRetriever,
        classifier: Arc<dyn TagClassifier>,
        fetcher: Arc<dyn TextFetcher>,
    ) -> Self {
        Self {
            vector,
            tags,
            classifier,
            fetcher,
            openai: None,
            groq: None,
            prompts: Prompts::default(),
            options: RagOptions::default(),
        }
    }

    /// Register the generator used for `provider`.
    pub fn with_generator(mut self, provider: LlmProvider, generator: Arc<dyn AnswerGenerator>) -> Self {
        match provider {
            LlmProvider::OpenAI => self.openai = Some(generator),
            LlmProvider::Groq => self.groq = Some(generator),
        }
        self
    }

    /// Set custom prompts (with user-defined variables).
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    /// Set retrieval limits and failure policies.
    pub fn with_options(mut self, options: RagOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RagOptions {
        &self.options
    }

    fn generator(&self, provider: LlmProvider) -> Result<&Arc<dyn AnswerGenerator>> {
        let generator = match provider {
            LlmProvider::OpenAI => self.openai.as_ref(),
            LlmProvider::Groq => self.groq.as_ref(),
        };
        generator.ok_or_else(|| SvarError::Config(format!("No {} generator configured", provider)))
    }

    fn validate(prompt: &str) -> Result<()> {
        if prompt.trim().is_empty() {
            return Err(SvarError::InvalidInput("Prompt must not be empty".to_string()));
        }
        Ok(())
    }

    async fn tag_path(&self, prompt: &str) -> Result<(BTreeSet<String>, Vec<BodyMatch>)> {
        let tags = self.classifier.classify(prompt).await?;
        let matches = self.tags.search_by_tags(&tags, self.options.tag_top_k).await?;
        Ok((tags, matches))
    }

    /// Run both retrieval paths and assemble the context, without generating.
    #[instrument(skip(self), fields(prompt = %prompt))]
    pub async fn retrieve(&self, prompt: &str) -> Result<Retrieval> {
        self.retrieve_traced(prompt, &mut StageTrail::default()).await
    }

    async fn retrieve_traced(&self, prompt: &str, trail: &mut StageTrail) -> Result<Retrieval> {
        Self::validate(prompt)?;

        // Classification starts the tag path; the vector path needs no tags.
        trail.enter(ChatStage::ClassifyingTags);
        trail.enter(ChatStage::Retrieving);

        let (vector_result, tag_result) = tokio::join!(
            self.vector.search_by_vector(prompt, self.options.vector_top_k),
            self.tag_path(prompt),
        );

        let vector = settle("Vector", vector_result, self.options.embedding_failure)?;
        let tagged = settle("Tag", tag_result, self.options.classification_failure)?;

        let (vector_matches, (tags, tag_matches)) = match (vector, tagged) {
            (PathResult::Degraded(e), PathResult::Degraded(_)) => return Err(e),
            (vector, tagged) => (vector.into_found(), tagged.into_found()),
        };

        trail.enter(ChatStage::Merging);
        let outcome = assemble_context(
            prompt,
            &vector_matches,
            &tag_matches,
            self.options.max_bodies,
            self.fetcher.as_ref(),
        )
        .await;

        trail.enter(if outcome.is_ready() {
            ChatStage::ContextReady
        } else {
            ChatStage::NoContext
        });

        Ok(Retrieval {
            tags,
            vector_matches,
            tag_matches,
            outcome,
        })
    }

    /// Answer `prompt` from the knowledge base using `provider`.
    #[instrument(skip(self), fields(prompt = %prompt, provider = %provider))]
    pub async fn chat(&self, prompt: &str, provider: LlmProvider) -> Result<ChatReply> {
        let mut trail = StageTrail::default();
        trail.enter(ChatStage::Received);
        match self.run_chat(prompt, provider, &mut trail).await {
            Ok(mut reply) => {
                trail.enter(ChatStage::Done);
                reply.stages = trail.stages;
                Ok(reply)
            }
            Err(e) => {
                warn!(stage = %ChatStage::Failed, "Chat request failed: {}", e);
                Err(e)
            }
        }
    }

    async fn run_chat(
        &self,
        prompt: &str,
        provider: LlmProvider,
        trail: &mut StageTrail,
    ) -> Result<ChatReply> {
        Self::validate(prompt)?;
        let generator = self.generator(provider)?;
        let retrieval = self.retrieve_traced(prompt, trail).await?;

        let context = match retrieval.outcome {
            ContextOutcome::Ready(context) => context,
            ContextOutcome::NoContext => {
                info!("No context found, answering with the fallback message");
                return Ok(ChatReply {
                    response: NO_CONTEXT_MESSAGE.to_string(),
                    sources: Vec::new(),
                    outcome: ContextOutcome::NoContext,
                    stages: Vec::new(),
                });
            }
        };

        trail.enter(ChatStage::Generating);
        let system_prompt = self
            .prompts
            .render_with_custom(&self.prompts.answer.system, &HashMap::new());
        let response = generator.generate(&system_prompt, &context.text).await?;

        info!("Answered from {} bodies", context.sources.len());
        Ok(ChatReply {
            response,
            sources: context.sources.clone(),
            outcome: ContextOutcome::Ready(context),
            stages: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Vocabulary;
    use crate::embedding::Embedder;
    use crate::graph_store::{Body, GraphStore, MemoryGraphStore, Question, UnavailableStore};
    use crate::retrieval::ContextOrigin;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedClassifier {
        tags: Option<Vec<&'static str>>,
    }

    #[async_trait]
    impl TagClassifier for FixedClassifier {
        async fn classify(&self, _query: &str) -> Result<BTreeSet<String>> {
            match &self.tags {
                Some(tags) => Ok(tags.iter().map(|t| t.to_string()).collect()),
                None => Err(SvarError::Classification("model returned prose".to_string())),
            }
        }
    }

    struct StaticEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl Embedder for StaticEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            if self.fail {
                return Err(SvarError::Embedding("provider down".to_string()));
            }
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    struct InlineFetcher;

    #[async_trait]
    impl TextFetcher for InlineFetcher {
        async fn fetch(&self, body: &Body) -> Result<String> {
            body.text
                .clone()
                .ok_or_else(|| SvarError::TextFetch(body.id.clone()))
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AnswerGenerator for RecordingGenerator {
        async fn generate(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(user_prompt.to_string());
            Ok("generated answer".to_string())
        }
    }

    async fn seeded_store() -> Arc<MemoryGraphStore> {
        let store = Arc::new(MemoryGraphStore::new());
        let rows: [(&str, Vec<f32>, &str, &[&str]); 2] = [
            ("Is salt bad for me?", vec![1.0, 0.0], "Salt is fine in moderation.", &["Salt"]),
            ("Can I fast on salt water?", vec![0.0, 1.0], "Salt helps during fasts.", &["Fasting", "Salt"]),
        ];

        for (i, (question, embedding, text, tags)) in rows.into_iter().enumerate() {
            let qid = format!("q{}", i + 1);
            let bid = format!("b{}", i + 1);
            store
                .insert_question(&Question {
                    id: qid.clone(),
                    text: question.to_string(),
                    date: None,
                    embedding,
                })
                .await
                .unwrap();
            store
                .insert_body(&Body {
                    id: bid.clone(),
                    text: Some(text.to_string()),
                    text_link: None,
                    date: None,
                })
                .await
                .unwrap();
            store.link_body(&qid, &bid).await.unwrap();
            for tag in tags {
                store.get_or_create_tag(tag).await.unwrap();
                store.link_tag(&bid, tag).await.unwrap();
            }
        }

        store
    }

    fn engine(
        store: Arc<dyn GraphStore>,
        tags: Option<Vec<&'static str>>,
        embed_fails: bool,
        generator: Arc<RecordingGenerator>,
    ) -> RagEngine {
        let vocabulary = Arc::new(Vocabulary::new(["Fasting", "Salt"]).unwrap());
        let vector = VectorRetriever::new(store.clone(), Arc::new(StaticEmbedder { fail: embed_fails }));
        let tag_retriever = TagRetriever::new(store, vocabulary);

        RagEngine::new(
            vector,
            tag_retriever,
            Arc::new(FixedClassifier { tags }),
            Arc::new(InlineFetcher),
        )
        .with_generator(LlmProvider::OpenAI, generator)
        .with_options(RagOptions {
            vector_top_k: 1,
            ..RagOptions::default()
        })
    }

    fn source_ids(reply: &ChatReply) -> Vec<&str> {
        reply.sources.iter().map(|s| s.body_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_nothing_found_returns_fallback_without_generating() {
        let generator = Arc::new(RecordingGenerator::default());
        let engine = engine(Arc::new(MemoryGraphStore::new()), Some(vec![]), false, generator.clone());

        let reply = engine.chat("Is salt bad?", LlmProvider::OpenAI).await.unwrap();

        assert_eq!(reply.response, NO_CONTEXT_MESSAGE);
        assert!(reply.sources.is_empty());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chat_merges_both_paths() {
        let generator = Arc::new(RecordingGenerator::default());
        let engine = engine(seeded_store().await, Some(vec!["Fasting", "Salt"]), false, generator.clone());

        let reply = engine.chat("Is salt ok while fasting?", LlmProvider::OpenAI).await.unwrap();

        assert_eq!(reply.response, "generated answer");
        assert_eq!(source_ids(&reply), vec!["b1", "b2"]);
        assert_eq!(reply.sources[0].origin, ContextOrigin::Vector);
        assert_eq!(reply.sources[1].origin, ContextOrigin::Tags);

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("User question: Is salt ok while fasting?\n\nContext:\n"));
        assert!(prompts[0].contains("Context 1:\nSalt is fine in moderation...."));
        assert!(prompts[0].contains("Context 2:\nSalt helps during fasts...."));
    }

    #[tokio::test]
    async fn test_stages_follow_request_order() {
        let generator = Arc::new(RecordingGenerator::default());
        let engine = engine(seeded_store().await, Some(vec!["Salt"]), false, generator);

        let reply = engine.chat("Is salt ok?", LlmProvider::OpenAI).await.unwrap();
        assert_eq!(
            reply.stages,
            vec![
                ChatStage::Received,
                ChatStage::ClassifyingTags,
                ChatStage::Retrieving,
                ChatStage::Merging,
                ChatStage::ContextReady,
                ChatStage::Generating,
                ChatStage::Done,
            ]
        );

        let empty = engine_with_empty_store();
        let reply = empty.chat("Is salt ok?", LlmProvider::OpenAI).await.unwrap();
        assert_eq!(
            reply.stages,
            vec![
                ChatStage::Received,
                ChatStage::ClassifyingTags,
                ChatStage::Retrieving,
                ChatStage::Merging,
                ChatStage::NoContext,
                ChatStage::Done,
            ]
        );
    }

    fn engine_with_empty_store() -> RagEngine {
        engine(
            Arc::new(MemoryGraphStore::new()),
            Some(vec![]),
            false,
            Arc::new(RecordingGenerator::default()),
        )
    }

    #[tokio::test]
    async fn test_retrieve_reports_tags_and_matches() {
        let generator = Arc::new(RecordingGenerator::default());
        let engine = engine(seeded_store().await, Some(vec!["Salt"]), false, generator.clone());

        let retrieval = engine.retrieve("Is salt ok?").await.unwrap();

        assert_eq!(retrieval.tags.len(), 1);
        assert_eq!(retrieval.vector_matches.len(), 1);
        // Both bodies carry Salt, so the tie at the cutoff keeps both.
        assert_eq!(retrieval.tag_matches.len(), 2);
        assert!(retrieval.outcome.is_ready());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_classification_failure_degrades_to_vector_only() {
        let generator = Arc::new(RecordingGenerator::default());
        let engine = engine(seeded_store().await, None, false, generator);

        let reply = engine.chat("Is salt ok?", LlmProvider::OpenAI).await.unwrap();
        assert_eq!(source_ids(&reply), vec!["b1"]);
    }

    #[tokio::test]
    async fn test_classification_failure_can_be_fatal() {
        let generator = Arc::new(RecordingGenerator::default());
        let engine = engine(seeded_store().await, None, false, generator.clone()).with_options(RagOptions {
            classification_failure: FailurePolicy::Fail,
            ..RagOptions::default()
        });

        let err = engine.chat("Is salt ok?", LlmProvider::OpenAI).await.unwrap_err();
        assert!(matches!(err, SvarError::Classification(_)));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_tags_only() {
        let generator = Arc::new(RecordingGenerator::default());
        let engine = engine(seeded_store().await, Some(vec!["Fasting"]), true, generator);

        let reply = engine.chat("Fasting?", LlmProvider::OpenAI).await.unwrap();
        assert_eq!(source_ids(&reply), vec!["b2"]);
        assert_eq!(reply.sources[0].origin, ContextOrigin::Tags);
    }

    #[tokio::test]
    async fn test_both_paths_failing_returns_first_error() {
        let generator = Arc::new(RecordingGenerator::default());
        let engine = engine(seeded_store().await, None, true, generator);

        let err = engine.chat("Is salt ok?", LlmProvider::OpenAI).await.unwrap_err();
        assert!(matches!(err, SvarError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_store_outage_is_fatal() {
        let generator = Arc::new(RecordingGenerator::default());
        let engine = engine(Arc::new(UnavailableStore), Some(vec!["Salt"]), false, generator);

        let err = engine.chat("Is salt ok?", LlmProvider::OpenAI).await.unwrap_err();
        assert!(matches!(err, SvarError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_rejects_empty_prompt_and_unknown_provider() {
        let generator = Arc::new(RecordingGenerator::default());
        let engine = engine(seeded_store().await, Some(vec![]), false, generator);

        let err = engine.chat("  ", LlmProvider::OpenAI).await.unwrap_err();
        assert!(matches!(err, SvarError::InvalidInput(_)));

        let err = engine.chat("Is salt ok?", LlmProvider::Groq).await.unwrap_err();
        assert!(matches!(err, SvarError::Config(_)));
    }
}
