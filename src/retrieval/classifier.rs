//! Query tag classification.
//!
//! An LLM maps the user's question onto the controlled vocabulary. Its reply must
//! be the JSON object `{"tags": [...]}`; anything else is retried and then rejected.
//! Tags outside the vocabulary are dropped, never trusted.

use crate::config::{Prompts, Vocabulary};
use crate::error::{Result, SvarError};
use crate::openai::create_client;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Trait for query tag classification.
#[async_trait]
pub trait TagClassifier: Send + Sync {
    /// Select the vocabulary tags evidenced by `query`. May be empty.
    async fn classify(&self, query: &str) -> Result<BTreeSet<String>>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassifierReply {
    tags: Vec<String>,
}

/// Parse a classifier reply and restrict it to the vocabulary.
pub fn parse_reply(raw: &str, vocabulary: &Vocabulary) -> Result<BTreeSet<String>> {
    let reply: ClassifierReply = serde_json::from_str(raw.trim())
        .map_err(|e| SvarError::Classification(format!("Malformed classifier reply: {}", e)))?;

    let (kept, rejected) = vocabulary.partition(&reply.tags);
    if !rejected.is_empty() {
        warn!("Dropping tags outside the vocabulary: {:?}", rejected);
    }
    Ok(kept)
}

/// OpenAI-backed tag classifier.
pub struct OpenAITagClassifier {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    vocabulary: Arc<Vocabulary>,
    prompts: Prompts,
    max_attempts: u32,
}

impl OpenAITagClassifier {
    /// Create a new classifier.
    pub fn new(model: &str, vocabulary: Arc<Vocabulary>) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: model.to_string(),
            vocabulary,
            prompts: Prompts::default(),
            max_attempts: 2,
        })
    }

    /// Use an existing client, e.g. one pointed at a compatible endpoint.
    pub fn with_client(mut self, client: async_openai::Client<async_openai::config::OpenAIConfig>) -> Self {
        self.client = client;
        self
    }

    /// Set custom prompts.
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    /// Set how many replies may be malformed before giving up.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn build_messages(&self, query: &str) -> Result<Vec<ChatCompletionRequestMessage>> {
        let tags_json = serde_json::to_string(self.vocabulary.tags())?;

        let mut vars = HashMap::new();
        vars.insert("tags".to_string(), tags_json);
        vars.insert("question".to_string(), query.to_string());
        let user_prompt = self.prompts.render_with_custom(&self.prompts.classifier.user, &vars);

        Ok(vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.prompts.classifier.system.clone())
                .build()
                .map_err(|e| SvarError::Classification(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_prompt)
                .build()
                .map_err(|e| SvarError::Classification(e.to_string()))?
                .into(),
        ])
    }
}

#[async_trait]
impl TagClassifier for OpenAITagClassifier {
    #[instrument(skip(self), fields(query = %query))]
    async fn classify(&self, query: &str) -> Result<BTreeSet<String>> {
        if query.trim().is_empty() {
            return Err(SvarError::InvalidInput("Query must not be empty".to_string()));
        }
        if self.vocabulary.is_empty() {
            return Ok(BTreeSet::new());
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.build_messages(query)?)
            .response_format(ResponseFormat::JsonObject)
            .temperature(0.0)
            .build()
            .map_err(|e| SvarError::Classification(e.to_string()))?;

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            let response = self
                .client
                .chat()
                .create(request.clone())
                .await
                .map_err(|e| SvarError::Classification(format!("Classifier API error: {}", e)))?;

            let raw = response
                .choices
                .first()
                .and_then(|c| c.message.content.clone())
                .unwrap_or_default();

            match parse_reply(&raw, &self.vocabulary) {
                Ok(tags) => {
                    debug!("Classified query into {} tags: {:?}", tags.len(), tags);
                    return Ok(tags);
                }
                Err(e) => {
                    warn!("Attempt {}/{}: {}", attempt, self.max_attempts, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| SvarError::Classification("No classifier attempts made".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vocabulary {
        Vocabulary::new(["Fasting", "Salt", "Cancer"]).unwrap()
    }

    #[test]
    fn test_parse_valid_reply() {
        let tags = parse_reply(r#"{"tags": ["Salt", "Fasting"]}"#, &vocab()).unwrap();
        assert_eq!(tags.into_iter().collect::<Vec<_>>(), vec!["Fasting", "Salt"]);
    }

    #[test]
    fn test_parse_filters_unknown_and_canonicalizes() {
        let tags = parse_reply(r#"{"tags": ["salt", "Bananas", " Cancer "]}"#, &vocab()).unwrap();
        assert_eq!(tags.into_iter().collect::<Vec<_>>(), vec!["Cancer", "Salt"]);
    }

    #[test]
    fn test_parse_empty_list() {
        assert!(parse_reply(r#"{"tags": []}"#, &vocab()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_free_text() {
        for raw in [
            "['Salt', 'Fasting']",
            "Salt, Fasting",
            r#"{"tags": "Salt"}"#,
            r#"{"tags": ["Salt"], "reason": "mentions salt"}"#,
            "",
        ] {
            let err = parse_reply(raw, &vocab()).unwrap_err();
            assert!(matches!(err, SvarError::Classification(_)), "accepted {:?}", raw);
        }
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected_before_calling_llm() {
        let classifier = OpenAITagClassifier::new("gpt-4o-mini", Arc::new(vocab())).unwrap();
        let err = classifier.classify("   ").await.unwrap_err();
        assert!(matches!(err, SvarError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_empty_vocabulary_short_circuits() {
        let classifier =
            OpenAITagClassifier::new("gpt-4o-mini", Arc::new(Vocabulary::default())).unwrap();
        assert!(classifier.classify("Is salt fine?").await.unwrap().is_empty());
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
    }

    fn classifier_for(server: &wiremock::MockServer) -> OpenAITagClassifier {
        let config = async_openai::config::OpenAIConfig::new()
            .with_api_base(server.uri())
            .with_api_key("test-key");
        OpenAITagClassifier::new("gpt-4o-mini", Arc::new(vocab()))
            .unwrap()
            .with_client(async_openai::Client::with_config(config))
    }

    #[tokio::test]
    async fn test_classify_retries_malformed_reply() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Salt, obviously")))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion(r#"{"tags": ["Salt"]}"#)),
            )
            .mount(&server)
            .await;

        let tags = classifier_for(&server).classify("Is salt ok?").await.unwrap();
        assert_eq!(tags.into_iter().collect::<Vec<_>>(), vec!["Salt"]);
    }

    #[tokio::test]
    async fn test_classify_gives_up_after_max_attempts() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("no json here")))
            .expect(3)
            .mount(&server)
            .await;

        let classifier = classifier_for(&server).with_max_attempts(3);
        let err = classifier.classify("Is salt ok?").await.unwrap_err();
        assert!(matches!(err, SvarError::Classification(_)));
    }
}
