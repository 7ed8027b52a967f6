//! Grounded answer generation.

use crate::config::{LlmProvider, LlmSettings};
use crate::error::{Result, SvarError};
use crate::openai::{create_client_with_timeout, create_groq_client};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Trait for answer generation.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Produce an answer from a system prompt and the assembled context.
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Chat-completions generator for OpenAI and Groq.
pub struct OpenAIGenerator {
    client: Client<OpenAIConfig>,
    provider: LlmProvider,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIGenerator {
    /// Create a generator for `provider` using the configured model and limits.
    pub fn new(provider: LlmProvider, settings: &LlmSettings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.timeout_secs);
        let client = match provider {
            LlmProvider::OpenAI => create_client_with_timeout(timeout)?,
            LlmProvider::Groq => create_groq_client(timeout)?,
        };
        Ok(Self::with_client(client, provider, settings))
    }

    /// Create a generator around an existing client.
    pub fn with_client(
        client: Client<OpenAIConfig>,
        provider: LlmProvider,
        settings: &LlmSettings,
    ) -> Self {
        let model = match provider {
            LlmProvider::OpenAI => settings.openai_model.clone(),
            LlmProvider::Groq => settings.groq_model.clone(),
        };

        Self {
            client,
            provider,
            model,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl AnswerGenerator for OpenAIGenerator {
    #[instrument(skip(self, system_prompt, user_prompt), fields(provider = %self.provider, model = %self.model))]
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()
                .map_err(|e| SvarError::Generation(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_prompt)
                .build()
                .map_err(|e| SvarError::Generation(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .max_completion_tokens(self.max_tokens)
            .build()
            .map_err(|e| SvarError::Generation(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            SvarError::Generation(format!("{} request failed: {}", self.provider, e))
        })?;

        let answer = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| SvarError::Generation(format!("Empty response from {}", self.provider)))?;

        debug!("Generated {} characters", answer.len());
        Ok(answer.to_string())
    }
}
