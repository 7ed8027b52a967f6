//! Pre-flight checks before expensive operations.
//!
//! Validates that API keys and the tag vocabulary are available before
//! starting operations that would otherwise fail midway.

use crate::config::{LlmProvider, Settings};
use crate::error::{Result, SvarError};
use crate::openai::GROQ_API_KEY_VAR;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Answering needs the OpenAI key, the provider's key and the vocabulary.
    Ask(LlmProvider),
    /// The server may answer with either provider.
    Serve,
    /// Tag classification needs the OpenAI key and the vocabulary.
    Tags,
    /// Embedding questions needs the OpenAI key.
    Embed,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    check_api_key("OPENAI_API_KEY", "sk-...")?;

    match operation {
        Operation::Ask(LlmProvider::Groq) => {
            check_api_key(GROQ_API_KEY_VAR, "gsk_...")?;
            check_vocabulary(settings)?;
        }
        Operation::Ask(LlmProvider::OpenAI) | Operation::Tags => {
            check_vocabulary(settings)?;
        }
        Operation::Serve => {
            check_vocabulary(settings)?;
            if check_api_key(GROQ_API_KEY_VAR, "gsk_...").is_err() {
                tracing::warn!("{} not set, requests with use_groq will fail", GROQ_API_KEY_VAR);
            }
        }
        Operation::Embed => {}
    }
    Ok(())
}

/// Check if an API key is configured.
fn check_api_key(var: &str, example: &str) -> Result<()> {
    match std::env::var(var) {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(SvarError::Config(format!(
            "{} is empty. Set it with: export {}='{}'",
            var, var, example
        ))),
        Err(_) => Err(SvarError::Config(format!(
            "{} not set. Set it with: export {}='{}'",
            var, var, example
        ))),
    }
}

/// Check that the tag vocabulary file exists.
fn check_vocabulary(settings: &Settings) -> Result<()> {
    let path = settings.vocabulary_path();
    if path.exists() {
        Ok(())
    } else {
        Err(SvarError::Config(format!(
            "Tag vocabulary not found at {}. Create a JSON array of tags there or set tags.vocabulary_path",
            path.display()
        )))
    }
}
