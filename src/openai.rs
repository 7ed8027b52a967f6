//! OpenAI-compatible client configuration with sensible defaults.
//!
//! Groq exposes an OpenAI-compatible API, so both providers share one client type.

use crate::error::{Result, SvarError};
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Default timeout for LLM API requests (2 minutes).
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Base URL of Groq's OpenAI-compatible endpoint.
pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// Environment variable holding the Groq API key.
pub const GROQ_API_KEY_VAR: &str = "GROQ_API_KEY";

/// Create an OpenAI client with the default timeout.
pub fn create_client() -> Result<Client<OpenAIConfig>> {
    create_client_with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Create an OpenAI client with a custom timeout.
pub fn create_client_with_timeout(timeout: Duration) -> Result<Client<OpenAIConfig>> {
    Ok(Client::with_config(OpenAIConfig::default()).with_http_client(http_client(timeout)?))
}

/// Create a client pointed at Groq, keyed from `GROQ_API_KEY`.
pub fn create_groq_client(timeout: Duration) -> Result<Client<OpenAIConfig>> {
    let api_key = std::env::var(GROQ_API_KEY_VAR).unwrap_or_default();
    let config = OpenAIConfig::new()
        .with_api_base(GROQ_API_BASE)
        .with_api_key(api_key);

    Ok(Client::with_config(config).with_http_client(http_client(timeout)?))
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SvarError::Config(format!("Failed to create HTTP client: {}", e)))
}
