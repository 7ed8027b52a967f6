//! Error types for Svar.

use thiserror::Error;

/// Library-level error type for Svar operations.
#[derive(Error, Debug)]
pub enum SvarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tag classification failed: {0}")]
    Classification(String),

    #[error("Graph store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Failed to fetch body text: {0}")]
    TextFetch(String),

    #[error("Answer generation failed: {0}")]
    Generation(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl SvarError {
    /// Whether this error means the graph store could not serve the request.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, SvarError::StoreUnavailable(_) | SvarError::Database(_))
    }
}

/// Result type alias for Svar operations.
pub type Result<T> = std::result::Result<T, SvarError>;
