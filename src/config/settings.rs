//! Configuration settings for Svar.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub embedding: EmbeddingSettings,
    pub graph_store: GraphStoreSettings,
    pub tags: TagSettings,
    pub retrieval: RetrievalSettings,
    pub classifier: ClassifierSettings,
    pub llm: LlmSettings,
    pub rag: RagSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.svar".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding provider (openai).
    pub provider: String,
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

/// Graph store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphStoreSettings {
    /// Graph store provider (sqlite, memory).
    pub provider: String,
    /// Path to SQLite database (for sqlite provider).
    pub sqlite_path: String,
}

impl Default for GraphStoreSettings {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            sqlite_path: "~/.svar/graph.db".to_string(),
        }
    }
}

/// Controlled tag vocabulary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagSettings {
    /// Path to the JSON array of allowed tags.
    pub vocabulary_path: String,
}

impl Default for TagSettings {
    fn default() -> Self {
        Self {
            vocabulary_path: "~/.svar/tags_list.json".to_string(),
        }
    }
}

/// How the tag retriever resolves ties at the `top_k` boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakPolicy {
    /// Return every body tied with the `top_k`-th body (may exceed `top_k`).
    #[default]
    IncludeTies,
    /// Cap strictly at `top_k`, preferring bodies that match priority tags.
    PriorityCap,
}

impl std::str::FromStr for TieBreakPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "include_ties" | "ties" => Ok(TieBreakPolicy::IncludeTies),
            "priority_cap" | "priority" => Ok(TieBreakPolicy::PriorityCap),
            _ => Err(format!("Unknown tie-break policy: {}", s)),
        }
    }
}

impl std::fmt::Display for TieBreakPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TieBreakPolicy::IncludeTies => write!(f, "include_ties"),
            TieBreakPolicy::PriorityCap => write!(f, "priority_cap"),
        }
    }
}

/// Retrieval settings for both paths and the merger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Number of nearest questions to fetch.
    pub vector_top_k: usize,
    /// Number of best tag-matching bodies to fetch.
    pub tag_top_k: usize,
    /// Tie-break policy at the tag cutoff.
    pub tie_break: TieBreakPolicy,
    /// Tags that win ties under `priority_cap`, highest priority first.
    pub priority_tags: Vec<String>,
    /// Upper bound on bodies included in the context (0 = unbounded).
    pub max_bodies: usize,
    /// Timeout for fetching a single body's text.
    pub fetch_timeout_secs: u64,
}

impl RetrievalSettings {
    /// The configured body cap, if any.
    pub fn max_bodies(&self) -> Option<usize> {
        (self.max_bodies > 0).then_some(self.max_bodies)
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            vector_top_k: 2,
            tag_top_k: 2,
            tie_break: TieBreakPolicy::IncludeTies,
            priority_tags: vec!["Cancer".to_string(), "Kids".to_string()],
            max_bodies: 6,
            fetch_timeout_secs: 20,
        }
    }
}

/// Tag classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// LLM model used to classify queries into tags.
    pub model: String,
    /// Attempts before a malformed reply becomes a classification error.
    pub max_attempts: u32,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_attempts: 2,
        }
    }
}

/// LLM provider for answer generation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI chat completions (default).
    #[default]
    OpenAI,
    /// Groq's OpenAI-compatible endpoint.
    Groq,
}

impl std::str::FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAI),
            "groq" => Ok(LlmProvider::Groq),
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::OpenAI => write!(f, "openai"),
            LlmProvider::Groq => write!(f, "groq"),
        }
    }
}

/// Answer generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Provider used when a request does not choose one.
    pub default_provider: LlmProvider,
    /// OpenAI model for answers.
    pub openai_model: String,
    /// Groq model for answers.
    pub groq_model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens in a generated answer.
    pub max_tokens: u32,
    /// Timeout for a single LLM request.
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            default_provider: LlmProvider::OpenAI,
            openai_model: "gpt-4o-mini".to_string(),
            groq_model: "llama3-8b-8192".to_string(),
            temperature: 0.2,
            max_tokens: 1500,
            timeout_secs: 120,
        }
    }
}

/// What to do when one retrieval path fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Continue with whatever the other path found.
    #[default]
    Degrade,
    /// Abort the request.
    Fail,
}

/// RAG pipeline policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct RagSettings {
    /// Policy for tag classification failures.
    pub classification_failure: FailurePolicy,
    /// Policy for embedding failures on the vector path.
    pub embedding_failure: FailurePolicy,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Timeout for a whole chat request.
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            request_timeout_secs: 60,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::SvarError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("svar")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.graph_store.sqlite_path)
    }

    /// Get the expanded vocabulary file path.
    pub fn vocabulary_path(&self) -> PathBuf {
        Self::expand_path(&self.tags.vocabulary_path)
    }

    /// Apply a `section.key = value` override, as used by `svar config set`.
    pub fn set_value(&mut self, key: &str, value: &str) -> crate::error::Result<()> {
        let mut doc = toml::Value::try_from(&*self)
            .map_err(|e| crate::error::SvarError::Config(e.to_string()))?;

        let (section, field) = key.split_once('.').ok_or_else(|| {
            crate::error::SvarError::Config(format!("Key must look like 'section.key': {}", key))
        })?;

        let table = doc
            .get_mut(section)
            .and_then(|s| s.as_table_mut())
            .ok_or_else(|| crate::error::SvarError::Config(format!("Unknown section: {}", section)))?;

        let existing = table
            .get(field)
            .ok_or_else(|| crate::error::SvarError::Config(format!("Unknown key: {}", key)))?;

        let parsed = match existing {
            toml::Value::String(_) => toml::Value::String(value.to_string()),
            _ => toml::from_str::<toml::Table>(&format!("v = {}", value))
                .ok()
                .and_then(|mut t| t.remove("v"))
                .ok_or_else(|| {
                    crate::error::SvarError::Config(format!("Invalid value for {}: {}", key, value))
                })?,
        };
        table.insert(field.to_string(), parsed);

        *self = doc
            .try_into()
            .map_err(|e: toml::de::Error| crate::error::SvarError::Config(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.retrieval.vector_top_k, 2);
        assert_eq!(settings.retrieval.tag_top_k, 2);
        assert_eq!(settings.retrieval.tie_break, TieBreakPolicy::IncludeTies);
        assert_eq!(settings.llm.groq_model, "llama3-8b-8192");
        assert_eq!(settings.rag.classification_failure, FailurePolicy::Degrade);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [retrieval]
            tag_top_k = 5
            tie_break = "priority_cap"

            [llm]
            default_provider = "groq"
            "#,
        )
        .unwrap();

        assert_eq!(settings.retrieval.tag_top_k, 5);
        assert_eq!(settings.retrieval.vector_top_k, 2);
        assert_eq!(settings.retrieval.tie_break, TieBreakPolicy::PriorityCap);
        assert_eq!(settings.llm.default_provider, LlmProvider::Groq);
        assert_eq!(settings.embedding.dimensions, 1536);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.retrieval.max_bodies = 3;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.retrieval.max_bodies(), Some(3));

        settings.retrieval.max_bodies = 0;
        assert_eq!(settings.retrieval.max_bodies(), None);
    }

    #[test]
    fn test_set_value() {
        let mut settings = Settings::default();
        settings.set_value("retrieval.tag_top_k", "4").unwrap();
        settings.set_value("llm.openai_model", "gpt-4.1").unwrap();
        settings.set_value("retrieval.tie_break", "priority_cap").unwrap();

        assert_eq!(settings.retrieval.tag_top_k, 4);
        assert_eq!(settings.llm.openai_model, "gpt-4.1");
        assert_eq!(settings.retrieval.tie_break, TieBreakPolicy::PriorityCap);

        assert!(settings.set_value("retrieval.nope", "1").is_err());
        assert!(settings.set_value("no_section", "1").is_err());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("priority-cap".parse::<TieBreakPolicy>().unwrap(), TieBreakPolicy::PriorityCap);
        assert_eq!("GROQ".parse::<LlmProvider>().unwrap(), LlmProvider::Groq);
        assert!("bogus".parse::<LlmProvider>().is_err());
    }
}
