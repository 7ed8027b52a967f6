//! Configuration module for Svar.
//!
//! Handles loading application settings, prompt templates and the tag vocabulary.

mod prompts;
mod settings;
mod vocabulary;

pub use prompts::{AnswerPrompts, ClassifierPrompts, Prompts};
pub use settings::{
    ClassifierSettings, EmbeddingSettings, FailurePolicy, GeneralSettings, GraphStoreSettings,
    LlmProvider, LlmSettings, PromptSettings, RagSettings, RetrievalSettings, ServerSettings,
    Settings, TagSettings, TieBreakPolicy,
};
pub use vocabulary::Vocabulary;
