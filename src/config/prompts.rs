//! Prompt templates for Svar.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub classifier: ClassifierPrompts,
    pub answer: AnswerPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: std::collections::HashMap<String, String>,
}

/// Prompts for mapping a question onto vocabulary tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierPrompts {
    pub system: String,
    pub user: String,
}

impl Default for ClassifierPrompts {
    fn default() -> Self {
        Self {
            system: r#"You label user questions with tags from a fixed list.

Rules:
- Only use tags that appear verbatim in TAGS_LIST
- Only select a tag when the question explicitly touches on that topic
- Do not guess related topics that the question does not mention
- If no tag applies, return an empty list

Respond with a JSON object of the form {"tags": ["Tag A", "Tag B"]} and nothing else."#
                .to_string(),

            user: r#"TAGS_LIST: {{tags}}

Question: {{question}}"#
                .to_string(),
        }
    }
}

/// Prompts for grounded answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerPrompts {
    pub system: String,
}

impl Default for AnswerPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are an assistant designed to answer questions based solely on the provided context. Your goal is to provide as much relevant detail from the context as possible without introducing any information from your prior training or knowledge that is not found in the context.

If the context contains relevant information that addresses the user's question, even if the answer is complex or ambiguous, provide that information in full.
If there is no direct answer, offer the most relevant insights based on the context without making unsupported assumptions or conclusions.
If the provided context is not sufficient to address the user's question at all, reply with 'I don't have enough information to answer this question.'"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&std::collections::HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let classifier_path = custom_path.join("classifier.toml");
            if classifier_path.exists() {
                let content = std::fs::read_to_string(&classifier_path)?;
                prompts.classifier = toml::from_str(&content)?;
            }

            let answer_path = custom_path.join("answer.toml");
            if answer_path.exists() {
                let content = std::fs::read_to_string(&answer_path)?;
                prompts.answer = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &std::collections::HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(
        &self,
        template: &str,
        vars: &std::collections::HashMap<String, String>,
    ) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
