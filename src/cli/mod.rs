//! CLI module for Svar.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use crate::config::{LlmProvider, TieBreakPolicy};
use clap::{Parser, Subcommand};

/// Svar - hybrid graph and vector RAG over Q&A transcripts
///
/// Answers questions from a graph of past questions, answer bodies and topic
/// tags, combining vector search with tag overlap.
#[derive(Parser, Debug)]
#[command(name = "svar")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check configuration, API keys and data files
    Doctor,

    /// Ask a question and get an answer from the knowledge base
    Ask {
        /// The question to ask
        question: String,

        /// LLM provider for the answer (openai, groq)
        #[arg(short, long)]
        provider: Option<LlmProvider>,

        /// Print the assembled context before the answer
        #[arg(long)]
        show_context: bool,
    },

    /// Find past questions similar to a query
    Search {
        /// Search query
        query: String,

        /// Maximum number of questions
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Classify a query into tags and list the bodies sharing them
    Tags {
        /// Query to classify
        query: String,

        /// Number of bodies before tie-breaking
        #[arg(short, long)]
        limit: Option<usize>,

        /// Tie-break policy (include_ties, priority_cap)
        #[arg(long)]
        tie_break: Option<TieBreakPolicy>,
    },

    /// Load Q&A records from a JSON file into the graph
    Ingest {
        /// Path to a JSON array of records
        file: String,
    },

    /// Show graph store statistics
    Stats,

    /// Start the HTTP chat API
    Serve {
        /// Host to bind to (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "retrieval.tie_break")
        key: String,
        /// Configuration value
        value: String,
    },

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask_with_provider() {
        let cli = Cli::try_parse_from(["svar", "-vv", "ask", "Is salt ok?", "--provider", "groq"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Ask { question, provider, show_context } => {
                assert_eq!(question, "Is salt ok?");
                assert_eq!(provider, Some(LlmProvider::Groq));
                assert!(!show_context);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_tags_with_policy() {
        let cli = Cli::try_parse_from(["svar", "tags", "fasting", "--tie-break", "priority_cap"]).unwrap();
        match cli.command {
            Commands::Tags { tie_break, limit, .. } => {
                assert_eq!(tie_break, Some(TieBreakPolicy::PriorityCap));
                assert_eq!(limit, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_provider() {
        assert!(Cli::try_parse_from(["svar", "ask", "q", "--provider", "bard"]).is_err());
    }
}
