//! Stats command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the stats command.
pub async fn run_stats(settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;

    match orchestrator.store().stats().await {
        Ok(stats) => {
            if stats.questions == 0 {
                Output::info("The graph is empty. Use 'svar ingest <file>' to add questions.");
                return Ok(());
            }

            Output::header("Graph");
            Output::kv("Questions", &stats.questions.to_string());
            Output::kv("Bodies", &stats.bodies.to_string());
            Output::kv("Tags", &stats.tags.to_string());
            Output::kv("Topics", &stats.topics.to_string());
            Output::kv("Tag links", &stats.tag_edges.to_string());
            Output::kv("Vocabulary", &format!("{} tags", orchestrator.vocabulary().len()));
            if let Some(dims) = orchestrator.store().index_dimensions().await? {
                Output::kv("Embedding dimensions", &dims.to_string());
            }
        }
        Err(e) => {
            Output::error(&format!("Failed to read graph statistics: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
