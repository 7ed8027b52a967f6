//! Search command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::retrieval::VectorRetriever;
use anyhow::Result;

/// Run the search command.
pub async fn run_search(query: &str, limit: Option<usize>, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Embed, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let limit = limit.unwrap_or(settings.retrieval.vector_top_k);
    let orchestrator = Orchestrator::new(settings)?;
    if orchestrator.store().question_count().await? == 0 {
        Output::info("The graph is empty. Use 'svar ingest <file>' to add questions.");
        return Ok(());
    }
    let retriever = VectorRetriever::new(orchestrator.store(), orchestrator.embedder());

    let spinner = Output::spinner("Searching...");
    let results = retriever.search_by_vector(query, limit).await;
    spinner.finish_and_clear();

    match results {
        Ok(matches) => {
            if matches.is_empty() {
                Output::warning("No similar questions found.");
            } else {
                Output::success(&format!("Found {} similar questions", matches.len()));

                for m in &matches {
                    Output::question_match(&m.question_text, m.score, &m.tags, m.body.label());
                    if let Some(topic) = &m.topic {
                        Output::kv("topic", topic);
                    }
                }
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
