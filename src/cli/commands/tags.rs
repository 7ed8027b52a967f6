//! Tags command: classify a query and show the tag-matched bodies.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{Settings, TieBreakPolicy};
use crate::orchestrator::Orchestrator;
use crate::retrieval::TagRetriever;
use anyhow::Result;

/// Run the tags command.
pub async fn run_tags(
    query: &str,
    limit: Option<usize>,
    tie_break: Option<TieBreakPolicy>,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Tags, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'svar doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let limit = limit.unwrap_or(settings.retrieval.tag_top_k);
    let tie_break = tie_break.unwrap_or(settings.retrieval.tie_break);
    let priority_tags = settings.retrieval.priority_tags.clone();

    let orchestrator = Orchestrator::new(settings)?;
    let retriever = TagRetriever::new(orchestrator.store(), orchestrator.vocabulary())
        .with_tie_break(tie_break)
        .with_priority_tags(&priority_tags);

    let spinner = Output::spinner("Classifying...");
    let tags = orchestrator.classifier().classify(query).await;
    spinner.finish_and_clear();

    let tags = match tags {
        Ok(tags) => tags,
        Err(e) => {
            Output::error(&format!("Classification failed: {}", e));
            return Err(e.into());
        }
    };

    if tags.is_empty() {
        Output::warning("No vocabulary tags apply to this query.");
        return Ok(());
    }

    Output::header("Tags");
    for tag in &tags {
        Output::list_item(tag);
    }

    let matches = retriever.search_by_tags(&tags, limit).await?;
    if matches.is_empty() {
        Output::warning("No bodies carry these tags.");
        return Ok(());
    }

    Output::header(&format!("Bodies ({}, {})", matches.len(), tie_break));
    for m in &matches {
        let matched: Vec<String> = m.matched_tags.iter().cloned().collect();
        Output::body_match(m.body.label(), &matched, m.body.text.as_deref());
    }

    Ok(())
}
