//! Ingest command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use std::path::Path;

/// Run the ingest command.
pub async fn run_ingest(file: &str, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Embed, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    if orchestrator.vocabulary().is_empty() {
        Output::warning("Tag vocabulary is empty; records will be ingested without tags.");
    }

    let path = Settings::expand_path(file);
    let spinner = Output::spinner(&format!("Ingesting {}...", display_name(&path)));
    let result = orchestrator.ingester().ingest_file(&path).await;
    spinner.finish_and_clear();

    match result {
        Ok(report) => {
            Output::success(&format!("Ingested {} questions", report.questions));
            Output::kv("Bodies", &report.bodies.to_string());
            Output::kv("Tags linked", &report.tags_linked.to_string());
            if report.tags_skipped > 0 {
                Output::kv("Tags skipped (not in vocabulary)", &report.tags_skipped.to_string());
            }
            if report.records_skipped > 0 {
                Output::warning(&format!(
                    "Skipped {} records without a question or body text",
                    report.records_skipped
                ));
            }
        }
        Err(e) => {
            Output::error(&format!("Ingest failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
