//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{LlmProvider, Settings};
use crate::orchestrator::Orchestrator;
use crate::retrieval::{ContextOrigin, ContextOutcome};
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(
    question: &str,
    provider: Option<LlmProvider>,
    show_context: bool,
    settings: Settings,
) -> Result<()> {
    let provider = provider.unwrap_or(settings.llm.default_provider);

    // Pre-flight checks
    if let Err(e) = preflight::check(Operation::Ask(provider), &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'svar doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    let engine = orchestrator.rag_engine();

    let spinner = Output::spinner("Searching knowledge base...");

    match engine.chat(question, provider).await {
        Ok(reply) => {
            spinner.finish_and_clear();

            if show_context {
                if let ContextOutcome::Ready(context) = &reply.outcome {
                    Output::header("Context");
                    println!("{}", context.text);
                }
            }

            println!("\n{}\n", reply.response);

            if !reply.sources.is_empty() {
                Output::header("Sources");
                for source in &reply.sources {
                    let via = match source.origin {
                        ContextOrigin::Vector => "similar question",
                        ContextOrigin::Tags => "shared tags",
                    };
                    let title = source.question.as_deref().unwrap_or(&source.label);
                    Output::list_item(&format!("{} ({}: {})", title, via, source.tags.join(", ")));
                }
            }
        }
        Err(e) => {
            spinner.finish_and_clear();
            Output::error(&format!("Failed to generate answer: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
