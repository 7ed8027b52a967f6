//! Doctor command - verify configuration, API keys and data files.

use crate::cli::Output;
use crate::config::{LlmProvider, Settings, Vocabulary};
use crate::openai::GROQ_API_KEY_VAR;
use console::style;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Svar Doctor");
    println!();
    println!("Checking configuration and data files...\n");

    let mut checks = Vec::new();

    println!("{}", style("API Configuration").bold());
    let api_checks = vec![
        check_api_key("OPENAI_API_KEY", true, "Set with: export OPENAI_API_KEY='sk-...'"),
        check_api_key(
            GROQ_API_KEY_VAR,
            settings.llm.default_provider == LlmProvider::Groq,
            "Set with: export GROQ_API_KEY='gsk_...' (needed for use_groq requests)",
        ),
    ];
    for check in &api_checks {
        check.print();
    }
    checks.extend(api_checks);

    println!();

    println!("{}", style("Data").bold());
    let data_checks = vec![check_vocabulary(settings), check_database(settings)];
    for check in &data_checks {
        check.print();
    }
    checks.extend(data_checks);

    println!();

    println!("{}", style("Configuration").bold());
    let config_check = check_config_file();
    config_check.print();
    checks.push(config_check);

    println!();

    // Summary
    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Svar.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! Svar is ready to use.");
    }

    Ok(())
}

/// Check if an API key is configured. Missing optional keys are warnings.
fn check_api_key(var: &str, required: bool, hint: &str) -> CheckResult {
    match std::env::var(var) {
        Ok(key) if key.len() > 12 => {
            let masked = format!("{}...{}", &key[..4], &key[key.len() - 4..]);
            CheckResult::ok(var, &format!("configured ({})", masked))
        }
        Ok(key) if !key.is_empty() => CheckResult::warning(var, "set but unusually short", hint),
        _ if required => CheckResult::error(var, "not set", hint),
        _ => CheckResult::warning(var, "not set", hint),
    }
}

/// Check that the tag vocabulary loads.
fn check_vocabulary(settings: &Settings) -> CheckResult {
    let path = settings.vocabulary_path();
    if !path.exists() {
        return CheckResult::error(
            "Tag vocabulary",
            &format!("{} not found", path.display()),
            "Create a JSON array of tags, e.g. [\"Fasting\", \"Salt\"]",
        );
    }

    match Vocabulary::load(&path) {
        Ok(vocab) if vocab.is_empty() => CheckResult::warning(
            "Tag vocabulary",
            &format!("{} is empty", path.display()),
            "Tag retrieval is disabled until tags are added",
        ),
        Ok(vocab) => CheckResult::ok(
            "Tag vocabulary",
            &format!("{} ({} tags)", path.display(), vocab.len()),
        ),
        Err(e) => CheckResult::error("Tag vocabulary", &e.to_string(), "Fix the JSON file"),
    }
}

/// Check the graph database file.
fn check_database(settings: &Settings) -> CheckResult {
    if settings.graph_store.provider == "memory" {
        return CheckResult::warning(
            "Graph store",
            "in-memory (contents are lost on exit)",
            "Set graph_store.provider = \"sqlite\" to persist",
        );
    }

    let db_path = settings.sqlite_path();
    if db_path.exists() {
        let size = std::fs::metadata(&db_path)
            .map(|m| format_size(m.len()))
            .unwrap_or_else(|_| "unknown size".to_string());
        CheckResult::ok("Graph store", &format!("{} ({})", db_path.display(), size))
    } else {
        CheckResult::warning(
            "Graph store",
            &format!("{} (not created yet)", db_path.display()),
            "Load data with: svar ingest <file.json>",
        )
    }
}

/// Check if config file exists.
fn check_config_file() -> CheckResult {
    let config_path = Settings::default_config_path();
    if config_path.exists() {
        CheckResult::ok("Config file", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: svar config set <section.key> <value>",
        )
    }
}

/// Format file size in human-readable format.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
