use std::path::Path;

use {
    aggrechans_config::{
        AggrechansConfig, Diagnostic, Severity, ValidationResult, validate_config,
        validate_toml_str,
    },
    aggrechans_routing::Dispatcher,
    anyhow::{Context, Result},
    clap::Subcommand,
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the dispatch rules the relay would use.
    Rules,
}

pub fn handle_config(action: ConfigAction, explicit: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check { verbose } => check(explicit, verbose),
        ConfigAction::Rules => {
            let (config, _) = aggrechans_config::load_or_discover(explicit)?;
            let dispatcher = Dispatcher::from_config(&config.relay)?;
            println!("{}", dispatcher.describe());
            Ok(())
        },
    }
}

/// Everything wrong with a loaded configuration: unknown keys in the TOML
/// file (when there is one), missing credentials, and a dispatch table that
/// cannot be built.
pub fn diagnose(path: Option<&Path>, config: &AggrechansConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::default();

    if let Some(path) = path
        && path.extension().is_some_and(|ext| ext == "toml")
    {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        result.diagnostics.extend(validate_toml_str(&raw).diagnostics);
    }

    result.diagnostics.extend(validate_config(config).diagnostics);

    if !result.has_errors()
        && let Err(e) = Dispatcher::from_config(&config.relay)
    {
        result.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "routing",
            path: "relay.dispatch".into(),
            message: e.to_string(),
        });
    }

    Ok(result)
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(explicit: Option<&Path>, verbose: bool) -> Result<()> {
    let (config, path) = aggrechans_config::load_or_discover(explicit)?;
    let result = diagnose(path.as_deref(), &config)?;

    if let Some(ref path) = path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking environment and defaults.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}
