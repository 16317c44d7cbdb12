//! Redline unified CLI.
//!
//! Validate documents against a gate ruleset and synthesize corrected text.
//!
//! # Quick Start
//!
//! ```bash
//! # Validate a document against the built-in gates
//! redline check draft.md
//!
//! # Validate and fix with a ruleset
//! redline fix draft.md --ruleset compliance.yaml --output fixed.md
//!
//! # Preview what a fix would do, as JSON
//! redline fix draft.md --ruleset compliance.yaml --dry-run --report
//! ```

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use redline_core::{
    gates::builtin, Document, DocumentMetadata, GateSet, InMemoryCatalog, RulesetConfig,
    SynthesisConfig, SynthesisEngine, TerminalState, ValidationRunner,
};

/// Redline - document validation and correction synthesis.
#[derive(Parser)]
#[command(name = "redline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a document and report violations.
    Check {
        /// Path to the document to validate.
        path: PathBuf,

        /// Ruleset file (YAML). Defaults to all built-in gates.
        #[arg(short, long)]
        ruleset: Option<PathBuf>,

        /// Emit the full validation report as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Validate a document and synthesize corrected text.
    Fix {
        /// Path to the document to correct.
        path: PathBuf,

        /// Ruleset file (YAML) with gates and correction rules.
        #[arg(short, long)]
        ruleset: PathBuf,

        /// Write the corrected text here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Document type used for context-relevance scoring.
        #[arg(long)]
        document_type: Option<String>,

        /// Hard cap on correction passes.
        #[arg(long, default_value_t = SynthesisConfig::default().max_iterations)]
        max_iterations: usize,

        /// Minimum confidence for automatic application.
        #[arg(long, default_value_t = SynthesisConfig::default().confidence_threshold)]
        confidence_threshold: f64,

        /// Run the full pipeline but discard the corrected text.
        #[arg(long)]
        dry_run: bool,

        /// Emit the full synthesis result as JSON on stdout.
        #[arg(long)]
        report: bool,
    },

    /// List the built-in gates.
    Gates,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { path, ruleset, json } => check(&path, ruleset.as_deref(), json),
        Commands::Fix {
            path,
            ruleset,
            output,
            document_type,
            max_iterations,
            confidence_threshold,
            dry_run,
            report,
        } => fix(
            &path,
            &ruleset,
            output.as_deref(),
            document_type,
            max_iterations,
            confidence_threshold,
            dry_run,
            report,
        ),
        Commands::Gates => {
            for gate in builtin::all() {
                println!("{}", gate.id());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn check(path: &std::path::Path, ruleset: Option<&std::path::Path>, json: bool) -> Result<ExitCode> {
    let text = read_document(path)?;
    let gates = match ruleset {
        Some(path) => gate_set(&load_ruleset(path)?)?,
        None => builtin::all()
            .into_iter()
            .fold(GateSet::new(), |set, gate| set.with(gate)),
    };

    let report = ValidationRunner::new(&gates).run(&text);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for violation in &report.violations {
            println!(
                "{} {} {}: {}",
                violation.severity, violation.span, violation.gate_id, violation.message
            );
        }
        println!(
            "{} violation(s), overall risk: {}",
            report.violations.len(),
            report.overall_risk
        );
    }

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[allow(clippy::too_many_arguments)]
fn fix(
    path: &std::path::Path,
    ruleset: &std::path::Path,
    output: Option<&std::path::Path>,
    document_type: Option<String>,
    max_iterations: usize,
    confidence_threshold: f64,
    dry_run: bool,
    report: bool,
) -> Result<ExitCode> {
    let text = read_document(path)?;
    let ruleset = load_ruleset(ruleset)?;
    let gates = gate_set(&ruleset)?;
    let catalog: Arc<InMemoryCatalog> = Arc::new(ruleset.build_catalog()?);

    let config = SynthesisConfig {
        max_iterations,
        confidence_threshold,
        ..SynthesisConfig::default()
    };
    let engine = SynthesisEngine::new(gates, catalog, config)?;

    let mut metadata = DocumentMetadata::new();
    if let Some(document_type) = document_type {
        metadata.insert("document_type".to_string(), document_type);
    }

    let result = engine.run(Document::new(text), &metadata);

    if report {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    if !dry_run {
        match output {
            Some(path) => fs::write(path, &result.final_text)
                .with_context(|| format!("failed to write {}", path.display()))?,
            None if !report => println!("{}", result.final_text),
            None => {}
        }
    }

    tracing::info!(
        terminal_state = ?result.terminal_state,
        applied = result.applied_corrections.len(),
        unresolved = result.unresolved_violations.len(),
        "synthesis finished"
    );

    let clean = matches!(result.terminal_state, TerminalState::Converged)
        && result.unresolved_violations.is_empty();
    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn read_document(path: &std::path::Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_ruleset(path: &std::path::Path) -> Result<RulesetConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read ruleset {}", path.display()))?;
    serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse ruleset {}", path.display()))
}

fn gate_set(ruleset: &RulesetConfig) -> Result<GateSet> {
    let mut gates = GateSet::new();
    for id in &ruleset.gates {
        match builtin::by_id(id) {
            Some(gate) => gates.register(gate),
            None => bail!("unknown gate '{}' in ruleset", id),
        }
    }
    Ok(gates)
}
