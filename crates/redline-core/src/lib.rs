//! # redline-core
//!
//! Deterministic document validation and correction synthesis engine.
//!
//! Redline validates free-text documents against a catalog of declarative
//! rules ("gates"), reports violations with severity and evidence, and then
//! synthesizes corrected text by iteratively applying targeted
//! transformations until no further improvement is possible or a safety
//! limit is reached.
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same input always produces the same final hash and
//!    the same ordering of applied corrections
//! 2. **Convergent**: The loop terminates for any finite violation and
//!    candidate set
//! 3. **Safe**: No correction that introduces an equal-or-worse violation is
//!    ever auto-applied
//! 4. **Auditable**: Every edit is recorded, traceable, and reversible via
//!    the snapshot history
//!
//! ## Example
//!
//! ```rust,ignore
//! use redline_core::{synthesize, Document, DocumentMetadata, GateSet, SynthesisConfig};
//!
//! let gates = GateSet::new().with(Box::new(MyGate));
//! let result = synthesize(gates, catalog, SynthesisConfig::default(),
//!     Document::new("Guaranteed 15% returns!"), &DocumentMetadata::new())?;
//!
//! println!("{:?}: {}", result.terminal_state, result.final_text);
//! ```

pub mod candidates;
pub mod catalog;
pub mod conflicts;
pub mod engine;
pub mod gates;
pub mod metrics;
pub mod scoring;
pub mod snapshots;
pub mod strategy;
pub mod types;

// Re-export main types at crate root
pub use candidates::{CandidateGenerator, CorrectionCandidate};
pub use catalog::{
    CorrectionCatalog, CorrectionConfig, InMemoryCatalog, RulesetConfig, StrategyConfig,
    StrategySpec,
};
pub use conflicts::{AcceptedCorrection, ConflictResolver, ResolvedPass};
pub use engine::{CancelFlag, SynthesisConfig, SynthesisEngine};
pub use gates::{
    FnGate, Gate, GateError, GateOutcome, GateSet, GateStatus, ValidationReport, ValidationRunner,
};
pub use scoring::{ConfidenceScorer, ScorerWeights, DEFAULT_HISTORICAL_SUCCESS};
pub use snapshots::{RollbackError, SnapshotStore};
pub use strategy::{
    CorrectionPlugin, CorrectionStrategy, EditOutcome, InsertPosition, Reform, StrategyError,
};
pub use types::{
    content_hash, AppliedCorrection, CandidateSummary, Conflict, ConflictKind, Document,
    DocumentMetadata, QualityMetrics, RiskLevel, Severity, Snapshot, Span, StrategyKind,
    SynthesisResult, TerminalState, Violation,
};

use std::sync::Arc;
use thiserror::Error;

/// Fatal configuration errors, raised at construction and never at run
/// time. Everything else in the pipeline degrades gracefully; these do not.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("scorer weights invalid: {reason}")]
    InvalidWeights { reason: String },

    #[error("gate set is empty")]
    EmptyGateSet,

    #[error("invalid correction pattern for gate '{gate_id}': {message}")]
    InvalidPattern { gate_id: String, message: String },

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

/// Run correction synthesis over a document.
///
/// This is the main entry point: it builds a [`SynthesisEngine`] (the only
/// step that can fail, on malformed configuration) and runs it to a terminal
/// state. Callers that need cancellation, preview mode, or engine reuse
/// should construct the engine directly.
pub fn synthesize(
    gates: GateSet,
    catalog: Arc<dyn CorrectionCatalog>,
    config: SynthesisConfig,
    document: Document,
    metadata: &DocumentMetadata,
) -> Result<SynthesisResult, ConfigError> {
    let engine = SynthesisEngine::new(gates, catalog, config)?;
    Ok(engine.run(document, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_synthesize_entry_point() {
        let gates = GateSet::new().with(Box::new(gates::builtin::GuaranteedClaimsGate));
        let catalog = Arc::new(
            InMemoryCatalog::builder()
                .strategy(
                    "guaranteed-claims",
                    StrategySpec::new(
                        CorrectionStrategy::RegexReplace {
                            pattern: Regex::new("(?i)guaranteed").unwrap(),
                            replacement: "Historically".to_string(),
                        },
                        Severity::Critical,
                    )
                    .with_weights(0.8, 0.8),
                )
                .build(),
        );

        let result = synthesize(
            gates,
            catalog,
            SynthesisConfig::default(),
            Document::new("Guaranteed 15% returns!"),
            &DocumentMetadata::new(),
        )
        .unwrap();

        assert_eq!(result.terminal_state, TerminalState::Converged);
        assert_eq!(result.final_text, "Historically 15% returns!");
    }

    #[test]
    fn test_config_error_prevents_any_result() {
        let gates = GateSet::new();
        let catalog: Arc<dyn CorrectionCatalog> = Arc::new(InMemoryCatalog::builder().build());
        let result = synthesize(
            gates,
            catalog,
            SynthesisConfig::default(),
            Document::new("text"),
            &DocumentMetadata::new(),
        );
        assert!(matches!(result, Err(ConfigError::EmptyGateSet)));
    }
}
