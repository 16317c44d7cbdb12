//! Candidate generation: violations in, unranked correction candidates out.
//!
//! Generation over distinct violations is independent and runs on the rayon
//! pool; results are merged in violation-id order so downstream stages see a
//! deterministic sequence. Ranking is the scorer's concern, not ours.

use rayon::prelude::*;

use crate::catalog::CorrectionCatalog;
use crate::strategy::CorrectionStrategy;
use crate::types::{ConfidenceFactors, Severity, Span, Violation};

/// A proposed transformation addressing one violation. Ephemeral: scoped to
/// a single pass, regenerated from scratch on the next one.
#[derive(Debug, Clone)]
pub struct CorrectionCandidate {
    pub id: String,
    pub violation_id: String,
    pub gate_id: String,
    pub violation_severity: Severity,
    /// Position of the strategy in the gate's catalog list. Identifies the
    /// concrete (gate, strategy) pairing across passes, where the span-based
    /// candidate id does not.
    pub ordinal: usize,
    pub strategy: CorrectionStrategy,
    pub target_span: Span,
    /// Filled in by the confidence scorer.
    pub confidence: f64,
    pub factors: ConfidenceFactors,
    // Static scoring inputs carried over from the catalog spec.
    pub strategy_severity: Severity,
    pub intended_contexts: Vec<String>,
    pub domain_expertise: f64,
    pub specificity: f64,
}

/// Produces candidates for each unresolved violation by querying the
/// correction catalog.
pub struct CandidateGenerator<'a> {
    catalog: &'a dyn CorrectionCatalog,
}

impl<'a> CandidateGenerator<'a> {
    pub fn new(catalog: &'a dyn CorrectionCatalog) -> Self {
        Self { catalog }
    }

    /// Generate all candidates for the given violations.
    ///
    /// A violation with no applicable strategies yields nothing; it passes
    /// through to the output unresolved. Multiple candidates per violation
    /// are allowed and unranked.
    pub fn generate(&self, violations: &[Violation]) -> Vec<CorrectionCandidate> {
        let mut candidates: Vec<CorrectionCandidate> = violations
            .par_iter()
            .flat_map_iter(|violation| {
                self.catalog
                    .candidates_for(violation)
                    .into_iter()
                    .enumerate()
                    .map(move |(ordinal, spec)| CorrectionCandidate {
                        id: format!("{}#{}", violation.id, ordinal),
                        violation_id: violation.id.clone(),
                        gate_id: violation.gate_id.clone(),
                        violation_severity: violation.severity,
                        ordinal,
                        strategy: spec.strategy,
                        target_span: violation.span,
                        confidence: 0.0,
                        factors: ConfidenceFactors::default(),
                        strategy_severity: spec.strategy_severity,
                        intended_contexts: spec.intended_contexts,
                        domain_expertise: spec.domain_expertise,
                        specificity: spec.specificity,
                    })
                    .collect::<Vec<_>>()
                    .into_iter()
            })
            .collect();

        // Deterministic merge: the parallel fan-out must not leak scheduling
        // order into the pipeline.
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        candidates
    }
}
