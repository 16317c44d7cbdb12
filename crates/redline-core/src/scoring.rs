//! Confidence scoring: six weighted factors, each normalized to [0,1].
//!
//! `score = 0.30·pattern_match_strength + 0.25·severity_alignment
//!        + 0.15·historical_success + 0.15·context_relevance
//!        + 0.10·domain_expertise + 0.05·specificity`
//!
//! Weights are configurable but must sum to 1.0; that is validated at
//! construction and a bad sum is fatal, never discovered mid-run.

use serde::{Deserialize, Serialize};

use crate::candidates::CorrectionCandidate;
use crate::catalog::CorrectionCatalog;
use crate::strategy::CorrectionStrategy;
use crate::types::{ConfidenceFactors, DocumentMetadata, Violation};
use crate::ConfigError;

/// Historical success rate assumed when the catalog has no history for a
/// strategy/gate pair.
pub const DEFAULT_HISTORICAL_SUCCESS: f64 = 0.5;

/// Weight sums are compared against 1.0 within this tolerance.
const WEIGHT_SUM_EPSILON: f64 = 1e-9;

/// Configurable weights for the six confidence factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScorerWeights {
    pub pattern_match_strength: f64,
    pub severity_alignment: f64,
    pub historical_success: f64,
    pub context_relevance: f64,
    pub domain_expertise: f64,
    pub specificity: f64,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        Self {
            pattern_match_strength: 0.30,
            severity_alignment: 0.25,
            historical_success: 0.15,
            context_relevance: 0.15,
            domain_expertise: 0.10,
            specificity: 0.05,
        }
    }
}

impl ScorerWeights {
    fn sum(&self) -> f64 {
        self.pattern_match_strength
            + self.severity_alignment
            + self.historical_success
            + self.context_relevance
            + self.domain_expertise
            + self.specificity
    }

    /// Validate that every weight is non-negative and the sum is 1.0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            self.pattern_match_strength,
            self.severity_alignment,
            self.historical_success,
            self.context_relevance,
            self.domain_expertise,
            self.specificity,
        ];
        if weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(ConfigError::InvalidWeights {
                reason: "weights must be finite and non-negative".to_string(),
            });
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ConfigError::InvalidWeights {
                reason: format!("weights must sum to 1.0, got {}", sum),
            });
        }
        Ok(())
    }
}

/// Assigns each candidate a confidence score in [0,1].
pub struct ConfidenceScorer<'a> {
    weights: ScorerWeights,
    catalog: &'a dyn CorrectionCatalog,
    metadata: &'a DocumentMetadata,
}

impl<'a> ConfidenceScorer<'a> {
    /// Weights are assumed already validated (engine construction does it).
    pub fn new(
        weights: ScorerWeights,
        catalog: &'a dyn CorrectionCatalog,
        metadata: &'a DocumentMetadata,
    ) -> Self {
        Self {
            weights,
            catalog,
            metadata,
        }
    }

    /// Score a candidate in place, filling `confidence` and `factors`.
    pub fn score(&self, candidate: &mut CorrectionCandidate, violation: &Violation) {
        let factors = ConfidenceFactors {
            pattern_match_strength: pattern_match_strength(candidate, violation),
            severity_alignment: severity_alignment(candidate),
            historical_success: self
                .catalog
                .historical_success(candidate.strategy.kind(), &candidate.gate_id)
                .unwrap_or(DEFAULT_HISTORICAL_SUCCESS)
                .clamp(0.0, 1.0),
            context_relevance: context_relevance(candidate, self.metadata),
            domain_expertise: candidate.domain_expertise.clamp(0.0, 1.0),
            specificity: candidate.specificity.clamp(0.0, 1.0),
        };

        let score = self.weights.pattern_match_strength * factors.pattern_match_strength
            + self.weights.severity_alignment * factors.severity_alignment
            + self.weights.historical_success * factors.historical_success
            + self.weights.context_relevance * factors.context_relevance
            + self.weights.domain_expertise * factors.domain_expertise
            + self.weights.specificity * factors.specificity;

        candidate.factors = factors;
        candidate.confidence = score.clamp(0.0, 1.0);
    }
}

/// How precisely the candidate's target pattern matches the violation's
/// evidence. Pattern strategies are measured against the evidence text;
/// positional strategies get a fixed mid-high score, plugins a neutral one.
fn pattern_match_strength(candidate: &CorrectionCandidate, violation: &Violation) -> f64 {
    match &candidate.strategy {
        CorrectionStrategy::RegexReplace { pattern, .. } => {
            match pattern.find(&violation.evidence) {
                Some(m) if m.as_str().len() == violation.evidence.len() => 1.0,
                Some(m) if !violation.evidence.is_empty() => {
                    m.as_str().len() as f64 / violation.evidence.len() as f64
                }
                Some(_) => 0.5,
                None => 0.0,
            }
        }
        CorrectionStrategy::TemplateInsert { .. } | CorrectionStrategy::StructuralReform(_) => 0.75,
        CorrectionStrategy::Plugin(_) => 0.5,
    }
}

/// Rewards candidates whose calibrated severity matches the violation's.
/// Exact match scores 1.0; each rank of distance costs a third.
fn severity_alignment(candidate: &CorrectionCandidate) -> f64 {
    let distance = candidate
        .violation_severity
        .rank()
        .abs_diff(candidate.strategy_severity.rank());
    1.0 - f64::from(distance) / 3.0
}

/// Compares the document-type metadata to the candidate's intended context.
/// No declared contexts is neutral; a declared match is full credit; a
/// declared mismatch keeps a small floor rather than zeroing the score.
fn context_relevance(candidate: &CorrectionCandidate, metadata: &DocumentMetadata) -> f64 {
    if candidate.intended_contexts.is_empty() {
        return 0.5;
    }
    match metadata.get("document_type") {
        Some(document_type) if candidate.intended_contexts.iter().any(|c| c == document_type) => 1.0,
        Some(_) => 0.2,
        None => 0.5,
    }
}
