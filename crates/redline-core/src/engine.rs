//! The synthesis loop: validate, generate, score, resolve, apply, repeat.
//!
//! One engine instance drives one document at a time. The loop is
//! deterministic end to end: identical input always yields an identical
//! final hash and an identical ordering of applied corrections. Termination
//! is guaranteed by the iteration cap plus the convergence early-stop; a
//! pass that applies nothing ends the loop immediately.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::candidates::{CandidateGenerator, CorrectionCandidate};
use crate::catalog::CorrectionCatalog;
use crate::conflicts::{AcceptedCorrection, ConflictResolver};
use crate::gates::{GateSet, ValidationRunner};
use crate::metrics;
use crate::scoring::{ConfidenceScorer, ScorerWeights};
use crate::types::{
    content_hash, AppliedCorrection, CandidateSummary, Conflict, Document, DocumentMetadata,
    QualityMetrics, Snapshot, Span, SynthesisResult, TerminalState, Violation,
};
use crate::ConfigError;

/// Tunables for one synthesis run. Validated once, at engine construction;
/// a bad configuration never gets as far as a pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Hard cap on correction passes.
    pub max_iterations: usize,
    /// Improvement ratio below which a pass counts as stalled; two stalled
    /// passes in a row stop the loop early.
    pub convergence_threshold: f64,
    /// Minimum confidence for automatic application. Candidates below it are
    /// reported for manual review instead.
    pub confidence_threshold: f64,
    pub weights: ScorerWeights,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            convergence_threshold: 0.05,
            confidence_threshold: 0.6,
            weights: ScorerWeights::default(),
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                reason: "max_iterations must be at least 1".to_string(),
            });
        }
        for (name, value) in [
            ("convergence_threshold", self.convergence_threshold),
            ("confidence_threshold", self.confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) || !value.is_finite() {
                return Err(ConfigError::Invalid {
                    reason: format!("{} must be within [0, 1], got {}", name, value),
                });
            }
        }
        self.weights.validate()
    }
}

/// Cooperative cancellation signal, checked between iterations only. The
/// current snapshot stays valid and is returned as a partial result.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The correction synthesis engine.
///
/// Multiple documents may be processed concurrently by separate engine
/// instances; nothing here is shared mutable state. The catalog must stay
/// read-only for the duration of a run.
pub struct SynthesisEngine {
    gates: GateSet,
    catalog: Arc<dyn CorrectionCatalog>,
    config: SynthesisConfig,
}

impl SynthesisEngine {
    /// Construct an engine. This is the only place synthesis can fail
    /// outright: malformed weights or an empty gate set are configuration
    /// errors, detected here and never at run time.
    pub fn new(
        gates: GateSet,
        catalog: Arc<dyn CorrectionCatalog>,
        config: SynthesisConfig,
    ) -> Result<Self, ConfigError> {
        if gates.is_empty() {
            return Err(ConfigError::EmptyGateSet);
        }
        config.validate()?;
        Ok(Self {
            gates,
            catalog,
            config,
        })
    }

    pub fn gates(&self) -> &GateSet {
        &self.gates
    }

    /// Run synthesis to a terminal state.
    pub fn run(&self, document: Document, metadata: &DocumentMetadata) -> SynthesisResult {
        self.run_with_cancel(document, metadata, &CancelFlag::new())
    }

    /// Run the identical pipeline without retaining anything: preview mode.
    /// The returned result is the caller's to discard; the engine keeps no
    /// state and the historical-success table is never touched. Violations
    /// are re-derived from scratch on every pass, so a caller-supplied list
    /// would be discarded by the first validation anyway and is not accepted.
    pub fn preview(&self, text: &str, metadata: &DocumentMetadata) -> SynthesisResult {
        self.run(Document::new(text), metadata)
    }

    /// Run synthesis, checking `cancel` between iterations.
    pub fn run_with_cancel(
        &self,
        document: Document,
        metadata: &DocumentMetadata,
        cancel: &CancelFlag,
    ) -> SynthesisResult {
        let runner = ValidationRunner::new(&self.gates);
        let catalog: &dyn CorrectionCatalog = self.catalog.as_ref();

        let mut text = document.text;
        let mut report = runner.run(&text);

        let mut snapshots: Vec<Snapshot> = vec![Snapshot {
            iteration: 0,
            text: text.clone(),
            hash: document.hash,
            violations_remaining: report.violations.clone(),
            applied: Vec::new(),
            metrics_so_far: QualityMetrics::default(),
        }];
        patch_metrics(&mut snapshots);

        let mut applied_corrections: Vec<AppliedCorrection> = Vec::new();
        let mut conflicts: Vec<Conflict> = Vec::new();
        let mut manual_review: Vec<CandidateSummary> = Vec::new();
        // Losers of conflict resolution, keyed by (gate, strategy ordinal) so
        // only the concrete losing pairing is tracked. One defeat earns one
        // retry; two defeats and the pairing is discarded.
        let mut defeats: HashMap<(String, usize), u32> = HashMap::new();
        let mut manual_seen: HashSet<String> = HashSet::new();
        let mut stalled_passes = 0u32;

        let terminal_state = loop {
            if cancel.is_cancelled() {
                tracing::info!(iteration = snapshots.len() - 1, "cancelled between iterations");
                break TerminalState::Cancelled;
            }
            if report.violations.is_empty() {
                break TerminalState::Converged;
            }
            if snapshots.len() - 1 >= self.config.max_iterations {
                tracing::warn!(
                    max_iterations = self.config.max_iterations,
                    remaining = report.violations.len(),
                    "iteration cap reached with violations remaining"
                );
                break TerminalState::MaxIterations;
            }

            let iteration = snapshots.len();
            let violations_before = report.violations.len();

            // Generate and score.
            let mut candidates = CandidateGenerator::new(catalog).generate(&report.violations);
            candidates.retain(|c| {
                defeats
                    .get(&(c.gate_id.clone(), c.ordinal))
                    .copied()
                    .unwrap_or(0)
                    < 2
            });

            let by_id: HashMap<&str, &Violation> = report
                .violations
                .iter()
                .map(|v| (v.id.as_str(), v))
                .collect();
            let scorer = ConfidenceScorer::new(self.config.weights, catalog, metadata);
            for candidate in &mut candidates {
                if let Some(violation) = by_id.get(candidate.violation_id.as_str()) {
                    scorer.score(candidate, violation);
                }
            }

            let (auto, low): (Vec<CorrectionCandidate>, Vec<CorrectionCandidate>) = candidates
                .into_iter()
                .partition(|c| c.confidence >= self.config.confidence_threshold);
            for candidate in low {
                // A persistent low-confidence candidate is reported once, not
                // once per pass.
                if manual_seen.insert(candidate.id.clone()) {
                    manual_review.push(CandidateSummary {
                        candidate_id: candidate.id.clone(),
                        violation_id: candidate.violation_id.clone(),
                        strategy: candidate.strategy.kind(),
                        target_span: candidate.target_span,
                        confidence: candidate.confidence,
                        reason: format!(
                            "below confidence threshold {}",
                            self.config.confidence_threshold
                        ),
                    });
                }
            }
            if auto.is_empty() {
                break TerminalState::NoCandidates;
            }

            // Resolve conflicts (single-threaded, deterministic).
            let resolver = ConflictResolver::new(catalog, &self.gates);
            let pass = resolver.resolve(&text, &report.violations, auto);
            conflicts.extend(pass.conflicts);
            for summary in pass.manual_review {
                if manual_seen.insert(summary.candidate_id.clone()) {
                    manual_review.push(summary);
                }
            }
            for loser in &pass.deferred {
                *defeats
                    .entry((loser.gate_id.clone(), loser.ordinal))
                    .or_insert(0) += 1;
            }
            if pass.accepted.is_empty() {
                break TerminalState::NoCandidates;
            }

            // Apply the accepted edits in one batch.
            let (new_text, iteration_applied) =
                apply_accepted(&text, &pass.accepted, iteration);
            text = new_text;
            report = runner.run(&text);

            snapshots.push(Snapshot {
                iteration,
                text: text.clone(),
                hash: content_hash(&text),
                violations_remaining: report.violations.clone(),
                applied: iteration_applied.clone(),
                metrics_so_far: QualityMetrics::default(),
            });
            patch_metrics(&mut snapshots);
            applied_corrections.extend(iteration_applied);

            let violations_after = report.violations.len();
            let improvement =
                (violations_before.saturating_sub(violations_after)) as f64 / violations_before as f64;
            tracing::debug!(
                iteration,
                violations_before,
                violations_after,
                improvement,
                "pass complete"
            );

            if improvement < self.config.convergence_threshold {
                stalled_passes += 1;
                if stalled_passes >= 2 {
                    break TerminalState::Converged;
                }
            } else {
                stalled_passes = 0;
            }
        };

        let metrics = metrics::compute(&snapshots, &Default::default());
        let final_hash = snapshots
            .last()
            .map(|s| s.hash.clone())
            .unwrap_or_else(|| content_hash(&text));

        SynthesisResult {
            final_text: text,
            final_hash,
            terminal_state,
            snapshots,
            applied_corrections,
            unresolved_violations: report.violations,
            conflicts,
            manual_review,
            metrics,
            completed_at: Utc::now(),
        }
    }
}

/// Splice all accepted edits into the pass-start text in ascending span
/// order, producing the new text and the audit records with their spans in
/// final coordinates.
fn apply_accepted(
    text: &str,
    accepted: &[AcceptedCorrection],
    iteration: usize,
) -> (String, Vec<AppliedCorrection>) {
    let mut ordered: Vec<&AcceptedCorrection> = accepted.iter().collect();
    ordered.sort_by_key(|a| a.outcome.span_source.start);

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    let mut records = Vec::with_capacity(ordered.len());

    for (index, correction) in ordered.iter().enumerate() {
        let source = correction.outcome.span_source;
        out.push_str(&text[cursor..source.start]);
        let final_start = out.len();
        out.push_str(&correction.outcome.replacement);
        cursor = source.end;

        records.push(AppliedCorrection {
            id: format!("corr-{}-{}", iteration, index),
            iteration,
            violation_id: correction.candidate.violation_id.clone(),
            strategy: correction.candidate.strategy.kind(),
            span_before: source,
            span_after: Span::new(final_start, final_start + correction.outcome.replacement.len()),
            replacement: correction.outcome.replacement.clone(),
            confidence: correction.candidate.confidence,
            timestamp_logical: iteration,
        });
    }
    out.push_str(&text[cursor..]);

    (out, records)
}

/// Recompute the latest snapshot's metrics from the whole history.
fn patch_metrics(snapshots: &mut [Snapshot]) {
    let metrics = metrics::compute(snapshots, &Default::default());
    if let Some(last) = snapshots.last_mut() {
        last.metrics_so_far = metrics;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, StrategySpec};
    use crate::gates::builtin::GuaranteedClaimsGate;
    use crate::gates::FnGate;
    use crate::strategy::CorrectionStrategy;
    use crate::types::{Severity, StrategyKind};
    use regex::Regex;

    fn claims_catalog(confidence_boosting_history: bool) -> Arc<InMemoryCatalog> {
        let mut builder = InMemoryCatalog::builder().strategy(
            "guaranteed-claims",
            StrategySpec::new(
                CorrectionStrategy::RegexReplace {
                    pattern: Regex::new("(?i)guaranteed").unwrap(),
                    replacement: "Historically".to_string(),
                },
                Severity::Critical,
            )
            .with_weights(0.8, 0.8),
        );
        if confidence_boosting_history {
            builder = builder.history(StrategyKind::RegexReplace, "guaranteed-claims", 0.9);
        }
        Arc::new(builder.build())
    }

    fn claims_engine() -> SynthesisEngine {
        let gates = GateSet::new().with(Box::new(GuaranteedClaimsGate));
        SynthesisEngine::new(gates, claims_catalog(true), SynthesisConfig::default()).unwrap()
    }

    #[test]
    fn test_example_scenario_converges_in_one_iteration() {
        let engine = claims_engine();
        let result = engine.run(Document::new("Guaranteed 15% returns!"), &DocumentMetadata::new());

        assert_eq!(result.terminal_state, TerminalState::Converged);
        assert_eq!(result.final_text, "Historically 15% returns!");
        assert!(result.unresolved_violations.is_empty());
        assert_eq!(result.applied_corrections.len(), 1);
        assert_eq!(result.snapshots.len(), 2);
        assert_eq!(result.metrics.recall, 1.0);
    }

    #[test]
    fn test_clean_document_converges_immediately() {
        let engine = claims_engine();
        let result = engine.run(Document::new("Nothing to see."), &DocumentMetadata::new());
        assert_eq!(result.terminal_state, TerminalState::Converged);
        assert_eq!(result.snapshots.len(), 1);
        assert!(result.applied_corrections.is_empty());
    }

    #[test]
    fn test_unfixable_violation_ends_with_no_candidates() {
        let gates = GateSet::new().with(Box::new(GuaranteedClaimsGate));
        let catalog = Arc::new(InMemoryCatalog::builder().build());
        let engine = SynthesisEngine::new(gates, catalog, SynthesisConfig::default()).unwrap();

        let result = engine.run(Document::new("Guaranteed wins."), &DocumentMetadata::new());
        assert_eq!(result.terminal_state, TerminalState::NoCandidates);
        assert_eq!(result.unresolved_violations.len(), 1);
        // The original document passes through untouched.
        assert_eq!(result.final_text, "Guaranteed wins.");
    }

    #[test]
    fn test_empty_gate_set_is_config_error() {
        let result = SynthesisEngine::new(
            GateSet::new(),
            claims_catalog(false),
            SynthesisConfig::default(),
        );
        assert!(matches!(result, Err(ConfigError::EmptyGateSet)));
    }

    #[test]
    fn test_bad_weights_are_config_error() {
        let gates = GateSet::new().with(Box::new(GuaranteedClaimsGate));
        let mut config = SynthesisConfig::default();
        config.weights.specificity = 0.9;
        let result = SynthesisEngine::new(gates, claims_catalog(false), config);
        assert!(matches!(result, Err(ConfigError::InvalidWeights { .. })));
    }

    #[test]
    fn test_determinism_identical_runs() {
        let engine = claims_engine();
        let metadata = DocumentMetadata::new();
        let doc = "Guaranteed returns, guaranteed growth, call 555-123-4567.";

        let a = engine.run(Document::new(doc), &metadata);
        let b = engine.run(Document::new(doc), &metadata);

        assert_eq!(a.final_hash, b.final_hash);
        let ids_a: Vec<&str> = a.applied_corrections.iter().map(|c| c.id.as_str()).collect();
        let ids_b: Vec<&str> = b.applied_corrections.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_cancellation_returns_partial_result() {
        let engine = claims_engine();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = engine.run_with_cancel(
            Document::new("Guaranteed returns!"),
            &DocumentMetadata::new(),
            &cancel,
        );
        assert_eq!(result.terminal_state, TerminalState::Cancelled);
        // Snapshot 0 is intact and returned.
        assert_eq!(result.snapshots.len(), 1);
        assert_eq!(result.snapshots[0].hash, result.final_hash);
    }

    #[test]
    fn test_max_iterations_bounds_the_loop() {
        // A gate that reports only the first "aa" it sees, so each pass can
        // fix exactly one of many. With the early stop disabled the cap is
        // the only thing that ends the loop.
        let gates = GateSet::new().with(Box::new(FnGate::new("churn", |text: &str| {
            Ok(text
                .match_indices("aa")
                .take(1)
                .map(|(start, m)| {
                    Violation::new(
                        "churn",
                        Severity::Medium,
                        Span::new(start, start + m.len()),
                        "churn",
                        text,
                    )
                })
                .collect())
        })));
        let catalog = Arc::new(
            InMemoryCatalog::builder()
                .strategy(
                    "churn",
                    StrategySpec::new(
                        CorrectionStrategy::RegexReplace {
                            pattern: Regex::new("aa").unwrap(),
                            replacement: "bb".to_string(),
                        },
                        Severity::Medium,
                    )
                    .with_weights(0.9, 0.9),
                )
                .history(StrategyKind::RegexReplace, "churn", 0.9)
                .build(),
        );

        let config = SynthesisConfig {
            max_iterations: 3,
            convergence_threshold: 0.0, // disable the early stop
            ..SynthesisConfig::default()
        };
        let engine = SynthesisEngine::new(gates, catalog, config).unwrap();

        let result = engine.run(
            Document::new("aa aa aa aa aa aa aa aa aa aa"),
            &DocumentMetadata::new(),
        );
        assert_eq!(result.terminal_state, TerminalState::MaxIterations);
        assert_eq!(result.snapshots.len(), 4); // iteration 0 plus three passes
        assert_eq!(result.applied_corrections.len(), 3);
        assert!(!result.unresolved_violations.is_empty());
    }

    #[test]
    fn test_stalled_improvement_stops_early() {
        // Every pass trades one flagged token for a less severe one, so the
        // violation count never drops: improvement is 0 twice in a row and
        // the loop converges early instead of burning the full cap.
        let gates = GateSet::new().with(Box::new(FnGate::new("stall", |text: &str| {
            let flagged = [
                ("aa", Severity::High),
                ("zz", Severity::Medium),
                ("yy", Severity::Low),
            ];
            Ok(flagged
                .iter()
                .flat_map(|(needle, severity)| {
                    text.match_indices(needle).map(|(start, m)| {
                        Violation::new(
                            "stall",
                            *severity,
                            Span::new(start, start + m.len()),
                            "stall",
                            text,
                        )
                    })
                })
                .collect::<Vec<_>>())
        })));
        let catalog = Arc::new(
            InMemoryCatalog::builder()
                .strategy(
                    "stall",
                    StrategySpec::new(
                        CorrectionStrategy::RegexReplace {
                            pattern: Regex::new("aa").unwrap(),
                            replacement: "zz".to_string(),
                        },
                        Severity::High,
                    )
                    .with_weights(0.9, 0.9),
                )
                .strategy(
                    "stall",
                    StrategySpec::new(
                        CorrectionStrategy::RegexReplace {
                            pattern: Regex::new("zz").unwrap(),
                            replacement: "yy".to_string(),
                        },
                        Severity::Medium,
                    )
                    .with_weights(0.9, 0.9),
                )
                .history(StrategyKind::RegexReplace, "stall", 0.95)
                .build(),
        );

        let engine =
            SynthesisEngine::new(gates, catalog, SynthesisConfig::default()).unwrap();
        let result = engine.run(Document::new("aa aa aa"), &DocumentMetadata::new());

        assert_eq!(result.terminal_state, TerminalState::Converged);
        // Two stalled passes end the loop well before the default cap of 8.
        assert!(result.snapshots.len() <= 3);
    }

    #[test]
    fn test_manual_review_reports_persistent_candidate_once() {
        // gate-weak's only strategy never matches its evidence, so its
        // candidate stays below the confidence threshold on every pass. It
        // must show up in manual_review once, not once per pass.
        let gates = GateSet::new()
            .with(Box::new(FnGate::new("gate-fix", |text: &str| {
                Ok(text
                    .match_indices("aa")
                    .take(1)
                    .map(|(start, m)| {
                        Violation::new(
                            "gate-fix",
                            Severity::Critical,
                            Span::new(start, start + m.len()),
                            "flagged",
                            text,
                        )
                    })
                    .collect())
            })))
            .with(Box::new(FnGate::new("gate-weak", |text: &str| {
                Ok(text
                    .match_indices("kk")
                    .map(|(start, m)| {
                        Violation::new(
                            "gate-weak",
                            Severity::Low,
                            Span::new(start, start + m.len()),
                            "flagged",
                            text,
                        )
                    })
                    .collect())
            })));
        let catalog = Arc::new(
            InMemoryCatalog::builder()
                .strategy(
                    "gate-fix",
                    StrategySpec::new(
                        CorrectionStrategy::RegexReplace {
                            pattern: Regex::new("aa").unwrap(),
                            replacement: "bb".to_string(),
                        },
                        Severity::Critical,
                    )
                    .with_weights(0.9, 0.9),
                )
                .strategy(
                    "gate-weak",
                    StrategySpec::new(
                        CorrectionStrategy::RegexReplace {
                            pattern: Regex::new("zz").unwrap(),
                            replacement: "ok".to_string(),
                        },
                        Severity::Low,
                    ),
                )
                .build(),
        );

        let engine = SynthesisEngine::new(gates, catalog, SynthesisConfig::default()).unwrap();
        let result = engine.run(Document::new("aa aa kk"), &DocumentMetadata::new());

        assert_eq!(result.terminal_state, TerminalState::NoCandidates);
        assert_eq!(result.final_text, "bb bb kk");
        assert_eq!(result.manual_review.len(), 1);
        assert_eq!(result.manual_review[0].candidate_id, "gate-weak:6-8#0");
    }

    #[test]
    fn test_preview_is_side_effect_free_and_identical() {
        let engine = claims_engine();
        let metadata = DocumentMetadata::new();
        let a = engine.preview("Guaranteed 15% returns!", &metadata);
        let b = engine.run(Document::new("Guaranteed 15% returns!"), &metadata);
        assert_eq!(a.final_hash, b.final_hash);
        assert_eq!(a.terminal_state, b.terminal_state);
    }
}
