//! Conflict detection and resolution between correction candidates.
//!
//! Strictly single-threaded: the deterministic tie-break rule (severity
//! desc, confidence desc, violation id asc) is the whole point, and a
//! worker pool would trade it away. These rules are governance machinery,
//! not a tuning toy.

use std::collections::HashMap;

use crate::candidates::CorrectionCandidate;
use crate::catalog::CorrectionCatalog;
use crate::gates::GateSet;
use crate::strategy::EditOutcome;
use crate::types::{CandidateSummary, Conflict, ConflictKind, Severity, Violation};

/// A candidate that survived conflict resolution, paired with its simulated
/// edit against the pass-start text.
#[derive(Debug)]
pub struct AcceptedCorrection {
    pub candidate: CorrectionCandidate,
    pub outcome: EditOutcome,
}

/// Everything the resolver decided for one pass.
#[derive(Debug, Default)]
pub struct ResolvedPass {
    /// Winners, in priority order. Their source spans never overlap.
    pub accepted: Vec<AcceptedCorrection>,
    /// Every conflict detected this pass, resolved or not.
    pub conflicts: Vec<Conflict>,
    /// Losers eligible for one retry on the next pass.
    pub deferred: Vec<CorrectionCandidate>,
    /// Candidates routed to manual review (`new_violation` flags).
    pub manual_review: Vec<CandidateSummary>,
    /// Candidates dropped for strategy errors or no-op edits.
    pub dropped: usize,
}

/// Finds and resolves conflicts among the accepted-confidence candidates of
/// one pass.
pub struct ConflictResolver<'a> {
    catalog: &'a dyn CorrectionCatalog,
    gates: &'a GateSet,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(catalog: &'a dyn CorrectionCatalog, gates: &'a GateSet) -> Self {
        Self { catalog, gates }
    }

    /// Resolve one pass's candidates against the pass-start `text` and its
    /// `baseline` violations.
    ///
    /// Candidates are processed in deterministic priority order; each is
    /// simulated, screened for introduced violations, then checked against
    /// the already-accepted set. The first winner for a region stays; later
    /// claimants become conflicts.
    pub fn resolve(
        &self,
        text: &str,
        baseline: &[Violation],
        mut candidates: Vec<CorrectionCandidate>,
    ) -> ResolvedPass {
        candidates.sort_by(|a, b| {
            b.violation_severity
                .cmp(&a.violation_severity)
                .then(b.confidence.total_cmp(&a.confidence))
                .then(a.violation_id.cmp(&b.violation_id))
                .then(a.id.cmp(&b.id))
        });

        let baseline_counts = violation_counts(baseline);
        let mut pass = ResolvedPass::default();

        'next_candidate: for candidate in candidates {
            let outcome = match candidate.strategy.apply(text, candidate.target_span) {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(
                        candidate = %candidate.id,
                        error = %err,
                        "strategy failed; dropping candidate"
                    );
                    pass.dropped += 1;
                    continue;
                }
            };
            if !outcome.changed {
                // No-op edits cannot improve anything and would stall the
                // loop's convergence accounting.
                pass.dropped += 1;
                continue;
            }

            // A candidate that would introduce an equal-or-worse violation is
            // never auto-applied; it goes to manual review.
            if let Some(introduced) = self.find_introduced_violation(
                &outcome,
                &baseline_counts,
                candidate.violation_severity,
            ) {
                pass.conflicts.push(Conflict {
                    kind: ConflictKind::NewViolation,
                    correction_ids: vec![candidate.id.clone()],
                    severity: introduced.severity,
                    auto_resolvable: false,
                    resolution: format!(
                        "deferred to manual review: would introduce '{}' ({})",
                        introduced.gate_id, introduced.severity
                    ),
                });
                pass.manual_review.push(summary(
                    &candidate,
                    format!("would introduce violation '{}'", introduced.id),
                ));
                continue;
            }

            for winner in &pass.accepted {
                if let Some(kind) = self.conflict_between(winner, &candidate, &outcome) {
                    let severity = winner
                        .candidate
                        .violation_severity
                        .max(candidate.violation_severity);
                    let auto_resolvable = true;
                    let (resolution, defer) = match kind {
                        ConflictKind::Redundant => (
                            format!(
                                "kept {}; discarded {} (effect already covered)",
                                winner.candidate.id, candidate.id
                            ),
                            false,
                        ),
                        _ => (
                            format!(
                                "kept {}; deferred {} for one retry",
                                winner.candidate.id, candidate.id
                            ),
                            true,
                        ),
                    };
                    pass.conflicts.push(Conflict {
                        kind,
                        correction_ids: vec![winner.candidate.id.clone(), candidate.id.clone()],
                        severity,
                        auto_resolvable,
                        resolution,
                    });
                    if defer {
                        pass.deferred.push(candidate);
                    }
                    continue 'next_candidate;
                }
            }

            pass.accepted.push(AcceptedCorrection { candidate, outcome });
        }

        pass
    }

    /// Classify the conflict between an accepted winner and a later
    /// candidate, if any. Same-violation checks come first, then declared
    /// incompatibilities, then span overlap.
    fn conflict_between(
        &self,
        winner: &AcceptedCorrection,
        candidate: &CorrectionCandidate,
        outcome: &EditOutcome,
    ) -> Option<ConflictKind> {
        if winner.candidate.violation_id == candidate.violation_id {
            let same_effect = winner.outcome.replacement == outcome.replacement
                && winner.outcome.span_source.contains_span(&outcome.span_source);
            return Some(if same_effect {
                ConflictKind::Redundant
            } else {
                ConflictKind::Contradictory
            });
        }

        if self
            .catalog
            .is_incompatible(winner.candidate.strategy.kind(), candidate.strategy.kind())
        {
            return Some(ConflictKind::Incompatible);
        }

        if winner.outcome.span_source.intersects(&outcome.span_source)
            || winner.candidate.target_span.intersects(&candidate.target_span)
        {
            return Some(ConflictKind::Overlap);
        }

        None
    }

    /// Simulate the edit and re-validate; report a violation that appears in
    /// the edited region with severity at least `fixed_severity` and was not
    /// present before.
    fn find_introduced_violation(
        &self,
        outcome: &EditOutcome,
        baseline_counts: &HashMap<(String, Severity, String), usize>,
        fixed_severity: Severity,
    ) -> Option<Violation> {
        let mut seen: HashMap<(String, Severity, String), usize> = HashMap::new();
        for gate in self.gates.gates() {
            // A gate that errors during simulation contributes nothing, same
            // as in a real validation pass.
            let Ok(violations) = gate.evaluate(&outcome.new_text) else {
                continue;
            };
            for violation in violations {
                let key = (
                    violation.gate_id.clone(),
                    violation.severity,
                    violation.evidence.clone(),
                );
                let count = seen.entry(key.clone()).or_insert(0);
                *count += 1;
                let before = baseline_counts.get(&key).copied().unwrap_or(0);
                if *count > before
                    && violation.severity >= fixed_severity
                    && violation.span.intersects(&outcome.span_after)
                {
                    return Some(violation);
                }
            }
        }
        None
    }
}

fn violation_counts(violations: &[Violation]) -> HashMap<(String, Severity, String), usize> {
    let mut counts = HashMap::new();
    for v in violations {
        *counts
            .entry((v.gate_id.clone(), v.severity, v.evidence.clone()))
            .or_insert(0) += 1;
    }
    counts
}

fn summary(candidate: &CorrectionCandidate, reason: String) -> CandidateSummary {
    CandidateSummary {
        candidate_id: candidate.id.clone(),
        violation_id: candidate.violation_id.clone(),
        strategy: candidate.strategy.kind(),
        target_span: candidate.target_span,
        confidence: candidate.confidence,
        reason,
    }
}
