//! Validation runner: parallel gate fan-out with deterministic fan-in.
//!
//! Gates evaluate independently on a rayon worker pool. A gate that fails is
//! recorded as errored and contributes no violations; it never aborts the
//! run. Collected violations are merged in a deterministic order (sorted by
//! gate id, then span) before anything downstream sees them.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::GateSet;
use crate::types::{RiskLevel, Violation};

/// Per-gate outcome for one validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum GateOutcome {
    Passed { violations: usize },
    Errored { message: String },
}

/// Status of one gate in a validation pass, in registration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateStatus {
    pub gate_id: String,
    pub outcome: GateOutcome,
}

/// The aggregated result of running the active gate set over a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
    pub gate_statuses: Vec<GateStatus>,
    pub overall_risk: RiskLevel,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Executes the active gate set over a document text.
pub struct ValidationRunner<'a> {
    gates: &'a GateSet,
}

impl<'a> ValidationRunner<'a> {
    pub fn new(gates: &'a GateSet) -> Self {
        Self { gates }
    }

    /// Run every gate against the text.
    ///
    /// Fan-out is parallel; fan-in sorts violations by `(gate_id, span)` so
    /// downstream ordering never depends on scheduling.
    pub fn run(&self, text: &str) -> ValidationReport {
        let results: Vec<(String, Result<Vec<Violation>, super::GateError>)> = self
            .gates
            .gates()
            .par_iter()
            .map(|gate| (gate.id().to_string(), gate.evaluate(text)))
            .collect();

        let mut violations = Vec::new();
        let mut gate_statuses = Vec::with_capacity(results.len());

        for (gate_id, result) in results {
            match result {
                Ok(found) => {
                    gate_statuses.push(GateStatus {
                        gate_id,
                        outcome: GateOutcome::Passed {
                            violations: found.len(),
                        },
                    });
                    violations.extend(found);
                }
                Err(err) => {
                    tracing::warn!(gate = %gate_id, error = %err, "gate evaluation failed; isolating");
                    gate_statuses.push(GateStatus {
                        gate_id,
                        outcome: GateOutcome::Errored {
                            message: err.to_string(),
                        },
                    });
                }
            }
        }

        violations.sort_by(|a, b| {
            a.gate_id
                .cmp(&b.gate_id)
                .then(a.span.cmp(&b.span))
                .then(b.severity.cmp(&a.severity))
        });

        let overall_risk = violations
            .iter()
            .map(|v| RiskLevel::from(v.severity))
            .max()
            .unwrap_or(RiskLevel::None);

        ValidationReport {
            violations,
            gate_statuses,
            overall_risk,
        }
    }
}
