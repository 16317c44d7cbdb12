//! Gate catalog seam and validation runner.
//!
//! A gate is a pure rule evaluator: given a document text, it returns the
//! violations it detects. Gates are independent of one another, never mutate
//! shared state, and may run concurrently.
//!
//! The concrete regulatory content of individual gates is a collaborator
//! concern; the [`builtin`] module ships a small reference library used by
//! the CLI and by tests.

pub mod builtin;
mod runner;

pub use runner::{GateOutcome, GateStatus, ValidationReport, ValidationRunner};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Violation;

/// Errors raised by a gate evaluator. A failing gate is isolated: it is
/// recorded as errored, contributes no violations, and never aborts a run.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum GateError {
    #[error("gate '{gate_id}' failed: {message}")]
    Evaluation { gate_id: String, message: String },
}

impl GateError {
    pub fn evaluation(gate_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluation {
            gate_id: gate_id.into(),
            message: message.into(),
        }
    }
}

/// A pure rule evaluator producing violations for a document.
pub trait Gate: Send + Sync {
    /// Stable identifier, unique within a gate set.
    fn id(&self) -> &str;

    /// Evaluate the text and return all violations found.
    fn evaluate(&self, text: &str) -> Result<Vec<Violation>, GateError>;
}

/// A gate built from a closure. Handy for tests and for callers wiring in
/// ad-hoc rules without a full type.
pub struct FnGate {
    id: String,
    #[allow(clippy::type_complexity)]
    eval: Box<dyn Fn(&str) -> Result<Vec<Violation>, GateError> + Send + Sync>,
}

impl FnGate {
    pub fn new<F>(id: impl Into<String>, eval: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<Violation>, GateError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            eval: Box::new(eval),
        }
    }
}

impl Gate for FnGate {
    fn id(&self) -> &str {
        &self.id
    }

    fn evaluate(&self, text: &str) -> Result<Vec<Violation>, GateError> {
        (self.eval)(text)
    }
}

/// The set of active gates for a synthesis run.
#[derive(Default)]
pub struct GateSet {
    gates: Vec<Box<dyn Gate>>,
}

impl GateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gate. Registration order is preserved for status reports;
    /// violation ordering never depends on it.
    pub fn register(&mut self, gate: Box<dyn Gate>) {
        self.gates.push(gate);
    }

    /// Builder-style registration.
    pub fn with(mut self, gate: Box<dyn Gate>) -> Self {
        self.register(gate);
        self
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    pub(crate) fn gates(&self) -> &[Box<dyn Gate>] {
        &self.gates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Severity, Span};

    #[test]
    fn test_fn_gate_evaluates() {
        let gate = FnGate::new("always-flag", |text| {
            Ok(vec![Violation::new(
                "always-flag",
                Severity::Low,
                Span::new(0, text.len().min(4)),
                "flagged",
                text,
            )])
        });

        let violations = gate.evaluate("some text").unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].gate_id, "always-flag");
    }

    #[test]
    fn test_gate_set_registration() {
        let set = GateSet::new()
            .with(Box::new(FnGate::new("a", |_| Ok(vec![]))))
            .with(Box::new(FnGate::new("b", |_| Ok(vec![]))));
        assert_eq!(set.len(), 2);
        assert!(!set.is_empty());
    }
}
