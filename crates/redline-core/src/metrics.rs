//! Quality metrics derived from snapshot history.
//!
//! Metrics are always recomputed from the immutable snapshots, never
//! incrementally mutated, so they stay consistent with the audit trail no
//! matter how the history was produced (loop, undo, preview).

use std::collections::HashSet;

use crate::types::{QualityMetrics, Snapshot};

/// Compute metrics over a snapshot history.
///
/// - `precision` — corrections not undone / corrections applied.
/// - `recall` — violations fixed / violations initial.
/// - `f1` — harmonic mean of the two.
/// - `accuracy` — (initial − final) / initial violations.
/// - `improvement_rate` — fraction of the previous pass's violations the
///   latest pass removed.
///
/// Empty denominators take their identity values: zero corrections applied
/// is perfect precision, a clean starting document is perfect recall.
pub fn compute(snapshots: &[Snapshot], undone: &HashSet<String>) -> QualityMetrics {
    let Some(first) = snapshots.first() else {
        return QualityMetrics::default();
    };
    let last = snapshots.last().expect("non-empty");

    let initial = first.violations_remaining.len();
    let final_count = last.violations_remaining.len();

    let applied: usize = snapshots.iter().map(|s| s.applied.len()).sum();
    let undone_count = snapshots
        .iter()
        .flat_map(|s| &s.applied)
        .filter(|c| undone.contains(&c.id))
        .count();

    let precision = if applied == 0 {
        1.0
    } else {
        (applied - undone_count) as f64 / applied as f64
    };

    let fixed = initial.saturating_sub(final_count);
    let recall = if initial == 0 {
        1.0
    } else {
        fixed as f64 / initial as f64
    };

    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    let accuracy = recall; // (initial − final) / initial, floored at zero

    let improvement_rate = match snapshots.len() {
        0 | 1 => 0.0,
        n => {
            let prev = snapshots[n - 2].violations_remaining.len();
            if prev == 0 {
                0.0
            } else {
                prev.saturating_sub(final_count) as f64 / prev as f64
            }
        }
    };

    QualityMetrics {
        precision,
        recall,
        f1,
        accuracy,
        improvement_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        content_hash, AppliedCorrection, Severity, Span, StrategyKind, Violation,
    };

    fn violation(n: usize) -> Violation {
        Violation::new("g", Severity::Medium, Span::new(n, n + 1), "m", "some text here")
    }

    fn correction(id: &str, iteration: usize) -> AppliedCorrection {
        AppliedCorrection {
            id: id.to_string(),
            iteration,
            violation_id: "v".to_string(),
            strategy: StrategyKind::RegexReplace,
            span_before: Span::new(0, 1),
            span_after: Span::new(0, 1),
            replacement: "x".to_string(),
            confidence: 0.9,
            timestamp_logical: iteration,
        }
    }

    fn snapshot(iteration: usize, violations: usize, applied: Vec<AppliedCorrection>) -> Snapshot {
        Snapshot {
            iteration,
            text: "t".to_string(),
            hash: content_hash("t"),
            violations_remaining: (0..violations).map(violation).collect(),
            applied,
            metrics_so_far: QualityMetrics::default(),
        }
    }

    #[test]
    fn test_full_fix_has_perfect_recall() {
        let history = vec![
            snapshot(0, 4, vec![]),
            snapshot(1, 0, vec![correction("c1", 1), correction("c2", 1)]),
        ];
        let metrics = compute(&history, &HashSet::new());
        assert_eq!(metrics.recall, 1.0);
        assert_eq!(metrics.precision, 1.0);
        assert_eq!(metrics.f1, 1.0);
        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(metrics.improvement_rate, 1.0);
    }

    #[test]
    fn test_partial_fix() {
        let history = vec![
            snapshot(0, 4, vec![]),
            snapshot(1, 2, vec![correction("c1", 1)]),
        ];
        let metrics = compute(&history, &HashSet::new());
        assert_eq!(metrics.recall, 0.5);
        assert_eq!(metrics.improvement_rate, 0.5);
    }

    #[test]
    fn test_undone_correction_lowers_precision() {
        let history = vec![
            snapshot(0, 2, vec![]),
            snapshot(1, 0, vec![correction("c1", 1), correction("c2", 1)]),
        ];
        let mut undone = HashSet::new();
        undone.insert("c1".to_string());
        let metrics = compute(&history, &undone);
        assert_eq!(metrics.precision, 0.5);
    }

    #[test]
    fn test_clean_document_identities() {
        let history = vec![snapshot(0, 0, vec![])];
        let metrics = compute(&history, &HashSet::new());
        assert_eq!(metrics.precision, 1.0);
        assert_eq!(metrics.recall, 1.0);
        assert_eq!(metrics.improvement_rate, 0.0);
    }
}
