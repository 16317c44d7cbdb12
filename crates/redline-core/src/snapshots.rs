//! Snapshot store and rollback manager.
//!
//! One immutable snapshot per iteration, contiguous from 0 (the original
//! document). The store is the only owner of snapshot history; everything
//! else reads the latest snapshot to start a pass.
//!
//! Undo never splices text naively: it re-derives the document by replaying
//! every other recorded edit from iteration 0, shifting later spans that the
//! removed edit would have displaced. That keeps undo consistent with the
//! audit trail by construction.

use std::collections::HashSet;

use thiserror::Error;

use crate::gates::{GateSet, ValidationRunner};
use crate::metrics;
use crate::types::{content_hash, AppliedCorrection, Snapshot};

/// Errors from the rollback API.
#[derive(Error, Debug)]
pub enum RollbackError {
    #[error("iteration {requested} does not exist (history has {available})")]
    UnknownIteration { requested: usize, available: usize },

    #[error("correction '{id}' not found in history")]
    UnknownCorrection { id: String },

    #[error("replay failed: {message}")]
    ReplayFailed { message: String },
}

/// Append-only store of the snapshot history for one synthesis run.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    snapshots: Vec<Snapshot>,
    undone: HashSet<String>,
}

impl SnapshotStore {
    /// Start a store from the iteration-0 snapshot.
    pub fn new(initial: Snapshot) -> Self {
        debug_assert_eq!(initial.iteration, 0, "history must start at iteration 0");
        Self {
            snapshots: vec![initial],
            undone: HashSet::new(),
        }
    }

    /// Rebuild a store from a finished run's snapshot history.
    pub fn from_snapshots(snapshots: Vec<Snapshot>) -> Result<Self, RollbackError> {
        for (i, snapshot) in snapshots.iter().enumerate() {
            if snapshot.iteration != i {
                return Err(RollbackError::ReplayFailed {
                    message: format!(
                        "snapshot history is not contiguous: expected iteration {}, got {}",
                        i, snapshot.iteration
                    ),
                });
            }
        }
        if snapshots.is_empty() {
            return Err(RollbackError::ReplayFailed {
                message: "snapshot history is empty".to_string(),
            });
        }
        Ok(Self {
            snapshots,
            undone: HashSet::new(),
        })
    }

    /// Append the next snapshot. Panics in debug builds if the iteration
    /// number is not the next in sequence.
    pub(crate) fn push(&mut self, snapshot: Snapshot) {
        debug_assert_eq!(snapshot.iteration, self.snapshots.len());
        self.snapshots.push(snapshot);
    }

    pub fn latest(&self) -> &Snapshot {
        self.snapshots.last().expect("store always holds iteration 0")
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        false // invariant: iteration 0 always present
    }

    /// Ids of corrections undone through this store.
    pub fn undone(&self) -> &HashSet<String> {
        &self.undone
    }

    /// Fetch the snapshot for iteration `n`.
    pub fn rollback_to_iteration(&self, n: usize) -> Result<&Snapshot, RollbackError> {
        self.snapshots.get(n).ok_or(RollbackError::UnknownIteration {
            requested: n,
            available: self.snapshots.len(),
        })
    }

    /// Undo a single correction by id.
    ///
    /// Re-derives the text by replaying all other accepted corrections from
    /// iteration 0, re-validates it, and appends the derived snapshot to the
    /// history (keeping iteration numbers contiguous).
    pub fn undo_correction(
        &mut self,
        correction_id: &str,
        gates: &GateSet,
    ) -> Result<Snapshot, RollbackError> {
        let exists = self
            .snapshots
            .iter()
            .flat_map(|s| &s.applied)
            .any(|c| c.id == correction_id);
        if !exists {
            return Err(RollbackError::UnknownCorrection {
                id: correction_id.to_string(),
            });
        }

        let mut skip = self.undone.clone();
        skip.insert(correction_id.to_string());

        let text = replay(&self.snapshots, &skip)?;
        self.undone.insert(correction_id.to_string());

        let report = ValidationRunner::new(gates).run(&text);
        let metrics_so_far = metrics::compute(&self.snapshots, &self.undone);
        let snapshot = Snapshot {
            iteration: self.snapshots.len(),
            hash: content_hash(&text),
            text,
            violations_remaining: report.violations,
            applied: Vec::new(),
            metrics_so_far,
        };
        self.snapshots.push(snapshot.clone());
        Ok(snapshot)
    }
}

/// A removed edit's influence on later coordinates: spans at or after `pos`
/// shift by `delta`.
struct SkipShift {
    pos: i64,
    delta: i64,
}

/// Replay the full edit history from iteration 0, skipping the corrections
/// named in `skip`.
fn replay(snapshots: &[Snapshot], skip: &HashSet<String>) -> Result<String, RollbackError> {
    let mut text = snapshots[0].text.clone();
    let mut shifts: Vec<SkipShift> = Vec::new();

    for snapshot in &snapshots[1..] {
        let mut edits: Vec<(i64, i64, &AppliedCorrection)> = Vec::new();
        let mut new_shifts: Vec<SkipShift> = Vec::new();

        for corr in &snapshot.applied {
            let (start, end) = adjusted_span(corr, &shifts);
            if skip.contains(&corr.id) {
                // Spans recorded in the same iteration share this edit's
                // coordinate space, so its shift only kicks in next pass.
                new_shifts.push(SkipShift {
                    pos: start,
                    delta: -(corr.replacement.len() as i64 - (end - start)),
                });
            } else {
                edits.push((start, end, corr));
            }
        }

        edits.sort_by_key(|(start, _, _)| *start);
        text = apply_raw_edits(&text, &edits)?;

        // Convert shift anchors into the iteration's output coordinates.
        for (start, end, corr) in &edits {
            let delta = corr.replacement.len() as i64 - (end - start);
            for shift in shifts.iter_mut().chain(new_shifts.iter_mut()) {
                if *start < shift.pos {
                    shift.pos += delta;
                }
            }
        }
        shifts.extend(new_shifts);
    }

    Ok(text)
}

/// Apply accumulated skip shifts to a recorded span, in position order.
fn adjusted_span(corr: &AppliedCorrection, shifts: &[SkipShift]) -> (i64, i64) {
    let mut start = corr.span_before.start as i64;
    let mut end = corr.span_before.end as i64;
    let mut ordered: Vec<&SkipShift> = shifts.iter().collect();
    ordered.sort_by_key(|s| s.pos);
    for shift in ordered {
        if shift.pos <= start {
            start += shift.delta;
            end += shift.delta;
        }
    }
    (start, end)
}

/// Splice a batch of ascending, non-overlapping edits into a text.
fn apply_raw_edits(
    text: &str,
    edits: &[(i64, i64, &AppliedCorrection)],
) -> Result<String, RollbackError> {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;

    for (start, end, corr) in edits {
        let (start, end) = (*start, *end);
        if start < cursor as i64
            || end < start
            || end > text.len() as i64
            || !text.is_char_boundary(start as usize)
            || !text.is_char_boundary(end as usize)
        {
            return Err(RollbackError::ReplayFailed {
                message: format!(
                    "edit '{}' span {}..{} invalid during replay",
                    corr.id, start, end
                ),
            });
        }
        out.push_str(&text[cursor..start as usize]);
        out.push_str(&corr.replacement);
        cursor = end as usize;
    }
    out.push_str(&text[cursor..]);
    Ok(out)
}
