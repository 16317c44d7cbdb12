//! Core data types shared across the synthesis pipeline.
//!
//! Everything in here is a plain value: documents, violations, applied
//! corrections and snapshots are immutable once constructed. Mutation always
//! produces a new value, never edits one in place.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque key-value metadata supplied by the caller (document_type,
/// jurisdiction tags). Passed through unmodified; only context-relevance
/// scoring reads it.
pub type DocumentMetadata = HashMap<String, String>;

/// Compute the content digest of a document text (SHA-256, lowercase hex).
///
/// The hash is a pure function of the text: identical text always yields an
/// identical hash. Reproducibility tests depend on this.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// An immutable document value: text plus its content digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub hash: String,
}

impl Document {
    /// Create a document, computing its hash from the text.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let hash = content_hash(&text);
        Self { text, hash }
    }
}

/// Violation severity. Ordering is total: `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Numeric rank, used by severity-alignment scoring.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Low => 0,
            Severity::Medium => 1,
            Severity::High => 2,
            Severity::Critical => 3,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Overall risk for a validation pass: the maximum severity across all
/// unresolved violations, or `None` when the document is clean.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::None => "none",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl From<Severity> for RiskLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => RiskLevel::Low,
            Severity::Medium => RiskLevel::Medium,
            Severity::High => RiskLevel::High,
            Severity::Critical => RiskLevel::Critical,
        }
    }
}

/// A half-open byte range `[start, end)` into a document text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start must not exceed end");
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether two spans share at least one byte.
    pub fn intersects(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether `other` lies entirely within this span.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}]", self.start, self.end)
    }
}

/// Maximum length of an evidence snippet carried on a violation.
const EVIDENCE_SNIPPET_MAX: usize = 80;

/// A detected rule failure: which gate fired, how severe, where in the text,
/// and the offending excerpt.
///
/// Violations are produced fresh on every validation pass and never mutated.
/// The id is derived from `gate_id` plus the span, so it is stable within a
/// single pass and later pipeline stages can reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub gate_id: String,
    pub severity: Severity,
    pub span: Span,
    pub message: String,
    pub evidence: String,
}

impl Violation {
    /// Build a violation, deriving the id and extracting the evidence
    /// snippet from the originating text.
    pub fn new(
        gate_id: impl Into<String>,
        severity: Severity,
        span: Span,
        message: impl Into<String>,
        text: &str,
    ) -> Self {
        let gate_id = gate_id.into();
        let id = format!("{}:{}-{}", gate_id, span.start, span.end);
        let evidence = snippet(text, span);
        Self {
            id,
            gate_id,
            severity,
            span,
            message: message.into(),
            evidence,
        }
    }
}

/// Extract the text covered by a span, truncated to a readable snippet.
fn snippet(text: &str, span: Span) -> String {
    let raw = text.get(span.start..span.end).unwrap_or("");
    if raw.chars().count() <= EVIDENCE_SNIPPET_MAX {
        raw.to_string()
    } else {
        let cut: String = raw.chars().take(EVIDENCE_SNIPPET_MAX).collect();
        format!("{}…", cut)
    }
}

/// The closed set of correction strategy kinds, as recorded in the audit
/// trail and the historical-success table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    RegexReplace,
    TemplateInsert,
    StructuralReform,
    Plugin,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StrategyKind::RegexReplace => "regex_replace",
            StrategyKind::TemplateInsert => "template_insert",
            StrategyKind::StructuralReform => "structural_reform",
            StrategyKind::Plugin => "plugin",
        };
        f.write_str(s)
    }
}

/// The six normalized sub-factors that feed the confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub pattern_match_strength: f64,
    pub severity_alignment: f64,
    pub historical_success: f64,
    pub context_relevance: f64,
    pub domain_expertise: f64,
    pub specificity: f64,
}

/// The authoritative, append-only audit record of one applied edit.
///
/// `span_before` and `replacement` record the concrete edit in the
/// coordinates of the text it was applied to, so undo can replay the full
/// history deterministically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedCorrection {
    pub id: String,
    pub iteration: usize,
    pub violation_id: String,
    pub strategy: StrategyKind,
    pub span_before: Span,
    pub span_after: Span,
    pub replacement: String,
    pub confidence: f64,
    /// Logical timestamp: equals the iteration that applied the edit.
    pub timestamp_logical: usize,
}

/// Kinds of incompatibility between two candidates in the same pass.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Contradictory,
    Overlap,
    NewViolation,
    Incompatible,
    Redundant,
}

/// A detected conflict between correction candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub correction_ids: Vec<String>,
    pub severity: Severity,
    pub auto_resolvable: bool,
    pub resolution: String,
}

/// A lightweight, serializable view of a candidate surfaced for manual
/// review (below the confidence threshold, or flagged `new_violation`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub candidate_id: String,
    pub violation_id: String,
    pub strategy: StrategyKind,
    pub target_span: Span,
    pub confidence: f64,
    pub reason: String,
}

/// Quality metrics derived from the snapshot history. Always recomputed from
/// immutable snapshots, never incrementally mutated.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub accuracy: f64,
    /// Fraction of the previous pass's violations removed by the latest pass.
    pub improvement_rate: f64,
}

/// An immutable record of document state at one iteration.
///
/// Iteration 0 is the original document. Iteration numbers are contiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub iteration: usize,
    pub text: String,
    pub hash: String,
    pub violations_remaining: Vec<Violation>,
    pub applied: Vec<AppliedCorrection>,
    pub metrics_so_far: QualityMetrics,
}

/// Terminal state of the synthesis loop.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Converged,
    MaxIterations,
    NoCandidates,
    Cancelled,
}

/// The complete output of one synthesis run. Callers always receive one,
/// even on partial failure; only configuration errors prevent a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub final_text: String,
    pub final_hash: String,
    pub terminal_state: TerminalState,
    pub snapshots: Vec<Snapshot>,
    pub applied_corrections: Vec<AppliedCorrection>,
    pub unresolved_violations: Vec<Violation>,
    pub conflicts: Vec<Conflict>,
    pub manual_review: Vec<CandidateSummary>,
    pub metrics: QualityMetrics,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_pure_function_of_text() {
        let a = Document::new("Guaranteed 15% returns!");
        let b = Document::new("Guaranteed 15% returns!");
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);

        let c = Document::new("Historically 15% returns!");
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_span_intersects() {
        let a = Span::new(0, 10);
        let b = Span::new(5, 15);
        let c = Span::new(10, 20);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c)); // half-open: touching is not overlap
        assert!(a.contains_span(&Span::new(2, 8)));
        assert!(!a.contains_span(&b));
    }

    #[test]
    fn test_violation_id_is_stable_within_pass() {
        let text = "Guaranteed returns";
        let v1 = Violation::new("claims", Severity::Critical, Span::new(0, 10), "m", text);
        let v2 = Violation::new("claims", Severity::Critical, Span::new(0, 10), "m", text);
        assert_eq!(v1.id, v2.id);
        assert_eq!(v1.id, "claims:0-10");
        assert_eq!(v1.evidence, "Guaranteed");
    }

    #[test]
    fn test_evidence_snippet_truncates_long_matches() {
        let text = "x".repeat(200);
        let v = Violation::new("g", Severity::Low, Span::new(0, 200), "m", &text);
        assert!(v.evidence.chars().count() <= 81);
        assert!(v.evidence.ends_with('…'));
    }
}
