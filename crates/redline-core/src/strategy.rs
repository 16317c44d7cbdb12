//! Correction strategies: the closed set of text transformations plus an
//! explicit plugin extension point.
//!
//! Every strategy must be idempotent: applying it to its own output produces
//! no further change. Application never panics on bad spans; it returns a
//! [`StrategyError`] and the candidate is dropped.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Span, StrategyKind};

/// Errors from applying a correction strategy. Always recovered locally: the
/// offending candidate is dropped, the pass continues.
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("span {start}..{end} is out of bounds or splits a character (text length {len})")]
    SpanOutOfBounds { start: usize, end: usize, len: usize },

    #[error("plugin '{name}' failed: {message}")]
    Plugin { name: String, message: String },
}

/// Where a template block is inserted relative to the target span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertPosition {
    Before,
    After,
    Replace,
}

/// Structural transformations beyond single-span edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Reform {
    /// Append a named section at the end of the document if its heading is
    /// not already present. Used for multi-paragraph fixes such as adding a
    /// disclosures section.
    AppendSection { heading: String, body: String },
}

/// Extension point for caller-supplied strategies.
///
/// Contract: `apply` returns the full new text and must confine its edit to
/// the given span, must be idempotent, and must be pure (no I/O). A plugin
/// that needs I/O has to wrap it with its own timeout and report failure via
/// `StrategyError`; a failed candidate is dropped, never fatal.
pub trait CorrectionPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, text: &str, span: Span) -> Result<String, StrategyError>;
}

/// A concrete text transformation addressing one violation.
#[derive(Clone)]
pub enum CorrectionStrategy {
    /// Match a pattern within the violation span and substitute text.
    RegexReplace { pattern: Regex, replacement: String },

    /// Insert a fixed block at a position relative to the span.
    TemplateInsert {
        template: String,
        position: InsertPosition,
    },

    /// Reorder or merge spans; see [`Reform`].
    StructuralReform(Reform),

    /// Caller-supplied transformation.
    Plugin(Arc<dyn CorrectionPlugin>),
}

impl std::fmt::Debug for CorrectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RegexReplace { pattern, replacement } => f
                .debug_struct("RegexReplace")
                .field("pattern", &pattern.as_str())
                .field("replacement", replacement)
                .finish(),
            Self::TemplateInsert { template, position } => f
                .debug_struct("TemplateInsert")
                .field("template", template)
                .field("position", position)
                .finish(),
            Self::StructuralReform(reform) => {
                f.debug_tuple("StructuralReform").field(reform).finish()
            }
            Self::Plugin(plugin) => f.debug_tuple("Plugin").field(&plugin.name()).finish(),
        }
    }
}

/// The result of applying a strategy to a text.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    /// Full text after the edit.
    pub new_text: String,
    /// The region of the *input* text the edit replaced. Empty for pure
    /// insertions. Conflict detection and batched application key off this.
    pub span_source: Span,
    /// The edited region in the coordinates of `new_text`.
    pub span_after: Span,
    /// The exact fragment now occupying `span_after`. Recorded in the audit
    /// trail so undo can replay the edit without re-running the strategy.
    pub replacement: String,
    /// False when the strategy was a no-op (idempotence).
    pub changed: bool,
}

impl EditOutcome {
    fn unchanged(text: &str, span: Span) -> Self {
        Self {
            new_text: text.to_string(),
            span_source: span,
            span_after: span,
            replacement: String::new(),
            changed: false,
        }
    }
}

impl CorrectionStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::RegexReplace { .. } => StrategyKind::RegexReplace,
            Self::TemplateInsert { .. } => StrategyKind::TemplateInsert,
            Self::StructuralReform(_) => StrategyKind::StructuralReform,
            Self::Plugin(_) => StrategyKind::Plugin,
        }
    }

    /// Apply the strategy to `text` at `span`, producing a new text value.
    /// The input is never modified in place.
    pub fn apply(&self, text: &str, span: Span) -> Result<EditOutcome, StrategyError> {
        let slice = text
            .get(span.start..span.end)
            .ok_or(StrategyError::SpanOutOfBounds {
                start: span.start,
                end: span.end,
                len: text.len(),
            })?;

        match self {
            Self::RegexReplace { pattern, replacement } => {
                let replaced = pattern.replace_all(slice, replacement.as_str());
                if replaced == slice {
                    return Ok(EditOutcome::unchanged(text, span));
                }
                let replaced = replaced.into_owned();
                let new_text = splice(text, span, &replaced);
                Ok(EditOutcome {
                    span_source: span,
                    span_after: Span::new(span.start, span.start + replaced.len()),
                    replacement: replaced,
                    new_text,
                    changed: true,
                })
            }

            Self::TemplateInsert { template, position } => {
                // Already present anywhere in the document: nothing to add.
                if text.contains(template.as_str()) {
                    return Ok(EditOutcome::unchanged(text, span));
                }
                let (at, replaced_span) = match position {
                    InsertPosition::Before => (span.start, Span::new(span.start, span.start)),
                    InsertPosition::After => (span.end, Span::new(span.end, span.end)),
                    InsertPosition::Replace => (span.start, span),
                };
                let new_text = splice(text, replaced_span, template);
                Ok(EditOutcome {
                    span_source: replaced_span,
                    span_after: Span::new(at, at + template.len()),
                    replacement: template.clone(),
                    new_text,
                    changed: true,
                })
            }

            Self::StructuralReform(Reform::AppendSection { heading, body }) => {
                if text.contains(heading.as_str()) {
                    return Ok(EditOutcome::unchanged(text, span));
                }
                let separator = if text.ends_with('\n') { "\n" } else { "\n\n" };
                let block = format!("{}{}\n{}", separator, heading, body);
                let at = text.len();
                let new_text = format!("{}{}", text, block);
                Ok(EditOutcome {
                    span_source: Span::new(at, at),
                    span_after: Span::new(at, at + block.len()),
                    replacement: block,
                    new_text,
                    changed: true,
                })
            }

            Self::Plugin(plugin) => {
                let new_text = plugin.apply(text, span)?;
                if new_text == text {
                    return Ok(EditOutcome::unchanged(text, span));
                }
                // The plugin contract confines the edit to the span, so the
                // length delta belongs entirely to the edited region.
                let delta = new_text.len() as i64 - text.len() as i64;
                let end = (span.end as i64 + delta).max(span.start as i64) as usize;
                let span_after = Span::new(span.start, end.min(new_text.len()));
                let replacement = new_text
                    .get(span_after.start..span_after.end)
                    .unwrap_or("")
                    .to_string();
                Ok(EditOutcome {
                    new_text,
                    span_source: span,
                    span_after,
                    replacement,
                    changed: true,
                })
            }
        }
    }
}

/// Replace `span` in `text` with `fragment`, producing a new string.
pub(crate) fn splice(text: &str, span: Span, fragment: &str) -> String {
    let mut out = String::with_capacity(text.len() - span.len() + fragment.len());
    out.push_str(&text[..span.start]);
    out.push_str(fragment);
    out.push_str(&text[span.end..]);
    out
}
