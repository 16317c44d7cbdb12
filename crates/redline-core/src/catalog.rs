//! Correction catalog seam.
//!
//! The catalog is an external collaborator: it maps violations to applicable
//! correction strategies, owns the historical-success table, and declares
//! strategy incompatibilities. It must be read-only while a synthesis loop
//! runs; feedback updates happen between calls, never concurrently.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::strategy::{CorrectionStrategy, InsertPosition, Reform};
use crate::types::{Severity, StrategyKind, Violation};
use crate::ConfigError;

/// A correction strategy plus the static scoring inputs the catalog supplies
/// for it.
#[derive(Debug, Clone)]
pub struct StrategySpec {
    pub strategy: CorrectionStrategy,
    /// The violation severity this strategy is calibrated for.
    pub strategy_severity: Severity,
    /// Document types this strategy is intended for; empty means any.
    pub intended_contexts: Vec<String>,
    /// Static weight in [0,1] supplied by the catalog author.
    pub domain_expertise: f64,
    /// Static weight in [0,1] supplied by the catalog author.
    pub specificity: f64,
}

/// The correction catalog contract consumed by the synthesis engine.
pub trait CorrectionCatalog: Send + Sync {
    /// All strategies applicable to a violation. May be empty: such
    /// violations pass through to the output unresolved. Ordering must be
    /// stable for a given violation (determinism).
    fn candidates_for(&self, violation: &Violation) -> Vec<StrategySpec>;

    /// Historical success rate for a strategy kind on a gate, if any history
    /// exists. The scorer substitutes 0.5 when absent.
    fn historical_success(&self, kind: StrategyKind, gate_id: &str) -> Option<f64>;

    /// Whether two strategy kinds are declared mutually exclusive.
    fn is_incompatible(&self, a: StrategyKind, b: StrategyKind) -> bool;
}

/// In-memory catalog keyed by gate id.
#[derive(Default)]
pub struct InMemoryCatalog {
    strategies: HashMap<String, Vec<StrategySpec>>,
    history: HashMap<(StrategyKind, String), f64>,
    incompatible: HashSet<(StrategyKind, StrategyKind)>,
}

impl InMemoryCatalog {
    pub fn builder() -> InMemoryCatalogBuilder {
        InMemoryCatalogBuilder::default()
    }
}

impl CorrectionCatalog for InMemoryCatalog {
    fn candidates_for(&self, violation: &Violation) -> Vec<StrategySpec> {
        self.strategies
            .get(&violation.gate_id)
            .cloned()
            .unwrap_or_default()
    }

    fn historical_success(&self, kind: StrategyKind, gate_id: &str) -> Option<f64> {
        self.history.get(&(kind, gate_id.to_string())).copied()
    }

    fn is_incompatible(&self, a: StrategyKind, b: StrategyKind) -> bool {
        self.incompatible.contains(&(a, b)) || self.incompatible.contains(&(b, a))
    }
}

/// Builder for [`InMemoryCatalog`].
#[derive(Default)]
pub struct InMemoryCatalogBuilder {
    catalog: InMemoryCatalog,
}

impl InMemoryCatalogBuilder {
    /// Register a strategy for a gate. Registration order is the stable
    /// candidate order for that gate.
    pub fn strategy(mut self, gate_id: impl Into<String>, spec: StrategySpec) -> Self {
        self.catalog
            .strategies
            .entry(gate_id.into())
            .or_default()
            .push(spec);
        self
    }

    /// Seed the historical-success table.
    pub fn history(mut self, kind: StrategyKind, gate_id: impl Into<String>, rate: f64) -> Self {
        self.catalog
            .history
            .insert((kind, gate_id.into()), rate.clamp(0.0, 1.0));
        self
    }

    /// Declare two strategy kinds mutually exclusive.
    pub fn incompatible(mut self, a: StrategyKind, b: StrategyKind) -> Self {
        self.catalog.incompatible.insert((a, b));
        self
    }

    pub fn build(self) -> InMemoryCatalog {
        self.catalog
    }
}

impl StrategySpec {
    /// Convenience constructor with neutral static weights.
    pub fn new(strategy: CorrectionStrategy, strategy_severity: Severity) -> Self {
        Self {
            strategy,
            strategy_severity,
            intended_contexts: Vec::new(),
            domain_expertise: 0.5,
            specificity: 0.5,
        }
    }

    pub fn with_contexts(mut self, contexts: Vec<String>) -> Self {
        self.intended_contexts = contexts;
        self
    }

    pub fn with_weights(mut self, domain_expertise: f64, specificity: f64) -> Self {
        self.domain_expertise = domain_expertise.clamp(0.0, 1.0);
        self.specificity = specificity.clamp(0.0, 1.0);
        self
    }
}

// ---------------------------------------------------------------------------
// Serializable ruleset form (used by the CLI's YAML rulesets)
// ---------------------------------------------------------------------------

/// One correction rule in a serialized ruleset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionConfig {
    pub gate: String,
    #[serde(flatten)]
    pub strategy: StrategyConfig,
    pub severity: Severity,
    #[serde(default)]
    pub contexts: Vec<String>,
    #[serde(default = "default_weight")]
    pub domain_expertise: f64,
    #[serde(default = "default_weight")]
    pub specificity: f64,
}

fn default_weight() -> f64 {
    0.5
}

/// Serialized form of a strategy. The plugin variant is intentionally
/// absent: plugins are wired in code, not in config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum StrategyConfig {
    RegexReplace {
        pattern: String,
        replacement: String,
    },
    TemplateInsert {
        template: String,
        position: InsertPosition,
    },
    AppendSection {
        heading: String,
        body: String,
    },
}

impl CorrectionConfig {
    /// Compile into a [`StrategySpec`]. An invalid pattern is a fatal
    /// configuration error, caught before any synthesis starts.
    pub fn into_spec(self) -> Result<(String, StrategySpec), ConfigError> {
        let strategy = match self.strategy {
            StrategyConfig::RegexReplace { pattern, replacement } => {
                let pattern = Regex::new(&pattern).map_err(|e| ConfigError::InvalidPattern {
                    gate_id: self.gate.clone(),
                    message: e.to_string(),
                })?;
                CorrectionStrategy::RegexReplace { pattern, replacement }
            }
            StrategyConfig::TemplateInsert { template, position } => {
                CorrectionStrategy::TemplateInsert { template, position }
            }
            StrategyConfig::AppendSection { heading, body } => {
                CorrectionStrategy::StructuralReform(Reform::AppendSection { heading, body })
            }
        };

        let spec = StrategySpec {
            strategy,
            strategy_severity: self.severity,
            intended_contexts: self.contexts,
            domain_expertise: self.domain_expertise.clamp(0.0, 1.0),
            specificity: self.specificity.clamp(0.0, 1.0),
        };
        Ok((self.gate, spec))
    }
}

/// A serialized ruleset: active gate ids plus correction rules. The CLI
/// deserializes this from YAML and builds the gate set and catalog from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesetConfig {
    pub gates: Vec<String>,
    #[serde(default)]
    pub corrections: Vec<CorrectionConfig>,
}

impl RulesetConfig {
    /// Build an [`InMemoryCatalog`] from the correction rules.
    pub fn build_catalog(&self) -> Result<InMemoryCatalog, ConfigError> {
        let mut builder = InMemoryCatalog::builder();
        for correction in self.corrections.clone() {
            let (gate, spec) = correction.into_spec()?;
            builder = builder.strategy(gate, spec);
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Span;

    fn violation(gate_id: &str) -> Violation {
        Violation::new(gate_id, Severity::High, Span::new(0, 4), "m", "text")
    }

    fn spec() -> StrategySpec {
        StrategySpec::new(
            CorrectionStrategy::RegexReplace {
                pattern: Regex::new("x").unwrap(),
                replacement: "y".to_string(),
            },
            Severity::High,
        )
    }

    #[test]
    fn test_candidates_for_unknown_gate_is_empty() {
        let catalog = InMemoryCatalog::builder().build();
        assert!(catalog.candidates_for(&violation("nope")).is_empty());
    }

    #[test]
    fn test_registered_strategy_is_returned() {
        let catalog = InMemoryCatalog::builder().strategy("g", spec()).build();
        assert_eq!(catalog.candidates_for(&violation("g")).len(), 1);
    }

    #[test]
    fn test_history_lookup_and_absence() {
        let catalog = InMemoryCatalog::builder()
            .history(StrategyKind::RegexReplace, "g", 0.8)
            .build();
        assert_eq!(catalog.historical_success(StrategyKind::RegexReplace, "g"), Some(0.8));
        assert_eq!(catalog.historical_success(StrategyKind::TemplateInsert, "g"), None);
    }

    #[test]
    fn test_incompatibility_is_symmetric() {
        let catalog = InMemoryCatalog::builder()
            .incompatible(StrategyKind::RegexReplace, StrategyKind::StructuralReform)
            .build();
        assert!(catalog.is_incompatible(StrategyKind::RegexReplace, StrategyKind::StructuralReform));
        assert!(catalog.is_incompatible(StrategyKind::StructuralReform, StrategyKind::RegexReplace));
        assert!(!catalog.is_incompatible(StrategyKind::RegexReplace, StrategyKind::TemplateInsert));
    }

    #[test]
    fn test_ruleset_config_round_trip() {
        let yaml = r#"
gates:
  - guaranteed-claims
corrections:
  - gate: guaranteed-claims
    strategy: regex_replace
    pattern: "(?i)guaranteed"
    replacement: "historically"
    severity: critical
    domain_expertise: 0.8
"#;
        let config: RulesetConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.gates, vec!["guaranteed-claims"]);
        let catalog = config.build_catalog().unwrap();
        let specs = catalog.candidates_for(&violation("guaranteed-claims"));
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].domain_expertise, 0.8);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let config = CorrectionConfig {
            gate: "g".to_string(),
            strategy: StrategyConfig::RegexReplace {
                pattern: "(unclosed".to_string(),
                replacement: "x".to_string(),
            },
            severity: Severity::Low,
            contexts: vec![],
            domain_expertise: 0.5,
            specificity: 0.5,
        };
        assert!(matches!(
            config.into_spec(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }
}
