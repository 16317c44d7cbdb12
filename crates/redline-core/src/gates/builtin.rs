//! Built-in reference gates.
//!
//! A small library of pattern gates covering the common review cases:
//! absolute performance claims, PII exposure, and a missing risk-disclosure
//! section. The engine never hard-wires these; the CLI's default ruleset and
//! the test suite use them.

use lazy_static::lazy_static;
use regex::Regex;

use super::{Gate, GateError};
use crate::types::{Severity, Span, Violation};

lazy_static! {
    /// Absolute claim language: "guaranteed", "risk-free", "cannot lose".
    static ref GUARANTEED_CLAIM_PATTERN: Regex = Regex::new(
        r"(?i)\b(guaranteed?|risk[\s-]?free|cannot\s+lose|sure\s+thing)\b"
    ).unwrap();

    /// Email address pattern (RFC 5322 simplified).
    static ref EMAIL_PATTERN: Regex = Regex::new(
        r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}"
    ).unwrap();

    /// US phone number pattern (with optional country code).
    static ref PHONE_PATTERN: Regex = Regex::new(
        r"(?:\+?1[-.\s]?)?(?:\([0-9]{3}\)|[0-9]{3})[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}"
    ).unwrap();

    /// Risk disclosure language expected somewhere in the document.
    static ref RISK_DISCLOSURE_PATTERN: Regex = Regex::new(
        r"(?i)\b(past\s+performance|not\s+indicative|may\s+lose\s+value|risk\s+disclosure)\b"
    ).unwrap();
}

/// Flags absolute performance claims (severity: critical).
pub struct GuaranteedClaimsGate;

impl Gate for GuaranteedClaimsGate {
    fn id(&self) -> &str {
        "guaranteed-claims"
    }

    fn evaluate(&self, text: &str) -> Result<Vec<Violation>, GateError> {
        Ok(GUARANTEED_CLAIM_PATTERN
            .find_iter(text)
            .map(|m| {
                Violation::new(
                    self.id(),
                    Severity::Critical,
                    Span::new(m.start(), m.end()),
                    "Absolute performance claim",
                    text,
                )
            })
            .collect())
    }
}

/// Flags exposed email addresses (severity: high).
pub struct EmailExposureGate;

impl Gate for EmailExposureGate {
    fn id(&self) -> &str {
        "pii-email"
    }

    fn evaluate(&self, text: &str) -> Result<Vec<Violation>, GateError> {
        Ok(EMAIL_PATTERN
            .find_iter(text)
            .map(|m| {
                Violation::new(
                    self.id(),
                    Severity::High,
                    Span::new(m.start(), m.end()),
                    "Email address exposed",
                    text,
                )
            })
            .collect())
    }
}

/// Flags exposed phone numbers (severity: high).
pub struct PhoneExposureGate;

impl Gate for PhoneExposureGate {
    fn id(&self) -> &str {
        "pii-phone"
    }

    fn evaluate(&self, text: &str) -> Result<Vec<Violation>, GateError> {
        Ok(PHONE_PATTERN
            .find_iter(text)
            .map(|m| {
                Violation::new(
                    self.id(),
                    Severity::High,
                    Span::new(m.start(), m.end()),
                    "Phone number exposed",
                    text,
                )
            })
            .collect())
    }
}

/// Flags documents that mention returns or performance but carry no risk
/// disclosure anywhere (severity: medium). The violation spans the whole
/// document since the defect is an absence, not a location.
pub struct MissingDisclosureGate;

impl Gate for MissingDisclosureGate {
    fn id(&self) -> &str {
        "missing-risk-disclosure"
    }

    fn evaluate(&self, text: &str) -> Result<Vec<Violation>, GateError> {
        lazy_static! {
            static ref PERFORMANCE_MENTION: Regex =
                Regex::new(r"(?i)\b(returns?|performance|yield|profit)\b").unwrap();
        }

        if PERFORMANCE_MENTION.is_match(text) && !RISK_DISCLOSURE_PATTERN.is_match(text) {
            Ok(vec![Violation::new(
                self.id(),
                Severity::Medium,
                Span::new(0, text.len()),
                "Performance discussed without a risk disclosure",
                text,
            )])
        } else {
            Ok(vec![])
        }
    }
}

/// All built-in gates, boxed for registration.
pub fn all() -> Vec<Box<dyn Gate>> {
    vec![
        Box::new(GuaranteedClaimsGate),
        Box::new(EmailExposureGate),
        Box::new(PhoneExposureGate),
        Box::new(MissingDisclosureGate),
    ]
}

/// Look up a single built-in gate by id.
pub fn by_id(id: &str) -> Option<Box<dyn Gate>> {
    match id {
        "guaranteed-claims" => Some(Box::new(GuaranteedClaimsGate)),
        "pii-email" => Some(Box::new(EmailExposureGate)),
        "pii-phone" => Some(Box::new(PhoneExposureGate)),
        "missing-risk-disclosure" => Some(Box::new(MissingDisclosureGate)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guaranteed_claims_detection() {
        let gate = GuaranteedClaimsGate;
        let violations = gate.evaluate("Guaranteed 15% returns!").unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Critical);
        assert_eq!(violations[0].evidence, "Guaranteed");

        assert!(gate.evaluate("Historically strong returns").unwrap().is_empty());
    }

    #[test]
    fn test_email_detection() {
        let gate = EmailExposureGate;
        let violations = gate.evaluate("Contact john@example.com for help").unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].evidence, "john@example.com");

        assert!(gate.evaluate("No email here").unwrap().is_empty());
    }

    #[test]
    fn test_phone_detection() {
        let gate = PhoneExposureGate;
        assert_eq!(gate.evaluate("Call us at 555-123-4567").unwrap().len(), 1);
        assert!(gate.evaluate("No phone here").unwrap().is_empty());
    }

    #[test]
    fn test_missing_disclosure_only_when_performance_mentioned() {
        let gate = MissingDisclosureGate;
        assert_eq!(gate.evaluate("Strong returns last year.").unwrap().len(), 1);
        assert!(gate
            .evaluate("Strong returns last year. Past performance is not indicative of future results.")
            .unwrap()
            .is_empty());
        assert!(gate.evaluate("Nothing financial here.").unwrap().is_empty());
    }

    #[test]
    fn test_by_id_lookup() {
        assert!(by_id("guaranteed-claims").is_some());
        assert!(by_id("unknown-gate").is_none());
        assert_eq!(all().len(), 4);
    }
}
