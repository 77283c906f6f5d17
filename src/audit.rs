//! Rule-set driven validation of generated SOP text.
//!
//! A [`RuleSet`] is plain data: a name, an ordered list of [`Check`]s, the
//! section schema the generator is asked to produce, and the prompt template
//! that asks for it. [`audit`] walks the checks in order and reports the
//! first failure; later checks are not consulted once one fails.
//!
//! Two sets ship built in and are selected by key through [`RuleSet::named`]:
//!
//! | Key         | Checks (in order)                               |
//! |-------------|-------------------------------------------------|
//! | `safety`    | denylist → numbered steps → minimum length      |
//! | `structure` | required `SECTION 1` … `SECTION 4` markers      |
//!
//! Custom sets can be deserialised from JSON (see [`RuleSet::from_json`]).

use crate::prompts::{SAFETY_SOP_PROMPT, STRUCTURED_SOP_PROMPT};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of an audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Pass,
    Fail,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditStatus::Pass => f.write_str("PASS"),
            AuditStatus::Fail => f.write_str("FAIL"),
        }
    }
}

/// Informational severity attached to a verdict. Never alters control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::None => "NONE",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// The result of auditing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditVerdict {
    pub status: AuditStatus,
    pub reason: String,
    pub severity: Severity,
}

impl AuditVerdict {
    pub fn pass() -> Self {
        Self {
            status: AuditStatus::Pass,
            reason: "All compliance checks passed".to_string(),
            severity: Severity::None,
        }
    }

    pub fn fail(reason: impl Into<String>, severity: Severity) -> Self {
        Self {
            status: AuditStatus::Fail,
            reason: reason.into(),
            severity,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == AuditStatus::Pass
    }
}

/// A single validation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Check {
    /// Fails when any term occurs (case-insensitive substring). The first
    /// term in list order that matches is reported verbatim.
    Denylist { terms: Vec<String> },
    /// Fails when none of the step-numbering markers occur.
    StepMarkers { markers: Vec<String> },
    /// Fails when the text has fewer than `chars` characters.
    MinLength { chars: usize },
    /// Fails on the first marker (in list order) that does not occur.
    RequiredMarkers { markers: Vec<String> },
}

impl Check {
    /// Evaluate this check. `lowered` is `text.to_lowercase()`, computed once
    /// per audit by the caller.
    fn evaluate(&self, text: &str, lowered: &str) -> Option<AuditVerdict> {
        match self {
            Check::Denylist { terms } => terms
                .iter()
                .find(|term| lowered.contains(&term.to_lowercase()))
                .map(|term| {
                    AuditVerdict::fail(
                        format!("Safety violation detected: \"{}\"", term),
                        Severity::High,
                    )
                }),
            Check::StepMarkers { markers } => {
                let has_steps = markers
                    .iter()
                    .any(|m| lowered.contains(&m.to_lowercase()));
                (!has_steps).then(|| {
                    AuditVerdict::fail("Missing numbered steps (Step 1, 1., etc.)", Severity::Medium)
                })
            }
            Check::MinLength { chars } => (text.chars().count() < *chars).then(|| {
                AuditVerdict::fail("Content too brief for professional SOP", Severity::Low)
            }),
            Check::RequiredMarkers { markers } => markers
                .iter()
                .find(|m| !lowered.contains(&m.to_lowercase()))
                .map(|m| {
                    AuditVerdict::fail(format!("Missing required section: {}", m), Severity::Medium)
                }),
        }
    }
}

/// One section the generator is asked to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    /// Marker label as it appears in the text, e.g. `SECTION 2`.
    pub label: String,
    /// Heading printed above the section in the rendered document.
    pub title: String,
    /// Trailing sections are placed after the screenshot grid.
    #[serde(default)]
    pub trailing: bool,
}

impl SectionSpec {
    pub fn new(label: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            title: title.into(),
            trailing: false,
        }
    }

    pub fn trailing(mut self) -> Self {
        self.trailing = true;
        self
    }
}

/// A named, ordered collection of checks plus the expected section schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub name: String,
    pub checks: Vec<Check>,
    pub sections: Vec<SectionSpec>,
    pub prompt_template: String,
}

/// Terms that mark a procedure as encouraging unsafe shortcuts.
pub const DEFAULT_DENYLIST: &[&str] = &[
    "ignore warning",
    "bypass safety",
    "force",
    "don't worry",
    "skip verification",
    "override",
    "disable protection",
    "turn off safety",
    "ignore error",
];

/// Markers accepted as evidence of numbered steps.
pub const DEFAULT_STEP_MARKERS: &[&str] = &["step 1", "1.", "step-1"];

/// Minimum length (characters) of an acceptable SOP.
pub const DEFAULT_MIN_CHARS: usize = 100;

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl RuleSet {
    /// Denylist → numbered steps → minimum length, single `SOP` section.
    pub fn safety() -> Self {
        Self {
            name: "safety".to_string(),
            checks: vec![
                Check::Denylist {
                    terms: owned(DEFAULT_DENYLIST),
                },
                Check::StepMarkers {
                    markers: owned(DEFAULT_STEP_MARKERS),
                },
                Check::MinLength {
                    chars: DEFAULT_MIN_CHARS,
                },
            ],
            sections: vec![SectionSpec::new("SOP", "Standard Operating Procedure")],
            prompt_template: SAFETY_SOP_PROMPT.to_string(),
        }
    }

    /// Four required section markers, checked in order.
    pub fn structure() -> Self {
        let sections = vec![
            SectionSpec::new("SECTION 1", "Overview"),
            SectionSpec::new("SECTION 2", "Procedure"),
            SectionSpec::new("SECTION 3", "Process Flow"),
            SectionSpec::new("SECTION 4", "Compliance Notes").trailing(),
        ];
        Self {
            name: "structure".to_string(),
            checks: vec![Check::RequiredMarkers {
                markers: sections.iter().map(|s| s.label.clone()).collect(),
            }],
            sections,
            prompt_template: STRUCTURED_SOP_PROMPT.to_string(),
        }
    }

    /// Look up a built-in rule set by configuration key.
    pub fn named(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "safety" => Some(Self::safety()),
            "structure" | "structural" => Some(Self::structure()),
            _ => None,
        }
    }

    /// Parse a custom rule set from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Replace the check list, keeping sections and prompt.
    pub fn with_checks(mut self, checks: Vec<Check>) -> Self {
        self.checks = checks;
        self
    }

    /// Section labels in schema order.
    pub fn labels(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.label.clone()).collect()
    }
}

/// Anything that can turn a document into a verdict.
pub trait Auditor: Send + Sync {
    fn audit(&self, text: &str) -> AuditVerdict;
}

impl Auditor for RuleSet {
    fn audit(&self, text: &str) -> AuditVerdict {
        audit(text, self)
    }
}

/// Validate `text` against `rules`, reporting the first failing check.
pub fn audit(text: &str, rules: &RuleSet) -> AuditVerdict {
    let lowered = text.to_lowercase();
    rules
        .checks
        .iter()
        .find_map(|check| check.evaluate(text, &lowered))
        .unwrap_or_else(AuditVerdict::pass)
}
