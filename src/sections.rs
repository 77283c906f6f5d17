//! Marker-based section extraction.
//!
//! The parser is a two-part state machine: [`classify`] decides whether a
//! line is a marker for one of the expected labels, and [`parse`] keeps a
//! single "current label" register that receives every non-marker line.
//!
//! ```text
//! preamble (dropped)      SECTION 1:   ──▶ current = 0
//! SECTION 1: Overview     body lines   ──▶ appended to bodies[0]
//! ...                     SECTION 2:   ──▶ current = 1
//! ```
//!
//! When no marker appears at all, the whole input is assigned verbatim to
//! the first expected label.

use serde::Serialize;
use std::collections::HashMap;

/// Section bodies keyed by label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sections {
    labels: Vec<String>,
    bodies: HashMap<String, String>,
    fallback: bool,
}

impl Sections {
    /// Body for `label`; empty for labels that received no text, `None`
    /// for labels outside the expected set.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.bodies.get(label).map(String::as_str)
    }

    /// Expected labels in schema order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Whether no marker was found and the whole input went to the first label.
    pub fn fallback_used(&self) -> bool {
        self.fallback
    }

    /// `(label, body)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(move |l| {
            let body = self.bodies.get(l).map(String::as_str).unwrap_or("");
            (l.as_str(), body)
        })
    }

    /// Re-serialise as `LABEL:` lines followed by each body. Every body
    /// ends on its own line so the next marker is never glued to it.
    pub fn to_marked_text(&self) -> String {
        let mut out = String::new();
        for (label, body) in self.iter() {
            out.push_str(label);
            out.push_str(":\n");
            out.push_str(body);
            if !body.is_empty() && !body.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.bodies
    }
}

/// Kind of an input line relative to the expected labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    /// Marker for the label at this index.
    Marker(usize),
    Text,
}

/// Decoration models like to wrap markers in (`## SECTION 1`, `**SECTION 1:**`).
fn strip_decoration(line: &str) -> &str {
    line.trim()
        .trim_start_matches(['#', '*', ' ', '\t'])
        .trim_end_matches(['*', ' ', '\t'])
}

fn classify(line: &str, upper_labels: &[String]) -> LineKind {
    let candidate = strip_decoration(line).to_uppercase();
    for (idx, label) in upper_labels.iter().enumerate() {
        if let Some(rest) = candidate.strip_prefix(label.as_str()) {
            let rest = rest.trim_start();
            // "SECTION 1" must not claim "SECTION 10".
            if rest.is_empty() || rest.starts_with(':') {
                return LineKind::Marker(idx);
            }
        }
    }
    LineKind::Text
}

/// Split `text` into the sections named by `labels`.
pub fn parse(text: &str, labels: &[String]) -> Sections {
    let upper: Vec<String> = labels.iter().map(|l| l.trim().to_uppercase()).collect();
    let mut bodies: Vec<String> = vec![String::new(); labels.len()];
    let mut current: Option<usize> = None;
    let mut saw_marker = false;

    for line in text.lines() {
        match classify(line, &upper) {
            LineKind::Marker(idx) => {
                current = Some(idx);
                saw_marker = true;
            }
            LineKind::Text => {
                if let Some(idx) = current {
                    bodies[idx].push_str(line);
                    bodies[idx].push('\n');
                }
            }
        }
    }

    let fallback = !saw_marker && !labels.is_empty();
    if fallback {
        bodies[0] = text.to_string();
    }

    Sections {
        labels: labels.to_vec(),
        bodies: labels.iter().cloned().zip(bodies).collect(),
        fallback,
    }
}
