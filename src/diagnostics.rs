//! Plan-time diagnostics.
//!
//! Validation problems are collected rather than returned one at a time so
//! that a single plan reports every bad attribute.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Attribute the diagnostic refers to, e.g. `auth_login.path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, attribute: &str, summary: impl Into<String>) {
        self.push(Severity::Error, attribute, summary.into(), None);
    }

    pub fn error_with_detail(
        &mut self,
        attribute: &str,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) {
        self.push(Severity::Error, attribute, summary.into(), Some(detail.into()));
    }

    pub fn warning(&mut self, attribute: &str, summary: impl Into<String>) {
        self.push(Severity::Warning, attribute, summary.into(), None);
    }

    /// Records an error when more than one of `attributes` is set.
    pub fn conflicts(&mut self, attributes: &[(&str, bool)]) {
        let set: Vec<&str> = attributes
            .iter()
            .filter(|(_, is_set)| *is_set)
            .map(|(name, _)| *name)
            .collect();
        if set.len() > 1 {
            self.error(
                set[0],
                format!("conflicting attributes: only one of {} may be set", set.join(", ")),
            );
        }
    }

    fn push(&mut self, severity: Severity, attribute: &str, summary: String, detail: Option<String>) {
        self.0.push(Diagnostic {
            severity,
            summary,
            detail,
            attribute: (!attribute.is_empty()).then(|| attribute.to_string()),
        });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|d| match &d.attribute {
                Some(attr) => format!("{}: {}", attr, d.summary),
                None => d.summary.clone(),
            })
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}
