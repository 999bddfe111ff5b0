//! User-facing diagnostics.
//!
//! Diagnostics are returned by value from `compile` and `export`; they are never
//! raised as errors. Formatting is left to the caller, which can group them by
//! source location with [`group_by_location`].

use crate::tree::SourceLoc;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// A located compile-time problem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: SourceLoc,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, location: SourceLoc) -> Self {
        Self { severity, message: message.into(), location }
    }

    /// Create an error diagnostic.
    pub fn error(message: impl Into<String>, location: SourceLoc) -> Self {
        Self::new(Severity::Error, message, location)
    }

    /// Create a warning diagnostic.
    pub fn warning(message: impl Into<String>, location: SourceLoc) -> Self {
        Self::new(Severity::Warning, message, location)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.location, self.severity, self.message)
    }
}

pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

/// Group diagnostics by source location, keeping their relative order.
pub fn group_by_location(diagnostics: &[Diagnostic]) -> BTreeMap<SourceLoc, Vec<&Diagnostic>> {
    let mut groups: BTreeMap<SourceLoc, Vec<&Diagnostic>> = BTreeMap::new();
    for diagnostic in diagnostics {
        groups.entry(diagnostic.location).or_default().push(diagnostic);
    }
    groups
}
