//! Row-level diagnostics and exclusion accounting.
//!
//! Data problems never abort a run. Loaders record a [`DiagnosticIssue`] for
//! each dropped input row, and the evaluation stages count every record they
//! leave out of a fit or a score in an [`ExclusionReport`], keyed by model and
//! [`ExclusionCause`]. The final report surfaces these counts next to the
//! accuracy numbers.
//!
//! # Example
//!
//! ```
//! use pedal_core::diagnostics::{Diagnostics, ExclusionCause, ExclusionReport};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning_at_line("schema", "unknown station '9999'", 12);
//! assert_eq!(diag.warning_count(), 1);
//!
//! let mut report = ExclusionReport::default();
//! report.record("full", ExclusionCause::InsufficientHistory, 24);
//! assert_eq!(report.count("full", ExclusionCause::InsufficientHistory), 24);
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Row dropped or defaulted, run continued
    Warning,
    /// Input could not be used at all
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Grouping key such as "schema", "join", "parse"
    pub category: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl DiagnosticIssue {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            line: None,
        }
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;
        if let Some(line) = self.line {
            write!(f, " at line {}", line)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    pub fn add_warning(&mut self, category: &str, message: &str) {
        self.add(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn add_warning_at_line(&mut self, category: &str, message: &str, line: usize) {
        self.add(DiagnosticIssue::new(Severity::Warning, category, message).with_line(line));
    }

    pub fn add_error(&mut self, category: &str, message: &str) {
        self.add(DiagnosticIssue::new(Severity::Error, category, message));
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn count_in(&self, category: &str) -> usize {
        self.issues.iter().filter(|i| i.category == category).count()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }
}

/// Why a record was left out of fitting or scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionCause {
    /// Raw event referenced an unknown station, fell outside the study
    /// period, or could not be parsed
    SchemaViolation,
    /// No weather observation for the record's interval
    JoinGapWeather,
    /// Station has no demographic snapshot
    JoinGapDemographics,
    /// A required lag reaches before the start of the station's history
    InsufficientHistory,
    /// The fitted model cannot score the row (unseen level, singular fit)
    ModelDegeneracy,
}

impl ExclusionCause {
    pub const ALL: [ExclusionCause; 5] = [
        ExclusionCause::SchemaViolation,
        ExclusionCause::JoinGapWeather,
        ExclusionCause::JoinGapDemographics,
        ExclusionCause::InsufficientHistory,
        ExclusionCause::ModelDegeneracy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionCause::SchemaViolation => "schema_violation",
            ExclusionCause::JoinGapWeather => "join_gap_weather",
            ExclusionCause::JoinGapDemographics => "join_gap_demographics",
            ExclusionCause::InsufficientHistory => "insufficient_history",
            ExclusionCause::ModelDegeneracy => "model_degeneracy",
        }
    }
}

impl fmt::Display for ExclusionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Excluded-row counts keyed by (scope, cause). The scope is a model name, or
/// `"panel"` for events dropped while building the panel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExclusionReport {
    counts: BTreeMap<(String, ExclusionCause), usize>,
}

impl ExclusionReport {
    pub const PANEL_SCOPE: &'static str = "panel";

    pub fn record(&mut self, scope: &str, cause: ExclusionCause, rows: usize) {
        if rows == 0 {
            return;
        }
        *self
            .counts
            .entry((scope.to_string(), cause))
            .or_insert(0) += rows;
    }

    pub fn count(&self, scope: &str, cause: ExclusionCause) -> usize {
        self.counts
            .get(&(scope.to_string(), cause))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_for(&self, scope: &str) -> usize {
        self.counts
            .iter()
            .filter(|((s, _), _)| s == scope)
            .map(|(_, n)| n)
            .sum()
    }

    pub fn merge(&mut self, other: &ExclusionReport) {
        for ((scope, cause), rows) in &other.counts {
            self.record(scope, *cause, *rows);
        }
    }

    /// Rows in deterministic (scope, cause) order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, ExclusionCause, usize)> {
        self.counts
            .iter()
            .map(|((scope, cause), rows)| (scope.as_str(), *cause, *rows))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
