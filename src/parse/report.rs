//! Parse report types.
//!
//! Every candidate the parser throws away or adjusts leaves an issue here,
//! so a run log can explain why a box the model mentioned was not drawn.

use serde::Serialize;
use std::fmt;

/// Everything the parser had to say about one response.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ParseReport {
    pub issues: Vec<ParseIssue>,
}

impl ParseReport {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    pub fn add(&mut self, issue: ParseIssue) {
        self.issues.push(issue);
    }

    /// Number of candidates that were dropped.
    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    /// Number of candidates that were kept but adjusted.
    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    /// Returns true if there are no issues at all.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns true if an issue with the given code was recorded.
    pub fn has(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

impl fmt::Display for ParseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return writeln!(f, "Parse clean: no issues found");
        }

        writeln!(
            f,
            "Parse completed with {} dropped and {} adjusted candidate(s):",
            self.error_count(),
            self.warning_count()
        )?;

        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }

        Ok(())
    }
}

/// A single parse issue.
#[derive(Clone, Debug, Serialize)]
pub struct ParseIssue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    pub context: IssueContext,
}

impl ParseIssue {
    pub fn new(
        severity: Severity,
        code: IssueCode,
        message: impl Into<String>,
        context: IssueContext,
    ) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            context,
        }
    }

    /// The candidate was dropped.
    pub fn error(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self::new(Severity::Error, code, message, context)
    }

    /// The candidate was kept after an adjustment.
    pub fn warning(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self::new(Severity::Warning, code, message, context)
    }
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "DROP ",
            Severity::Warning => "ADJ  ",
        };
        write!(
            f,
            "[{}] {:?} in {}: {}",
            severity, self.code, self.context, self.message
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The candidate was kept but changed.
    Warning,
    /// The candidate was dropped.
    Error,
}

/// A stable code identifying the type of parse issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    // Shape issues
    /// Neither a JSON list nor detection lines were found.
    NoDetectionList,
    /// A list element was not a JSON object.
    NotAnObject,
    /// No label could be found, or it was empty.
    MissingLabel,

    // Confidence issues
    /// Confidence was missing, non-numeric, or outside `[0, 1]`.
    InvalidConfidence,

    // Bounding box issues
    /// No usable box coordinates were found.
    MissingBox,
    /// A box coordinate was NaN or infinite.
    BBoxNotFinite,
    /// The corners were given in the wrong order and were swapped.
    ReorderedCorners,
    /// The box was scaled from normalized coordinates.
    NormalizedBox,
    /// The box extended past the image and was clamped.
    BBoxClamped,
    /// The box had no area once clamped to the image.
    DegenerateBox,
}

/// Where an issue occurred.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueContext {
    /// Issue with the response as a whole.
    Response,
    /// Issue with the n-th candidate (0-based, in discovery order).
    Candidate { index: usize },
}

impl fmt::Display for IssueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueContext::Response => write!(f, "response"),
            IssueContext::Candidate { index } => write!(f, "candidate {}", index),
        }
    }
}
