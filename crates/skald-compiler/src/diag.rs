//! Diagnostic infrastructure.
//!
//! The compiler never throws past a statement: anything recoverable becomes
//! a [`Diagnostic`] in the sink and lowering continues with fallback code, so
//! one pass reports every problem in a file. Diagnostics are plain data
//! handed back to the embedder; rendering is the driver's job.

use serde::{Deserialize, Serialize};

/// Severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The emitted program is complete but almost certainly not what the
    /// author meant. Acceptance policy is the embedder's call.
    Error,
    /// Degraded but well-defined output (truncated quote, zero-sized array).
    Warning,
}

/// What went wrong, as a closed set. Every diagnostic carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Name not found through the whole resolution chain
    UnresolvedReference,
    /// Value of one shape used where another was required
    ShapeMismatch,
    /// Construct outside the restricted grammar the target can express
    GrammarRestriction,
    /// Write to a const or readonly symbol
    ReadOnlyViolation,
    /// Fixed-size target resource exceeded (quote over 128 chars)
    CapacityViolation,
}

impl Category {
    /// Stable error code, "E41xx"
    pub fn code(&self) -> &'static str {
        match self {
            Category::UnresolvedReference => "E4101",
            Category::ShapeMismatch => "E4102",
            Category::GrammarRestriction => "E4103",
            Category::ReadOnlyViolation => "E4104",
            Category::CapacityViolation => "E4105",
        }
    }
}

/// A diagnostic message tied to a source line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub severity: Severity,
    pub category: Category,
    pub message: String,
}

impl Diagnostic {
    pub fn code(&self) -> &'static str {
        self.category.code()
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Diagnostics accumulated for one file of a compilation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub file: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl FileReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Collects diagnostics for the file currently being lowered.
///
/// `flush` drains the sink into a [`FileReport`] at each file boundary;
/// diagnostics never escape the compilation unit they were raised in.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    file: String,
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the sink at the next file. Must be called after `flush`.
    pub fn set_file(&mut self, file: impl Into<String>) {
        self.file = file.into();
    }

    pub fn error(&mut self, category: Category, line: u32, message: impl Into<String>) {
        self.push(Severity::Error, category, line, message);
    }

    pub fn warning(&mut self, category: Category, line: u32, message: impl Into<String>) {
        self.push(Severity::Warning, category, line, message);
    }

    fn push(
        &mut self,
        severity: Severity,
        category: Category,
        line: u32,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic {
            file: self.file.clone(),
            line,
            severity,
            category,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Drain everything raised since the last flush into a per-file report.
    pub fn flush(&mut self) -> FileReport {
        FileReport {
            file: std::mem::take(&mut self.file),
            diagnostics: std::mem::take(&mut self.diagnostics),
        }
    }
}
