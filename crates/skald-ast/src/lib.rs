//! Syntax tree for the Skald scripting language.
//!
//! Skald sources are statically-typed, class-based scripts that compile down
//! to the flat register language executed by the world VM. Parsing is the
//! front end's job; this crate is the contract between a front end and the
//! compiler: plain data nodes with source positions and type annotations,
//! nothing resolved, nothing lowered.
//!
//! Front ends, tooling, and the compiler's own test suites construct these
//! nodes directly. The [`build`] module provides shorthand constructors so
//! hand-written trees stay readable.

pub mod build;
pub mod expression;
pub mod statement;
pub mod types;

pub use expression::*;
pub use statement::*;
pub use types::*;

/// Source position attached to every node.
///
/// `start`/`end` are byte offsets into the original source; `line` is what
/// compiler diagnostics report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Span carrying only a line number. Hand-built trees rarely have byte
    /// offsets worth tracking.
    pub fn at_line(line: u32) -> Self {
        Self {
            start: 0,
            end: 0,
            line,
            column: 0,
        }
    }
}

/// Identifier with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

impl Identifier {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// One source file, already parsed.
///
/// Include directives are resolved by the front end: an included file's
/// module is compiled immediately before the including file's statements, so
/// several modules share one running symbol table.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Display name used in diagnostics, usually the file path.
    pub file: String,
    pub statements: Vec<Statement>,
}

impl Module {
    pub fn new(file: impl Into<String>, statements: Vec<Statement>) -> Self {
        Self {
            file: file.into(),
            statements,
        }
    }
}
