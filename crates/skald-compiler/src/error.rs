//! Compilation errors
//!
//! Only conditions that make the whole output unusable abort a compile.
//! Everything tied to a single construct is a [`crate::diag::Diagnostic`]
//! instead, with fallback code emitted in its place.

use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Library fragment '{name}' has no text (missing artifact)")]
    MissingFragment { name: String },

    #[error("Globals need {needed} slots but the value stack is configured with {configured}")]
    StackTooSmall { needed: u32, configured: u32 },

    #[error("Internal compiler error: {message}")]
    InternalError { message: String },
}
