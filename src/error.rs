//! Error Types.
//!
//! Recoverable issues (unsupported literal shapes during witness
//! extraction) are absorbed best-effort at the extraction site; everything
//! that reaches a caller through this enum is a hard failure of the
//! current run. An indeterminate SMT answer is not an error: it surfaces
//! as [`crate::qe::Validity::Unknown`].

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal failures of one engine run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// A constraint shape the witness extractor cannot decompose and
    /// cannot conservatively drop.
    #[error("unsupported constraint: {0}")]
    Unsupported(String),

    /// A structural precondition of the engine was violated; indicates an
    /// engine defect, not a user error.
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    /// Cycle-breaking found no acyclic entry point among the mutually
    /// dependent synthesis-variable definitions.
    #[error("cyclic skolem definitions cannot be resolved")]
    CyclicDefinitions,

    /// The backend reported satisfiable but produced no model.
    #[error("satisfiable answer without a model")]
    NoModel,
}
