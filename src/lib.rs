//! forallex - AE-Validity and Skolem Extraction
//!
//! This crate decides forall-exists formulas `∀s. S(s) ⟹ ∃v. T(s, v)`
//! over linear integer/real arithmetic and booleans, and synthesizes a
//! Skolem relation for the valid ones:
//! - Arena-allocated terms with hash-consed [`ast::TermId`] references
//! - A small incremental SMT backend for the linear fragment
//! - The model-based-projection partitioning loop ([`qe::AeSolver`])
//! - Per-partition witness extraction and Skolem combination, with
//!   optional compaction of the final case split
//!
//! # Examples
//!
//! ## Deciding an AE-formula
//!
//! ```
//! use forallex::ast::TermManager;
//! use forallex::sort::Sort;
//! use forallex::config::AeConfig;
//! use forallex::qe::{solve_with_vars, Validity};
//!
//! let mut tm = TermManager::new();
//! let x = tm.mk_var("x", Sort::Int);
//! let v = tm.mk_var("v", Sort::Int);
//!
//! // ∀x. ∃v. x < v ∧ v < x + 2
//! let two = tm.mk_int(2);
//! let upper = tm.mk_add(vec![x, two]);
//! let lo = tm.mk_gt(v, x);
//! let hi = tm.mk_lt(v, upper);
//! let t = tm.mk_and(vec![lo, hi]);
//! let s = tm.mk_true();
//!
//! let sol = solve_with_vars(&mut tm, s, t, vec![v], AeConfig::default()).unwrap();
//! assert_eq!(sol.validity, Validity::Valid);
//! assert!(sol.skolem.is_some());
//! ```
//!
//! ## Driving the solver directly
//!
//! ```
//! use forallex::ast::TermManager;
//! use forallex::sort::Sort;
//! use forallex::config::AeConfig;
//! use forallex::qe::{AeSolver, Validity};
//!
//! let mut tm = TermManager::new();
//! let x = tm.mk_var("x", Sort::Int);
//! let v = tm.mk_var("v", Sort::Int);
//! let s = tm.mk_true();
//! let t = tm.mk_eq(v, x);
//!
//! let mut ae = AeSolver::new(&mut tm, s, t, vec![v], AeConfig::default());
//! assert_eq!(ae.solve(&mut tm).unwrap(), Validity::Valid);
//! let skolem = ae.skolem_function(&mut tm).unwrap();
//! assert!(tm.display(skolem).to_string().contains('v'));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ast;
pub mod config;
pub mod error;
pub mod model;
pub mod qe;
pub mod smt;
pub mod sort;
pub mod stats;

pub use ast::{TermId, TermKind, TermManager};
pub use config::AeConfig;
pub use error::{Error, Result};
pub use model::{Model, Value};
pub use qe::{
    all_inclusive_skolem, all_inclusive_with_vars, solve_and_skolemize, solve_with_vars,
    AeSolution, AeSolver, Partition, SkolemScope, Validity,
};
pub use smt::{SatResult, Solver};
pub use sort::Sort;
pub use stats::AeStats;
