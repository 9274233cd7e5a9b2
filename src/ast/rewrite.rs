//! Structural Splitting Helpers.

use super::{TermId, TermKind, TermManager};

/// Top-level conjuncts of a term (`true` splits to none).
#[must_use]
pub fn conjuncts(tm: &TermManager, t: TermId) -> Vec<TermId> {
    if tm.is_true(t) {
        return Vec::new();
    }
    match tm.kind(t) {
        TermKind::And(args) => args.clone(),
        _ => vec![t],
    }
}

/// Top-level disjuncts of a term (`false` splits to none).
#[must_use]
pub fn disjuncts(tm: &TermManager, t: TermId) -> Vec<TermId> {
    if tm.is_false(t) {
        return Vec::new();
    }
    match tm.kind(t) {
        TermKind::Or(args) => args.clone(),
        _ => vec![t],
    }
}
