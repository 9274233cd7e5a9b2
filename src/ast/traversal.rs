//! Term Traversal.
//!
//! Variable collection and substitution over the hash-consed DAG. Both are
//! memoized per call so shared subtrees are visited once.

use super::{TermId, TermKind, TermManager};
use rustc_hash::{FxHashMap, FxHashSet};

/// Collect the variables of a term, in ascending id order.
#[must_use]
pub fn collect_vars(tm: &TermManager, t: TermId) -> Vec<TermId> {
    let mut out = Vec::new();
    let mut seen = FxHashSet::default();
    let mut stack = vec![t];
    while let Some(t) = stack.pop() {
        if !seen.insert(t) {
            continue;
        }
        match tm.kind(t) {
            TermKind::Var(..) => out.push(t),
            k => for_each_child(k, |c| stack.push(c)),
        }
    }
    out.sort_unstable();
    out
}

/// Whether `var` occurs in `t`.
#[must_use]
pub fn occurs_in(tm: &TermManager, t: TermId, var: TermId) -> bool {
    let mut seen = FxHashSet::default();
    let mut stack = vec![t];
    while let Some(t) = stack.pop() {
        if t == var {
            return true;
        }
        if !seen.insert(t) {
            continue;
        }
        for_each_child(tm.kind(t), |c| stack.push(c));
    }
    false
}

/// Replace every occurrence of the map's keys by the mapped terms.
///
/// Rebuilds through the `mk_*` constructors, so the result is
/// re-canonicalized on the way out; untouched subtrees are shared.
pub fn substitute(tm: &mut TermManager, t: TermId, map: &FxHashMap<TermId, TermId>) -> TermId {
    if map.is_empty() {
        return t;
    }
    let mut memo = FxHashMap::default();
    subst_rec(tm, t, map, &mut memo)
}

/// Replace a single variable.
pub fn substitute_one(tm: &mut TermManager, t: TermId, var: TermId, by: TermId) -> TermId {
    let mut map = FxHashMap::default();
    map.insert(var, by);
    substitute(tm, t, &map)
}

fn subst_rec(
    tm: &mut TermManager,
    t: TermId,
    map: &FxHashMap<TermId, TermId>,
    memo: &mut FxHashMap<TermId, TermId>,
) -> TermId {
    if let Some(&r) = map.get(&t) {
        return r;
    }
    if let Some(&r) = memo.get(&t) {
        return r;
    }
    let kind = tm.kind(t).clone();
    let result = match kind {
        TermKind::True
        | TermKind::False
        | TermKind::Var(..)
        | TermKind::IntConst(_)
        | TermKind::RealConst(_) => t,
        TermKind::Not(a) => {
            let a = subst_rec(tm, a, map, memo);
            tm.mk_not(a)
        }
        TermKind::And(args) => {
            let args = args.iter().map(|&a| subst_rec(tm, a, map, memo)).collect();
            tm.mk_and(args)
        }
        TermKind::Or(args) => {
            let args = args.iter().map(|&a| subst_rec(tm, a, map, memo)).collect();
            tm.mk_or(args)
        }
        TermKind::Ite(c, a, b) => {
            let c = subst_rec(tm, c, map, memo);
            let a = subst_rec(tm, a, map, memo);
            let b = subst_rec(tm, b, map, memo);
            tm.mk_ite(c, a, b)
        }
        TermKind::Eq(a, b) => {
            let (a, b) = (subst_rec(tm, a, map, memo), subst_rec(tm, b, map, memo));
            tm.mk_eq(a, b)
        }
        TermKind::Ne(a, b) => {
            let (a, b) = (subst_rec(tm, a, map, memo), subst_rec(tm, b, map, memo));
            tm.mk_ne(a, b)
        }
        TermKind::Lt(a, b) => {
            let (a, b) = (subst_rec(tm, a, map, memo), subst_rec(tm, b, map, memo));
            tm.mk_lt(a, b)
        }
        TermKind::Le(a, b) => {
            let (a, b) = (subst_rec(tm, a, map, memo), subst_rec(tm, b, map, memo));
            tm.mk_le(a, b)
        }
        TermKind::Gt(a, b) => {
            let (a, b) = (subst_rec(tm, a, map, memo), subst_rec(tm, b, map, memo));
            tm.mk_gt(a, b)
        }
        TermKind::Ge(a, b) => {
            let (a, b) = (subst_rec(tm, a, map, memo), subst_rec(tm, b, map, memo));
            tm.mk_ge(a, b)
        }
        TermKind::Add(args) => {
            let args = args.iter().map(|&a| subst_rec(tm, a, map, memo)).collect();
            tm.mk_add(args)
        }
        TermKind::Sub(a, b) => {
            let (a, b) = (subst_rec(tm, a, map, memo), subst_rec(tm, b, map, memo));
            tm.mk_sub(a, b)
        }
        TermKind::Neg(a) => {
            let a = subst_rec(tm, a, map, memo);
            tm.mk_neg(a)
        }
        TermKind::Mul(a, b) => {
            let (a, b) = (subst_rec(tm, a, map, memo), subst_rec(tm, b, map, memo));
            tm.mk_mul(a, b)
        }
        TermKind::Div(a, b) => {
            let (a, b) = (subst_rec(tm, a, map, memo), subst_rec(tm, b, map, memo));
            tm.mk_div(a, b)
        }
        TermKind::Idiv(a, b) => {
            let (a, b) = (subst_rec(tm, a, map, memo), subst_rec(tm, b, map, memo));
            tm.mk_idiv(a, b)
        }
    };
    memo.insert(t, result);
    result
}

/// Tree size of a term (counting shared subterms once per occurrence).
#[must_use]
pub fn term_size(tm: &TermManager, t: TermId) -> usize {
    let mut size = 0usize;
    let mut stack = vec![t];
    while let Some(t) = stack.pop() {
        size += 1;
        for_each_child(tm.kind(t), |c| stack.push(c));
    }
    size
}

pub(crate) fn for_each_child(kind: &TermKind, mut f: impl FnMut(TermId)) {
    match kind {
        TermKind::True
        | TermKind::False
        | TermKind::Var(..)
        | TermKind::IntConst(_)
        | TermKind::RealConst(_) => {}
        TermKind::Not(a) | TermKind::Neg(a) => f(*a),
        TermKind::And(args) | TermKind::Or(args) | TermKind::Add(args) => {
            for &a in args {
                f(a);
            }
        }
        TermKind::Ite(a, b, c) => {
            f(*a);
            f(*b);
            f(*c);
        }
        TermKind::Eq(a, b)
        | TermKind::Ne(a, b)
        | TermKind::Lt(a, b)
        | TermKind::Le(a, b)
        | TermKind::Gt(a, b)
        | TermKind::Ge(a, b)
        | TermKind::Sub(a, b)
        | TermKind::Mul(a, b)
        | TermKind::Div(a, b)
        | TermKind::Idiv(a, b) => {
            f(*a);
            f(*b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::Sort;

    #[test]
    fn test_collect_vars() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let y = tm.mk_var("y", Sort::Int);
        let one = tm.mk_int(1);
        let sum = tm.mk_add(vec![x, y, one]);
        let eq = tm.mk_eq(sum, x);
        let vars = collect_vars(&tm, eq);
        assert_eq!(vars, vec![x, y]);
        assert!(occurs_in(&tm, eq, y));
        assert!(!occurs_in(&tm, eq, tm.mk_true()));
    }

    #[test]
    fn test_substitute_resimplifies() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let two = tm.mk_int(2);
        let one = tm.mk_int(1);
        let sum = tm.mk_add(vec![x, one]);
        let r = substitute_one(&mut tm, sum, x, two);
        assert_eq!(r, tm.mk_int(3));
    }
}
