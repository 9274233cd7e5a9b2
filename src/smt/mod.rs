//! SMT Backend for Linear Arithmetic and Booleans.
//!
//! A small, honest decision procedure behind the query interface the
//! engine consumes: incremental assertion frames, three-valued
//! satisfiability with model production, and the derived
//! implication/equivalence/simplification queries.
//!
//! ## Strategy
//!
//! Assertions are lowered (`div`-by-constant introduced variables,
//! if-then-else split at the atom level), put into negation normal form,
//! and explored by backtracking branch enumeration over disjunctions with
//! disequality splitting; each complete branch is a conjunction of linear
//! atoms decided by [`fourier`]. A branch the theory core cannot settle
//! poisons the `Unsat` answer into `Unknown` — never into a guess.

pub mod fourier;
pub mod linear;

use crate::ast::traversal::{collect_vars, substitute, for_each_child};
use crate::ast::{TermId, TermKind, TermManager};
use crate::model::Model;
use crate::sort::Sort;
use fourier::AtomVec;
use linear::atom_to_lin;
use num_bigint::BigInt;
use num_traits::Signed;
use rustc_hash::FxHashMap;
use tracing::trace;

/// Three-valued satisfiability answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatResult {
    /// A model exists.
    Sat,
    /// No model exists.
    Unsat,
    /// The backend could not decide.
    Unknown,
}

/// Incremental solver session: a stack of assertion frames.
///
/// Push/pop must stay balanced; popping the root frame is a programming
/// error caught by a `debug_assert!` and otherwise ignored.
#[derive(Debug, Default)]
pub struct Solver {
    frames: Vec<Vec<TermId>>,
    last_model: Option<Model>,
}

impl Solver {
    /// Fresh session with one root frame.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: vec![Vec::new()],
            last_model: None,
        }
    }

    /// Drop all assertions and any cached model.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.frames.push(Vec::new());
        self.last_model = None;
    }

    /// Open a new assertion frame.
    pub fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    /// Discard the top assertion frame.
    pub fn pop(&mut self) {
        debug_assert!(self.frames.len() > 1, "pop on the root frame");
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Assert a boolean term in the current frame.
    pub fn assert_term(&mut self, t: TermId) {
        self.frames
            .last_mut()
            .expect("solver always has a root frame")
            .push(t);
    }

    /// Check satisfiability of the conjunction of all asserted terms.
    pub fn check(&mut self, tm: &mut TermManager) -> SatResult {
        let asserted: Vec<TermId> = self.frames.iter().flatten().copied().collect();
        let goal = tm.mk_and(asserted.clone());
        trace!(target: "forallex::smt", "check: {}", tm.display(goal));

        let mut vars = Vec::new();
        for &a in &asserted {
            vars.extend(collect_vars(tm, a));
        }
        vars.sort_unstable();
        vars.dedup();

        let mut side = Vec::new();
        let mut memo = FxHashMap::default();
        let lowered = lower_idiv(tm, goal, &mut side, &mut memo);
        side.push(lowered);
        let goal = tm.mk_and(side);
        let goal = nnf(tm, goal, true);

        let mut ctx = SearchCtx { unknown: false };
        match search(
            tm,
            &mut ctx,
            vec![goal],
            AtomVec::new(),
            FxHashMap::default(),
        ) {
            Some(mut model) => {
                model.complete(tm, &vars);
                self.last_model = Some(model);
                SatResult::Sat
            }
            None => {
                self.last_model = None;
                if ctx.unknown {
                    SatResult::Unknown
                } else {
                    SatResult::Unsat
                }
            }
        }
    }

    /// Model of the last `Sat` answer.
    #[must_use]
    pub fn model(&self) -> Option<&Model> {
        self.last_model.as_ref()
    }
}

struct SearchCtx {
    unknown: bool,
}

fn search(
    tm: &mut TermManager,
    ctx: &mut SearchCtx,
    mut goals: Vec<TermId>,
    mut lits: AtomVec,
    mut bools: FxHashMap<TermId, bool>,
) -> Option<Model> {
    while let Some(g) = goals.pop() {
        match tm.kind(g).clone() {
            TermKind::True => {}
            TermKind::False => return None,
            TermKind::And(args) => goals.extend(args),
            TermKind::Or(args) => {
                for a in args {
                    let mut branch = goals.clone();
                    branch.push(a);
                    if let Some(m) = search(tm, ctx, branch, lits.clone(), bools.clone()) {
                        return Some(m);
                    }
                }
                return None;
            }
            TermKind::Var(_, Sort::Bool) => {
                if let Some(prev) = bools.insert(g, true) {
                    if !prev {
                        return None;
                    }
                }
            }
            TermKind::Not(inner) => match tm.kind(inner) {
                TermKind::Var(_, Sort::Bool) => {
                    if let Some(prev) = bools.insert(inner, false) {
                        if prev {
                            return None;
                        }
                    }
                }
                _ => {
                    ctx.unknown = true;
                    return None;
                }
            },
            TermKind::Ne(a, b) if tm.sort(a) != Sort::Bool => {
                // split a ≠ b into the two strict sides
                let lt = tm.mk_lt(a, b);
                let gt = tm.mk_gt(a, b);
                let or = tm.mk_or(vec![lt, gt]);
                goals.push(or);
            }
            TermKind::Eq(a, b)
            | TermKind::Le(a, b)
            | TermKind::Lt(a, b)
            | TermKind::Gt(a, b)
            | TermKind::Ge(a, b)
                if tm.sort(a) != Sort::Bool =>
            {
                if let Some((cond, then_g, else_g)) = split_ite_atom(tm, g) {
                    let not_cond = tm.mk_not(cond);
                    let pos = tm.mk_and(vec![cond, then_g]);
                    let neg = tm.mk_and(vec![not_cond, else_g]);
                    let or = tm.mk_or(vec![pos, neg]);
                    goals.push(nnf(tm, or, true));
                    continue;
                }
                match atom_to_lin(tm, g) {
                    Ok((lin, rel)) => lits.push((lin, rel)),
                    Err(_) => {
                        ctx.unknown = true;
                        return None;
                    }
                }
            }
            _ => {
                // anything else in boolean position is outside the
                // supported fragment
                ctx.unknown = true;
                return None;
            }
        }
    }

    match fourier::check_conjunction(tm, lits.into_vec()) {
        fourier::Feasibility::Feasible(asg) => {
            Some(fourier::assignment_to_model(tm, &asg, &bools))
        }
        fourier::Feasibility::Infeasible => None,
        fourier::Feasibility::Unknown => {
            ctx.unknown = true;
            None
        }
    }
}

/// Find a numeric if-then-else inside an atom and return the condition
/// with the two substituted copies of the atom.
fn split_ite_atom(tm: &mut TermManager, atom: TermId) -> Option<(TermId, TermId, TermId)> {
    let ite = find_numeric_ite(tm, atom)?;
    let (c, a, b) = match *tm.kind(ite) {
        TermKind::Ite(c, a, b) => (c, a, b),
        _ => unreachable!("find_numeric_ite returns ite nodes"),
    };
    let mut map = FxHashMap::default();
    map.insert(ite, a);
    let then_g = substitute(tm, atom, &map);
    map.insert(ite, b);
    let else_g = substitute(tm, atom, &map);
    Some((c, then_g, else_g))
}

fn find_numeric_ite(tm: &TermManager, t: TermId) -> Option<TermId> {
    let mut stack = vec![t];
    let mut seen = rustc_hash::FxHashSet::default();
    while let Some(t) = stack.pop() {
        if !seen.insert(t) {
            continue;
        }
        if matches!(tm.kind(t), TermKind::Ite(..)) && tm.sort(t) != Sort::Bool {
            return Some(t);
        }
        for_each_child(tm.kind(t), |c| stack.push(c));
    }
    None
}

/// Negation normal form with boolean if-then-else and iff expansion.
pub(crate) fn nnf(tm: &mut TermManager, t: TermId, pos: bool) -> TermId {
    match tm.kind(t).clone() {
        TermKind::True | TermKind::False | TermKind::Var(..) => {
            if pos {
                t
            } else {
                tm.mk_not(t)
            }
        }
        TermKind::Not(a) => nnf(tm, a, !pos),
        TermKind::And(args) => {
            let mapped: Vec<TermId> = args.into_iter().map(|a| nnf(tm, a, pos)).collect();
            if pos {
                tm.mk_and(mapped)
            } else {
                tm.mk_or(mapped)
            }
        }
        TermKind::Or(args) => {
            let mapped: Vec<TermId> = args.into_iter().map(|a| nnf(tm, a, pos)).collect();
            if pos {
                tm.mk_or(mapped)
            } else {
                tm.mk_and(mapped)
            }
        }
        TermKind::Ite(c, a, b) if tm.sort(a) == Sort::Bool => {
            let nc = tm.mk_not(c);
            let t1 = tm.mk_and(vec![c, a]);
            let t2 = tm.mk_and(vec![nc, b]);
            let or = tm.mk_or(vec![t1, t2]);
            nnf(tm, or, pos)
        }
        TermKind::Eq(a, b) if tm.sort(a) == Sort::Bool => {
            let na = tm.mk_not(a);
            let nb = tm.mk_not(b);
            let both = tm.mk_and(vec![a, b]);
            let neither = tm.mk_and(vec![na, nb]);
            let or = tm.mk_or(vec![both, neither]);
            nnf(tm, or, pos)
        }
        TermKind::Ne(a, b) if tm.sort(a) == Sort::Bool => {
            let na = tm.mk_not(a);
            let nb = tm.mk_not(b);
            let t1 = tm.mk_and(vec![a, nb]);
            let t2 = tm.mk_and(vec![na, b]);
            let or = tm.mk_or(vec![t1, t2]);
            nnf(tm, or, pos)
        }
        _ => {
            // relational atoms: mk_not flips the operator
            if pos {
                t
            } else {
                tm.mk_not(t)
            }
        }
    }
}

/// Replace `div`-by-positive-constant nodes with fresh quotient and
/// remainder variables plus their defining constraints.
fn lower_idiv(
    tm: &mut TermManager,
    t: TermId,
    side: &mut Vec<TermId>,
    memo: &mut FxHashMap<TermId, TermId>,
) -> TermId {
    if let Some(&r) = memo.get(&t) {
        return r;
    }
    let kind = tm.kind(t).clone();
    let result = match kind {
        TermKind::Idiv(a, b) => {
            let a = lower_idiv(tm, a, side, memo);
            let divisor = match tm.kind(b) {
                TermKind::IntConst(k) if k.is_positive() => Some(k.clone()),
                _ => None,
            };
            match divisor {
                Some(k) => {
                    let q = tm.mk_fresh_var("fx!divq", Sort::Int);
                    let r = tm.mk_fresh_var("fx!divr", Sort::Int);
                    let kq = {
                        let kt = tm.mk_int(k.clone());
                        tm.mk_mul(kt, q)
                    };
                    let sum = tm.mk_add(vec![kq, r]);
                    let def = tm.mk_eq(a, sum);
                    let zero = tm.mk_int(0);
                    let low = tm.mk_ge(r, zero);
                    let km1 = tm.mk_int(k - BigInt::from(1));
                    let high = tm.mk_le(r, km1);
                    side.push(def);
                    side.push(low);
                    side.push(high);
                    q
                }
                None => tm.mk_idiv(a, b),
            }
        }
        TermKind::True
        | TermKind::False
        | TermKind::Var(..)
        | TermKind::IntConst(_)
        | TermKind::RealConst(_) => t,
        TermKind::Not(a) => {
            let a = lower_idiv(tm, a, side, memo);
            tm.mk_not(a)
        }
        TermKind::And(args) => {
            let args = args
                .into_iter()
                .map(|a| lower_idiv(tm, a, side, memo))
                .collect();
            tm.mk_and(args)
        }
        TermKind::Or(args) => {
            let args = args
                .into_iter()
                .map(|a| lower_idiv(tm, a, side, memo))
                .collect();
            tm.mk_or(args)
        }
        TermKind::Add(args) => {
            let args = args
                .into_iter()
                .map(|a| lower_idiv(tm, a, side, memo))
                .collect();
            tm.mk_add(args)
        }
        TermKind::Ite(c, a, b) => {
            let c = lower_idiv(tm, c, side, memo);
            let a = lower_idiv(tm, a, side, memo);
            let b = lower_idiv(tm, b, side, memo);
            tm.mk_ite(c, a, b)
        }
        TermKind::Eq(a, b) => {
            let (a, b) = (lower_idiv(tm, a, side, memo), lower_idiv(tm, b, side, memo));
            tm.mk_eq(a, b)
        }
        TermKind::Ne(a, b) => {
            let (a, b) = (lower_idiv(tm, a, side, memo), lower_idiv(tm, b, side, memo));
            tm.mk_ne(a, b)
        }
        TermKind::Lt(a, b) => {
            let (a, b) = (lower_idiv(tm, a, side, memo), lower_idiv(tm, b, side, memo));
            tm.mk_lt(a, b)
        }
        TermKind::Le(a, b) => {
            let (a, b) = (lower_idiv(tm, a, side, memo), lower_idiv(tm, b, side, memo));
            tm.mk_le(a, b)
        }
        TermKind::Gt(a, b) => {
            let (a, b) = (lower_idiv(tm, a, side, memo), lower_idiv(tm, b, side, memo));
            tm.mk_gt(a, b)
        }
        TermKind::Ge(a, b) => {
            let (a, b) = (lower_idiv(tm, a, side, memo), lower_idiv(tm, b, side, memo));
            tm.mk_ge(a, b)
        }
        TermKind::Sub(a, b) => {
            let (a, b) = (lower_idiv(tm, a, side, memo), lower_idiv(tm, b, side, memo));
            tm.mk_sub(a, b)
        }
        TermKind::Neg(a) => {
            let a = lower_idiv(tm, a, side, memo);
            tm.mk_neg(a)
        }
        TermKind::Mul(a, b) => {
            let (a, b) = (lower_idiv(tm, a, side, memo), lower_idiv(tm, b, side, memo));
            tm.mk_mul(a, b)
        }
        TermKind::Div(a, b) => {
            let (a, b) = (lower_idiv(tm, a, side, memo), lower_idiv(tm, b, side, memo));
            tm.mk_div(a, b)
        }
    };
    memo.insert(t, result);
    result
}

// ---- derived queries ----------------------------------------------------

/// One-shot satisfiability of a term.
pub fn is_sat(tm: &mut TermManager, t: TermId) -> SatResult {
    let mut solver = Solver::new();
    solver.assert_term(t);
    solver.check(tm)
}

/// Whether `a ⟹ b` is provable (`Unknown` counts as not proven).
pub fn implies(tm: &mut TermManager, a: TermId, b: TermId) -> bool {
    let nb = tm.mk_not(b);
    let q = tm.mk_and(vec![a, nb]);
    matches!(is_sat(tm, q), SatResult::Unsat)
}

/// Whether `a` and `b` are provably equivalent.
pub fn is_equiv(tm: &mut TermManager, a: TermId, b: TermId) -> bool {
    implies(tm, a, b) && implies(tm, b, a)
}

/// Whether a formula is provably valid.
pub fn is_valid(tm: &mut TermManager, t: TermId) -> bool {
    let tt = tm.mk_true();
    implies(tm, tt, t)
}

/// Collapse if-then-else branches whose condition is decided by the
/// background theory.
pub fn simplify_ite(tm: &mut TermManager, t: TermId) -> TermId {
    let mut memo = FxHashMap::default();
    simplify_ite_rec(tm, t, &mut memo)
}

fn simplify_ite_rec(
    tm: &mut TermManager,
    t: TermId,
    memo: &mut FxHashMap<TermId, TermId>,
) -> TermId {
    if let Some(&r) = memo.get(&t) {
        return r;
    }
    let kind = tm.kind(t).clone();
    let result = match kind {
        TermKind::Ite(c, a, b) => {
            let c = simplify_ite_rec(tm, c, memo);
            let a = simplify_ite_rec(tm, a, memo);
            let b = simplify_ite_rec(tm, b, memo);
            if is_valid(tm, c) {
                a
            } else {
                let nc = tm.mk_not(c);
                if is_valid(tm, nc) {
                    b
                } else {
                    tm.mk_ite(c, a, b)
                }
            }
        }
        TermKind::Not(a) => {
            let a = simplify_ite_rec(tm, a, memo);
            tm.mk_not(a)
        }
        TermKind::And(args) => {
            let args = args
                .into_iter()
                .map(|a| simplify_ite_rec(tm, a, memo))
                .collect();
            tm.mk_and(args)
        }
        TermKind::Or(args) => {
            let args = args
                .into_iter()
                .map(|a| simplify_ite_rec(tm, a, memo))
                .collect();
            tm.mk_or(args)
        }
        _ => t,
    };
    memo.insert(t, result);
    result
}

/// Drop conjuncts implied by the remaining ones.
pub fn remove_redundant_conjuncts(tm: &mut TermManager, conjs: &mut Vec<TermId>) {
    if conjs.len() < 2 {
        return;
    }
    let mut i = 0;
    while i < conjs.len() && conjs.len() > 1 {
        let candidate = conjs[i];
        let rest: Vec<TermId> = conjs
            .iter()
            .copied()
            .filter(|&c| c != candidate)
            .collect();
        let rest = tm.mk_and(rest);
        if implies(tm, rest, candidate) {
            conjs.remove(i);
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (TermManager, TermId, TermId) {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let v = tm.mk_var("v", Sort::Int);
        (tm, x, v)
    }

    #[test]
    fn test_push_pop_balance() {
        let (mut tm, x, _) = setup();
        let zero = tm.mk_int(0);
        let pos = tm.mk_gt(x, zero);
        let neg = tm.mk_lt(x, zero);
        let mut solver = Solver::new();
        solver.assert_term(pos);
        assert_eq!(solver.check(&mut tm), SatResult::Sat);
        solver.push();
        solver.assert_term(neg);
        assert_eq!(solver.check(&mut tm), SatResult::Unsat);
        solver.pop();
        assert_eq!(solver.check(&mut tm), SatResult::Sat);
    }

    #[test]
    fn test_model_satisfies_assertions() {
        let (mut tm, x, v) = setup();
        let two = tm.mk_int(2);
        let upper = tm.mk_add(vec![x, two]);
        let a1 = tm.mk_gt(v, x);
        let a2 = tm.mk_lt(v, upper);
        let mut solver = Solver::new();
        solver.assert_term(a1);
        solver.assert_term(a2);
        assert_eq!(solver.check(&mut tm), SatResult::Sat);
        let m = solver.model().unwrap().clone();
        assert_eq!(m.eval_bool(&tm, a1), Some(true));
        assert_eq!(m.eval_bool(&tm, a2), Some(true));
    }

    #[test]
    fn test_disequality_split() {
        let (mut tm, _, v) = setup();
        let zero = tm.mk_int(0);
        let one = tm.mk_int(1);
        let n0 = tm.mk_ne(v, zero);
        let n1 = tm.mk_ne(v, one);
        let mut solver = Solver::new();
        solver.assert_term(n0);
        solver.assert_term(n1);
        assert_eq!(solver.check(&mut tm), SatResult::Sat);
        let m = solver.model().unwrap();
        assert_eq!(m.eval_bool(&tm, n0), Some(true));
        assert_eq!(m.eval_bool(&tm, n1), Some(true));
    }

    #[test]
    fn test_boolean_reasoning() {
        let mut tm = TermManager::new();
        let p = tm.mk_var("p", Sort::Bool);
        let q = tm.mk_var("q", Sort::Bool);
        let np = tm.mk_not(p);
        let or = tm.mk_or(vec![np, q]);
        let nq = tm.mk_not(q);
        let mut solver = Solver::new();
        solver.assert_term(p);
        solver.assert_term(or);
        solver.assert_term(nq);
        assert_eq!(solver.check(&mut tm), SatResult::Unsat);
    }

    #[test]
    fn test_implies_and_equiv() {
        let (mut tm, x, _) = setup();
        let zero = tm.mk_int(0);
        let one = tm.mk_int(1);
        let gt0 = tm.mk_gt(x, zero);
        let ge1 = tm.mk_ge(x, one);
        assert!(implies(&mut tm, gt0, ge1));
        assert!(is_equiv(&mut tm, gt0, ge1));
        let lt0 = tm.mk_lt(x, zero);
        assert!(!implies(&mut tm, gt0, lt0));
    }

    #[test]
    fn test_idiv_lowering() {
        let (mut tm, x, v) = setup();
        let two = tm.mk_int(2);
        let six = tm.mk_int(6);
        let q = tm.mk_idiv(x, two);
        let e1 = tm.mk_eq(v, q);
        let e2 = tm.mk_eq(x, six);
        let mut solver = Solver::new();
        solver.assert_term(e1);
        solver.assert_term(e2);
        assert_eq!(solver.check(&mut tm), SatResult::Sat);
        let m = solver.model().unwrap();
        assert_eq!(
            m.value(v).and_then(|val| val.as_rational()),
            Some(num_rational::BigRational::from_integer(3.into()))
        );
    }

    #[test]
    fn test_simplify_ite_decided_condition() {
        let (mut tm, x, _) = setup();
        let one = tm.mk_int(1);
        let two = tm.mk_int(2);
        let cond = tm.mk_lt(one, two);
        let branchy = tm.mk_ite(cond, x, one);
        // mk_ite already folds constant conditions; build an undecided
        // shape and let the background close it
        assert_eq!(branchy, x);
        let xc = tm.mk_ge(x, x);
        let kept = tm.mk_ite(xc, x, one);
        assert_eq!(simplify_ite(&mut tm, kept), x);
    }

    #[test]
    fn test_remove_redundant_conjuncts() {
        let (mut tm, x, _) = setup();
        let zero = tm.mk_int(0);
        let one = tm.mk_int(1);
        let gt0 = tm.mk_gt(x, zero);
        let ge1 = tm.mk_ge(x, one);
        let gem1 = {
            let m1 = tm.mk_int(-1);
            tm.mk_ge(x, m1)
        };
        let mut conjs = vec![gt0, ge1, gem1];
        remove_redundant_conjuncts(&mut tm, &mut conjs);
        // x > -1 follows from either of the others; one of the equivalent
        // tight bounds also goes
        assert_eq!(conjs.len(), 1);
    }
}
