//! Witness Extraction from Projected Constraints.
//!
//! Turns the conjunction of literals that constrained an existential
//! variable during projection into a symbolic term over the universal
//! variables that satisfies those literals wherever the projection holds.
//!
//! ## Strategy
//!
//! Literals are normalized into buckets relative to the variable
//! (equalities, strict and non-strict bounds, disequalities). An equality
//! defines the witness outright. One-sided bounds take a symbolic extremum
//! nudged past any strict bound. Two-sided bounds take the midpoint,
//! truncated over the integers. Disequalities alone sit above a symbolic
//! maximum of the excluded values. Shapes outside these buckets fall back
//! to a fresh auxiliary variable whose defining constraint is recorded in
//! the enclosing [`SkolemScope`], keeping the final relation correct.

use crate::ast::rewrite::conjuncts;
use crate::ast::traversal::{occurs_in, substitute_one};
use crate::ast::{TermId, TermKind, TermManager};
use crate::error::Result;
use crate::smt::linear::{atom_to_lin, term_to_lin, LinExpr, Rel};
use crate::smt::is_valid;
use crate::sort::Sort;
use crate::stats::AeStats;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use tracing::debug;

use super::mbp::lin_sort;

/// Auxiliary constraints accumulated while extracting witnesses.
///
/// Every constraint added here must be conjoined into the final Skolem
/// relation for the extracted terms to stay correct.
#[derive(Debug, Default, Clone)]
pub struct SkolemScope {
    conjuncts: Vec<TermId>,
}

impl SkolemScope {
    /// Empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a constraint on an auxiliary variable.
    pub fn add(&mut self, c: TermId) {
        self.conjuncts.push(c);
    }

    /// Number of constraints recorded so far.
    #[must_use]
    pub fn mark(&self) -> usize {
        self.conjuncts.len()
    }

    /// Restrict every constraint recorded since `mark` to the region
    /// where `guard` holds. A partition-local constraint must not be
    /// asserted outside its partition.
    pub fn guard_since(&mut self, tm: &mut TermManager, mark: usize, guard: TermId) {
        if tm.is_true(guard) {
            return;
        }
        let ng = tm.mk_not(guard);
        for c in &mut self.conjuncts[mark..] {
            *c = tm.mk_or(vec![ng, *c]);
        }
    }

    /// Whether any auxiliary constraint was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conjuncts.is_empty()
    }

    /// The conjunction of all recorded constraints.
    pub fn to_term(&self, tm: &mut TermManager) -> TermId {
        tm.mk_and(self.conjuncts.clone())
    }
}

/// Normalized view of the literals constraining one variable.
#[derive(Debug, Default)]
struct Buckets {
    eqs: Vec<LinExpr>,
    lowers: Vec<(LinExpr, bool)>,
    uppers: Vec<(LinExpr, bool)>,
    neqs: Vec<LinExpr>,
}

/// Compute a witness term for `v` from the conjunction `constraint`.
///
/// The result mentions only variables other than `v` (universals and,
/// in the fallback case, a fresh auxiliary variable constrained through
/// `scope`).
pub fn assignment_for_var(
    tm: &mut TermManager,
    v: TermId,
    constraint: TermId,
    scope: &mut SkolemScope,
    stats: &mut AeStats,
) -> Result<TermId> {
    if tm.is_true(constraint) {
        let sort = tm.sort(v);
        return Ok(tm.default_value(sort));
    }
    if tm.sort(v) == Sort::Bool {
        return Ok(bool_assignment(tm, v, constraint));
    }

    let is_int = tm.sort(v) == Sort::Int;
    match buckets_for(tm, v, constraint, is_int) {
        Some(buckets) => numeric_assignment(tm, v, buckets, is_int, constraint, scope, stats),
        None => Ok(aux_fallback(tm, v, constraint, scope, stats)),
    }
}

/// Boolean witness: a definition read directly off the literals, with
/// `false` as the default when none constrains the variable.
fn bool_assignment(tm: &mut TermManager, v: TermId, constraint: TermId) -> TermId {
    for l in conjuncts(tm, constraint) {
        match *tm.kind(l) {
            _ if l == v => return tm.mk_true(),
            TermKind::Not(a) if a == v => return tm.mk_false(),
            TermKind::Eq(a, b) if a == v && !occurs_in(tm, b, v) => return b,
            TermKind::Eq(a, b) if b == v && !occurs_in(tm, a, v) => return a,
            TermKind::Ne(a, b) if a == v && !occurs_in(tm, b, v) => return tm.mk_not(b),
            TermKind::Ne(a, b) if b == v && !occurs_in(tm, a, v) => return tm.mk_not(a),
            _ => {}
        }
    }
    tm.mk_false()
}

/// Sort the literals into buckets of `v ⋈ e` shapes. `None` when some
/// literal does not fit the linear fragment with a unit coefficient.
fn buckets_for(
    tm: &TermManager,
    v: TermId,
    constraint: TermId,
    is_int: bool,
) -> Option<Buckets> {
    let mut buckets = Buckets::default();
    for l in conjuncts(tm, constraint) {
        let (mut lin, rel) = atom_to_lin(tm, l).ok()?;
        let c = lin.remove(v)?;
        if is_int && !(c.is_integer() && c.numer().abs() == BigInt::one()) {
            return None;
        }
        // rewrite c·v + e ⋈ 0 into v ⋈ −e/c
        lin.scale(&(-BigRational::one() / &c));
        if is_int && !lin.is_integral() {
            return None;
        }
        let flipped = c.is_negative();
        match rel {
            Rel::Eq => buckets.eqs.push(lin),
            Rel::Ne => buckets.neqs.push(lin),
            Rel::Le if !flipped => buckets.uppers.push((lin, false)),
            Rel::Lt if !flipped => buckets.uppers.push((lin, true)),
            Rel::Le => buckets.lowers.push((lin, false)),
            Rel::Lt => buckets.lowers.push((lin, true)),
        }
    }
    Some(buckets)
}

fn numeric_assignment(
    tm: &mut TermManager,
    v: TermId,
    buckets: Buckets,
    is_int: bool,
    constraint: TermId,
    scope: &mut SkolemScope,
    stats: &mut AeStats,
) -> Result<TermId> {
    let Buckets {
        eqs,
        lowers,
        uppers,
        neqs,
    } = buckets;

    if let Some(e) = eqs.into_iter().next() {
        return Ok(linexpr_term(tm, &e));
    }

    if !neqs.is_empty() && (lowers.is_empty() && uppers.is_empty()) {
        // sit strictly above every excluded value
        let terms: Vec<TermId> = neqs.iter().map(|e| linexpr_term(tm, e)).collect();
        let peak = symbolic_max(tm, terms);
        return Ok(tm.plus_unit(peak));
    }

    if !neqs.is_empty() {
        // bounds mixed with exclusions need the relational fallback
        return Ok(aux_fallback(tm, v, constraint, scope, stats));
    }

    let one_sided = lowers.is_empty() || uppers.is_empty();
    let lower_terms: Vec<TermId> = lowers
        .iter()
        .map(|(e, strict)| bound_term(tm, e, *strict, is_int, one_sided, false))
        .collect();
    let upper_terms: Vec<TermId> = uppers
        .iter()
        .map(|(e, strict)| bound_term(tm, e, *strict, is_int, one_sided, true))
        .collect();

    match (lower_terms.is_empty(), upper_terms.is_empty()) {
        (false, true) => Ok(symbolic_max(tm, lower_terms)),
        (true, false) => Ok(symbolic_min(tm, upper_terms)),
        (false, false) => {
            let lo = symbolic_max(tm, lower_terms);
            let hi = symbolic_min(tm, upper_terms);
            Ok(midpoint(tm, lo, hi, is_int))
        }
        (true, true) => {
            let sort = tm.sort(v);
            Ok(tm.default_value(sort))
        }
    }
}

/// Bound adjusted so the witness may land exactly on it. Over the
/// integers a strict bound moves one unit inward; over the reals the
/// same unit step is valid for a one-sided bound, and two-sided strict
/// real bounds are resolved by the midpoint instead.
fn bound_term(
    tm: &mut TermManager,
    e: &LinExpr,
    strict: bool,
    is_int: bool,
    one_sided: bool,
    upper: bool,
) -> TermId {
    let t = linexpr_term(tm, e);
    if strict && (is_int || one_sided) {
        if upper {
            tm.minus_unit(t)
        } else {
            tm.plus_unit(t)
        }
    } else {
        t
    }
}

fn linexpr_term(tm: &mut TermManager, e: &LinExpr) -> TermId {
    let sort = lin_sort(tm, e);
    e.to_term(tm, sort)
}

/// Midpoint of two symbolic bounds, truncated over the integers. When
/// the sum has only even coefficients the division is folded away.
fn midpoint(tm: &mut TermManager, lo: TermId, hi: TermId, is_int: bool) -> TermId {
    let sum = tm.mk_add(vec![lo, hi]);
    let two = BigRational::from_integer(2.into());
    if let Ok(mut lin) = term_to_lin(tm, sum) {
        lin.scale(&(BigRational::one() / &two));
        if !is_int || lin.is_integral() {
            return linexpr_term(tm, &lin);
        }
    }
    if is_int {
        let two = tm.mk_int(2);
        tm.mk_idiv(sum, two)
    } else {
        let two = tm.mk_real(two);
        tm.mk_div(sum, two)
    }
}

/// Fresh variable standing for `v`, constrained in the Skolem scope.
fn aux_fallback(
    tm: &mut TermManager,
    v: TermId,
    constraint: TermId,
    scope: &mut SkolemScope,
    stats: &mut AeStats,
) -> TermId {
    let sort = tm.sort(v);
    let aux = tm.mk_fresh_var("fx!neq", sort);
    let renamed = substitute_one(tm, constraint, v, aux);
    scope.add(renamed);
    stats.aux_vars += 1;
    debug!(
        target: "forallex::witness",
        var = tm.var_name(v),
        aux = tm.var_name(aux),
        "witness kept relational through an auxiliary variable"
    );
    aux
}

/// Symbolic maximum of a nonempty candidate list. Candidates that are
/// provably dominated are dropped; the rest fold into a conditional.
pub fn symbolic_max(tm: &mut TermManager, terms: Vec<TermId>) -> TermId {
    fold_extremum(tm, terms, true)
}

/// Symbolic minimum of a nonempty candidate list.
pub fn symbolic_min(tm: &mut TermManager, terms: Vec<TermId>) -> TermId {
    fold_extremum(tm, terms, false)
}

fn fold_extremum(tm: &mut TermManager, terms: Vec<TermId>, max: bool) -> TermId {
    let mut it = terms.into_iter();
    let mut acc = it
        .next()
        .unwrap_or_else(|| tm.mk_int(BigInt::zero()));
    for t in it {
        if t == acc {
            continue;
        }
        let acc_wins = if max {
            tm.mk_ge(acc, t)
        } else {
            tm.mk_le(acc, t)
        };
        if is_valid(tm, acc_wins) {
            continue;
        }
        let t_wins = if max {
            tm.mk_ge(t, acc)
        } else {
            tm.mk_le(t, acc)
        };
        if is_valid(tm, t_wins) {
            acc = t;
            continue;
        }
        acc = tm.mk_ite(acc_wins, acc, t);
    }
    acc
}
