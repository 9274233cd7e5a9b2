//! Model-Based Projection for Linear Arithmetic and Booleans.
//!
//! Given a model of a formula, computes an implicant of the formula that
//! the model satisfies and eliminates the requested variables from it,
//! yielding a projection over the remaining variables that still implies
//! the existential closure of the input.
//!
//! ## Strategy
//!
//! Variables are eliminated one at a time. A boolean variable is replaced
//! by its model value. A numeric variable defined by an equality is
//! substituted away. Otherwise its literals are split into lower and upper
//! bounds (disequalities are oriented by the model first) and replaced by
//! all lower-upper resolvents, tightened over the integers. A non-unit
//! integer coefficient falls back to substituting the model value for the
//! whole variable, which is sound but coarser.
//!
//! ## References
//!
//! - Komuravelli, Gurfinkel, Chaki: "SMT-based model checking for
//!   recursive programs" (the MBP of Spacer)

use crate::ast::traversal::{occurs_in, substitute_one};
use crate::ast::{TermId, TermKind, TermManager};
use crate::error::{Error, Result};
use crate::model::Model;
use crate::smt::linear::{atom_to_lin, LinExpr, Rel};
use crate::smt::nnf;
use crate::sort::Sort;
use crate::stats::AeStats;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Result of projecting a set of variables out of a formula under a model.
#[derive(Debug, Clone)]
pub struct MbpResult {
    /// Conjunction over the surviving variables, true under the model.
    pub projection: TermId,
    /// Per eliminated variable, the conjunction of literals that
    /// constrained it at elimination time (oriented, model-true).
    pub constraints: FxHashMap<TermId, TermId>,
    /// Per eliminated variable, its concrete model value as an equality.
    pub evals: FxHashMap<TermId, TermId>,
}

/// Select a conjunction of literals from `formula` that the model
/// satisfies and that implies the formula.
///
/// The formula is normalized first, so negation only ever guards boolean
/// variables in the result.
pub fn implicant(tm: &mut TermManager, model: &Model, formula: TermId) -> Result<Vec<TermId>> {
    let formula = nnf(tm, formula, true);
    let mut out = Vec::new();
    let mut stack = vec![formula];
    while let Some(t) = stack.pop() {
        match tm.kind(t) {
            TermKind::True => {}
            TermKind::False => {
                return Err(Error::Invariant(
                    "implicant requested for a falsified formula".into(),
                ))
            }
            TermKind::And(args) => stack.extend(args.iter().copied()),
            TermKind::Or(args) => {
                let args = args.clone();
                let chosen = args
                    .iter()
                    .copied()
                    .find(|&a| model.eval_bool(tm, a) == Some(true));
                match chosen {
                    Some(a) => stack.push(a),
                    None => {
                        return Err(Error::Invariant(
                            "model satisfies no disjunct of the formula".into(),
                        ))
                    }
                }
            }
            _ => {
                if model.eval_bool(tm, t) != Some(true) {
                    return Err(Error::Invariant(
                        "model falsifies a selected literal".into(),
                    ));
                }
                out.push(t);
            }
        }
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

/// Project `vars` out of `formula` under `model`.
pub fn project(
    tm: &mut TermManager,
    model: &Model,
    formula: TermId,
    vars: &[TermId],
    stats: &mut AeStats,
) -> Result<MbpResult> {
    let mut literals = implicant(tm, model, formula)?;
    let mut constraints = FxHashMap::default();
    let mut evals = FxHashMap::default();
    let numeric = numeric_assignment(tm, model);

    for &v in vars {
        let (mine, rest): (Vec<TermId>, Vec<TermId>) = literals
            .into_iter()
            .partition(|&l| occurs_in(tm, l, v));
        literals = rest;

        let value = model_value_term(tm, model, v)?;
        evals.insert(v, tm.mk_eq(v, value));

        if mine.is_empty() {
            constraints.insert(v, tm.mk_true());
            continue;
        }

        let (oriented, produced) = match tm.sort(v) {
            Sort::Bool => eliminate_bool(tm, model, v, &mine)?,
            _ => match eliminate_numeric(tm, &numeric, v, &mine) {
                Some(pair) => pair,
                None => {
                    debug!(
                        target: "forallex::mbp",
                        var = tm.var_name(v),
                        "projection falls back to the model value"
                    );
                    stats.projection_fallbacks += 1;
                    substitute_value(tm, model, v, value, &mine)?
                }
            },
        };
        constraints.insert(v, tm.mk_and(oriented));
        literals.extend(produced);
        literals.sort_unstable();
        literals.dedup();
    }

    let projection = tm.mk_and(literals);
    debug_assert!(
        vars.iter().all(|&v| !occurs_in(tm, projection, v)),
        "projection still mentions an eliminated variable"
    );
    Ok(MbpResult {
        projection,
        constraints,
        evals,
    })
}

fn numeric_assignment(tm: &TermManager, model: &Model) -> FxHashMap<TermId, BigRational> {
    let mut out = FxHashMap::default();
    for v in model.vars() {
        if tm.sort(v) != Sort::Bool {
            if let Some(q) = model.value(v).and_then(|val| val.as_rational()) {
                out.insert(v, q);
            }
        }
    }
    out
}

fn model_value_term(tm: &mut TermManager, model: &Model, v: TermId) -> Result<TermId> {
    let value = model.value(v).ok_or(Error::NoModel)?.clone();
    Ok(value.to_term(tm))
}

/// A boolean variable is eliminated by substituting its model value into
/// every literal that mentions it.
fn eliminate_bool(
    tm: &mut TermManager,
    model: &Model,
    v: TermId,
    mine: &[TermId],
) -> Result<(Vec<TermId>, Vec<TermId>)> {
    let b = model
        .value(v)
        .and_then(|val| val.as_bool())
        .ok_or(Error::NoModel)?;
    let by = if b { tm.mk_true() } else { tm.mk_false() };
    let mut produced = Vec::new();
    for &l in mine {
        let residue = substitute_one(tm, l, v, by);
        if tm.is_true(residue) {
            continue;
        }
        if tm.is_false(residue) {
            return Err(Error::Invariant(
                "model-true literal falsified by its own model value".into(),
            ));
        }
        produced.push(residue);
    }
    Ok((mine.to_vec(), produced))
}

/// Last resort: replace the variable by its model value everywhere.
fn substitute_value(
    tm: &mut TermManager,
    _model: &Model,
    v: TermId,
    value: TermId,
    mine: &[TermId],
) -> Result<(Vec<TermId>, Vec<TermId>)> {
    let mut produced = Vec::new();
    for &l in mine {
        let residue = substitute_one(tm, l, v, value);
        if tm.is_true(residue) {
            continue;
        }
        produced.push(residue);
    }
    Ok((mine.to_vec(), produced))
}

struct Bound {
    /// Bounding expression, already scaled so the bound reads
    /// `expr ⋈ v` (lower) or `v ⋈ expr` (upper).
    expr: LinExpr,
    strict: bool,
}

/// Resolvent-based elimination of a numeric variable. Returns `None` if
/// a literal cannot be handled exactly (nonlinear occurrence, or a
/// non-unit integer coefficient).
fn eliminate_numeric(
    tm: &mut TermManager,
    numeric: &FxHashMap<TermId, BigRational>,
    v: TermId,
    mine: &[TermId],
) -> Option<(Vec<TermId>, Vec<TermId>)> {
    let is_int = tm.sort(v) == Sort::Int;
    let mut parsed: Vec<(LinExpr, Rel)> = Vec::with_capacity(mine.len());
    for &l in mine {
        let (lin, rel) = atom_to_lin(tm, l).ok()?;
        let (lin, rel) = match rel {
            // orient a disequality by the model
            Rel::Ne => {
                let val = lin.eval(numeric)?;
                if val.is_negative() {
                    (lin, Rel::Lt)
                } else {
                    let mut neg = lin;
                    neg.scale(&-BigRational::one());
                    (neg, Rel::Lt)
                }
            }
            rel => (lin, rel),
        };
        parsed.push((lin, rel));
    }

    let oriented: Vec<TermId> = parsed
        .iter()
        .map(|(lin, rel)| lin_to_atom(tm, lin, *rel))
        .collect();

    // a defining equality substitutes the variable away
    if let Some(pos) = parsed.iter().position(|(lin, rel)| {
        matches!(rel, Rel::Eq) && solvable_for(lin, v, is_int)
    }) {
        let (mut lin, _) = parsed.swap_remove(pos);
        let c = lin.remove(v)?;
        lin.scale(&(-BigRational::one() / c));
        let mut produced = Vec::new();
        for (mut other, rel) in parsed {
            other.substitute(v, &lin);
            let t = lin_to_atom(tm, &other, rel);
            if !tm.is_true(t) {
                produced.push(t);
            }
        }
        return Some((oriented, produced));
    }

    // no equality: split into bounds and resolve pairwise
    let mut lowers: Vec<Bound> = Vec::new();
    let mut uppers: Vec<Bound> = Vec::new();
    for (mut lin, rel) in parsed {
        if matches!(rel, Rel::Eq) {
            // unsolvable integer equality
            return None;
        }
        let c = lin.remove(v)?;
        if is_int && !(c.is_integer() && c.numer().abs() == BigInt::one()) {
            return None;
        }
        let strict = matches!(rel, Rel::Lt);
        if c.is_positive() {
            // c·v + e ⋈ 0  ⟹  v ⋈ −e/c
            lin.scale(&(-BigRational::one() / &c));
            uppers.push(tighten(lin, strict, is_int, true));
        } else {
            // e/(−c) ⋈ v
            lin.scale(&(-BigRational::one() / &c));
            lowers.push(tighten(lin, strict, is_int, false));
        }
    }

    let mut produced = Vec::new();
    for lo in &lowers {
        for hi in &uppers {
            // lo ⋈ v and v ⋈ hi resolve to lo − hi ⋈ 0
            let mut res = lo.expr.clone();
            res.add_scaled(&hi.expr, &-BigRational::one());
            let rel = if lo.strict || hi.strict {
                Rel::Lt
            } else {
                Rel::Le
            };
            let t = lin_to_atom(tm, &res, rel);
            if !tm.is_true(t) {
                produced.push(t);
            }
        }
    }
    Some((oriented, produced))
}

/// Over the integers a strict bound shifts into a non-strict one.
fn tighten(mut expr: LinExpr, strict: bool, is_int: bool, upper: bool) -> Bound {
    if strict && is_int && expr.is_integral() {
        let shift = if upper {
            -BigRational::one()
        } else {
            BigRational::one()
        };
        let unit = LinExpr::constant(shift);
        expr.add_scaled(&unit, &BigRational::one());
        Bound {
            expr,
            strict: false,
        }
    } else {
        Bound { expr, strict }
    }
}

fn solvable_for(lin: &LinExpr, v: TermId, is_int: bool) -> bool {
    let c = lin.coeff(v);
    if c.is_zero() {
        return false;
    }
    if !is_int {
        return true;
    }
    // over Int the substitution must keep coefficients integral
    if !(c.is_integer() && c.numer().abs() == BigInt::one()) {
        return false;
    }
    lin.is_integral()
}

pub(crate) fn lin_to_atom(tm: &mut TermManager, lin: &LinExpr, rel: Rel) -> TermId {
    let sort = lin_sort(tm, lin);
    let lhs = lin.to_term(tm, sort);
    let zero = tm.mk_numeral(0, sort);
    match rel {
        Rel::Eq => tm.mk_eq(lhs, zero),
        Rel::Ne => tm.mk_ne(lhs, zero),
        Rel::Le => tm.mk_le(lhs, zero),
        Rel::Lt => tm.mk_lt(lhs, zero),
    }
}

/// Sort of the rebuilt term: the sort of its variables, or the tightest
/// sort fitting the constants when there are none.
pub(crate) fn lin_sort(tm: &TermManager, lin: &LinExpr) -> Sort {
    for &v in lin.coeffs.keys() {
        return tm.sort(v);
    }
    if lin.is_integral() {
        Sort::Int
    } else {
        Sort::Real
    }
}
