//! Conjunction Feasibility via Fourier-Motzkin.
//!
//! Decides conjunctions of linear atoms: Gaussian elimination of the
//! equalities, then Fourier-Motzkin elimination of the inequalities, with
//! integer atoms tightened to non-strict normal form first. Model
//! construction unwinds the elimination stack and picks concrete points
//! inside the final intervals. A rationally feasible system whose
//! integrality repair fails answers [`Feasibility::Unknown`] rather than
//! guessing.
//!
//! ## References
//!
//! - Z3's `math/simplex` and `qe/qe_arith.cpp`

use super::linear::{num_gcd, LinExpr, Rel};
use crate::ast::{TermId, TermManager};
use crate::model::{Model, Value};
use crate::sort::Sort;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Outcome of a conjunction feasibility check.
#[derive(Debug, Clone)]
pub enum Feasibility {
    /// A satisfying numeric assignment.
    Feasible(FxHashMap<TermId, BigRational>),
    /// The conjunction is unsatisfiable.
    Infeasible,
    /// Rationally feasible, but no integer point was found.
    Unknown,
}

#[derive(Debug, Clone)]
struct Atom {
    lin: LinExpr,
    rel: Rel,
}

enum Step {
    /// Variable solved from an equality: `var = expr`.
    Solved { var: TermId, expr: LinExpr },
    /// Variable eliminated by Fourier-Motzkin, with the bound atoms that
    /// constrained it at elimination time.
    Bounded {
        var: TermId,
        lowers: Vec<Atom>,
        uppers: Vec<Atom>,
    },
}

/// Check a conjunction of `expr ⋈ 0` atoms (`Ne` must be pre-split away).
pub fn check_conjunction(
    tm: &TermManager,
    atoms: Vec<(LinExpr, Rel)>,
) -> Feasibility {
    let mut work: Vec<Atom> = Vec::with_capacity(atoms.len());
    for (lin, rel) in atoms {
        debug_assert!(!matches!(rel, Rel::Ne), "disequalities must be split");
        let atom = match normalize(tm, Atom { lin, rel }) {
            Ok(Some(atom)) => atom,
            Ok(None) => continue,
            Err(()) => return Feasibility::Infeasible,
        };
        work.push(atom);
    }

    let mut steps: Vec<Step> = Vec::new();

    // Gaussian elimination of equalities.
    loop {
        let Some(pos) = work.iter().position(|a| matches!(a.rel, Rel::Eq)) else {
            break;
        };
        let eq = work.swap_remove(pos);
        debug_assert!(!eq.lin.is_const(), "constant equalities are pre-filtered");
        let var = pick_pivot(tm, &eq.lin);
        let mut expr = eq.lin.clone();
        let c = expr.remove(var).expect("pivot has a coefficient");
        expr.scale(&(-BigRational::one() / c));
        for atom in &mut work {
            atom.lin.substitute(var, &expr);
        }
        let mut renorm = Vec::with_capacity(work.len());
        for atom in work {
            match normalize(tm, atom) {
                Ok(Some(a)) => renorm.push(a),
                Ok(None) => {}
                Err(()) => return Feasibility::Infeasible,
            }
        }
        work = renorm;
        steps.push(Step::Solved { var, expr });
    }

    // Fourier-Motzkin elimination of the remaining inequalities.
    loop {
        let Some(var) = next_fm_var(&work) else { break };
        let mut lowers = Vec::new();
        let mut uppers = Vec::new();
        let mut rest = Vec::new();
        for atom in work {
            let c = atom.lin.coeff(var);
            if c.is_zero() {
                rest.push(atom);
            } else if c.is_negative() {
                lowers.push(atom);
            } else {
                uppers.push(atom);
            }
        }
        for lo in &lowers {
            for up in &uppers {
                let cl = lo.lin.coeff(var);
                let cu = up.lin.coeff(var);
                // cl < 0 < cu: resolvent cancels var with positive scales
                let mut lin = lo.lin.clone();
                lin.scale(&cu);
                lin.add_scaled(&up.lin, &(-cl));
                let rel = if matches!(lo.rel, Rel::Lt) || matches!(up.rel, Rel::Lt) {
                    Rel::Lt
                } else {
                    Rel::Le
                };
                match normalize(tm, Atom { lin, rel }) {
                    Ok(Some(a)) => rest.push(a),
                    Ok(None) => {}
                    Err(()) => return Feasibility::Infeasible,
                }
            }
        }
        work = rest;
        steps.push(Step::Bounded {
            var,
            lowers,
            uppers,
        });
    }

    debug_assert!(work.is_empty(), "only constant atoms may remain");

    build_assignment(tm, &steps)
}

/// Tighten and canonicalize one atom. `Ok(None)` means trivially true,
/// `Err(())` trivially false.
fn normalize(tm: &TermManager, mut atom: Atom) -> Result<Option<Atom>, ()> {
    if atom.lin.is_const() {
        let k = &atom.lin.constant;
        let holds = match atom.rel {
            Rel::Eq => k.is_zero(),
            Rel::Le => !k.is_positive(),
            Rel::Lt => k.is_negative(),
            Rel::Ne => !k.is_zero(),
        };
        return if holds { Ok(None) } else { Err(()) };
    }
    let all_int = atom
        .lin
        .coeffs
        .keys()
        .all(|&v| tm.sort(v) == Sort::Int);
    if !all_int {
        return Ok(Some(atom));
    }
    // Integer atom: scale to integer coefficients, divide by the gcd, and
    // tighten the constant so strictness disappears.
    let lcm = atom.lin.denominator_lcm();
    atom.lin.scale(&BigRational::from_integer(lcm));
    let mut g = BigInt::zero();
    for c in atom.lin.coeffs.values() {
        g = num_gcd(&g, &c.to_integer());
    }
    if g.is_zero() || g.is_one() && atom.lin.constant.is_integer() && !matches!(atom.rel, Rel::Lt) {
        return Ok(Some(atom));
    }
    let k = atom.lin.constant.clone();
    let grat = BigRational::from_integer(g.clone());
    match atom.rel {
        Rel::Eq => {
            // g·e + k = 0 needs g | k
            let t = -&k / &grat;
            if !t.is_integer() {
                return Err(());
            }
            atom.lin.scale(&grat.recip());
            atom.lin.constant = -t;
        }
        Rel::Le | Rel::Lt => {
            // g·e + k ⋈ 0  ⟺  e ≤ bound, bound = floor(-k/g) resp.
            // ceil(-k/g) - 1
            let q = -&k / &grat;
            let bound = if matches!(atom.rel, Rel::Le) {
                q.floor().to_integer()
            } else {
                q.ceil().to_integer() - BigInt::one()
            };
            atom.lin.constant = BigRational::zero();
            atom.lin.scale(&grat.recip());
            atom.lin.constant = BigRational::from_integer(-bound);
            atom.rel = Rel::Le;
        }
        Rel::Ne => {}
    }
    Ok(Some(atom))
}

/// Pivot choice for Gaussian elimination: prefer unit coefficients (they
/// keep integer systems integral), tie-break on the smallest term id.
fn pick_pivot(tm: &TermManager, lin: &LinExpr) -> TermId {
    let mut fallback: Option<TermId> = None;
    for (&v, c) in &lin.coeffs {
        let unit = c.is_integer() && c.numer().abs().is_one();
        if unit && tm.sort(v) == Sort::Int {
            return v;
        }
        if unit && fallback.is_none() {
            fallback = Some(v);
        }
    }
    fallback
        .or_else(|| lin.coeffs.keys().next().copied())
        .expect("pivot on constant expression")
}

fn next_fm_var(work: &[Atom]) -> Option<TermId> {
    work.iter()
        .flat_map(|a| a.lin.coeffs.keys().copied())
        .min()
}

fn build_assignment(tm: &TermManager, steps: &[Step]) -> Feasibility {
    let mut assignment: FxHashMap<TermId, BigRational> = FxHashMap::default();
    for step in steps.iter().rev() {
        match step {
            Step::Bounded {
                var,
                lowers,
                uppers,
            } => {
                // All other variables of the bound atoms were either solved
                // later in the unwind or never constrained; default them.
                for atom in lowers.iter().chain(uppers) {
                    for &v in atom.lin.coeffs.keys() {
                        if v != *var {
                            assignment.entry(v).or_insert_with(BigRational::zero);
                        }
                    }
                }
                let Some(value) =
                    pick_value(tm, *var, lowers, uppers, &assignment)
                else {
                    return Feasibility::Unknown;
                };
                assignment.insert(*var, value);
            }
            Step::Solved { var, expr } => {
                for &v in expr.coeffs.keys() {
                    assignment.entry(v).or_insert_with(BigRational::zero);
                }
                let value = expr
                    .eval(&assignment)
                    .expect("solved expression is closed under the assignment");
                if tm.sort(*var) == Sort::Int && !value.is_integer() {
                    return Feasibility::Unknown;
                }
                assignment.insert(*var, value);
            }
        }
    }
    Feasibility::Feasible(assignment)
}

fn pick_value(
    tm: &TermManager,
    var: TermId,
    lowers: &[Atom],
    uppers: &[Atom],
    assignment: &FxHashMap<TermId, BigRational>,
) -> Option<BigRational> {
    // Bound value of `var` in one atom: c·var + rest ⋈ 0.
    let bound_of = |atom: &Atom| -> Option<(BigRational, bool)> {
        let c = atom.lin.coeff(var);
        let mut rest = atom.lin.clone();
        rest.remove(var);
        let rv = rest.eval(assignment)?;
        Some((-rv / c, matches!(atom.rel, Rel::Lt)))
    };

    let mut lo: Option<(BigRational, bool)> = None;
    for atom in lowers {
        let (b, strict) = bound_of(atom)?;
        if lo.as_ref().map_or(true, |(cur, cs)| b > *cur || (b == *cur && strict && !*cs)) {
            lo = Some((b, strict));
        }
    }
    let mut hi: Option<(BigRational, bool)> = None;
    for atom in uppers {
        let (b, strict) = bound_of(atom)?;
        if hi.as_ref().map_or(true, |(cur, cs)| b < *cur || (b == *cur && strict && !*cs)) {
            hi = Some((b, strict));
        }
    }

    if tm.sort(var) == Sort::Int {
        let lo_int = lo.as_ref().map(|(b, strict)| {
            let c = b.ceil().to_integer();
            if *strict && b.is_integer() {
                c + BigInt::one()
            } else {
                c
            }
        });
        let hi_int = hi.as_ref().map(|(b, strict)| {
            let f = b.floor().to_integer();
            if *strict && b.is_integer() {
                f - BigInt::one()
            } else {
                f
            }
        });
        let value = match (lo_int, hi_int) {
            (Some(l), Some(h)) => {
                if l > h {
                    return None;
                }
                l
            }
            (Some(l), None) => l,
            (None, Some(h)) => h,
            (None, None) => BigInt::zero(),
        };
        return Some(BigRational::from_integer(value));
    }

    let value = match (lo, hi) {
        (Some((l, ls)), Some((h, hs))) => {
            if l > h || (l == h && (ls || hs)) {
                return None;
            }
            if l == h {
                l
            } else {
                (l + h) / BigRational::from_integer(2.into())
            }
        }
        (Some((l, strict)), None) => {
            if strict {
                l + BigRational::one()
            } else {
                l
            }
        }
        (None, Some((h, strict))) => {
            if strict {
                h - BigRational::one()
            } else {
                h
            }
        }
        (None, None) => BigRational::zero(),
    };
    Some(value)
}

/// Turn a numeric assignment plus boolean decisions into a [`Model`].
pub fn assignment_to_model(
    tm: &TermManager,
    numeric: &FxHashMap<TermId, BigRational>,
    booleans: &FxHashMap<TermId, bool>,
) -> Model {
    let mut model = Model::new();
    for (&v, q) in numeric {
        let value = match tm.sort(v) {
            Sort::Int => Value::Int(q.to_integer()),
            _ => Value::Rational(q.clone()),
        };
        model.assign(v, value);
    }
    for (&v, &b) in booleans {
        model.assign(v, Value::Bool(b));
    }
    model
}

/// Small helper bucket type used by the branch search.
pub(crate) type AtomVec = SmallVec<[(LinExpr, Rel); 8]>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smt::linear::atom_to_lin;

    fn atoms(tm: &TermManager, ts: &[TermId]) -> Vec<(LinExpr, Rel)> {
        ts.iter().map(|&t| atom_to_lin(tm, t).unwrap()).collect()
    }

    #[test]
    fn test_feasible_interval() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let v = tm.mk_var("v", Sort::Int);
        let two = tm.mk_int(2);
        let upper = tm.mk_add(vec![x, two]);
        let a1 = tm.mk_gt(v, x);
        let a2 = tm.mk_lt(v, upper);
        match check_conjunction(&tm, atoms(&tm, &[a1, a2])) {
            Feasibility::Feasible(asg) => {
                let xv = asg.get(&x).cloned().unwrap_or_else(BigRational::zero);
                let vv = asg[&v].clone();
                assert!(vv > xv);
                assert!(vv < xv + BigRational::from_integer(2.into()));
                assert!(vv.is_integer());
            }
            other => panic!("expected feasible, got {other:?}"),
        }
    }

    #[test]
    fn test_infeasible_strict_int_gap() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let v = tm.mk_var("v", Sort::Int);
        let one = tm.mk_int(1);
        let upper = tm.mk_add(vec![x, one]);
        // x < v < x + 1 has no integer solution
        let a1 = tm.mk_gt(v, x);
        let a2 = tm.mk_lt(v, upper);
        assert!(matches!(
            check_conjunction(&tm, atoms(&tm, &[a1, a2])),
            Feasibility::Infeasible
        ));
    }

    #[test]
    fn test_equality_chain() {
        let mut tm = TermManager::new();
        let a = tm.mk_var("a", Sort::Int);
        let b = tm.mk_var("b", Sort::Int);
        let one = tm.mk_int(1);
        let two = tm.mk_int(2);
        let b1 = tm.mk_add(vec![b, one]);
        let e1 = tm.mk_eq(a, b1);
        let e2 = tm.mk_eq(b, two);
        match check_conjunction(&tm, atoms(&tm, &[e1, e2])) {
            Feasibility::Feasible(asg) => {
                assert_eq!(asg[&a], BigRational::from_integer(3.into()));
                assert_eq!(asg[&b], BigRational::from_integer(2.into()));
            }
            other => panic!("expected feasible, got {other:?}"),
        }
    }

    #[test]
    fn test_non_integral_equality() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let two = tm.mk_int(2);
        let one = tm.mk_int(1);
        let lhs = tm.mk_mul(two, x);
        let eq = tm.mk_eq(lhs, one);
        // 2x = 1 over the integers
        assert!(matches!(
            check_conjunction(&tm, atoms(&tm, &[eq])),
            Feasibility::Infeasible
        ));
    }
}
