//! Linear-Arithmetic Normal Form.
//!
//! Terms of linear integer/real arithmetic are normalized into
//! `Σ cᵢ·xᵢ + k ⋈ 0` atoms for the feasibility check and for projection.
//! Coefficient maps are kept in `BTreeMap` keyed by term id so iteration
//! order, and with it every tie-break downstream, is deterministic.

use crate::ast::{TermId, TermKind, TermManager};
use crate::error::{Error, Result};
use crate::sort::Sort;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use std::collections::BTreeMap;

/// Relation of a normalized atom `expr ⋈ 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rel {
    /// `expr = 0`
    Eq,
    /// `expr ≠ 0`
    Ne,
    /// `expr ≤ 0`
    Le,
    /// `expr < 0`
    Lt,
}

/// Linear combination `Σ cᵢ·xᵢ + k` with exact rational coefficients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinExpr {
    /// Nonzero coefficients per variable.
    pub coeffs: BTreeMap<TermId, BigRational>,
    /// Constant offset.
    pub constant: BigRational,
}

impl LinExpr {
    /// The zero expression.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            coeffs: BTreeMap::new(),
            constant: BigRational::zero(),
        }
    }

    /// A lone constant.
    #[must_use]
    pub fn constant(k: BigRational) -> Self {
        Self {
            coeffs: BTreeMap::new(),
            constant: k,
        }
    }

    /// A lone variable.
    #[must_use]
    pub fn variable(v: TermId) -> Self {
        let mut coeffs = BTreeMap::new();
        coeffs.insert(v, BigRational::one());
        Self {
            coeffs,
            constant: BigRational::zero(),
        }
    }

    /// Whether no variable has a nonzero coefficient.
    #[must_use]
    pub fn is_const(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Coefficient of a variable (zero when absent).
    #[must_use]
    pub fn coeff(&self, v: TermId) -> BigRational {
        self.coeffs.get(&v).cloned().unwrap_or_else(BigRational::zero)
    }

    /// Add another expression scaled by `c`.
    pub fn add_scaled(&mut self, other: &LinExpr, c: &BigRational) {
        if c.is_zero() {
            return;
        }
        for (&v, cv) in &other.coeffs {
            let entry = self
                .coeffs
                .entry(v)
                .or_insert_with(BigRational::zero);
            *entry += cv * c;
            if entry.is_zero() {
                self.coeffs.remove(&v);
            }
        }
        self.constant += &other.constant * c;
    }

    /// Multiply in place by a constant.
    pub fn scale(&mut self, c: &BigRational) {
        if c.is_zero() {
            self.coeffs.clear();
            self.constant = BigRational::zero();
            return;
        }
        for cv in self.coeffs.values_mut() {
            *cv *= c;
        }
        self.constant *= c;
    }

    /// Remove a variable and return its coefficient, if present.
    pub fn remove(&mut self, v: TermId) -> Option<BigRational> {
        self.coeffs.remove(&v)
    }

    /// Replace `v` by another linear expression.
    pub fn substitute(&mut self, v: TermId, by: &LinExpr) {
        if let Some(c) = self.coeffs.remove(&v) {
            self.add_scaled(by, &c);
        }
    }

    /// Evaluate under a full numeric assignment.
    #[must_use]
    pub fn eval(&self, assignment: &rustc_hash::FxHashMap<TermId, BigRational>) -> Option<BigRational> {
        let mut acc = self.constant.clone();
        for (v, c) in &self.coeffs {
            acc += c * assignment.get(v)?;
        }
        Some(acc)
    }

    /// Whether every coefficient and the constant are integers.
    #[must_use]
    pub fn is_integral(&self) -> bool {
        self.constant.is_integer() && self.coeffs.values().all(BigRational::is_integer)
    }

    /// Least common multiple of all denominators.
    #[must_use]
    pub fn denominator_lcm(&self) -> BigInt {
        let mut lcm = self.constant.denom().clone();
        for c in self.coeffs.values() {
            lcm = num_lcm(&lcm, c.denom());
        }
        lcm
    }

    /// Build the normalized term back (`c·x` products, folded constant).
    pub fn to_term(&self, tm: &mut TermManager, sort: Sort) -> TermId {
        let mut parts = Vec::with_capacity(self.coeffs.len() + 1);
        for (&v, c) in &self.coeffs {
            if c.is_one() {
                parts.push(v);
            } else if (-c).is_one() {
                parts.push(tm.mk_neg(v));
            } else {
                let k = rational_term(tm, c, sort);
                parts.push(tm.mk_mul(k, v));
            }
        }
        if !self.constant.is_zero() || parts.is_empty() {
            parts.push(rational_term(tm, &self.constant, sort));
        }
        tm.mk_add(parts)
    }
}

fn rational_term(tm: &mut TermManager, q: &BigRational, sort: Sort) -> TermId {
    if sort == Sort::Int && q.is_integer() {
        tm.mk_int(q.to_integer())
    } else {
        tm.mk_real(q.clone())
    }
}

pub(crate) fn num_gcd(a: &BigInt, b: &BigInt) -> BigInt {
    let mut a = a.abs();
    let mut b = b.abs();
    while !b.is_zero() {
        let r = &a % &b;
        a = b;
        b = r;
    }
    a
}

pub(crate) fn num_lcm(a: &BigInt, b: &BigInt) -> BigInt {
    if a.is_zero() || b.is_zero() {
        return BigInt::zero();
    }
    (a * b).abs() / num_gcd(a, b)
}

/// Translate a term into a linear expression.
///
/// Fails with [`Error::Unsupported`] on nonlinear products, division by a
/// non-constant, and operators outside linear arithmetic; callers either
/// pre-lower those or fall back.
pub fn term_to_lin(tm: &TermManager, t: TermId) -> Result<LinExpr> {
    match tm.kind(t) {
        TermKind::IntConst(n) => Ok(LinExpr::constant(BigRational::from_integer(n.clone()))),
        TermKind::RealConst(q) => Ok(LinExpr::constant(q.clone())),
        TermKind::Var(_, sort) if sort.is_numeric() => Ok(LinExpr::variable(t)),
        TermKind::Add(args) => {
            let mut acc = LinExpr::zero();
            let one = BigRational::one();
            for &a in args {
                let la = term_to_lin(tm, a)?;
                acc.add_scaled(&la, &one);
            }
            Ok(acc)
        }
        TermKind::Sub(a, b) => {
            let mut acc = term_to_lin(tm, *a)?;
            let lb = term_to_lin(tm, *b)?;
            acc.add_scaled(&lb, &-BigRational::one());
            Ok(acc)
        }
        TermKind::Neg(a) => {
            let mut acc = term_to_lin(tm, *a)?;
            acc.scale(&-BigRational::one());
            Ok(acc)
        }
        TermKind::Mul(a, b) => {
            if let Some(c) = tm.numeral_value(*a) {
                let mut acc = term_to_lin(tm, *b)?;
                acc.scale(&c);
                Ok(acc)
            } else if let Some(c) = tm.numeral_value(*b) {
                let mut acc = term_to_lin(tm, *a)?;
                acc.scale(&c);
                Ok(acc)
            } else {
                Err(Error::Unsupported(format!(
                    "nonlinear product {}",
                    tm.display(t)
                )))
            }
        }
        TermKind::Div(a, b) => {
            let c = tm
                .numeral_value(*b)
                .filter(|c| !c.is_zero())
                .ok_or_else(|| {
                    Error::Unsupported(format!("division by non-constant {}", tm.display(t)))
                })?;
            let mut acc = term_to_lin(tm, *a)?;
            acc.scale(&c.recip());
            Ok(acc)
        }
        _ => Err(Error::Unsupported(format!(
            "non-arithmetic term {}",
            tm.display(t)
        ))),
    }
}

/// Translate a relational atom (possibly under a negation) into
/// `expr ⋈ 0` form.
pub fn atom_to_lin(tm: &TermManager, t: TermId) -> Result<(LinExpr, Rel)> {
    let (a, b, rel, flip) = match tm.kind(t) {
        TermKind::Eq(a, b) => (*a, *b, Rel::Eq, false),
        TermKind::Ne(a, b) => (*a, *b, Rel::Ne, false),
        TermKind::Lt(a, b) => (*a, *b, Rel::Lt, false),
        TermKind::Le(a, b) => (*a, *b, Rel::Le, false),
        TermKind::Gt(a, b) => (*a, *b, Rel::Lt, true),
        TermKind::Ge(a, b) => (*a, *b, Rel::Le, true),
        _ => {
            return Err(Error::Unsupported(format!(
                "not a relational atom: {}",
                tm.display(t)
            )))
        }
    };
    let (a, b) = if flip { (b, a) } else { (a, b) };
    let mut lin = term_to_lin(tm, a)?;
    let lb = term_to_lin(tm, b)?;
    lin.add_scaled(&lb, &-BigRational::one());
    Ok((lin, rel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_to_lin_roundtrip() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let y = tm.mk_var("y", Sort::Int);
        let two = tm.mk_int(2);
        let prod = tm.mk_mul(two, y);
        let three = tm.mk_int(3);
        let e = tm.mk_add(vec![x, prod, three]);
        let lin = term_to_lin(&tm, e).unwrap();
        assert_eq!(lin.coeff(x), BigRational::from_integer(1.into()));
        assert_eq!(lin.coeff(y), BigRational::from_integer(2.into()));
        assert_eq!(lin.constant, BigRational::from_integer(3.into()));
        assert_eq!(lin.to_term(&mut tm, Sort::Int), e);
    }

    #[test]
    fn test_atom_orientation() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let one = tm.mk_int(1);
        let gt = tm.mk_gt(x, one);
        let (lin, rel) = atom_to_lin(&tm, gt).unwrap();
        // x > 1 becomes 1 - x < 0
        assert_eq!(rel, Rel::Lt);
        assert_eq!(lin.coeff(x), BigRational::from_integer((-1).into()));
        assert_eq!(lin.constant, BigRational::from_integer(1.into()));
    }

    #[test]
    fn test_nonlinear_rejected() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let y = tm.mk_var("y", Sort::Int);
        let p = tm.mk_mul(x, y);
        assert!(matches!(term_to_lin(&tm, p), Err(Error::Unsupported(_))));
    }
}
