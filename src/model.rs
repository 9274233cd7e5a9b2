//! Models.
//!
//! A model is a finite assignment from variables to concrete values plus a
//! recursive evaluator over the full term language. The solver completes
//! models over every variable of the asserted formulas before handing them
//! out, so evaluation downstream of a `Sat` answer is total.

use crate::ast::{TermId, TermKind, TermManager};
use crate::sort::Sort;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, Zero};
use rustc_hash::FxHashMap;

/// Concrete value of a variable in a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(BigInt),
    /// Rational value.
    Rational(BigRational),
}

impl Value {
    /// Numeric view of the value.
    #[must_use]
    pub fn as_rational(&self) -> Option<BigRational> {
        match self {
            Value::Bool(_) => None,
            Value::Int(n) => Some(BigRational::from_integer(n.clone())),
            Value::Rational(q) => Some(q.clone()),
        }
    }

    /// Boolean view of the value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Term rendering of the value.
    pub fn to_term(&self, tm: &mut TermManager) -> TermId {
        match self {
            Value::Bool(true) => tm.mk_true(),
            Value::Bool(false) => tm.mk_false(),
            Value::Int(n) => tm.mk_int(n.clone()),
            Value::Rational(q) => tm.mk_real(q.clone()),
        }
    }

    fn of_rational(q: BigRational, sort: Sort) -> Option<Value> {
        match sort {
            Sort::Int => {
                if q.is_integer() {
                    Some(Value::Int(q.to_integer()))
                } else {
                    None
                }
            }
            Sort::Real => Some(Value::Rational(q)),
            Sort::Bool => None,
        }
    }

    /// Sort default: `false` / `0`.
    #[must_use]
    pub fn default_of(sort: Sort) -> Value {
        match sort {
            Sort::Bool => Value::Bool(false),
            Sort::Int => Value::Int(BigInt::zero()),
            Sort::Real => Value::Rational(BigRational::zero()),
        }
    }
}

/// Finite variable assignment with recursive evaluation.
#[derive(Debug, Clone, Default)]
pub struct Model {
    assignment: FxHashMap<TermId, Value>,
}

impl Model {
    /// Empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a variable.
    pub fn assign(&mut self, var: TermId, value: Value) {
        self.assignment.insert(var, value);
    }

    /// Value of a variable, if assigned.
    #[must_use]
    pub fn value(&self, var: TermId) -> Option<&Value> {
        self.assignment.get(&var)
    }

    /// Assigned variables in ascending id order.
    #[must_use]
    pub fn vars(&self) -> Vec<TermId> {
        let mut vars: Vec<TermId> = self.assignment.keys().copied().collect();
        vars.sort_unstable();
        vars
    }

    /// Fill every unassigned variable of `vars` with its sort default.
    pub fn complete(&mut self, tm: &TermManager, vars: &[TermId]) {
        for &v in vars {
            self.assignment
                .entry(v)
                .or_insert_with(|| Value::default_of(tm.sort(v)));
        }
    }

    /// Evaluate a term under the model. `None` if an unassigned variable
    /// is reached or the term is not value-denoting (division by zero).
    #[must_use]
    pub fn eval(&self, tm: &TermManager, t: TermId) -> Option<Value> {
        match tm.kind(t) {
            TermKind::True => Some(Value::Bool(true)),
            TermKind::False => Some(Value::Bool(false)),
            TermKind::Var(..) => self.assignment.get(&t).cloned(),
            TermKind::IntConst(n) => Some(Value::Int(n.clone())),
            TermKind::RealConst(q) => Some(Value::Rational(q.clone())),
            TermKind::Not(a) => Some(Value::Bool(!self.eval_bool(tm, *a)?)),
            TermKind::And(args) => {
                let mut acc = true;
                for &a in args {
                    acc &= self.eval_bool(tm, a)?;
                }
                Some(Value::Bool(acc))
            }
            TermKind::Or(args) => {
                let mut acc = false;
                for &a in args {
                    acc |= self.eval_bool(tm, a)?;
                }
                Some(Value::Bool(acc))
            }
            TermKind::Ite(c, a, b) => {
                if self.eval_bool(tm, *c)? {
                    self.eval(tm, *a)
                } else {
                    self.eval(tm, *b)
                }
            }
            TermKind::Eq(a, b) => {
                if tm.sort(*a) == Sort::Bool {
                    Some(Value::Bool(self.eval_bool(tm, *a)? == self.eval_bool(tm, *b)?))
                } else {
                    Some(Value::Bool(self.eval_num(tm, *a)? == self.eval_num(tm, *b)?))
                }
            }
            TermKind::Ne(a, b) => {
                if tm.sort(*a) == Sort::Bool {
                    Some(Value::Bool(self.eval_bool(tm, *a)? != self.eval_bool(tm, *b)?))
                } else {
                    Some(Value::Bool(self.eval_num(tm, *a)? != self.eval_num(tm, *b)?))
                }
            }
            TermKind::Lt(a, b) => Some(Value::Bool(self.eval_num(tm, *a)? < self.eval_num(tm, *b)?)),
            TermKind::Le(a, b) => Some(Value::Bool(self.eval_num(tm, *a)? <= self.eval_num(tm, *b)?)),
            TermKind::Gt(a, b) => Some(Value::Bool(self.eval_num(tm, *a)? > self.eval_num(tm, *b)?)),
            TermKind::Ge(a, b) => Some(Value::Bool(self.eval_num(tm, *a)? >= self.eval_num(tm, *b)?)),
            TermKind::Add(args) => {
                let mut acc = BigRational::zero();
                for &a in args {
                    acc += self.eval_num(tm, a)?;
                }
                Value::of_rational(acc, tm.sort(t))
            }
            TermKind::Sub(a, b) => {
                let x = self.eval_num(tm, *a)? - self.eval_num(tm, *b)?;
                Value::of_rational(x, tm.sort(t))
            }
            TermKind::Neg(a) => Value::of_rational(-self.eval_num(tm, *a)?, tm.sort(t)),
            TermKind::Mul(a, b) => {
                let x = self.eval_num(tm, *a)? * self.eval_num(tm, *b)?;
                Value::of_rational(x, tm.sort(t))
            }
            TermKind::Div(a, b) => {
                let d = self.eval_num(tm, *b)?;
                if d.is_zero() {
                    return None;
                }
                Value::of_rational(self.eval_num(tm, *a)? / d, Sort::Real)
            }
            TermKind::Idiv(a, b) => {
                let n = self.eval_num(tm, *a)?;
                let d = self.eval_num(tm, *b)?;
                if d.is_zero() || !n.is_integer() || !d.is_integer() {
                    return None;
                }
                Some(Value::Int(div_floor(&n.to_integer(), &d.to_integer())))
            }
        }
    }

    /// Boolean evaluation shortcut.
    #[must_use]
    pub fn eval_bool(&self, tm: &TermManager, t: TermId) -> Option<bool> {
        self.eval(tm, t)?.as_bool()
    }

    fn eval_num(&self, tm: &TermManager, t: TermId) -> Option<BigRational> {
        self.eval(tm, t)?.as_rational()
    }
}

/// Floor division on big integers (SMT-LIB `div` with positive divisor).
pub(crate) fn div_floor(a: &BigInt, b: &BigInt) -> BigInt {
    let q = a / b;
    let r = a % b;
    if !r.is_zero() && (r.is_negative() != b.is_negative()) {
        q - 1
    } else {
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_arithmetic() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let one = tm.mk_int(1);
        let sum = tm.mk_add(vec![x, one]);
        let gt = tm.mk_gt(sum, x);

        let mut m = Model::new();
        m.assign(x, Value::Int(BigInt::from(4)));
        assert_eq!(m.eval(&tm, sum), Some(Value::Int(BigInt::from(5))));
        assert_eq!(m.eval_bool(&tm, gt), Some(true));
    }

    #[test]
    fn test_eval_unassigned_is_none() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let m = Model::new();
        assert_eq!(m.eval(&tm, x), None);
    }

    #[test]
    fn test_div_floor_negative() {
        assert_eq!(div_floor(&BigInt::from(-3), &BigInt::from(2)), BigInt::from(-2));
        assert_eq!(div_floor(&BigInt::from(3), &BigInt::from(2)), BigInt::from(1));
    }
}
