//! Hash-Consed Term Arena.
//!
//! Arena-allocated immutable terms with [`TermId`] references. Terms are
//! hash-consed: structurally equal terms receive the same id, so id
//! equality is semantic equality and subterm sharing is free. The engine
//! never mutates a term, it only builds new ones through the `mk_*`
//! constructors, which perform light canonicalization (flattening,
//! constant folding, neutral-element elimination) on the way in.

pub mod print;
pub mod rewrite;
pub mod traversal;

use crate::sort::Sort;
use lasso::{Rodeo, Spur};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Zero};
use rustc_hash::{FxHashMap, FxHashSet};

/// Identifier of a term in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(u32);

impl TermId {
    /// Raw index into the arena.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Operator tag plus ordered children. The operator set is closed:
/// witness extraction and projection dispatch over it exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermKind {
    /// Boolean constant true.
    True,
    /// Boolean constant false.
    False,
    /// Named 0-ary constant of a sort.
    Var(Spur, Sort),
    /// Integer numeral.
    IntConst(BigInt),
    /// Rational numeral.
    RealConst(BigRational),
    /// Negation.
    Not(TermId),
    /// N-ary conjunction (flattened, sorted, deduplicated).
    And(Vec<TermId>),
    /// N-ary disjunction (flattened, sorted, deduplicated).
    Or(Vec<TermId>),
    /// If-then-else.
    Ite(TermId, TermId, TermId),
    /// Equality.
    Eq(TermId, TermId),
    /// Disequality.
    Ne(TermId, TermId),
    /// Strict less-than.
    Lt(TermId, TermId),
    /// Less-or-equal.
    Le(TermId, TermId),
    /// Strict greater-than.
    Gt(TermId, TermId),
    /// Greater-or-equal.
    Ge(TermId, TermId),
    /// N-ary sum (flattened, sorted, constants folded).
    Add(Vec<TermId>),
    /// Subtraction.
    Sub(TermId, TermId),
    /// Unary minus.
    Neg(TermId),
    /// Multiplication.
    Mul(TermId, TermId),
    /// Real division.
    Div(TermId, TermId),
    /// Integer (truncating) division.
    Idiv(TermId, TermId),
}

/// Owner of all terms: arena, dedup table, symbol interner.
pub struct TermManager {
    names: Rodeo,
    kinds: Vec<TermKind>,
    sorts: Vec<Sort>,
    dedup: FxHashMap<TermKind, TermId>,
    fresh: u32,
    true_id: TermId,
    false_id: TermId,
}

impl Default for TermManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TermManager {
    /// Create an empty manager (with the two boolean constants interned).
    #[must_use]
    pub fn new() -> Self {
        let mut tm = Self {
            names: Rodeo::default(),
            kinds: Vec::new(),
            sorts: Vec::new(),
            dedup: FxHashMap::default(),
            fresh: 0,
            true_id: TermId(0),
            false_id: TermId(0),
        };
        tm.true_id = tm.intern(TermKind::True, Sort::Bool);
        tm.false_id = tm.intern(TermKind::False, Sort::Bool);
        tm
    }

    fn intern(&mut self, kind: TermKind, sort: Sort) -> TermId {
        if let Some(&id) = self.dedup.get(&kind) {
            return id;
        }
        let id = TermId(u32::try_from(self.kinds.len()).expect("term arena overflow"));
        self.kinds.push(kind.clone());
        self.sorts.push(sort);
        self.dedup.insert(kind, id);
        id
    }

    /// Operator tag and children of a term.
    #[must_use]
    pub fn kind(&self, t: TermId) -> &TermKind {
        &self.kinds[t.index()]
    }

    /// Sort of a term.
    #[must_use]
    pub fn sort(&self, t: TermId) -> Sort {
        self.sorts[t.index()]
    }

    /// Number of interned terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether the arena is empty (never: the booleans are pre-interned).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    // ---- leaves ---------------------------------------------------------

    /// The boolean constant `true`.
    #[must_use]
    pub fn mk_true(&self) -> TermId {
        self.true_id
    }

    /// The boolean constant `false`.
    #[must_use]
    pub fn mk_false(&self) -> TermId {
        self.false_id
    }

    /// Whether a term is the constant `true`.
    #[must_use]
    pub fn is_true(&self, t: TermId) -> bool {
        t == self.true_id
    }

    /// Whether a term is the constant `false`.
    #[must_use]
    pub fn is_false(&self, t: TermId) -> bool {
        t == self.false_id
    }

    /// Named variable of a sort. Equal name and sort yield the same id.
    pub fn mk_var(&mut self, name: &str, sort: Sort) -> TermId {
        let spur = self.names.get_or_intern(name);
        self.intern(TermKind::Var(spur, sort), sort)
    }

    /// Fresh variable with a globally unique `prefix!N` name.
    pub fn mk_fresh_var(&mut self, prefix: &str, sort: Sort) -> TermId {
        loop {
            let name = format!("{}!{}", prefix, self.fresh);
            self.fresh += 1;
            if self.names.get(&name).is_none() {
                return self.mk_var(&name, sort);
            }
        }
    }

    /// Whether a term is a variable.
    #[must_use]
    pub fn is_var(&self, t: TermId) -> bool {
        matches!(self.kind(t), TermKind::Var(..))
    }

    /// Name of a variable term.
    ///
    /// # Panics
    /// Panics if `t` is not a variable.
    #[must_use]
    pub fn var_name(&self, t: TermId) -> &str {
        match self.kind(t) {
            TermKind::Var(spur, _) => self.names.resolve(spur),
            k => panic!("var_name on non-variable term {k:?}"),
        }
    }

    /// Integer numeral.
    pub fn mk_int(&mut self, n: impl Into<BigInt>) -> TermId {
        self.intern(TermKind::IntConst(n.into()), Sort::Int)
    }

    /// Rational numeral.
    pub fn mk_real(&mut self, q: BigRational) -> TermId {
        self.intern(TermKind::RealConst(q), Sort::Real)
    }

    /// Numeral of the given numeric sort.
    pub fn mk_numeral(&mut self, n: impl Into<BigInt>, sort: Sort) -> TermId {
        match sort {
            Sort::Int => self.mk_int(n),
            Sort::Real => self.mk_real(BigRational::from_integer(n.into())),
            Sort::Bool => panic!("mk_numeral on Bool sort"),
        }
    }

    /// Numeric value of a constant term, if it is one.
    #[must_use]
    pub fn numeral_value(&self, t: TermId) -> Option<BigRational> {
        match self.kind(t) {
            TermKind::IntConst(n) => Some(BigRational::from_integer(n.clone())),
            TermKind::RealConst(q) => Some(q.clone()),
            _ => None,
        }
    }

    // ---- boolean connectives -------------------------------------------

    /// Negation, with double-negation cancellation and operator flipping.
    pub fn mk_not(&mut self, t: TermId) -> TermId {
        match self.kind(t).clone() {
            TermKind::True => self.false_id,
            TermKind::False => self.true_id,
            TermKind::Not(inner) => inner,
            TermKind::Eq(a, b) if self.sort(a) != Sort::Bool => self.mk_ne(a, b),
            TermKind::Ne(a, b) => self.mk_eq(a, b),
            TermKind::Lt(a, b) => self.mk_ge(a, b),
            TermKind::Le(a, b) => self.mk_gt(a, b),
            TermKind::Gt(a, b) => self.mk_le(a, b),
            TermKind::Ge(a, b) => self.mk_lt(a, b),
            _ => self.intern(TermKind::Not(t), Sort::Bool),
        }
    }

    fn mk_nary_bool(&mut self, args: Vec<TermId>, conj: bool) -> TermId {
        let (absorb, neutral) = if conj {
            (self.false_id, self.true_id)
        } else {
            (self.true_id, self.false_id)
        };
        let mut flat = Vec::with_capacity(args.len());
        let mut seen = FxHashSet::default();
        let mut stack: Vec<TermId> = args.into_iter().rev().collect();
        while let Some(t) = stack.pop() {
            if t == absorb {
                return absorb;
            }
            if t == neutral {
                continue;
            }
            match self.kind(t) {
                TermKind::And(children) if conj => {
                    stack.extend(children.iter().rev().copied());
                }
                TermKind::Or(children) if !conj => {
                    stack.extend(children.iter().rev().copied());
                }
                _ => {
                    if seen.insert(t) {
                        flat.push(t);
                    }
                }
            }
        }
        flat.sort_unstable();
        match flat.len() {
            0 => neutral,
            1 => flat[0],
            _ => {
                let kind = if conj {
                    TermKind::And(flat)
                } else {
                    TermKind::Or(flat)
                };
                self.intern(kind, Sort::Bool)
            }
        }
    }

    /// N-ary conjunction with flattening and redundancy elimination.
    pub fn mk_and(&mut self, args: Vec<TermId>) -> TermId {
        self.mk_nary_bool(args, true)
    }

    /// Binary conjunction.
    pub fn mk_and2(&mut self, a: TermId, b: TermId) -> TermId {
        self.mk_and(vec![a, b])
    }

    /// N-ary disjunction with flattening and redundancy elimination.
    pub fn mk_or(&mut self, args: Vec<TermId>) -> TermId {
        self.mk_nary_bool(args, false)
    }

    /// If-then-else. Branch sorts must agree.
    pub fn mk_ite(&mut self, c: TermId, then: TermId, els: TermId) -> TermId {
        assert_eq!(self.sort(c), Sort::Bool, "ite condition must be Bool");
        let sort = self.sort(then);
        assert_eq!(sort, self.sort(els), "ite branch sorts must agree");
        if self.is_true(c) || then == els {
            return then;
        }
        if self.is_false(c) {
            return els;
        }
        self.intern(TermKind::Ite(c, then, els), sort)
    }

    // ---- relations ------------------------------------------------------

    fn const_cmp(&self, a: TermId, b: TermId) -> Option<std::cmp::Ordering> {
        let x = self.numeral_value(a)?;
        let y = self.numeral_value(b)?;
        Some(x.cmp(&y))
    }

    /// Equality. Symmetric, so operands are stored in id order.
    pub fn mk_eq(&mut self, a: TermId, b: TermId) -> TermId {
        assert_eq!(self.sort(a), self.sort(b), "eq operand sorts must agree");
        if a == b {
            return self.true_id;
        }
        if let Some(ord) = self.const_cmp(a, b) {
            return if ord.is_eq() { self.true_id } else { self.false_id };
        }
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        self.intern(TermKind::Eq(a, b), Sort::Bool)
    }

    /// Disequality. Symmetric, so operands are stored in id order.
    pub fn mk_ne(&mut self, a: TermId, b: TermId) -> TermId {
        assert_eq!(self.sort(a), self.sort(b), "ne operand sorts must agree");
        if a == b {
            return self.false_id;
        }
        if let Some(ord) = self.const_cmp(a, b) {
            return if ord.is_eq() { self.false_id } else { self.true_id };
        }
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        self.intern(TermKind::Ne(a, b), Sort::Bool)
    }

    /// Strict less-than.
    pub fn mk_lt(&mut self, a: TermId, b: TermId) -> TermId {
        if a == b {
            return self.false_id;
        }
        if let Some(ord) = self.const_cmp(a, b) {
            return if ord.is_lt() { self.true_id } else { self.false_id };
        }
        self.intern(TermKind::Lt(a, b), Sort::Bool)
    }

    /// Less-or-equal.
    pub fn mk_le(&mut self, a: TermId, b: TermId) -> TermId {
        if a == b {
            return self.true_id;
        }
        if let Some(ord) = self.const_cmp(a, b) {
            return if ord.is_gt() { self.false_id } else { self.true_id };
        }
        self.intern(TermKind::Le(a, b), Sort::Bool)
    }

    /// Strict greater-than.
    pub fn mk_gt(&mut self, a: TermId, b: TermId) -> TermId {
        if a == b {
            return self.false_id;
        }
        if let Some(ord) = self.const_cmp(a, b) {
            return if ord.is_gt() { self.true_id } else { self.false_id };
        }
        self.intern(TermKind::Gt(a, b), Sort::Bool)
    }

    /// Greater-or-equal.
    pub fn mk_ge(&mut self, a: TermId, b: TermId) -> TermId {
        if a == b {
            return self.true_id;
        }
        if let Some(ord) = self.const_cmp(a, b) {
            return if ord.is_lt() { self.false_id } else { self.true_id };
        }
        self.intern(TermKind::Ge(a, b), Sort::Bool)
    }

    // ---- arithmetic -----------------------------------------------------

    fn numeric_sort(&self, args: &[TermId]) -> Sort {
        let mut sort = Sort::Int;
        for &a in args {
            match self.sort(a) {
                Sort::Real => sort = Sort::Real,
                Sort::Int => {}
                Sort::Bool => panic!("arithmetic on a Bool term"),
            }
        }
        sort
    }

    /// N-ary sum with flattening and constant folding.
    pub fn mk_add(&mut self, args: Vec<TermId>) -> TermId {
        let sort = self.numeric_sort(&args);
        let mut flat = Vec::with_capacity(args.len());
        let mut acc = BigRational::zero();
        let mut stack: Vec<TermId> = args.into_iter().rev().collect();
        while let Some(t) = stack.pop() {
            match self.kind(t) {
                TermKind::Add(children) => stack.extend(children.iter().rev().copied()),
                _ => {
                    if let Some(q) = self.numeral_value(t) {
                        acc += q;
                    } else {
                        flat.push(t);
                    }
                }
            }
        }
        if !acc.is_zero() || flat.is_empty() {
            flat.push(self.mk_rational(acc, sort));
        }
        flat.sort_unstable();
        if flat.len() == 1 {
            return flat[0];
        }
        self.intern(TermKind::Add(flat), sort)
    }

    /// Binary sum.
    pub fn mk_add2(&mut self, a: TermId, b: TermId) -> TermId {
        self.mk_add(vec![a, b])
    }

    /// Subtraction.
    pub fn mk_sub(&mut self, a: TermId, b: TermId) -> TermId {
        let sort = self.numeric_sort(&[a, b]);
        if let (Some(x), Some(y)) = (self.numeral_value(a), self.numeral_value(b)) {
            return self.mk_rational(x - y, sort);
        }
        if self.numeral_value(b).is_some() {
            // fold `t - c` into the n-ary sum representation
            let neg = self.mk_neg(b);
            return self.mk_add(vec![a, neg]);
        }
        self.intern(TermKind::Sub(a, b), sort)
    }

    /// Unary minus.
    pub fn mk_neg(&mut self, t: TermId) -> TermId {
        let sort = self.numeric_sort(&[t]);
        if let Some(q) = self.numeral_value(t) {
            return self.mk_rational(-q, sort);
        }
        if let TermKind::Neg(inner) = *self.kind(t) {
            return inner;
        }
        self.intern(TermKind::Neg(t), sort)
    }

    /// Multiplication (constant folding, unit and zero elimination).
    pub fn mk_mul(&mut self, a: TermId, b: TermId) -> TermId {
        let sort = self.numeric_sort(&[a, b]);
        match (self.numeral_value(a), self.numeral_value(b)) {
            (Some(x), Some(y)) => return self.mk_rational(x * y, sort),
            (Some(x), None) => {
                if x.is_zero() {
                    return self.mk_rational(BigRational::zero(), sort);
                }
                if x.is_one() {
                    return b;
                }
            }
            (None, Some(y)) => {
                if y.is_zero() {
                    return self.mk_rational(BigRational::zero(), sort);
                }
                if y.is_one() {
                    return a;
                }
            }
            (None, None) => {}
        }
        self.intern(TermKind::Mul(a, b), sort)
    }

    /// Real division.
    pub fn mk_div(&mut self, a: TermId, b: TermId) -> TermId {
        if let (Some(x), Some(y)) = (self.numeral_value(a), self.numeral_value(b)) {
            if !y.is_zero() {
                return self.mk_real(x / y);
            }
        }
        self.intern(TermKind::Div(a, b), Sort::Real)
    }

    /// Truncating integer division.
    pub fn mk_idiv(&mut self, a: TermId, b: TermId) -> TermId {
        if let (TermKind::IntConst(x), TermKind::IntConst(y)) = (self.kind(a), self.kind(b)) {
            if !y.is_zero() {
                let q = x / y;
                return self.mk_int(q);
            }
        }
        self.intern(TermKind::Idiv(a, b), Sort::Int)
    }

    fn mk_rational(&mut self, q: BigRational, sort: Sort) -> TermId {
        match sort {
            Sort::Int => {
                debug_assert!(q.is_integer(), "non-integral constant in Int position");
                let n = q.to_integer();
                self.mk_int(n)
            }
            Sort::Real => self.mk_real(q),
            Sort::Bool => unreachable!("mk_rational on Bool sort"),
        }
    }

    /// `e + 1` for integers, `e + 1` unit for reals; numerals fold.
    pub fn plus_unit(&mut self, e: TermId) -> TermId {
        let one = match self.sort(e) {
            Sort::Real => self.mk_real(BigRational::one()),
            _ => self.mk_int(1),
        };
        self.mk_add(vec![e, one])
    }

    /// `e - 1` for integers, `e - 1` unit for reals; numerals fold.
    pub fn minus_unit(&mut self, e: TermId) -> TermId {
        let one = match self.sort(e) {
            Sort::Real => self.mk_real(BigRational::one()),
            _ => self.mk_int(1),
        };
        self.mk_sub(e, one)
    }

    /// Sort default: `false` for booleans, zero for numerics.
    pub fn default_value(&mut self, sort: Sort) -> TermId {
        match sort {
            Sort::Bool => self.mk_false(),
            Sort::Int => self.mk_int(0),
            Sort::Real => self.mk_real(BigRational::zero()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_consing_identity() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let y = tm.mk_var("x", Sort::Int);
        assert_eq!(x, y);
        let one = tm.mk_int(1);
        let a = tm.mk_add(vec![x, one]);
        let b = tm.mk_add(vec![one, x]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_and_or_redundancy() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("p", Sort::Bool);
        let t = tm.mk_true();
        let f = tm.mk_false();
        assert_eq!(tm.mk_and(vec![x, t, x]), x);
        assert_eq!(tm.mk_and(vec![x, f]), f);
        assert_eq!(tm.mk_or(vec![x, f, x]), x);
        assert_eq!(tm.mk_or(vec![x, t]), t);
        assert_eq!(tm.mk_and(vec![]), t);
        assert_eq!(tm.mk_or(vec![]), f);
    }

    #[test]
    fn test_not_flips_relations() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let z = tm.mk_int(0);
        let lt = tm.mk_lt(x, z);
        assert_eq!(tm.mk_not(lt), tm.mk_ge(x, z));
        let n = tm.mk_not(lt);
        let nn = tm.mk_not(n);
        assert_eq!(nn, lt);
    }

    #[test]
    fn test_constant_folding() {
        let mut tm = TermManager::new();
        let two = tm.mk_int(2);
        let three = tm.mk_int(3);
        assert_eq!(tm.mk_add(vec![two, three]), tm.mk_int(5));
        assert_eq!(tm.mk_lt(two, three), tm.mk_true());
        let x = tm.mk_var("x", Sort::Int);
        let a = tm.mk_add(vec![x, two]);
        let folded = tm.mk_add(vec![a, three]);
        let expect = tm.mk_int(5);
        let direct = tm.mk_add(vec![x, expect]);
        assert_eq!(folded, direct);
    }

    #[test]
    fn test_fresh_vars_unique() {
        let mut tm = TermManager::new();
        let a = tm.mk_fresh_var("fx!max", Sort::Int);
        let b = tm.mk_fresh_var("fx!max", Sort::Int);
        assert_ne!(a, b);
    }
}
