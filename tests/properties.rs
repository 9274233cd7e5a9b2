//! Property-based tests for the AE-validity engine
//!
//! These drive the solver and the SMT backend over families of small
//! integer formulas with randomized constants:
//! - Shifted intervals stay valid and their Skolem relations entail T
//! - Degenerate intervals flip to invalid
//! - Backend models really satisfy the asserted formulas

use forallex::ast::{TermId, TermManager};
use forallex::qe::{solve_with_vars, Validity};
use forallex::smt::{implies, is_equiv, SatResult, Solver};
use forallex::{AeConfig, Sort};
use proptest::prelude::*;

/// Strategy for small offsets
fn offset_strategy() -> impl Strategy<Value = i64> {
    -10i64..10i64
}

/// Strategy for interval widths that leave room for a witness
fn width_strategy() -> impl Strategy<Value = i64> {
    2i64..6i64
}

fn entails(tm: &mut TermManager, s: TermId, skolem: TermId, t: TermId) -> bool {
    let lhs = tm.mk_and2(s, skolem);
    implies(tm, lhs, t)
}

proptest! {
    /// T = (v > x + a) ∧ (v < x + a + w) with w ≥ 2 always admits a witness
    #[test]
    fn shifted_interval_is_valid(a in offset_strategy(), w in width_strategy()) {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let v = tm.mk_var("v", Sort::Int);
        let ca = tm.mk_int(a);
        let cw = tm.mk_int(a + w);
        let lo_e = tm.mk_add(vec![x, ca]);
        let hi_e = tm.mk_add(vec![x, cw]);
        let lo = tm.mk_gt(v, lo_e);
        let hi = tm.mk_lt(v, hi_e);
        let t = tm.mk_and(vec![lo, hi]);
        let s = tm.mk_true();

        let sol = solve_with_vars(&mut tm, s, t, vec![v], AeConfig::default()).unwrap();
        prop_assert_eq!(sol.validity, Validity::Valid);
        let skolem = sol.skolem.unwrap();
        prop_assert!(entails(&mut tm, s, skolem, t));
    }

    /// A strict interval of width one holds no integer
    #[test]
    fn empty_strict_interval_is_invalid(a in offset_strategy()) {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let v = tm.mk_var("v", Sort::Int);
        let ca = tm.mk_int(a);
        let cb = tm.mk_int(a + 1);
        let lo_e = tm.mk_add(vec![x, ca]);
        let hi_e = tm.mk_add(vec![x, cb]);
        let lo = tm.mk_gt(v, lo_e);
        let hi = tm.mk_lt(v, hi_e);
        let t = tm.mk_and(vec![lo, hi]);
        let s = tm.mk_true();

        let sol = solve_with_vars(&mut tm, s, t, vec![v], AeConfig::default()).unwrap();
        prop_assert_eq!(sol.validity, Validity::Invalid);
        prop_assert!(sol.counterexample.is_some());
    }

    /// An offset equality defines its own Skolem relation
    #[test]
    fn offset_equality_yields_exact_skolem(a in offset_strategy()) {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let v = tm.mk_var("v", Sort::Int);
        let ca = tm.mk_int(a);
        let rhs = tm.mk_add(vec![x, ca]);
        let t = tm.mk_eq(v, rhs);
        let s = tm.mk_true();

        let sol = solve_with_vars(&mut tm, s, t, vec![v], AeConfig::default()).unwrap();
        prop_assert_eq!(sol.validity, Validity::Valid);
        let skolem = sol.skolem.unwrap();
        let expected = tm.mk_eq(v, rhs);
        prop_assert!(is_equiv(&mut tm, skolem, expected));
    }

    /// A capped equality is valid exactly below the cap
    #[test]
    fn capped_equality_reports_exact_subset(a in offset_strategy()) {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let v = tm.mk_var("v", Sort::Int);
        let ca = tm.mk_int(a);
        let def = tm.mk_eq(v, x);
        let cap = tm.mk_le(v, ca);
        let t = tm.mk_and(vec![def, cap]);
        let s = tm.mk_true();

        let sol = solve_with_vars(&mut tm, s, t, vec![v], AeConfig::default()).unwrap();
        prop_assert_eq!(sol.validity, Validity::Invalid);
        let below = tm.mk_le(x, ca);
        prop_assert!(is_equiv(&mut tm, sol.valid_subset, below));
    }

    /// Models returned by the backend satisfy the asserted formula
    #[test]
    fn backend_models_are_sound(a in offset_strategy(), w in width_strategy()) {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let ca = tm.mk_int(a);
        let cb = tm.mk_int(a + w);
        let lo = tm.mk_gt(x, ca);
        let hi = tm.mk_lt(x, cb);
        let formula = tm.mk_and(vec![lo, hi]);

        let mut solver = Solver::new();
        solver.assert_term(formula);
        prop_assert_eq!(solver.check(&mut tm), SatResult::Sat);
        let model = solver.model().unwrap();
        prop_assert_eq!(model.eval_bool(&tm, formula), Some(true));
    }

    /// Integer tightening makes x > a and x ≥ a + 1 interchangeable,
    /// while a genuinely stronger bound only implies one way
    #[test]
    fn implication_orders_bounds(a in offset_strategy()) {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let ca = tm.mk_int(a);
        let cb = tm.mk_int(a + 1);
        let cc = tm.mk_int(a + 2);
        let tight = tm.mk_ge(x, cb);
        let weak = tm.mk_gt(x, ca);
        let strong = tm.mk_ge(x, cc);

        prop_assert!(implies(&mut tm, tight, weak));
        prop_assert!(implies(&mut tm, weak, tight));
        prop_assert!(implies(&mut tm, strong, weak));
        prop_assert!(!implies(&mut tm, weak, strong));
    }
}
