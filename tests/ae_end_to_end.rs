//! End-to-end tests for AE-validity and Skolem extraction.
//!
//! Each test builds an AE-pair `∀s. S ⟹ ∃v. T` over the integers,
//! runs the full pipeline, and checks the verdict together with the
//! artifacts: the Skolem relation must entail T under S, the valid
//! subset must match the satisfiable region, and counterexamples must
//! falsify the existential.

use forallex::ast::{TermId, TermManager};
use forallex::qe::{all_inclusive_with_vars, solve_and_skolemize, solve_with_vars, AeSolver};
use forallex::smt::{implies, is_equiv, is_sat, SatResult};
use forallex::{AeConfig, Sort, Validity};

fn checked() -> AeConfig {
    AeConfig {
        sanity_checks: true,
        ..AeConfig::default()
    }
}

fn entails(tm: &mut TermManager, s: TermId, skolem: TermId, t: TermId) -> bool {
    let lhs = tm.mk_and2(s, skolem);
    implies(tm, lhs, t)
}

#[test]
fn definitional_equality_is_valid() {
    // ∀x. ∃v. v = x + 1
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let v = tm.mk_var("v", Sort::Int);
    let one = tm.mk_int(1);
    let xp1 = tm.mk_add(vec![x, one]);
    let t = tm.mk_eq(v, xp1);
    let s = tm.mk_true();

    let sol = solve_with_vars(&mut tm, s, t, vec![v], checked()).unwrap();
    assert_eq!(sol.validity, Validity::Valid);
    assert_eq!(sol.partitions, 1);
    let skolem = sol.skolem.unwrap();
    assert!(entails(&mut tm, s, skolem, t));
    let expected = tm.mk_eq(v, xp1);
    assert!(is_equiv(&mut tm, skolem, expected));
}

#[test]
fn strict_integer_interval_is_valid() {
    // ∀x. ∃v. x < v ∧ v < x + 2; the only witness is v = x + 1
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let v = tm.mk_var("v", Sort::Int);
    let two = tm.mk_int(2);
    let upper = tm.mk_add(vec![x, two]);
    let lo = tm.mk_gt(v, x);
    let hi = tm.mk_lt(v, upper);
    let t = tm.mk_and(vec![lo, hi]);
    let s = tm.mk_true();

    let sol = solve_with_vars(&mut tm, s, t, vec![v], checked()).unwrap();
    assert_eq!(sol.validity, Validity::Valid);
    let skolem = sol.skolem.unwrap();
    assert!(entails(&mut tm, s, skolem, t));
    let one = tm.mk_int(1);
    let xp1 = tm.mk_add(vec![x, one]);
    let pinned = tm.mk_eq(v, xp1);
    assert!(is_equiv(&mut tm, skolem, pinned));
}

#[test]
fn case_split_produces_conditional_skolem() {
    // ∀x. ∃v. (x ≥ 0 ∧ v = x) ∨ (x < 0 ∧ v = −x)
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let v = tm.mk_var("v", Sort::Int);
    let zero = tm.mk_int(0);
    let nx = tm.mk_neg(x);
    let pos = tm.mk_ge(x, zero);
    let neg = tm.mk_lt(x, zero);
    let id = tm.mk_eq(v, x);
    let flip = tm.mk_eq(v, nx);
    let b1 = tm.mk_and(vec![pos, id]);
    let b2 = tm.mk_and(vec![neg, flip]);
    let t = tm.mk_or(vec![b1, b2]);
    let s = tm.mk_true();

    let sol = solve_with_vars(&mut tm, s, t, vec![v], checked()).unwrap();
    assert_eq!(sol.validity, Validity::Valid);
    assert!(sol.partitions >= 2);
    let skolem = sol.skolem.unwrap();
    assert!(entails(&mut tm, s, skolem, t));
    // the relation behaves like |x| on both sides of zero
    let five = tm.mk_int(5);
    let m5 = tm.mk_int(-5);
    let at5 = tm.mk_eq(x, five);
    let lhs = tm.mk_and(vec![s, skolem, at5]);
    let v5 = tm.mk_eq(v, five);
    assert!(implies(&mut tm, lhs, v5));
    let atm5 = tm.mk_eq(x, m5);
    let lhs = tm.mk_and(vec![s, skolem, atm5]);
    assert!(implies(&mut tm, lhs, v5));
}

#[test]
fn one_sided_bound_is_valid() {
    // ∀x. ∃v. v < x; the witness walks one unit below the bound
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let v = tm.mk_var("v", Sort::Int);
    let t = tm.mk_lt(v, x);
    let s = tm.mk_true();

    let sol = solve_with_vars(&mut tm, s, t, vec![v], checked()).unwrap();
    assert_eq!(sol.validity, Validity::Valid);
    let skolem = sol.skolem.unwrap();
    assert!(entails(&mut tm, s, skolem, t));
}

#[test]
fn contradictory_bounds_are_invalid() {
    // ∀x. ∃v. v < x ∧ v > x admits no witness anywhere
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let v = tm.mk_var("v", Sort::Int);
    let a1 = tm.mk_lt(v, x);
    let a2 = tm.mk_gt(v, x);
    let t = tm.mk_and(vec![a1, a2]);
    let s = tm.mk_true();

    let sol = solve_with_vars(&mut tm, s, t, vec![v], checked()).unwrap();
    assert_eq!(sol.validity, Validity::Invalid);
    assert_eq!(sol.partitions, 0);
    assert!(tm.is_false(sol.valid_subset));
    assert!(sol.skolem.is_none());
    assert!(sol.counterexample.is_some());
}

#[test]
fn partial_validity_reports_exact_subset() {
    // ∃v. (v = x ∧ v ≥ 0) holds exactly on x ≥ 0
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let v = tm.mk_var("v", Sort::Int);
    let zero = tm.mk_int(0);
    let def = tm.mk_eq(v, x);
    let nonneg = tm.mk_ge(v, zero);
    let t = tm.mk_and(vec![def, nonneg]);
    let s = tm.mk_true();

    let sol = solve_with_vars(&mut tm, s, t, vec![v], checked()).unwrap();
    assert_eq!(sol.validity, Validity::Invalid);
    let xpos = tm.mk_ge(x, zero);
    assert!(is_equiv(&mut tm, sol.valid_subset, xpos));

    // the counterexample sits outside the subset
    let m = sol.counterexample.unwrap();
    assert_eq!(m.eval_bool(&tm, xpos), Some(false));
}

#[test]
fn unsatisfiable_s_part_is_vacuously_valid() {
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let v = tm.mk_var("v", Sort::Int);
    let zero = tm.mk_int(0);
    let a1 = tm.mk_lt(x, zero);
    let a2 = tm.mk_gt(x, zero);
    let s = tm.mk_and(vec![a1, a2]);
    let t = tm.mk_eq(v, x);

    let sol = solve_and_skolemize(&mut tm, s, t, checked()).unwrap();
    assert_eq!(sol.validity, Validity::Valid);
    assert_eq!(sol.partitions, 0);
    let skolem = sol.skolem.unwrap();
    assert!(entails(&mut tm, s, skolem, t));
}

#[test]
fn no_synthesis_vars_degenerates_to_implication() {
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let zero = tm.mk_int(0);
    let one = tm.mk_int(1);
    let s = tm.mk_gt(x, one);
    let t = tm.mk_gt(x, zero);

    let sol = solve_and_skolemize(&mut tm, s, t, checked()).unwrap();
    assert_eq!(sol.validity, Validity::Valid);

    let sol = solve_and_skolemize(&mut tm, t, s, checked()).unwrap();
    assert_eq!(sol.validity, Validity::Invalid);
    let m = sol.counterexample.unwrap();
    // a value with x > 0 but not x > 1
    assert_eq!(m.eval_bool(&tm, t), Some(true));
    assert_eq!(m.eval_bool(&tm, s), Some(false));
}

#[test]
fn boolean_definition_is_mined() {
    // ∀x. ∃b. b = (x > 0), a boolean synthesis variable
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let b = tm.mk_var("b", Sort::Bool);
    let zero = tm.mk_int(0);
    let gt = tm.mk_gt(x, zero);
    let t = tm.mk_eq(b, gt);
    let s = tm.mk_true();

    let sol = solve_with_vars(&mut tm, s, t, vec![b], checked()).unwrap();
    assert_eq!(sol.validity, Validity::Valid);
    let skolem = sol.skolem.unwrap();
    assert!(entails(&mut tm, s, skolem, t));
}

#[test]
fn projections_cover_s_when_valid() {
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let v = tm.mk_var("v", Sort::Int);
    let zero = tm.mk_int(0);
    let nx = tm.mk_neg(x);
    let pos = tm.mk_ge(x, zero);
    let neg = tm.mk_lt(x, zero);
    let c1 = tm.mk_eq(v, x);
    let c2 = tm.mk_eq(v, nx);
    let b1 = tm.mk_and(vec![pos, c1]);
    let b2 = tm.mk_and(vec![neg, c2]);
    let t = tm.mk_or(vec![b1, b2]);
    let s = tm.mk_true();

    let mut ae = AeSolver::new(&mut tm, s, t, vec![v], checked());
    assert_eq!(ae.solve(&mut tm).unwrap(), Validity::Valid);
    let cover = tm.mk_or(ae.partitions().iter().map(|p| p.projection).collect());
    assert!(implies(&mut tm, s, cover));
}

#[test]
fn compaction_preserves_entailment() {
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let v = tm.mk_var("v", Sort::Int);
    let zero = tm.mk_int(0);
    let nx = tm.mk_neg(x);
    let pos = tm.mk_ge(x, zero);
    let neg = tm.mk_lt(x, zero);
    let c1 = tm.mk_ge(v, x);
    let c2 = tm.mk_ge(v, nx);
    let b1 = tm.mk_and(vec![pos, c1]);
    let b2 = tm.mk_and(vec![neg, c2]);
    let t = tm.mk_or(vec![b1, b2]);
    let s = tm.mk_true();

    let cfg = AeConfig {
        compact: true,
        sanity_checks: true,
        ..AeConfig::default()
    };
    let sol = solve_with_vars(&mut tm, s, t, vec![v], cfg).unwrap();
    assert_eq!(sol.validity, Validity::Valid);
    let skolem = sol.skolem.unwrap();
    assert!(entails(&mut tm, s, skolem, t));
}

#[test]
fn nonlinear_t_part_reports_unknown() {
    // v·v = x is outside the linear fragment; the verdict is honest
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let v = tm.mk_var("v", Sort::Int);
    let sq = tm.mk_mul(v, v);
    let t = tm.mk_eq(sq, x);
    let s = tm.mk_true();

    let sol = solve_with_vars(&mut tm, s, t, vec![v], AeConfig::default()).unwrap();
    assert_eq!(sol.validity, Validity::Unknown);
    assert!(sol.skolem.is_none());
    assert!(sol.counterexample.is_none());
}

#[test]
fn all_inclusive_single_round() {
    // the unique witness makes the second round close immediately
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let v = tm.mk_var("v", Sort::Int);
    let t = tm.mk_eq(v, x);
    let s = tm.mk_true();

    let sol = all_inclusive_with_vars(&mut tm, s, t, vec![v], checked()).unwrap();
    assert_eq!(sol.validity, Validity::Valid);
    let skolem = sol.skolem.unwrap();
    assert!(entails(&mut tm, s, skolem, t));
}

#[test]
fn all_inclusive_enumerates_distinct_witnesses() {
    // v ≠ x admits witnesses on both sides; later rounds rule out the
    // witnesses of earlier ones, and the join still entails T
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let v = tm.mk_var("v", Sort::Int);
    let t = tm.mk_ne(v, x);
    let s = tm.mk_true();

    let sol = all_inclusive_with_vars(&mut tm, s, t, vec![v], checked()).unwrap();
    assert_eq!(sol.validity, Validity::Valid);
    let skolem = sol.skolem.unwrap();
    assert!(entails(&mut tm, s, skolem, t));
}

#[test]
fn chained_definitions_resolve_without_cycles() {
    // v1 = x, v2 = v1 + 1: substitution closes the pair
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let v1 = tm.mk_var("v1", Sort::Int);
    let v2 = tm.mk_var("v2", Sort::Int);
    let one = tm.mk_int(1);
    let v1p1 = tm.mk_add(vec![v1, one]);
    let d1 = tm.mk_eq(v1, x);
    let d2 = tm.mk_eq(v2, v1p1);
    let t = tm.mk_and(vec![d1, d2]);
    let s = tm.mk_true();

    let sol = solve_with_vars(&mut tm, s, t, vec![v1, v2], checked()).unwrap();
    assert_eq!(sol.validity, Validity::Valid);
    let skolem = sol.skolem.unwrap();
    assert!(entails(&mut tm, s, skolem, t));
}

#[test]
fn skolem_extraction_is_deterministic() {
    let run = || {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let v1 = tm.mk_var("v1", Sort::Int);
        let v2 = tm.mk_var("v2", Sort::Int);
        let one = tm.mk_int(1);
        let v2p1 = tm.mk_add(vec![v2, one]);
        let lo = tm.mk_ge(v1, x);
        let link = tm.mk_le(v1, v2p1);
        let anchor = tm.mk_ge(v2, x);
        let t = tm.mk_and(vec![lo, link, anchor]);
        let s = tm.mk_true();
        let sol = solve_with_vars(&mut tm, s, t, vec![v1, v2], checked()).unwrap();
        let rendered = sol.skolem.map(|sk| tm.display(sk).to_string());
        (sol.validity, sol.partitions, rendered)
    };

    let (val1, parts1, sk1) = run();
    let (val2, parts2, sk2) = run();
    assert_eq!(val1, val2);
    assert_eq!(parts1, parts2);
    assert_eq!(sk1, sk2);
}

#[test]
fn backend_agrees_with_engine_on_satisfiable_subset() {
    // an invalid pair still leaves a satisfiable valid subset when
    // witnesses exist somewhere
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let v = tm.mk_var("v", Sort::Int);
    let ten = tm.mk_int(10);
    let def = tm.mk_eq(v, x);
    let cap = tm.mk_lt(v, ten);
    let t = tm.mk_and(vec![def, cap]);
    let s = tm.mk_true();

    let sol = solve_with_vars(&mut tm, s, t, vec![v], checked()).unwrap();
    assert_eq!(sol.validity, Validity::Invalid);
    assert_eq!(is_sat(&mut tm, sol.valid_subset), SatResult::Sat);
}

#[test]
fn relational_witness_stays_within_its_partition() {
    // ∀x. ∃v. (x = 2 ∧ 2v = x) ∨ (x ≠ 2 ∧ v = 0); the even-x case
    // forces an auxiliary-variable witness, whose side constraint must
    // not rule out the odd-x case
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let v = tm.mk_var("v", Sort::Int);
    let two = tm.mk_int(2);
    let zero = tm.mk_int(0);
    let x_is_two = tm.mk_eq(x, two);
    let twov = tm.mk_mul(two, v);
    let halved = tm.mk_eq(twov, x);
    let b1 = tm.mk_and2(x_is_two, halved);
    let x_not_two = tm.mk_ne(x, two);
    let v_zero = tm.mk_eq(v, zero);
    let b2 = tm.mk_and2(x_not_two, v_zero);
    let t = tm.mk_or(vec![b1, b2]);
    let s = tm.mk_true();

    let sol = solve_with_vars(&mut tm, s, t, vec![v], checked()).unwrap();
    assert_eq!(sol.validity, Validity::Valid);
    let skolem = sol.skolem.unwrap();
    assert!(entails(&mut tm, s, skolem, t));
    // the relation still admits every x outside the auxiliary's case
    let three = tm.mk_int(3);
    let x_is_three = tm.mk_eq(x, three);
    let at_three = tm.mk_and(vec![skolem, x_is_three]);
    assert_eq!(is_sat(&mut tm, at_three), SatResult::Sat);
    let at_two = tm.mk_and(vec![skolem, x_is_two]);
    assert_eq!(is_sat(&mut tm, at_two), SatResult::Sat);
}

#[test]
fn counterexample_assigns_every_shared_variable() {
    // ∀x. ∃v. v < x ∧ v > x is invalid; x never reaches the backend,
    // so the reported model falls back to its sort default
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", Sort::Int);
    let v = tm.mk_var("v", Sort::Int);
    let below = tm.mk_lt(v, x);
    let above = tm.mk_gt(v, x);
    let t = tm.mk_and(vec![below, above]);
    let s = tm.mk_true();

    let sol = solve_with_vars(&mut tm, s, t, vec![v], checked()).unwrap();
    assert_eq!(sol.validity, Validity::Invalid);
    let cex = sol.counterexample.unwrap();
    assert!(cex.value(x).is_some());
    assert_eq!(cex.eval_bool(&tm, s), Some(true));
}

#[test]
fn excluded_values_are_avoided() {
    // ∀. ∃v. v ≠ 0 ∧ v ≠ 1; the extracted witness must dodge both
    let mut tm = TermManager::new();
    let v = tm.mk_var("v", Sort::Int);
    let zero = tm.mk_int(0);
    let one = tm.mk_int(1);
    let n0 = tm.mk_ne(v, zero);
    let n1 = tm.mk_ne(v, one);
    let t = tm.mk_and(vec![n0, n1]);
    let s = tm.mk_true();

    let sol = solve_with_vars(&mut tm, s, t, vec![v], checked()).unwrap();
    assert_eq!(sol.validity, Validity::Valid);
    let skolem = sol.skolem.unwrap();
    assert!(entails(&mut tm, s, skolem, t));
    let v_zero = tm.mk_eq(v, zero);
    let at_zero = tm.mk_and(vec![skolem, v_zero]);
    assert_eq!(is_sat(&mut tm, at_zero), SatResult::Unsat);
    let v_one = tm.mk_eq(v, one);
    let at_one = tm.mk_and(vec![skolem, v_one]);
    assert_eq!(is_sat(&mut tm, at_one), SatResult::Unsat);
}

#[test]
fn definition_chain_resolves_both_variables() {
    // ∀. ∃a, b. a = b + 1 ∧ b = 2; the mined definitions chain to
    // concrete values
    let mut tm = TermManager::new();
    let a = tm.mk_var("a", Sort::Int);
    let b = tm.mk_var("b", Sort::Int);
    let one = tm.mk_int(1);
    let two = tm.mk_int(2);
    let bp1 = tm.mk_add(vec![b, one]);
    let d1 = tm.mk_eq(a, bp1);
    let d2 = tm.mk_eq(b, two);
    let t = tm.mk_and(vec![d1, d2]);
    let s = tm.mk_true();

    let sol = solve_with_vars(&mut tm, s, t, vec![a, b], checked()).unwrap();
    assert_eq!(sol.validity, Validity::Valid);
    let skolem = sol.skolem.unwrap();
    assert!(entails(&mut tm, s, skolem, t));
    let three = tm.mk_int(3);
    let a_three = tm.mk_eq(a, three);
    let b_two = tm.mk_eq(b, two);
    let expected = tm.mk_and(vec![a_three, b_two]);
    assert!(implies(&mut tm, skolem, expected));
}
