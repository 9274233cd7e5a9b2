//! AE-Validity by Model-Based Partitioning.
//!
//! Decides formulas of the shape `∀s. S(s) ⟹ ∃v. T(s, v)`. The S-part
//! is asserted once; as long as some of it remains uncovered, a model of
//! the remainder together with the T-part drives one projection step,
//! and the negated projection shrinks the remainder. The loop ends with
//! the whole of S covered (valid), with a region of S admitting no
//! witness (invalid), or with an undecided background query (unknown).
//!
//! ## References
//!
//! - Fedyukovich, Gurfinkel, Sharygina: "Automated discovery of
//!   simulation between programs" (the AE-VAL decision procedure)

use crate::ast::rewrite::conjuncts;
use crate::ast::traversal::{collect_vars, occurs_in};
use crate::ast::{TermId, TermKind, TermManager};
use crate::config::AeConfig;
use crate::error::{Error, Result};
use crate::model::Model;
use crate::qe::mbp;
use crate::qe::witness::SkolemScope;
use crate::smt::{simplify_ite, SatResult, Solver};
use crate::sort::Sort;
use crate::stats::AeStats;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

/// Outcome of an AE-validity query. `Unknown` propagates an undecided
/// background query and is never coerced into either verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Every model of S extends to a model of T.
    Valid,
    /// Some model of S admits no witness.
    Invalid,
    /// The background solver could not decide a query on the way.
    Unknown,
}

/// One partition produced by the projection loop.
#[derive(Debug, Clone)]
pub struct Partition {
    /// Projection of T onto the universal variables, true under the
    /// model that produced it.
    pub projection: TermId,
    /// Per synthesis variable, the literals that constrained it.
    pub constraints: FxHashMap<TermId, TermId>,
    /// Per synthesis variable, its model value as an equality.
    pub evals: FxHashMap<TermId, TermId>,
}

/// The AE-validity and Skolemization engine.
#[derive(Debug)]
pub struct AeSolver {
    pub(crate) s: TermId,
    pub(crate) t: TermId,
    pub(crate) v: Vec<TermId>,
    pub(crate) s_vars: Vec<TermId>,
    pub(crate) cfg: AeConfig,
    pub(crate) smt: Solver,
    pub(crate) partitions: Vec<Partition>,
    pub(crate) verdict: Option<Validity>,
    pub(crate) model_invalid: Option<Model>,
    /// Acyclic definitions mined from T, closed under each other.
    pub(crate) defs: FxHashMap<TermId, TermId>,
    pub(crate) scope: SkolemScope,
    pub(crate) stats: AeStats,
    /// Per synthesis variable, one constraint per partition. Filled by
    /// Skolem extraction.
    pub(crate) skolem_constraints: FxHashMap<TermId, Vec<TermId>>,
}

impl AeSolver {
    /// Set up a solver for `∀s. S ⟹ ∃v. T` with an explicit variable
    /// split. Definitions of synthesis variables are mined from the
    /// top-level conjuncts of T up front.
    pub fn new(
        tm: &mut TermManager,
        s: TermId,
        t: TermId,
        v: Vec<TermId>,
        cfg: AeConfig,
    ) -> Self {
        let vset: FxHashSet<TermId> = v.iter().copied().collect();
        let mut s_vars = collect_vars(tm, s);
        for var in collect_vars(tm, t) {
            if !vset.contains(&var) {
                s_vars.push(var);
            }
        }
        s_vars.sort_unstable();
        s_vars.dedup();

        let defs = mine_definitions(tm, t, &v, &s_vars, &vset);

        Self {
            s,
            t,
            v,
            s_vars,
            cfg,
            smt: Solver::new(),
            partitions: Vec::new(),
            verdict: None,
            model_invalid: None,
            defs,
            scope: SkolemScope::new(),
            stats: AeStats::default(),
            skolem_constraints: FxHashMap::default(),
        }
    }

    /// Set up a solver for a closed formula `∃v. T`, the universal part
    /// being trivially true.
    pub fn for_formula(tm: &mut TermManager, t: TermId, v: Vec<TermId>, cfg: AeConfig) -> Self {
        let s = tm.mk_true();
        Self::new(tm, s, t, v, cfg)
    }

    fn check(&mut self, tm: &mut TermManager) -> SatResult {
        self.stats.smt_checks += 1;
        self.smt.check(tm)
    }

    /// Run the partitioning loop to a verdict.
    pub fn solve(&mut self, tm: &mut TermManager) -> Result<Validity> {
        self.smt.reset();
        self.smt.assert_term(self.s);
        match self.check(tm) {
            SatResult::Unsat => {
                // no model of S at all
                return self.finish(tm, Validity::Valid);
            }
            SatResult::Unknown => return self.finish(tm, Validity::Unknown),
            SatResult::Sat => {
                self.model_invalid = self.smt.model().cloned();
            }
        }

        if self.v.is_empty() {
            // plain implication check
            let nt = tm.mk_not(self.t);
            self.smt.assert_term(nt);
            return match self.check(tm) {
                SatResult::Unsat => self.finish(tm, Validity::Valid),
                SatResult::Sat => {
                    self.model_invalid = self.smt.model().cloned();
                    self.finish(tm, Validity::Invalid)
                }
                SatResult::Unknown => self.finish(tm, Validity::Unknown),
            };
        }

        self.smt.push();
        self.smt.assert_term(self.t);

        loop {
            match self.check(tm) {
                SatResult::Unknown => return self.finish(tm, Validity::Unknown),
                SatResult::Unsat => {
                    // the uncovered region of S admits no witness
                    return self.finish(tm, Validity::Invalid);
                }
                SatResult::Sat => {}
            }
            let model = self.smt.model().cloned().ok_or(Error::NoModel)?;
            let projected = mbp::project(tm, &model, self.t, &self.v, &mut self.stats)?;
            if self.cfg.sanity_checks {
                for &var in &self.v {
                    if occurs_in(tm, projected.projection, var) {
                        return Err(Error::Invariant(
                            "projection mentions a synthesis variable".into(),
                        ));
                    }
                }
            }
            debug!(
                target: "forallex::solver",
                partition = self.partitions.len(),
                projection = %tm.display(projected.projection),
                "new partition"
            );
            self.partitions.push(Partition {
                projection: projected.projection,
                constraints: projected.constraints,
                evals: projected.evals,
            });
            self.stats.partitions += 1;

            self.smt.pop();
            let np = tm.mk_not(projected.projection);
            self.smt.assert_term(np);
            match self.check(tm) {
                SatResult::Unsat => return self.finish(tm, Validity::Valid),
                SatResult::Unknown => return self.finish(tm, Validity::Unknown),
                SatResult::Sat => {
                    // keep a model in case the formula turns out invalid
                    self.model_invalid = self.smt.model().cloned();
                }
            }
            self.smt.push();
            self.smt.assert_term(self.t);
        }
    }

    fn finish(&mut self, tm: &TermManager, verdict: Validity) -> Result<Validity> {
        if verdict == Validity::Invalid {
            // the backend only assigns variables it had to reason about
            if let Some(m) = self.model_invalid.as_mut() {
                m.complete(tm, &self.s_vars);
            }
        }
        self.verdict = Some(verdict);
        Ok(verdict)
    }

    /// Verdict of the last [`AeSolver::solve`] call.
    #[must_use]
    pub fn verdict(&self) -> Option<Validity> {
        self.verdict
    }

    /// Partitions discovered so far.
    #[must_use]
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Counters accumulated over the run.
    #[must_use]
    pub fn stats(&self) -> &AeStats {
        &self.stats
    }

    /// The subset of S covered by the discovered projections. Equivalent
    /// to S itself when the formula is valid, and false when no
    /// partition was produced.
    pub fn valid_subset(&self, tm: &mut TermManager) -> TermId {
        if self.partitions.is_empty() {
            return tm.mk_false();
        }
        let cover = tm.mk_or(self.partitions.iter().map(|p| p.projection).collect());
        tm.mk_and(vec![self.s, cover])
    }

    /// A model of S admitting no witness, kept when the verdict is
    /// invalid.
    #[must_use]
    pub fn counterexample(&self) -> Option<&Model> {
        if self.verdict == Some(Validity::Invalid) {
            self.model_invalid.as_ref()
        } else {
            None
        }
    }

    /// Conjunction of the per-variable constraints of partition `i`.
    /// Populated by Skolem extraction.
    pub fn skolem_constraints_for(&self, tm: &mut TermManager, i: usize) -> TermId {
        let parts: Vec<TermId> = self
            .skolem_constraints
            .values()
            .filter_map(|per_part| per_part.get(i).copied())
            .collect();
        tm.mk_and(parts)
    }
}

/// Mine `v = e` shapes (and bare boolean literals) from the top-level
/// conjuncts of T, then close the resulting definitions under each
/// other. Definitions still entangled with other synthesis variables
/// stay out and are resolved later by cycle breaking.
fn mine_definitions(
    tm: &mut TermManager,
    t: TermId,
    v: &[TermId],
    s_vars: &[TermId],
    vset: &FxHashSet<TermId>,
) -> FxHashMap<TermId, TermId> {
    let mut tconjs = conjuncts(tm, t);
    let mut used: FxHashSet<TermId> = FxHashSet::default();
    let mut defs: FxHashMap<TermId, TermId> = FxHashMap::default();

    // boolean literals first; an equality on an already-defined boolean
    // contributes its other side as a derived conjunct
    for &var in v {
        if tm.sort(var) != Sort::Bool {
            continue;
        }
        let mut def = None;
        for &cnj in &tconjs {
            if used.contains(&cnj) {
                continue;
            }
            if cnj == var {
                def = Some(tm.mk_true());
                used.insert(cnj);
            } else if matches!(*tm.kind(cnj), TermKind::Not(a) if a == var) {
                def = Some(tm.mk_false());
                used.insert(cnj);
            }
        }
        let mut derived = Vec::new();
        for &cnj in &tconjs {
            if used.contains(&cnj) {
                continue;
            }
            if let TermKind::Eq(a, b) = *tm.kind(cnj) {
                let other = if a == var {
                    Some(b)
                } else if b == var {
                    Some(a)
                } else {
                    None
                };
                if let Some(other) = other {
                    used.insert(cnj);
                    match def {
                        None => {
                            def = Some(other);
                            break;
                        }
                        Some(d) => {
                            let fact = if tm.is_true(d) { other } else { tm.mk_not(other) };
                            derived.extend(conjuncts(tm, fact));
                        }
                    }
                }
            }
        }
        tconjs.extend(derived);
        if let Some(d) = def {
            let d = simplify_ite(tm, d);
            defs.insert(var, d);
        }
    }

    // numeric equalities, preferring one grounded in the universals
    for &var in v {
        if defs.contains_key(&var) {
            continue;
        }
        let mut candidates = Vec::new();
        for &cnj in &tconjs {
            if used.contains(&cnj) {
                continue;
            }
            if let TermKind::Eq(a, b) = *tm.kind(cnj) {
                if a == var && !occurs_in(tm, b, var) {
                    candidates.push((cnj, b));
                } else if b == var && !occurs_in(tm, a, var) {
                    candidates.push((cnj, a));
                }
            }
        }
        let chosen = candidates
            .iter()
            .rev()
            .find(|(_, e)| s_vars.iter().any(|&sv| occurs_in(tm, *e, sv)))
            .or_else(|| candidates.first())
            .copied();
        if let Some((cnj, e)) = chosen {
            used.insert(cnj);
            let e = simplify_ite(tm, e);
            defs.insert(var, e);
        }
    }

    let mut cyclic = FxHashMap::default();
    split_defs(tm, &mut defs, &mut cyclic, vset);
    // cyclic definitions are dropped here; Skolem combination breaks
    // cycles among the per-partition assignments instead
    defs
}

/// Separate definitions into those free of synthesis variables (closing
/// them under each other) and the cyclic remainder.
pub(crate) fn split_defs(
    tm: &mut TermManager,
    defs: &mut FxHashMap<TermId, TermId>,
    cyclic: &mut FxHashMap<TermId, TermId>,
    vset: &FxHashSet<TermId>,
) {
    let mut resolved_count = usize::MAX;
    loop {
        let mut resolved = Vec::new();
        let mut pending = Vec::new();
        for (&var, &def) in defs.iter() {
            if vset.iter().any(|&v| occurs_in(tm, def, v)) {
                pending.push(var);
            } else {
                resolved.push(var);
            }
        }
        if resolved.len() == resolved_count || pending.is_empty() {
            for var in pending {
                if let Some(def) = defs.remove(&var) {
                    cyclic.insert(var, def);
                }
            }
            return;
        }
        resolved_count = resolved.len();
        for &rv in &resolved {
            let by = defs[&rv];
            let keys: Vec<TermId> = defs.keys().copied().collect();
            for key in keys {
                if key == rv {
                    continue;
                }
                let cur = defs[&key];
                if occurs_in(tm, cur, rv) {
                    let updated = crate::ast::traversal::substitute_one(tm, cur, rv, by);
                    defs.insert(key, updated);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_pair(tm: &mut TermManager) -> (TermId, TermId) {
        let x = tm.mk_var("x", Sort::Int);
        let v = tm.mk_var("v", Sort::Int);
        (x, v)
    }

    #[test]
    fn test_valid_interval() {
        // ∀x. ∃v. x < v ∧ v < x + 2
        let mut tm = TermManager::new();
        let (x, v) = int_pair(&mut tm);
        let two = tm.mk_int(2);
        let upper = tm.mk_add(vec![x, two]);
        let a1 = tm.mk_gt(v, x);
        let a2 = tm.mk_lt(v, upper);
        let t = tm.mk_and(vec![a1, a2]);
        let s = tm.mk_true();
        let mut ae = AeSolver::new(&mut tm, s, t, vec![v], AeConfig::default());
        assert_eq!(ae.solve(&mut tm).unwrap(), Validity::Valid);
        assert_eq!(ae.partitions().len(), 1);
    }

    #[test]
    fn test_invalid_empty_interval() {
        // ∀x. ∃v. v < x ∧ v > x
        let mut tm = TermManager::new();
        let (x, v) = int_pair(&mut tm);
        let a1 = tm.mk_lt(v, x);
        let a2 = tm.mk_gt(v, x);
        let t = tm.mk_and(vec![a1, a2]);
        let s = tm.mk_true();
        let mut ae = AeSolver::new(&mut tm, s, t, vec![v], AeConfig::default());
        assert_eq!(ae.solve(&mut tm).unwrap(), Validity::Invalid);
        assert!(ae.counterexample().is_some());
        let vs = ae.valid_subset(&mut tm);
        assert!(tm.is_false(vs));
    }

    #[test]
    fn test_vacuous_validity() {
        // unsatisfiable S validates anything
        let mut tm = TermManager::new();
        let (x, v) = int_pair(&mut tm);
        let zero = tm.mk_int(0);
        let a1 = tm.mk_lt(x, zero);
        let a2 = tm.mk_gt(x, zero);
        let s = tm.mk_and(vec![a1, a2]);
        let t = tm.mk_eq(v, x);
        let mut ae = AeSolver::new(&mut tm, s, t, vec![v], AeConfig::default());
        assert_eq!(ae.solve(&mut tm).unwrap(), Validity::Valid);
        assert_eq!(ae.partitions().len(), 0);
    }

    #[test]
    fn test_empty_synthesis_vars_is_implication() {
        let mut tm = TermManager::new();
        let (x, _) = int_pair(&mut tm);
        let zero = tm.mk_int(0);
        let one = tm.mk_int(1);
        let s = tm.mk_gt(x, one);
        let t = tm.mk_gt(x, zero);
        let mut ae = AeSolver::new(&mut tm, s, t, vec![], AeConfig::default());
        assert_eq!(ae.solve(&mut tm).unwrap(), Validity::Valid);

        let mut ae = AeSolver::new(&mut tm, t, s, vec![], AeConfig::default());
        assert_eq!(ae.solve(&mut tm).unwrap(), Validity::Invalid);
        assert!(ae.counterexample().is_some());
    }

    #[test]
    fn test_partial_validity_subset() {
        // ∃v. v ≥ 0 ∧ v = x holds exactly on x ≥ 0
        let mut tm = TermManager::new();
        let (x, v) = int_pair(&mut tm);
        let zero = tm.mk_int(0);
        let def = tm.mk_eq(v, x);
        let pos = tm.mk_ge(v, zero);
        let t = tm.mk_and(vec![def, pos]);
        let s = tm.mk_true();
        let mut ae = AeSolver::new(&mut tm, s, t, vec![v], AeConfig::default());
        assert_eq!(ae.solve(&mut tm).unwrap(), Validity::Invalid);
        let subset = ae.valid_subset(&mut tm);
        let xpos = tm.mk_ge(x, zero);
        assert!(crate::smt::is_equiv(&mut tm, subset, xpos));
    }

    #[test]
    fn test_definition_mining() {
        let mut tm = TermManager::new();
        let (x, v) = int_pair(&mut tm);
        let one = tm.mk_int(1);
        let xp1 = tm.mk_add(vec![x, one]);
        let def = tm.mk_eq(v, xp1);
        let zero = tm.mk_int(0);
        let side = tm.mk_ge(x, zero);
        let t = tm.mk_and(vec![def, side]);
        let s = tm.mk_true();
        let ae = AeSolver::new(&mut tm, s, t, vec![v], AeConfig::default());
        assert_eq!(ae.defs.get(&v), Some(&xp1));
    }

    #[test]
    fn test_cyclic_definitions_dropped() {
        // v1 = v2 + 1 and v2 = v1 - 1 define neither outright
        let mut tm = TermManager::new();
        let one = tm.mk_int(1);
        let v1 = tm.mk_var("v1", Sort::Int);
        let v2 = tm.mk_var("v2", Sort::Int);
        let v2p1 = tm.mk_add(vec![v2, one]);
        let v1m1 = tm.mk_sub(v1, one);
        let d1 = tm.mk_eq(v1, v2p1);
        let d2 = tm.mk_eq(v2, v1m1);
        let t = tm.mk_and(vec![d1, d2]);
        let s = tm.mk_true();
        let ae = AeSolver::new(&mut tm, s, t, vec![v1, v2], AeConfig::default());
        assert!(ae.defs.is_empty());
    }

    #[test]
    fn test_chained_definitions_close() {
        // v2 = x and v1 = v2 + 1 resolve to v1 = x + 1
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", Sort::Int);
        let v1 = tm.mk_var("v1", Sort::Int);
        let v2 = tm.mk_var("v2", Sort::Int);
        let one = tm.mk_int(1);
        let v2p1 = tm.mk_add(vec![v2, one]);
        let d1 = tm.mk_eq(v1, v2p1);
        let d2 = tm.mk_eq(v2, x);
        let t = tm.mk_and(vec![d1, d2]);
        let s = tm.mk_true();
        let ae = AeSolver::new(&mut tm, s, t, vec![v1, v2], AeConfig::default());
        let xp1 = tm.mk_add(vec![x, one]);
        assert_eq!(ae.defs.get(&v1), Some(&xp1));
        assert_eq!(ae.defs.get(&v2), Some(&x));
    }
}
