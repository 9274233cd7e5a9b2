//! Skolem Relation Assembly.
//!
//! Combines the per-partition witness constraints discovered by the
//! projection loop into one closed-form relation over the universal
//! variables. Variables whose constraint is identical across partitions
//! get an unconditional definition; the rest are assembled into a
//! conditional cascade guarded by the projections. Mutually dependent
//! witnesses are untangled by substitution, with a model value breaking
//! any genuine cycle. The optional compaction pass probes subsets of
//! partitions with recursive validity queries to shrink the cascade.

use crate::ast::rewrite::conjuncts;
use crate::ast::traversal::{collect_vars, occurs_in, substitute_one, term_size};
use crate::ast::{TermId, TermKind, TermManager};
use crate::config::AeConfig;
use crate::error::{Error, Result};
use crate::qe::solver::{split_defs, AeSolver, Validity};
use crate::qe::witness::assignment_for_var;
use crate::smt::{implies, is_equiv, simplify_ite};
use crate::sort::Sort;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;
use tracing::debug;

impl AeSolver {
    /// Build the Skolem relation for a valid formula. Conjoining the
    /// result with S must entail T; with sanity checks enabled this is
    /// verified before returning.
    pub fn skolem_function(&mut self, tm: &mut TermManager) -> Result<TermId> {
        let compact = self.cfg.compact;
        let n = self.partitions.len();
        let vset: FxHashSet<TermId> = self.v.iter().copied().collect();

        if n == 0 {
            // vacuously valid: any total assignment works
            let vars = self.v.clone();
            let mut parts = Vec::with_capacity(vars.len());
            for var in vars {
                let rhs = match self.defs.get(&var).copied() {
                    Some(d) => d,
                    None => {
                        let sort = tm.sort(var);
                        tm.default_value(sort)
                    }
                };
                parts.push(tm.mk_eq(var, rhs));
            }
            let base = tm.mk_and(parts);
            let scope = self.scope.to_term(tm);
            return Ok(tm.mk_and2(base, scope));
        }

        // fill one constraint per variable and partition
        self.skolem_constraints.clear();
        let mut eligible: Vec<TermId> = Vec::new();
        let mut sensitive: Vec<TermId> = Vec::new();
        for var in self.v.clone() {
            let mut elig = compact;
            let mut per_part = Vec::with_capacity(n);
            for i in 0..n {
                let filled = self.fill_constraint(tm, var, i)?;
                elig &= count_v_vars(tm, filled, &vset) == 1;
                per_part.push(filled);
            }
            if elig {
                eligible.push(var);
            } else {
                sensitive.push(var);
            }
            self.skolem_constraints.insert(var, per_part);
        }

        // variables constrained identically everywhere are unconditional
        let mut same_assms: FxHashMap<TermId, TermId> = FxHashMap::default();
        let mut uncond: Vec<TermId> = Vec::new();
        for &var in &eligible {
            let per_part = self.skolem_constraints[&var].clone();
            if per_part.iter().all(|&c| c == per_part[0]) {
                let w = assignment_for_var(tm, var, per_part[0], &mut self.scope, &mut self.stats)?;
                same_assms.insert(var, w);
                let eq = tm.mk_eq(var, w);
                uncond.push(eq);
            } else {
                sensitive.push(var);
            }
        }

        if !sensitive.is_empty() {
            let eligible_set: FxHashSet<TermId> = eligible.iter().copied().collect();
            let mut inds: FxHashMap<TermId, BTreeSet<usize>> = FxHashMap::default();
            for &var in &sensitive {
                let mut best = BTreeSet::new();
                if compact && eligible_set.contains(&var) {
                    let per_part = self.skolem_constraints[&var].clone();
                    let all: BTreeSet<usize> = (0..n).collect();
                    self.search_downwards(tm, var, &per_part, &all, &mut best)?;
                    let seed = best.clone();
                    self.search_upwards(tm, var, &per_part, &seed, &mut best)?;
                }
                inds.insert(var, best);
            }

            // partitions every sensitive variable can share
            let mut intersect: BTreeSet<usize> = (0..n)
                .filter(|i| inds.values().all(|set| set.contains(i)))
                .collect();
            if intersect.len() <= 1 {
                let mut largest = 0;
                let mut max_size = 0;
                for (i, p) in self.partitions.iter().enumerate() {
                    let sz = term_size(tm, p.projection);
                    if sz > max_size {
                        max_size = sz;
                        largest = i;
                    }
                }
                intersect = BTreeSet::from([largest]);
            }
            debug!(
                target: "forallex::skolem",
                shared = intersect.len(),
                total = n,
                "conditional cascade base"
            );

            let base_guard = {
                let parts: Vec<TermId> = intersect
                    .iter()
                    .map(|&i| self.partitions[i].projection)
                    .collect();
                tm.mk_or(parts)
            };
            let mut all_assms = same_assms.clone();
            let mark = self.scope.mark();
            for &var in &sensitive {
                let mut cnjs = Vec::new();
                for &i in &intersect {
                    cnjs.extend(conjuncts(tm, self.skolem_constraints[&var][i]));
                }
                cnjs.sort_unstable();
                cnjs.dedup();
                let c = tm.mk_and(cnjs);
                let w = assignment_for_var(tm, var, c, &mut self.scope, &mut self.stats)?;
                all_assms.insert(var, w);
            }
            self.scope.guard_since(tm, mark, base_guard);
            let first = *intersect
                .iter()
                .next()
                .ok_or_else(|| Error::Invariant("no base partition for the cascade".into()))?;
            let first_evals = self.partitions[first].evals.clone();
            let mut big = combine_assignments(tm, &vset, &sensitive, all_assms, &first_evals)?;

            for i in 0..n {
                if intersect.contains(&i) {
                    continue;
                }
                let guard = self.partitions[i].projection;
                let mut assms = same_assms.clone();
                let mark = self.scope.mark();
                for &var in &sensitive {
                    let c = self.skolem_constraints[&var][i];
                    let w = assignment_for_var(tm, var, c, &mut self.scope, &mut self.stats)?;
                    assms.insert(var, w);
                }
                self.scope.guard_since(tm, mark, guard);
                let evals = self.partitions[i].evals.clone();
                let branch = combine_assignments(tm, &vset, &sensitive, assms, &evals)?;
                big = tm.mk_ite(guard, branch, big);
                if compact {
                    big = simplify_ite(tm, big);
                }
            }
            uncond.push(big);
        }

        let base = tm.mk_and(uncond);
        let scope = self.scope.to_term(tm);
        let skol = tm.mk_and2(base, scope);

        if self.cfg.sanity_checks {
            let lhs = tm.mk_and2(self.s, skol);
            if !implies(tm, lhs, self.t) {
                return Err(Error::Invariant(
                    "skolem relation does not entail the T-part".into(),
                ));
            }
        }
        Ok(skol)
    }

    /// The constraint of `var` in partition `i`, with the fallback
    /// chain: mined definition, projected literals, conditional
    /// definition from T, model value, sort default.
    fn fill_constraint(&mut self, tm: &mut TermManager, var: TermId, i: usize) -> Result<TermId> {
        if let Some(&d) = self.defs.get(&var) {
            return Ok(tm.mk_eq(var, d));
        }

        let existing = self.partitions[i]
            .constraints
            .get(&var)
            .copied()
            .filter(|&c| !tm.is_true(c));
        let filled = match existing {
            Some(c) => c,
            None => {
                let mut pre = vec![self.scope.to_term(tm)];
                for (&other, &c) in &self.partitions[i].constraints {
                    if other != var && !tm.is_true(c) {
                        pre.push(c);
                    }
                }
                pre.push(self.t);
                let pre = tm.mk_and(pre);
                match self.cond_definition(tm, var, pre) {
                    Some(eq) => eq,
                    None => match self.partitions[i].evals.get(&var).copied() {
                        Some(eval) => eval,
                        None => {
                            let sort = tm.sort(var);
                            let d = tm.default_value(sort);
                            tm.mk_eq(var, d)
                        }
                    },
                }
            }
        };

        // a boolean constraint equivalent to a constant collapses
        if self.cfg.compact && tm.sort(var) == Sort::Bool {
            if let TermKind::Eq(a, b) = *tm.kind(filled) {
                let rhs = if a == var { b } else { a };
                let tt = tm.mk_true();
                if is_equiv(tm, rhs, tt) {
                    return Ok(tm.mk_eq(var, tt));
                }
                let ff = tm.mk_false();
                if is_equiv(tm, rhs, ff) {
                    return Ok(tm.mk_eq(var, ff));
                }
            }
        }
        Ok(filled)
    }

    /// An equality on `var` buried anywhere in T that is implied by the
    /// partition context. The largest such equality wins.
    fn cond_definition(&self, tm: &mut TermManager, var: TermId, pre: TermId) -> Option<TermId> {
        let mut candidates = Vec::new();
        let mut stack = vec![self.t];
        let mut seen = FxHashSet::default();
        while let Some(cur) = stack.pop() {
            if !seen.insert(cur) {
                continue;
            }
            if let TermKind::Eq(a, b) = *tm.kind(cur) {
                let other = if a == var {
                    Some(b)
                } else if b == var {
                    Some(a)
                } else {
                    None
                };
                if let Some(other) = other {
                    let clean = self
                        .v
                        .iter()
                        .all(|&w| w == var || !occurs_in(tm, other, w));
                    if clean && !occurs_in(tm, other, var) {
                        candidates.push(cur);
                    }
                }
            }
            crate::ast::traversal::for_each_child(tm.kind(cur), |c| stack.push(c));
        }

        let mut best: Option<TermId> = None;
        let mut best_size = 0;
        for eq in candidates {
            let tt = tm.mk_true();
            if is_equiv(tm, eq, tt) {
                continue;
            }
            if !implies(tm, pre, eq) {
                continue;
            }
            let sz = term_size(tm, eq);
            if sz > best_size {
                best_size = sz;
                best = Some(eq);
            }
        }
        best
    }

    /// Shrink a set of partitions while one witness still covers its
    /// disjoined projections; grow it back one partition at a time.
    fn search_downwards(
        &mut self,
        tm: &mut TermManager,
        var: TermId,
        per_part: &[TermId],
        indexes: &BTreeSet<usize>,
        best: &mut BTreeSet<usize>,
    ) -> Result<()> {
        if indexes.is_empty() {
            return Ok(());
        }
        let (verdict, subset) = self.probe(tm, var, per_part, indexes)?;
        match verdict {
            Validity::Valid => {
                if best.len() < indexes.len() {
                    *best = indexes.clone();
                }
                Ok(())
            }
            Validity::Unknown => Ok(()),
            Validity::Invalid => {
                if tm.is_false(subset) {
                    return Ok(());
                }
                let kept: BTreeSet<usize> = indexes
                    .iter()
                    .copied()
                    .filter(|&i| {
                        let pr = self.partitions[i].projection;
                        implies(tm, subset, pr)
                    })
                    .collect();
                if kept.len() < indexes.len() {
                    self.search_downwards(tm, var, per_part, &kept, best)
                } else {
                    for &j in indexes {
                        let mut smaller = indexes.clone();
                        smaller.remove(&j);
                        self.search_downwards(tm, var, per_part, &smaller, best)?;
                    }
                    Ok(())
                }
            }
        }
    }

    fn search_upwards(
        &mut self,
        tm: &mut TermManager,
        var: TermId,
        per_part: &[TermId],
        indexes: &BTreeSet<usize>,
        best: &mut BTreeSet<usize>,
    ) -> Result<()> {
        let (verdict, _) = self.probe(tm, var, per_part, indexes)?;
        if verdict != Validity::Valid {
            return Ok(());
        }
        if best.len() < indexes.len() {
            *best = indexes.clone();
        }
        for i in 0..self.partitions.len() {
            if indexes.contains(&i) {
                continue;
            }
            let mut bigger = indexes.clone();
            bigger.insert(i);
            self.search_upwards(tm, var, per_part, &bigger, best)?;
        }
        Ok(())
    }

    /// One recursive validity query: do the chosen constraints witness
    /// `var` over the union of the chosen projections?
    fn probe(
        &mut self,
        tm: &mut TermManager,
        var: TermId,
        per_part: &[TermId],
        indexes: &BTreeSet<usize>,
    ) -> Result<(Validity, TermId)> {
        self.stats.compaction_probes += 1;
        let pre: Vec<TermId> = indexes
            .iter()
            .map(|&i| self.partitions[i].projection)
            .collect();
        let post: Vec<TermId> = indexes.iter().map(|&i| per_part[i]).collect();
        let pre = tm.mk_or(pre);
        let post = tm.mk_and(post);
        let mut ae = AeSolver::new(tm, pre, post, vec![var], AeConfig::validity_only());
        let verdict = ae.solve(tm)?;
        let subset = ae.valid_subset(tm);
        Ok((verdict, subset))
    }
}

/// Close the witness map under itself and emit `var = witness` for every
/// conditional variable. A genuine cycle is broken by pinning the most
/// referenced variable to its model value.
fn combine_assignments(
    tm: &mut TermManager,
    vset: &FxHashSet<TermId>,
    sensitive: &[TermId],
    mut all: FxHashMap<TermId, TermId>,
    evals: &FxHashMap<TermId, TermId>,
) -> Result<TermId> {
    let mut cyclic = FxHashMap::default();
    split_defs(tm, &mut all, &mut cyclic, vset);
    break_cyclic_substs(tm, vset, &mut cyclic, evals, &mut all)?;

    let mut parts = Vec::with_capacity(sensitive.len());
    for &var in sensitive {
        let w = all
            .get(&var)
            .copied()
            .ok_or_else(|| Error::Invariant("missing witness for a synthesis variable".into()))?;
        debug_assert!(
            vset.iter().all(|&v| !occurs_in(tm, w, v)),
            "combined witness still mentions a synthesis variable"
        );
        parts.push(tm.mk_eq(var, w));
    }
    Ok(tm.mk_and(parts))
}

fn break_cyclic_substs(
    tm: &mut TermManager,
    vset: &FxHashSet<TermId>,
    cyclic: &mut FxHashMap<TermId, TermId>,
    evals: &FxHashMap<TermId, TermId>,
    out: &mut FxHashMap<TermId, TermId>,
) -> Result<()> {
    if cyclic.is_empty() {
        return Ok(());
    }

    // most referenced among the entangled variables, smallest id on ties
    let keys: Vec<TermId> = cyclic.keys().copied().collect();
    let mut pick = None;
    let mut pick_count = 0usize;
    for &var in &keys {
        let count = cyclic
            .values()
            .filter(|&&def| occurs_in(tm, def, var))
            .count();
        let better = match pick {
            None => true,
            Some(p) => count > pick_count || (count == pick_count && var < p),
        };
        if better {
            pick = Some(var);
            pick_count = count;
        }
    }
    let pick = pick.ok_or(Error::CyclicDefinitions)?;
    let value = evals
        .get(&pick)
        .and_then(|&eq| eval_rhs(tm, pick, eq))
        .ok_or(Error::CyclicDefinitions)?;

    cyclic.remove(&pick);
    out.insert(pick, value);
    for (var, def) in cyclic.drain() {
        let updated = substitute_one(tm, def, pick, value);
        out.insert(var, updated);
    }
    let mut rest = FxHashMap::default();
    split_defs(tm, out, &mut rest, vset);
    *cyclic = rest;
    break_cyclic_substs(tm, vset, cyclic, evals, out)
}

/// The value side of a `var = value` equality.
fn eval_rhs(tm: &TermManager, var: TermId, eq: TermId) -> Option<TermId> {
    match *tm.kind(eq) {
        TermKind::Eq(a, b) if a == var => Some(b),
        TermKind::Eq(a, b) if b == var => Some(a),
        _ => None,
    }
}

fn count_v_vars(tm: &TermManager, t: TermId, vset: &FxHashSet<TermId>) -> usize {
    collect_vars(tm, t)
        .into_iter()
        .filter(|v| vset.contains(v))
        .count()
}
