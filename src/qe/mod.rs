//! Quantifier Elimination and Skolemization.
//!
//! The [`AeSolver`] decides `∀s. S ⟹ ∃v. T` by model-based projection
//! and, for valid formulas, extracts a Skolem relation. The drivers in
//! this module add the usual front-end conveniences: inferring the
//! variable split from the two formula parts, and iterating the solver
//! to cover formulas whose witnesses need several rounds.

pub mod mbp;
pub mod skolem;
pub mod solver;
pub mod witness;

pub use solver::{AeSolver, Partition, Validity};
pub use witness::SkolemScope;

use crate::ast::traversal::collect_vars;
use crate::ast::{TermId, TermManager};
use crate::config::AeConfig;
use crate::error::{Error, Result};
use crate::model::Model;
use crate::sort::Sort;
use crate::stats::AeStats;
use rustc_hash::FxHashSet;
use tracing::info;

/// Outcome bundle of a driver run.
#[derive(Debug, Clone)]
pub struct AeSolution {
    /// The verdict.
    pub validity: Validity,
    /// Number of partitions the loop produced.
    pub partitions: usize,
    /// Skolem relation, present when the formula is valid and
    /// skolemization was requested.
    pub skolem: Option<TermId>,
    /// The subset of S on which a witness exists.
    pub valid_subset: TermId,
    /// A model of S with no witness, present when invalid.
    pub counterexample: Option<Model>,
    /// Counters accumulated over the run.
    pub stats: AeStats,
}

/// Synthesis variables of an AE-pair: the variables of T that do not
/// appear in S.
pub fn infer_synthesis_vars(tm: &TermManager, s: TermId, t: TermId) -> Vec<TermId> {
    let s_vars: FxHashSet<TermId> = collect_vars(tm, s).into_iter().collect();
    collect_vars(tm, t)
        .into_iter()
        .filter(|v| !s_vars.contains(v))
        .collect()
}

/// Decide `∀s. S ⟹ ∃v. T` and extract a Skolem relation when valid.
/// The variable split is inferred from the two parts: every variable
/// of T absent from S is treated as existential.
pub fn solve_and_skolemize(
    tm: &mut TermManager,
    s: TermId,
    t: TermId,
    cfg: AeConfig,
) -> Result<AeSolution> {
    let v = infer_synthesis_vars(tm, s, t);
    solve_with_vars(tm, s, t, v, cfg)
}

/// Decide `∀s. S ⟹ ∃v. T` with an explicit existential prefix.
pub fn solve_with_vars(
    tm: &mut TermManager,
    s: TermId,
    t: TermId,
    v: Vec<TermId>,
    cfg: AeConfig,
) -> Result<AeSolution> {
    let mut ae = AeSolver::new(tm, s, t, v, cfg);
    let validity = ae.solve(tm)?;
    info!(
        target: "forallex",
        ?validity,
        partitions = ae.partitions().len(),
        "ae query decided"
    );
    let skolem = if validity == Validity::Valid && cfg.skolemize {
        Some(ae.skolem_function(tm)?)
    } else {
        None
    };
    Ok(AeSolution {
        validity,
        partitions: ae.partitions().len(),
        skolem,
        valid_subset: ae.valid_subset(tm),
        counterexample: ae.counterexample().cloned(),
        stats: ae.stats().clone(),
    })
}

/// Iterate the solver over successively constrained copies of T, joining
/// the per-round Skolem relations under an integer selector variable.
/// Each round rules out the witnesses of the previous one, so the
/// combined relation enumerates distinct witnesses per round.
pub fn all_inclusive_skolem(
    tm: &mut TermManager,
    s: TermId,
    t: TermId,
    cfg: AeConfig,
) -> Result<AeSolution> {
    let v = infer_synthesis_vars(tm, s, t);
    all_inclusive_with_vars(tm, s, t, v, cfg)
}

/// [`all_inclusive_skolem`] with an explicit existential prefix.
pub fn all_inclusive_with_vars(
    tm: &mut TermManager,
    s: TermId,
    t: TermId,
    v: Vec<TermId>,
    cfg: AeConfig,
) -> Result<AeSolution> {
    let mut t_cur = t;
    let mut skolems: Vec<TermId> = Vec::new();
    let mut partitions = 0;
    let mut stats = AeStats::default();

    loop {
        let round_cfg = AeConfig {
            skolemize: true,
            ..cfg
        };
        let mut ae = AeSolver::new(tm, s, t_cur, v.clone(), round_cfg);
        let validity = ae.solve(tm)?;
        partitions += ae.partitions().len();
        match validity {
            Validity::Valid => {
                let sk = ae.skolem_function(tm)?;
                stats.merge(ae.stats());
                skolems.push(sk);
                if ae.partitions().is_empty() {
                    break;
                }
                let constr = ae.skolem_constraints_for(tm, 0);
                let neg = tm.mk_not(constr);
                t_cur = tm.mk_and2(t_cur, neg);
            }
            _ if skolems.is_empty() => {
                stats.merge(ae.stats());
                return Ok(AeSolution {
                    validity,
                    partitions,
                    skolem: None,
                    valid_subset: ae.valid_subset(tm),
                    counterexample: ae.counterexample().cloned(),
                    stats,
                });
            }
            _ => {
                stats.merge(ae.stats());
                break;
            }
        }
    }

    let Some((&base, earlier)) = skolems.split_last() else {
        return Err(Error::Invariant("no skolem round completed".into()));
    };
    let mut combined = base;
    if !earlier.is_empty() {
        let selector = tm.mk_fresh_var("fx!round", Sort::Int);
        for (i, &sk) in earlier.iter().enumerate().rev() {
            let tag = tm.mk_int(i as i64);
            let here = tm.mk_eq(selector, tag);
            combined = tm.mk_ite(here, sk, combined);
        }
    }
    Ok(AeSolution {
        validity: Validity::Valid,
        partitions,
        skolem: Some(combined),
        // the first round already covered the whole of S
        valid_subset: s,
        counterexample: None,
        stats,
    })
}
