//! Engine Configuration.

/// Knobs of one [`crate::qe::AeSolver`] run.
#[derive(Debug, Clone, Copy)]
pub struct AeConfig {
    /// Record local witnesses during projection and allow Skolem
    /// extraction afterwards.
    pub skolemize: bool,
    /// Minimize the case split of the final Skolem relation.
    pub compact: bool,
    /// Verify `S ∧ R ⟹ T` after building the relation and fail loudly on
    /// violation. Intended for tests; costs extra SMT queries.
    pub sanity_checks: bool,
}

impl Default for AeConfig {
    fn default() -> Self {
        Self {
            skolemize: true,
            compact: false,
            sanity_checks: false,
        }
    }
}

impl AeConfig {
    /// Validity checking only; no witness bookkeeping.
    #[must_use]
    pub fn validity_only() -> Self {
        Self {
            skolemize: false,
            compact: false,
            sanity_checks: false,
        }
    }
}
