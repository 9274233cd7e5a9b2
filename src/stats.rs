//! Engine Statistics.

/// Counters accumulated over one engine run.
#[derive(Debug, Clone, Default)]
pub struct AeStats {
    /// Partitions produced by the solve loop.
    pub partitions: usize,
    /// Satisfiability checks issued to the backend.
    pub smt_checks: usize,
    /// Variables eliminated by model-value fallback instead of bound
    /// resolution.
    pub projection_fallbacks: usize,
    /// Auxiliary variables introduced by witness extraction.
    pub aux_vars: usize,
    /// Compaction oracle runs (recursive sub-solves).
    pub compaction_probes: usize,
}

impl AeStats {
    /// Fold another run's counters into this one.
    pub fn merge(&mut self, other: &AeStats) {
        self.partitions += other.partitions;
        self.smt_checks += other.smt_checks;
        self.projection_fallbacks += other.projection_fallbacks;
        self.aux_vars += other.aux_vars;
        self.compaction_probes += other.compaction_probes;
    }
}
