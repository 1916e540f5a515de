/// Whether a successful fix realigns the backend's auto-increment counter.
///
/// `Skip` is for backends that recompute their counter from the live rows
/// and need no explicit realignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterResetPolicy {
    #[default]
    Reset,
    Skip,
}

/// Runtime configuration for a resequencing engine.
#[derive(Debug, Clone)]
pub struct ReseqConfig {
    /// Upper bound on the number of rows a check or fix will snapshot.
    /// Both the snapshot and the renumber plan are materialized in memory.
    pub max_snapshot_rows: usize,
    pub counter_reset: CounterResetPolicy,
}

impl Default for ReseqConfig {
    fn default() -> Self {
        Self {
            max_snapshot_rows: 100_000,
            counter_reset: CounterResetPolicy::Reset,
        }
    }
}

impl ReseqConfig {
    /// Uncapped profile for offline maintenance jobs where the table size
    /// is already known to be manageable.
    pub fn permissive() -> Self {
        Self {
            max_snapshot_rows: usize::MAX,
            ..Self::default()
        }
    }

    pub fn with_counter_reset(mut self, policy: CounterResetPolicy) -> Self {
        self.counter_reset = policy;
        self
    }
}
