pub mod check;
pub mod config;
pub mod dialect;
pub mod error;
pub mod model;
mod plan;
mod resequence;
pub mod store;
pub mod value;

#[cfg(test)]
mod lib_tests;

use crate::check::IntegrityReport;
use crate::config::{CounterResetPolicy, ReseqConfig};
use crate::error::{CounterResetError, ReseqError};
use crate::model::SequencedTable;
use crate::store::RowStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterResetStatus {
    Reset { max_id: i64 },
    Skipped,
    Failed(CounterResetError),
}

/// Outcome of a completed fix. `counter_reset` carries the downgraded
/// counter failure, if any; a failed reset never fails the fix itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixReport {
    pub table: String,
    pub rows: usize,
    pub moved: usize,
    pub remapped_references: u64,
    pub counter_reset: CounterResetStatus,
}

impl FixReport {
    pub fn changed(&self) -> bool {
        self.moved > 0
    }
}

/// ID integrity and resequencing engine over an explicitly injected row
/// store. One engine instance serves any number of tables; all table
/// specifics travel through [`SequencedTable`] descriptors.
pub struct ReseqEngine<S> {
    store: S,
    config: ReseqConfig,
}

impl<S: RowStore> ReseqEngine<S> {
    pub fn new(store: S, config: ReseqConfig) -> Result<Self, ReseqError> {
        validate_config(&config)?;
        info!(
            max_snapshot_rows = config.max_snapshot_rows,
            counter_reset = ?config.counter_reset,
            "resequencing engine ready"
        );
        Ok(Self { store, config })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ReseqConfig {
        &self.config
    }

    /// Read-only check: does sorting by the ordering key yield ids 1..N?
    /// Ties on the ordering key are broken by the primary key, matching the
    /// order a fix would apply.
    pub async fn check_integrity(
        &self,
        table: &SequencedTable,
    ) -> Result<IntegrityReport, ReseqError> {
        table.validate()?;
        let keys = self
            .store
            .read_keys(&table.table, &table.primary_key, &table.ordering_key)
            .await?;
        if keys.len() > self.config.max_snapshot_rows {
            return Err(ReseqError::SnapshotLimitExceeded {
                rows: keys.len(),
                max_rows: self.config.max_snapshot_rows,
            });
        }
        let report = check::build_report(&table.table, &keys);
        debug!(
            table = %table.table,
            total_rows = report.total_rows,
            issues = report.issues.len(),
            "integrity check complete"
        );
        Ok(report)
    }

    /// Renumbers the table to a contiguous 1..N sequence and rewrites every
    /// dependent foreign key, then realigns the auto-increment counter.
    /// Already-contiguous and empty tables short-circuit to a no-op.
    pub async fn fix_ids(&self, table: &SequencedTable) -> Result<FixReport, ReseqError> {
        table.validate()?;
        let outcome = resequence::resequence(&self.store, table, &self.config).await?;
        let counter_reset = if outcome.moved == 0
            || self.config.counter_reset == CounterResetPolicy::Skip
        {
            CounterResetStatus::Skipped
        } else {
            match self
                .store
                .reset_counter(&table.table, &table.primary_key, outcome.max_assigned)
                .await
            {
                Ok(()) => CounterResetStatus::Reset {
                    max_id: outcome.max_assigned,
                },
                Err(err) => {
                    warn!(
                        table = %table.table,
                        error = %err,
                        "counter reset failed; verify the next auto-assigned id before relying on it"
                    );
                    CounterResetStatus::Failed(CounterResetError {
                        table: table.table.clone(),
                        detail: err.to_string(),
                    })
                }
            }
        };
        info!(
            table = %table.table,
            rows = outcome.rows,
            moved = outcome.moved,
            remapped_references = outcome.remapped_references,
            "fix complete"
        );
        Ok(FixReport {
            table: table.table.clone(),
            rows: outcome.rows,
            moved: outcome.moved,
            remapped_references: outcome.remapped_references,
            counter_reset,
        })
    }
}

fn validate_config(config: &ReseqConfig) -> Result<(), ReseqError> {
    if config.max_snapshot_rows == 0 {
        return Err(ReseqError::InvalidConfig {
            message: "max_snapshot_rows must be at least 1".to_string(),
        });
    }
    Ok(())
}
