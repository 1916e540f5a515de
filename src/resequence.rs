use crate::config::ReseqConfig;
use crate::error::{ReseqError, Stage, StorageError};
use crate::model::SequencedTable;
use crate::plan::RenumberPlan;
use crate::store::{RowStore, StoreTransaction, TableSnapshot};
use crate::value::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResequenceOutcome {
    pub rows: usize,
    pub moved: usize,
    pub remapped_references: u64,
    pub max_assigned: i64,
}

/// Renumbers `table` so sorting by the ordering key yields ids 1..N, and
/// rewrites every dependent foreign key to match, inside one exclusive
/// transaction. The row order is re-derived from a fresh snapshot rather
/// than trusted from an earlier check, so a racing write between check and
/// fix cannot skew the ranks.
pub(crate) async fn resequence<S: RowStore>(
    store: &S,
    table: &SequencedTable,
    config: &ReseqConfig,
) -> Result<ResequenceOutcome, ReseqError> {
    let rows = store.count_rows(&table.table).await? as usize;
    if rows == 0 {
        debug!(table = %table.table, "resequence: empty table, nothing to fix");
        return Ok(ResequenceOutcome {
            rows: 0,
            moved: 0,
            remapped_references: 0,
            max_assigned: 0,
        });
    }
    if rows > config.max_snapshot_rows {
        return Err(ReseqError::SnapshotLimitExceeded {
            rows,
            max_rows: config.max_snapshot_rows,
        });
    }

    let mut tx = store
        .begin()
        .await
        .map_err(|e| ReseqError::resequence(Stage::Snapshot, e))?;
    match apply(&mut tx, table).await {
        Ok(Applied::Noop { rows }) => {
            // Nothing was written; release the transaction without churn.
            tx.rollback().await.map_err(ReseqError::Storage)?;
            debug!(table = %table.table, rows, "resequence: ids already contiguous");
            Ok(ResequenceOutcome {
                rows,
                moved: 0,
                remapped_references: 0,
                max_assigned: rows as i64,
            })
        }
        Ok(Applied::Renumbered {
            rows,
            moved,
            remapped_references,
        }) => {
            tx.commit()
                .await
                .map_err(|e| ReseqError::resequence(Stage::Commit, e))?;
            Ok(ResequenceOutcome {
                rows,
                moved,
                remapped_references,
                max_assigned: rows as i64,
            })
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(
                    table = %table.table,
                    error = %rollback_err,
                    "rollback failed after resequence error"
                );
            }
            Err(err)
        }
    }
}

enum Applied {
    Noop {
        rows: usize,
    },
    Renumbered {
        rows: usize,
        moved: usize,
        remapped_references: u64,
    },
}

async fn apply<T: StoreTransaction>(
    tx: &mut T,
    table: &SequencedTable,
) -> Result<Applied, ReseqError> {
    tx.defer_constraints()
        .await
        .map_err(|e| ReseqError::resequence(Stage::Snapshot, e))?;

    let snapshot = tx
        .snapshot(&table.table, &table.ordering_key, &table.primary_key)
        .await
        .map_err(|e| ReseqError::resequence(Stage::Snapshot, e))?;
    let pk_index = snapshot
        .column_index(&table.primary_key)
        .ok_or_else(|| {
            ReseqError::resequence(
                Stage::Snapshot,
                StorageError::UnknownColumn {
                    table: table.table.clone(),
                    column: table.primary_key.clone(),
                },
            )
        })?;
    let old_ids = snapshot_ids(table, &snapshot, pk_index)
        .map_err(|e| ReseqError::resequence(Stage::Snapshot, e))?;
    let plan = RenumberPlan::from_ordered_ids(&table.table, &old_ids)
        .map_err(|e| ReseqError::resequence(Stage::Snapshot, e))?;
    if plan.is_noop() {
        return Ok(Applied::Noop {
            rows: snapshot.rows.len(),
        });
    }
    let moved = plan.moves().count();
    debug!(
        table = %table.table,
        rows = snapshot.rows.len(),
        moved,
        "resequence: renumbering"
    );

    tx.delete_all(&table.table)
        .await
        .map_err(|e| ReseqError::resequence(Stage::Delete, e))?;

    for (index, row) in snapshot.rows.iter().enumerate() {
        let mut reinserted = row.clone();
        reinserted.values[pk_index] = Value::Integer(index as i64 + 1);
        tx.insert(&table.table, &snapshot.columns, &reinserted)
            .await
            .map_err(|e| ReseqError::resequence(Stage::Reinsert, e))?;
    }

    let mut remapped_references = 0u64;
    for dep in &table.dependents {
        // Phase one parks every moving reference in the staged range so a
        // later mapping cannot capture rows an earlier one just rewrote.
        for entry in plan.moves() {
            remapped_references += tx
                .remap_column(
                    &dep.table,
                    &dep.column,
                    entry.old_id,
                    plan.staged(entry.new_id),
                )
                .await
                .map_err(|e| ReseqError::resequence(Stage::DependentUpdate, e))?;
        }
        for entry in plan.moves() {
            tx.remap_column(
                &dep.table,
                &dep.column,
                plan.staged(entry.new_id),
                entry.new_id,
            )
            .await
            .map_err(|e| ReseqError::resequence(Stage::DependentUpdate, e))?;
        }
    }

    Ok(Applied::Renumbered {
        rows: snapshot.rows.len(),
        moved,
        remapped_references,
    })
}

fn snapshot_ids(
    table: &SequencedTable,
    snapshot: &TableSnapshot,
    pk_index: usize,
) -> Result<Vec<i64>, StorageError> {
    snapshot
        .rows
        .iter()
        .map(|row| {
            let value = row.values.get(pk_index).ok_or_else(|| {
                StorageError::InvalidStatement {
                    message: format!(
                        "snapshot row of table '{}' is shorter than its column list",
                        table.table
                    ),
                }
            })?;
            value.as_i64().ok_or_else(|| StorageError::TypeMismatch {
                table: table.table.clone(),
                column: table.primary_key.clone(),
                expected: "Integer",
                actual: value.kind(),
            })
        })
        .collect()
}
