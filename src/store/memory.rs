use crate::error::StorageError;
use crate::store::{ExecuteOutcome, KeyRow, RowStore, StoreTransaction, TableSnapshot};
use crate::value::{Row, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<String>,
    pub primary_key: String,
}

impl TableDef {
    pub fn new(name: impl Into<String>, columns: &[&str], primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            primary_key: primary_key.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForeignKeyDef {
    pub table: String,
    pub column: String,
    pub references: String,
}

impl ForeignKeyDef {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        references: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            references: references.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct MemTable {
    columns: Vec<String>,
    pk_index: usize,
    rows: Vec<Row>,
    /// High-water mark of assigned ids. Explicit inserts raise it but never
    /// lower it, which is exactly how a stale counter survives a compaction
    /// until `reset_counter` realigns it.
    counter: i64,
}

#[derive(Debug, Clone, Default)]
struct MemState {
    tables: HashMap<String, MemTable>,
    foreign_keys: Vec<ForeignKeyDef>,
}

impl MemState {
    fn table(&self, name: &str) -> Result<&MemTable, StorageError> {
        self.tables.get(name).ok_or_else(|| StorageError::TableNotFound {
            table: name.to_string(),
        })
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable, StorageError> {
        self.tables.get_mut(name).ok_or_else(|| StorageError::TableNotFound {
            table: name.to_string(),
        })
    }

    fn column_index(&self, table: &str, column: &str) -> Result<usize, StorageError> {
        self.table(table)?
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| StorageError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })
    }

    fn primary_ids(&self, table: &str) -> Result<HashSet<i64>, StorageError> {
        let t = self.table(table)?;
        Ok(t.rows
            .iter()
            .filter_map(|row| row.values[t.pk_index].as_i64())
            .collect())
    }

    fn check_row_references(&self, table: &str, row: &Row) -> Result<(), StorageError> {
        for fk in self.foreign_keys.iter().filter(|fk| fk.table == table) {
            let idx = self.column_index(table, &fk.column)?;
            if let Some(value) = row.values[idx].as_i64() {
                if !self.primary_ids(&fk.references)?.contains(&value) {
                    return Err(StorageError::ForeignKeyViolation {
                        table: table.to_string(),
                        column: fk.column.clone(),
                        value,
                    });
                }
            }
        }
        Ok(())
    }

    fn check_all_references(&self) -> Result<(), StorageError> {
        for fk in &self.foreign_keys {
            let idx = self.column_index(&fk.table, &fk.column)?;
            let parents = self.primary_ids(&fk.references)?;
            for row in &self.table(&fk.table)?.rows {
                if let Some(value) = row.values[idx].as_i64() {
                    if !parents.contains(&value) {
                        return Err(StorageError::ForeignKeyViolation {
                            table: fk.table.clone(),
                            column: fk.column.clone(),
                            value,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn check_no_inbound_references(&self, parent: &str) -> Result<(), StorageError> {
        let parent_ids = self.primary_ids(parent)?;
        for fk in self.foreign_keys.iter().filter(|fk| fk.references == parent) {
            let idx = self.column_index(&fk.table, &fk.column)?;
            for row in &self.table(&fk.table)?.rows {
                if let Some(value) = row.values[idx].as_i64() {
                    if parent_ids.contains(&value) {
                        return Err(StorageError::ForeignKeyViolation {
                            table: fk.table.clone(),
                            column: fk.column.clone(),
                            value,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn ordered_row_indices(
        &self,
        table: &str,
        ordering_key: &str,
        primary_key: &str,
    ) -> Result<(usize, usize, Vec<usize>), StorageError> {
        let oidx = self.column_index(table, ordering_key)?;
        let pidx = self.column_index(table, primary_key)?;
        let t = self.table(table)?;
        let mut order: Vec<usize> = (0..t.rows.len()).collect();
        order.sort_by(|a, b| {
            t.rows[*a].values[oidx]
                .cmp(&t.rows[*b].values[oidx])
                .then_with(|| t.rows[*a].values[pidx].cmp(&t.rows[*b].values[pidx]))
        });
        Ok((oidx, pidx, order))
    }
}

/// In-memory reference backend. A transaction holds the store-wide lock for
/// its whole lifetime, so isolation is trivially exclusive; rollback restores
/// an undo image taken at begin, including when the handle is dropped without
/// an explicit commit or rollback.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_table(&self, def: TableDef) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        if state.tables.contains_key(&def.name) {
            return Err(StorageError::TableExists { table: def.name });
        }
        let pk_index = def
            .columns
            .iter()
            .position(|c| *c == def.primary_key)
            .ok_or_else(|| StorageError::UnknownColumn {
                table: def.name.clone(),
                column: def.primary_key.clone(),
            })?;
        state.tables.insert(
            def.name,
            MemTable {
                columns: def.columns,
                pk_index,
                rows: Vec::new(),
                counter: 0,
            },
        );
        Ok(())
    }

    pub async fn add_foreign_key(&self, fk: ForeignKeyDef) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state.column_index(&fk.table, &fk.column)?;
        state.table(&fk.references)?;
        state.foreign_keys.push(fk);
        Ok(())
    }

    /// Current rows of a table, in insertion order.
    pub async fn rows(&self, table: &str) -> Result<Vec<Row>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.table(table)?.rows.clone())
    }

    /// Current auto-increment high-water mark of a table.
    pub async fn counter(&self, table: &str) -> Result<i64, StorageError> {
        let state = self.state.lock().await;
        Ok(state.table(table)?.counter)
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemState>,
    undo: Option<Box<MemState>>,
    deferred: bool,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if let Some(undo) = self.undo.take() {
            *self.guard = *undo;
        }
    }
}

impl RowStore for MemoryStore {
    type Tx<'a>
        = MemoryTransaction
    where
        Self: 'a;

    async fn read_keys(
        &self,
        table: &str,
        primary_key: &str,
        ordering_key: &str,
    ) -> Result<Vec<KeyRow>, StorageError> {
        let state = self.state.lock().await;
        let (oidx, pidx, order) = state.ordered_row_indices(table, ordering_key, primary_key)?;
        let t = state.table(table)?;
        order
            .into_iter()
            .map(|i| {
                let row = &t.rows[i];
                let id = row.values[pidx].as_i64().ok_or_else(|| StorageError::TypeMismatch {
                    table: table.to_string(),
                    column: primary_key.to_string(),
                    expected: "Integer",
                    actual: row.values[pidx].kind(),
                })?;
                Ok(KeyRow {
                    id,
                    ordering: row.values[oidx].clone(),
                })
            })
            .collect()
    }

    async fn count_rows(&self, table: &str) -> Result<u64, StorageError> {
        let state = self.state.lock().await;
        Ok(state.table(table)?.rows.len() as u64)
    }

    async fn begin(&self) -> Result<Self::Tx<'_>, StorageError> {
        let guard = self.state.clone().lock_owned().await;
        let undo = Box::new(guard.clone());
        Ok(MemoryTransaction {
            guard,
            undo: Some(undo),
            deferred: false,
        })
    }

    async fn reset_counter(
        &self,
        table: &str,
        _primary_key: &str,
        max_id: i64,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state.table_mut(table)?.counter = max_id;
        Ok(())
    }
}

impl StoreTransaction for MemoryTransaction {
    async fn defer_constraints(&mut self) -> Result<(), StorageError> {
        self.deferred = true;
        Ok(())
    }

    async fn snapshot(
        &mut self,
        table: &str,
        ordering_key: &str,
        primary_key: &str,
    ) -> Result<TableSnapshot, StorageError> {
        let (_, _, order) = self.guard.ordered_row_indices(table, ordering_key, primary_key)?;
        let t = self.guard.table(table)?;
        Ok(TableSnapshot {
            columns: t.columns.clone(),
            rows: order.into_iter().map(|i| t.rows[i].clone()).collect(),
        })
    }

    async fn delete_all(&mut self, table: &str) -> Result<u64, StorageError> {
        if !self.deferred {
            self.guard.check_no_inbound_references(table)?;
        }
        let t = self.guard.table_mut(table)?;
        let count = t.rows.len() as u64;
        t.rows.clear();
        Ok(count)
    }

    async fn insert(
        &mut self,
        table: &str,
        columns: &[String],
        row: &Row,
    ) -> Result<ExecuteOutcome, StorageError> {
        let t = self.guard.table(table)?;
        if columns != t.columns.as_slice() {
            return Err(StorageError::InvalidStatement {
                message: format!("column list does not match table '{table}'"),
            });
        }
        if row.values.len() != t.columns.len() {
            return Err(StorageError::InvalidStatement {
                message: format!(
                    "expected {} values for table '{table}', got {}",
                    t.columns.len(),
                    row.values.len()
                ),
            });
        }
        let pk_index = t.pk_index;
        let id = match &row.values[pk_index] {
            Value::Integer(id) => *id,
            Value::Null => t.counter + 1,
            other => {
                return Err(StorageError::TypeMismatch {
                    table: table.to_string(),
                    column: t.columns[pk_index].clone(),
                    expected: "Integer",
                    actual: other.kind(),
                });
            }
        };
        // Applies to assigned ids too: a counter that was reset below the
        // live maximum makes the next natural insert collide here.
        if self.guard.primary_ids(table)?.contains(&id) {
            return Err(StorageError::DuplicateKey {
                table: table.to_string(),
                key: id,
            });
        }
        let mut stored = row.clone();
        stored.values[pk_index] = Value::Integer(id);
        if !self.deferred {
            self.guard.check_row_references(table, &stored)?;
        }
        let t = self.guard.table_mut(table)?;
        t.counter = t.counter.max(id);
        t.rows.push(stored);
        Ok(ExecuteOutcome {
            affected: 1,
            inserted_id: Some(id),
        })
    }

    async fn remap_column(
        &mut self,
        table: &str,
        column: &str,
        old_id: i64,
        new_id: i64,
    ) -> Result<u64, StorageError> {
        let idx = self.guard.column_index(table, column)?;
        let t = self.guard.table_mut(table)?;
        let mut affected = 0;
        for row in &mut t.rows {
            if row.values[idx].as_i64() == Some(old_id) {
                row.values[idx] = Value::Integer(new_id);
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn commit(mut self) -> Result<(), StorageError> {
        if self.deferred {
            // Deferred checks run now; a violation leaves the undo image in
            // place so Drop restores the pre-transaction state.
            self.guard.check_all_references()?;
        }
        self.undo = None;
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StorageError> {
        if let Some(undo) = self.undo.take() {
            *self.guard = *undo;
        }
        Ok(())
    }
}
