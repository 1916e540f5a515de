pub mod memory;
pub mod sql;

use crate::error::StorageError;
use crate::value::{Row, Value};
use serde::{Deserialize, Serialize};

/// One `(primary_key, ordering_key)` pair from an ordered key scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRow {
    pub id: i64,
    pub ordering: Value,
}

/// Full-row snapshot of a table, in the order the scan produced it. The
/// order is authoritative for the rest of the operation that took it.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSnapshot {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl TableSnapshot {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecuteOutcome {
    pub affected: u64,
    pub inserted_id: Option<i64>,
}

/// Minimal row store capability the engine is generic over. Implementations
/// are handed in explicitly; the engine never reaches for an ambient
/// connection.
#[allow(async_fn_in_trait)]
pub trait RowStore {
    type Tx<'a>: StoreTransaction
    where
        Self: 'a;

    /// Consistent ordered read of `(primary_key, ordering_key)` pairs,
    /// sorted by the ordering key ascending with the primary key as the
    /// stable tie-break. Takes no lock beyond the read itself.
    async fn read_keys(
        &self,
        table: &str,
        primary_key: &str,
        ordering_key: &str,
    ) -> Result<Vec<KeyRow>, StorageError>;

    async fn count_rows(&self, table: &str) -> Result<u64, StorageError>;

    /// Opens an exclusive transaction. The handle must guarantee release on
    /// every exit path: explicit commit, explicit rollback, or rollback when
    /// the handle is dropped without either.
    async fn begin(&self) -> Result<Self::Tx<'_>, StorageError>;

    /// Realigns the backend's auto-increment counter so the next natural
    /// insert receives `max_id + 1`. The primary key name is needed by
    /// backends that locate the counter through the key's sequence.
    async fn reset_counter(
        &self,
        table: &str,
        primary_key: &str,
        max_id: i64,
    ) -> Result<(), StorageError>;
}

#[allow(async_fn_in_trait)]
pub trait StoreTransaction {
    /// Suspends referential-integrity enforcement until commit, where the
    /// constraints are re-verified. Required because resequencing transiently
    /// breaks every foreign key pointing at the table being renumbered.
    async fn defer_constraints(&mut self) -> Result<(), StorageError>;

    async fn snapshot(
        &mut self,
        table: &str,
        ordering_key: &str,
        primary_key: &str,
    ) -> Result<TableSnapshot, StorageError>;

    async fn delete_all(&mut self, table: &str) -> Result<u64, StorageError>;

    /// Inserts a row, honoring an explicit integer primary key even on a
    /// nominally auto-increment column. A `Null` primary key value asks the
    /// backend to assign the next counter value.
    async fn insert(
        &mut self,
        table: &str,
        columns: &[String],
        row: &Row,
    ) -> Result<ExecuteOutcome, StorageError>;

    /// Rewrites `column = old_id` to `column = new_id` across the table,
    /// returning the number of rows touched.
    async fn remap_column(
        &mut self,
        table: &str,
        column: &str,
        old_id: i64,
        new_id: i64,
    ) -> Result<u64, StorageError>;

    async fn commit(self) -> Result<(), StorageError>
    where
        Self: Sized;

    async fn rollback(self) -> Result<(), StorageError>
    where
        Self: Sized;
}
