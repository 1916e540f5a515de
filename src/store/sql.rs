use crate::dialect::SqlDialect;
use crate::error::StorageError;
use crate::store::{ExecuteOutcome, KeyRow, RowStore, StoreTransaction, TableSnapshot};
use crate::value::{Row, Value};
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Minimal execution capability a SQL client must provide. This is the seam
/// where a SQLite or PostgreSQL driver plugs in; the driver itself stays
/// outside this crate.
#[allow(async_fn_in_trait)]
pub trait SqlExecutor {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryOutput, StorageError>;
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, StorageError>;
}

/// Row store over a single SQL connection. All dialect branching is resolved
/// at statement-render time through [`SqlDialect`]; the executor only ever
/// sees finished SQL text and positional parameters.
pub struct SqlRowStore<E> {
    dialect: SqlDialect,
    executor: Mutex<E>,
}

impl<E: SqlExecutor> SqlRowStore<E> {
    pub fn new(dialect: SqlDialect, executor: E) -> Self {
        Self {
            dialect,
            executor: Mutex::new(executor),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn into_executor(self) -> E {
        self.executor.into_inner()
    }
}

impl<E: SqlExecutor> RowStore for SqlRowStore<E> {
    type Tx<'a>
        = SqlTransaction<'a, E>
    where
        Self: 'a;

    async fn read_keys(
        &self,
        table: &str,
        primary_key: &str,
        ordering_key: &str,
    ) -> Result<Vec<KeyRow>, StorageError> {
        let sql = self.dialect.key_scan_sql(table, primary_key, ordering_key);
        let mut executor = self.executor.lock().await;
        let output = executor.query(&sql, &[]).await?;
        output
            .rows
            .into_iter()
            .map(|row| key_row_from(table, primary_key, row))
            .collect()
    }

    async fn count_rows(&self, table: &str) -> Result<u64, StorageError> {
        let sql = self.dialect.count_sql(table);
        let mut executor = self.executor.lock().await;
        let output = executor.query(&sql, &[]).await?;
        let count = output
            .rows
            .first()
            .and_then(|row| row.values.first())
            .and_then(Value::as_i64)
            .ok_or_else(|| StorageError::Backend {
                message: format!("count query for table '{table}' returned no integer"),
            })?;
        u64::try_from(count).map_err(|_| StorageError::Backend {
            message: format!("count query for table '{table}' returned {count}"),
        })
    }

    async fn begin(&self) -> Result<Self::Tx<'_>, StorageError> {
        let mut executor = self.executor.lock().await;
        executor.execute(self.dialect.begin_sql(), &[]).await?;
        Ok(SqlTransaction {
            executor,
            dialect: self.dialect,
            open: true,
        })
    }

    async fn reset_counter(
        &self,
        table: &str,
        primary_key: &str,
        max_id: i64,
    ) -> Result<(), StorageError> {
        let (sql, params) = self.dialect.reset_counter_stmt(table, primary_key, max_id);
        let mut executor = self.executor.lock().await;
        match self.dialect {
            SqlDialect::Sqlite => {
                executor.execute(&sql, &params).await?;
            }
            SqlDialect::Postgres => {
                executor.query(&sql, &params).await?;
            }
        }
        Ok(())
    }
}

pub struct SqlTransaction<'a, E: SqlExecutor> {
    executor: MutexGuard<'a, E>,
    dialect: SqlDialect,
    open: bool,
}

impl<E: SqlExecutor> Drop for SqlTransaction<'_, E> {
    fn drop(&mut self) {
        if self.open {
            // The connection still holds an open transaction; the executor
            // must roll it back before the connection is reused.
            warn!("sql transaction dropped without commit or rollback");
        }
    }
}

impl<E: SqlExecutor> StoreTransaction for SqlTransaction<'_, E> {
    async fn defer_constraints(&mut self) -> Result<(), StorageError> {
        self.executor
            .execute(self.dialect.defer_constraints_sql(), &[])
            .await?;
        Ok(())
    }

    async fn snapshot(
        &mut self,
        table: &str,
        ordering_key: &str,
        primary_key: &str,
    ) -> Result<TableSnapshot, StorageError> {
        let sql = self.dialect.snapshot_sql(table, ordering_key, primary_key);
        let output = self.executor.query(&sql, &[]).await?;
        Ok(TableSnapshot {
            columns: output.columns,
            rows: output.rows,
        })
    }

    async fn delete_all(&mut self, table: &str) -> Result<u64, StorageError> {
        let sql = self.dialect.delete_all_sql(table);
        self.executor.execute(&sql, &[]).await
    }

    async fn insert(
        &mut self,
        table: &str,
        columns: &[String],
        row: &Row,
    ) -> Result<ExecuteOutcome, StorageError> {
        if row.values.len() != columns.len() {
            return Err(StorageError::InvalidStatement {
                message: format!(
                    "expected {} values for table '{table}', got {}",
                    columns.len(),
                    row.values.len()
                ),
            });
        }
        let sql = self.dialect.insert_sql(table, columns);
        let affected = self.executor.execute(&sql, &row.values).await?;
        Ok(ExecuteOutcome {
            affected,
            inserted_id: None,
        })
    }

    async fn remap_column(
        &mut self,
        table: &str,
        column: &str,
        old_id: i64,
        new_id: i64,
    ) -> Result<u64, StorageError> {
        let sql = self.dialect.remap_sql(table, column);
        self.executor
            .execute(&sql, &[Value::Integer(new_id), Value::Integer(old_id)])
            .await
    }

    async fn commit(mut self) -> Result<(), StorageError> {
        self.executor.execute(self.dialect.commit_sql(), &[]).await?;
        self.open = false;
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StorageError> {
        self.executor.execute(self.dialect.rollback_sql(), &[]).await?;
        self.open = false;
        Ok(())
    }
}

fn key_row_from(table: &str, primary_key: &str, row: Row) -> Result<KeyRow, StorageError> {
    let mut values = row.values.into_iter();
    let id_value = values.next().ok_or_else(|| StorageError::Backend {
        message: format!("key scan on table '{table}' returned an empty row"),
    })?;
    let id = id_value.as_i64().ok_or_else(|| StorageError::TypeMismatch {
        table: table.to_string(),
        column: primary_key.to_string(),
        expected: "Integer",
        actual: id_value.kind(),
    })?;
    let ordering = values.next().ok_or_else(|| StorageError::Backend {
        message: format!("key scan on table '{table}' returned no ordering value"),
    })?;
    Ok(KeyRow { id, ordering })
}
