use crate::value::Value;

/// SQL dialect a [`crate::store::sql::SqlRowStore`] renders statements for.
/// All backend-specific branching lives here: placeholder style, transaction
/// opening, constraint deferral, and the auto-increment counter reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Sqlite,
    Postgres,
}

impl SqlDialect {
    pub fn placeholder(self, index: usize) -> String {
        match self {
            SqlDialect::Sqlite => "?".to_string(),
            SqlDialect::Postgres => format!("${index}"),
        }
    }

    pub fn quote_ident(self, name: &str) -> String {
        format!("\"{name}\"")
    }

    /// SQLite takes the write lock up front; a deferred lock upgrade could
    /// otherwise fail mid-operation.
    pub fn begin_sql(self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "BEGIN IMMEDIATE",
            SqlDialect::Postgres => "BEGIN",
        }
    }

    pub fn commit_sql(self) -> &'static str {
        "COMMIT"
    }

    pub fn rollback_sql(self) -> &'static str {
        "ROLLBACK"
    }

    pub fn defer_constraints_sql(self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "PRAGMA defer_foreign_keys = ON",
            SqlDialect::Postgres => "SET CONSTRAINTS ALL DEFERRED",
        }
    }

    pub fn count_sql(self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", self.quote_ident(table))
    }

    pub fn key_scan_sql(self, table: &str, primary_key: &str, ordering_key: &str) -> String {
        format!(
            "SELECT {pk}, {ord} FROM {table} ORDER BY {ord} ASC, {pk} ASC",
            pk = self.quote_ident(primary_key),
            ord = self.quote_ident(ordering_key),
            table = self.quote_ident(table),
        )
    }

    pub fn snapshot_sql(self, table: &str, ordering_key: &str, primary_key: &str) -> String {
        format!(
            "SELECT * FROM {table} ORDER BY {ord} ASC, {pk} ASC",
            table = self.quote_ident(table),
            ord = self.quote_ident(ordering_key),
            pk = self.quote_ident(primary_key),
        )
    }

    pub fn delete_all_sql(self, table: &str) -> String {
        format!("DELETE FROM {}", self.quote_ident(table))
    }

    pub fn insert_sql(self, table: &str, columns: &[String]) -> String {
        let mut sql = format!("INSERT INTO {} (", self.quote_ident(table));
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&self.quote_ident(column));
        }
        sql.push_str(") VALUES (");
        for i in 0..columns.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&self.placeholder(i + 1));
        }
        sql.push(')');
        sql
    }

    /// Parameter order: `[new_id, old_id]`.
    pub fn remap_sql(self, table: &str, column: &str) -> String {
        format!(
            "UPDATE {table} SET {col} = {p1} WHERE {col} = {p2}",
            table = self.quote_ident(table),
            col = self.quote_ident(column),
            p1 = self.placeholder(1),
            p2 = self.placeholder(2),
        )
    }

    /// Statement and parameters realigning the auto-increment counter so the
    /// next natural insert yields `max_id + 1`. Table and key names travel as
    /// data here, not identifiers.
    pub fn reset_counter_stmt(self, table: &str, primary_key: &str, max_id: i64) -> (String, Vec<Value>) {
        match self {
            SqlDialect::Sqlite => (
                "UPDATE sqlite_sequence SET seq = ? WHERE name = ?".to_string(),
                vec![Value::Integer(max_id), Value::Text(table.into())],
            ),
            SqlDialect::Postgres => (
                "SELECT setval(pg_get_serial_sequence($1, $2), $3)".to_string(),
                vec![
                    Value::Text(table.into()),
                    Value::Text(primary_key.into()),
                    Value::Integer(max_id),
                ],
            ),
        }
    }
}
