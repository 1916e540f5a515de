use crate::error::ReseqError;
use serde::{Deserialize, Serialize};

/// A table holding a foreign key that references the sequenced table's
/// primary key. Its rows are rewritten in the same transaction whenever a
/// primary key moves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dependent {
    pub table: String,
    pub column: String,
}

/// Descriptor of a table whose surrogate integer primary key is expected to
/// form a contiguous 1..N sequence when sorted by `ordering_key`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequencedTable {
    pub table: String,
    pub primary_key: String,
    pub ordering_key: String,
    #[serde(default)]
    pub dependents: Vec<Dependent>,
}

impl SequencedTable {
    pub fn new(table: impl Into<String>, ordering_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: "id".to_string(),
            ordering_key: ordering_key.into(),
            dependents: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn with_dependent(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.dependents.push(Dependent {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    /// Every name in the descriptor is interpolated into statements as an
    /// identifier, so all of them must pass the identifier check.
    pub(crate) fn validate(&self) -> Result<(), ReseqError> {
        for (role, name) in [
            ("table", self.table.as_str()),
            ("primary_key", self.primary_key.as_str()),
            ("ordering_key", self.ordering_key.as_str()),
        ] {
            if !is_valid_identifier(name) {
                return Err(ReseqError::Validation(format!(
                    "{role} '{name}' is not a valid identifier"
                )));
            }
        }
        if self.primary_key == self.ordering_key {
            return Err(ReseqError::Validation(format!(
                "ordering_key '{}' must differ from the primary key",
                self.ordering_key
            )));
        }
        for dep in &self.dependents {
            if !is_valid_identifier(&dep.table) {
                return Err(ReseqError::Validation(format!(
                    "dependent table '{}' is not a valid identifier",
                    dep.table
                )));
            }
            if !is_valid_identifier(&dep.column) {
                return Err(ReseqError::Validation(format!(
                    "dependent column '{}' is not a valid identifier",
                    dep.column
                )));
            }
        }
        Ok(())
    }
}

pub(crate) fn is_valid_identifier(name: &str) -> bool {
    if name.is_empty() || name.len() > 128 {
        return false;
    }
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
