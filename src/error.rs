use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Step of the resequencing pipeline an error is attributed to.
///
/// Failures at `Snapshot` happen before any write, so nothing changed;
/// later stages always roll back before surfacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Snapshot,
    Delete,
    Reinsert,
    DependentUpdate,
    Commit,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Snapshot => "snapshot",
            Stage::Delete => "delete",
            Stage::Reinsert => "reinsert",
            Stage::DependentUpdate => "dependent_update",
            Stage::Commit => "commit",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures raised by a row store adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable { message: String },
    #[error("invalid statement: {message}")]
    InvalidStatement { message: String },
    #[error("table '{table}' not found")]
    TableNotFound { table: String },
    #[error("table '{table}' already exists")]
    TableExists { table: String },
    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },
    #[error("duplicate key {key} in table '{table}'")]
    DuplicateKey { table: String, key: i64 },
    #[error("foreign key violation: {table}.{column} references missing id {value}")]
    ForeignKeyViolation {
        table: String,
        column: String,
        value: i64,
    },
    #[error("type mismatch in table '{table}' column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("backend error: {message}")]
    Backend { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReseqErrorCode {
    Storage,
    Validation,
    InvalidConfig,
    SnapshotLimitExceeded,
    ResequenceSnapshot,
    ResequenceDelete,
    ResequenceReinsert,
    ResequenceDependentUpdate,
    ResequenceCommit,
}

impl ReseqErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReseqErrorCode::Storage => "storage",
            ReseqErrorCode::Validation => "validation",
            ReseqErrorCode::InvalidConfig => "invalid_config",
            ReseqErrorCode::SnapshotLimitExceeded => "snapshot_limit_exceeded",
            ReseqErrorCode::ResequenceSnapshot => "resequence_snapshot",
            ReseqErrorCode::ResequenceDelete => "resequence_delete",
            ReseqErrorCode::ResequenceReinsert => "resequence_reinsert",
            ReseqErrorCode::ResequenceDependentUpdate => "resequence_dependent_update",
            ReseqErrorCode::ResequenceCommit => "resequence_commit",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReseqError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("snapshot limit exceeded: table has {rows} rows, max {max_rows}")]
    SnapshotLimitExceeded { rows: usize, max_rows: usize },
    #[error("resequence failed at stage {stage}: {source}")]
    Resequence {
        stage: Stage,
        #[source]
        source: StorageError,
    },
}

impl ReseqError {
    pub(crate) fn resequence(stage: Stage, source: StorageError) -> Self {
        ReseqError::Resequence { stage, source }
    }

    pub fn code(&self) -> ReseqErrorCode {
        match self {
            ReseqError::Storage(_) => ReseqErrorCode::Storage,
            ReseqError::Validation(_) => ReseqErrorCode::Validation,
            ReseqError::InvalidConfig { .. } => ReseqErrorCode::InvalidConfig,
            ReseqError::SnapshotLimitExceeded { .. } => ReseqErrorCode::SnapshotLimitExceeded,
            ReseqError::Resequence { stage, .. } => match stage {
                Stage::Snapshot => ReseqErrorCode::ResequenceSnapshot,
                Stage::Delete => ReseqErrorCode::ResequenceDelete,
                Stage::Reinsert => ReseqErrorCode::ResequenceReinsert,
                Stage::DependentUpdate => ReseqErrorCode::ResequenceDependentUpdate,
                Stage::Commit => ReseqErrorCode::ResequenceCommit,
            },
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}

/// Non-fatal counter reset failure, surfaced through the fix report rather
/// than the error path.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("counter reset failed for table '{table}': {detail}")]
pub struct CounterResetError {
    pub table: String,
    pub detail: String,
}
