use crate::store::KeyRow;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// One row whose primary key does not match its rank under the ordering key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub current_id: i64,
    pub expected_id: i64,
    pub ordering_value: Value,
}

/// Result of an integrity check. Built fresh on every call and handed
/// straight to the caller; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub table: String,
    pub total_rows: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Walks keys already sorted by the ordering key (primary key as tie-break)
/// and flags every row whose id differs from its 1-based rank.
pub(crate) fn build_report(table: &str, keys: &[KeyRow]) -> IntegrityReport {
    let issues = keys
        .iter()
        .enumerate()
        .filter_map(|(index, key)| {
            let expected_id = index as i64 + 1;
            (key.id != expected_id).then(|| IntegrityIssue {
                current_id: key.id,
                expected_id,
                ordering_value: key.ordering.clone(),
            })
        })
        .collect();
    IntegrityReport {
        table: table.to_string(),
        total_rows: keys.len(),
        issues,
    }
}
