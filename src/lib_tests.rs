use crate::config::{CounterResetPolicy, ReseqConfig};
use crate::error::{ReseqError, ReseqErrorCode};
use crate::model::SequencedTable;
use crate::store::memory::{ForeignKeyDef, MemoryStore, TableDef};
use crate::store::{RowStore, StoreTransaction};
use crate::value::{Row, Value};
use crate::{CounterResetStatus, ReseqEngine};

fn agencies_table() -> SequencedTable {
    SequencedTable::new("agencies", "name").with_dependent("users", "agency_id")
}

fn agency_row(id: i64, name: &str) -> Row {
    Row::from_values(vec![Value::Integer(id), Value::Text(name.into())])
}

fn user_row(id: i64, agency_id: i64) -> Row {
    Row::from_values(vec![Value::Integer(id), Value::Integer(agency_id)])
}

async fn seeded_store(agencies: &[(i64, &str)], users: &[(i64, i64)]) -> MemoryStore {
    let store = MemoryStore::new();
    store
        .create_table(TableDef::new("agencies", &["id", "name"], "id"))
        .await
        .expect("create agencies");
    store
        .create_table(TableDef::new("users", &["id", "agency_id"], "id"))
        .await
        .expect("create users");
    store
        .add_foreign_key(ForeignKeyDef::new("users", "agency_id", "agencies"))
        .await
        .expect("fk");

    let agency_columns = vec!["id".to_string(), "name".to_string()];
    let user_columns = vec!["id".to_string(), "agency_id".to_string()];
    let mut tx = store.begin().await.expect("begin");
    for (id, name) in agencies {
        tx.insert("agencies", &agency_columns, &agency_row(*id, name))
            .await
            .expect("seed agency");
    }
    for (id, agency_id) in users {
        tx.insert("users", &user_columns, &user_row(*id, *agency_id))
            .await
            .expect("seed user");
    }
    tx.commit().await.expect("commit seed");
    store
}

fn engine(store: MemoryStore) -> ReseqEngine<MemoryStore> {
    ReseqEngine::new(store, ReseqConfig::default()).expect("engine")
}

#[tokio::test]
async fn check_flags_gapped_ids() {
    let store = seeded_store(&[(5, "Agency A"), (10, "Agency B"), (15, "Agency C")], &[]).await;
    let engine = engine(store);

    let report = engine
        .check_integrity(&agencies_table())
        .await
        .expect("check");
    assert!(!report.is_ok());
    assert_eq!(report.total_rows, 3);
    assert_eq!(report.issues.len(), 3);
    assert_eq!(report.issues[0].current_id, 5);
    assert_eq!(report.issues[0].expected_id, 1);
    assert_eq!(
        report.issues[0].ordering_value,
        Value::Text("Agency A".into())
    );
}

#[tokio::test]
async fn check_empty_table_is_ok() {
    let store = seeded_store(&[], &[]).await;
    let engine = engine(store);

    let report = engine
        .check_integrity(&agencies_table())
        .await
        .expect("check");
    assert_eq!(report.total_rows, 0);
    assert!(report.is_ok());
}

#[tokio::test]
async fn fix_renumbers_gapped_table_and_remaps_users() {
    let store = seeded_store(
        &[(5, "Agency A"), (10, "Agency B"), (15, "Agency C")],
        &[(1, 5), (2, 10), (3, 15), (4, 5)],
    )
    .await;
    let engine = engine(store.clone());

    let report = engine.fix_ids(&agencies_table()).await.expect("fix");
    assert_eq!(report.rows, 3);
    assert_eq!(report.moved, 3);
    assert_eq!(report.remapped_references, 4);
    assert_eq!(report.counter_reset, CounterResetStatus::Reset { max_id: 3 });
    assert!(report.changed());

    let agencies = store.rows("agencies").await.expect("rows");
    assert_eq!(agencies[0], agency_row(1, "Agency A"));
    assert_eq!(agencies[1], agency_row(2, "Agency B"));
    assert_eq!(agencies[2], agency_row(3, "Agency C"));

    let users = store.rows("users").await.expect("rows");
    assert_eq!(users[0], user_row(1, 1));
    assert_eq!(users[1], user_row(2, 2));
    assert_eq!(users[2], user_row(3, 3));
    assert_eq!(users[3], user_row(4, 1));

    assert_eq!(store.counter("agencies").await.expect("counter"), 3);

    let recheck = engine
        .check_integrity(&agencies_table())
        .await
        .expect("recheck");
    assert!(recheck.is_ok());
}

#[tokio::test]
async fn fix_is_noop_when_already_contiguous() {
    let store = seeded_store(&[(1, "A"), (2, "B"), (3, "C")], &[(1, 2)]).await;
    let before = store.rows("agencies").await.expect("rows");
    let engine = engine(store.clone());

    let report = engine.fix_ids(&agencies_table()).await.expect("fix");
    assert_eq!(report.moved, 0);
    assert_eq!(report.remapped_references, 0);
    assert_eq!(report.counter_reset, CounterResetStatus::Skipped);
    assert!(!report.changed());
    assert_eq!(store.rows("agencies").await.expect("rows"), before);
}

#[tokio::test]
async fn second_fix_is_a_noop() {
    let store = seeded_store(&[(7, "B"), (3, "A")], &[(1, 7), (2, 3)]).await;
    let engine = engine(store.clone());

    let first = engine.fix_ids(&agencies_table()).await.expect("first fix");
    assert!(first.changed());
    let after_first = store.rows("agencies").await.expect("rows");

    assert!(
        engine
            .check_integrity(&agencies_table())
            .await
            .expect("check")
            .is_ok()
    );
    let second = engine.fix_ids(&agencies_table()).await.expect("second fix");
    assert!(!second.changed());
    assert_eq!(store.rows("agencies").await.expect("rows"), after_first);
}

#[tokio::test]
async fn empty_table_fix_succeeds_without_a_transaction() {
    let store = seeded_store(&[], &[]).await;
    let engine = engine(store);

    let report = engine.fix_ids(&agencies_table()).await.expect("fix");
    assert_eq!(report.rows, 0);
    assert!(!report.changed());
    assert_eq!(report.counter_reset, CounterResetStatus::Skipped);
}

#[tokio::test]
async fn zero_row_cap_is_rejected_at_construction() {
    let config = ReseqConfig {
        max_snapshot_rows: 0,
        ..ReseqConfig::default()
    };
    let err = ReseqEngine::new(MemoryStore::new(), config).err().expect("error");
    assert_eq!(err.code(), ReseqErrorCode::InvalidConfig);
}

#[tokio::test]
async fn row_cap_bounds_check_and_fix() {
    let store = seeded_store(&[(5, "A"), (10, "B"), (15, "C")], &[]).await;
    let config = ReseqConfig {
        max_snapshot_rows: 2,
        ..ReseqConfig::default()
    };
    let engine = ReseqEngine::new(store, config).expect("engine");

    let err = engine
        .check_integrity(&agencies_table())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ReseqErrorCode::SnapshotLimitExceeded);

    let err = engine.fix_ids(&agencies_table()).await.unwrap_err();
    assert!(matches!(
        err,
        ReseqError::SnapshotLimitExceeded { rows: 3, max_rows: 2 }
    ));
}

#[tokio::test]
async fn counter_reset_policy_skip_leaves_the_counter_alone() {
    let store = seeded_store(&[(5, "A"), (10, "B")], &[]).await;
    let config = ReseqConfig::default().with_counter_reset(CounterResetPolicy::Skip);
    let engine = ReseqEngine::new(store.clone(), config).expect("engine");

    let report = engine.fix_ids(&agencies_table()).await.expect("fix");
    assert!(report.changed());
    assert_eq!(report.counter_reset, CounterResetStatus::Skipped);
    // Stale high-water mark from the seeded ids survives untouched.
    assert_eq!(store.counter("agencies").await.expect("counter"), 10);
}

#[tokio::test]
async fn invalid_identifiers_are_rejected_before_the_store_is_touched() {
    let engine = engine(MemoryStore::new());
    let bad = SequencedTable::new("agencies; DROP TABLE users", "name");
    let err = engine.check_integrity(&bad).await.unwrap_err();
    assert_eq!(err.code(), ReseqErrorCode::Validation);
}

#[tokio::test]
async fn reports_serialize_for_admin_surfaces() {
    let store = seeded_store(&[(5, "A")], &[]).await;
    let engine = engine(store);

    let check = engine
        .check_integrity(&agencies_table())
        .await
        .expect("check");
    let json = serde_json::to_value(&check).expect("serialize report");
    assert_eq!(json["table"], "agencies");
    assert_eq!(json["total_rows"], 1);
    assert_eq!(json["issues"][0]["current_id"], 5);
    assert_eq!(json["issues"][0]["expected_id"], 1);

    let fix = engine.fix_ids(&agencies_table()).await.expect("fix");
    let json = serde_json::to_value(&fix).expect("serialize fix report");
    assert_eq!(json["rows"], 1);
    assert_eq!(json["moved"], 1);
    assert_eq!(json["counter_reset"]["Reset"]["max_id"], 1);
}
