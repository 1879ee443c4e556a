//! Integration tests for the PostgreSQL store
//!
//! Each test runs against a fresh PostgreSQL container.

use std::sync::Arc;

use chrono::Utc;
use grouper::error::EngineError;
use grouper::models::{
    CreateClass, CreateRule, Group, HistoryEntry, PairKey, Partition,
};
use grouper::services::PairingHistory;
use grouper::store::{ClassStore, GroupStore, PairingStore, PgStore, RosterStore, RuleStore};
use pretty_assertions::assert_eq;
use serde_json::json;
use uuid::Uuid;

use crate::common::{at, seeded_class, TestDb};

#[tokio::test]
async fn test_health_check_on_migrated_database() {
    let db = TestDb::new().await;
    assert!(grouper::db::health_check(&db.pool).await);
}

// =============================================================================
// Class & Roster Tests
// =============================================================================

#[tokio::test]
async fn test_class_and_roster_crud() {
    let db = TestDb::new().await;
    let store = PgStore::new(db.pool.clone());

    let (class_id, ids) = seeded_class(&store, 3).await;

    let classes = store.list_classes().await.unwrap();
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].name, "Period 3");

    let students = store.list_students(class_id).await.unwrap();
    assert_eq!(students.iter().map(|s| s.id).collect::<Vec<_>>(), ids);
    assert!(students.iter().all(|s| s.grouping_history.is_empty()));
    assert!(students.iter().all(|s| s.non_standard_groupings == 0));

    store.delete_student(class_id, ids[0]).await.unwrap();
    assert!(matches!(
        store.get_student(class_id, ids[0]).await,
        Err(EngineError::NotFound(_))
    ));

    store.delete_class(class_id).await.unwrap();
    assert!(store.list_students(class_id).await.unwrap().is_empty());
    assert!(matches!(
        store.delete_class(class_id).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_blank_class_name_is_rejected() {
    let db = TestDb::new().await;
    let store = PgStore::new(db.pool.clone());

    let result = store
        .create_class(CreateClass {
            name: "   ".to_string(),
        })
        .await;

    assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
}

// =============================================================================
// Pairing Tests
// =============================================================================

#[tokio::test]
async fn test_increment_upserts_canonical_row() {
    let db = TestDb::new().await;
    let store = PgStore::new(db.pool.clone());
    let (class_id, ids) = seeded_class(&store, 3).await;
    let key = PairKey::new(ids[2], ids[0]);

    let first = store.increment(class_id, key, at(0)).await.unwrap();
    let second = store.increment(class_id, key, at(2)).await.unwrap();

    assert_eq!(first.pair_count, 1);
    assert_eq!(second.pair_count, 2);
    assert_eq!((second.student_a, second.student_b), (ids[0], ids[2]));
    assert_eq!(second.last_paired, Some(at(2)));

    let fetched = store.fetch(class_id, key).await.unwrap().unwrap();
    assert_eq!(fetched.pair_count, 2);
    assert!(store
        .fetch(class_id, PairKey::new(ids[0], ids[1]))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_reversed_rows_are_refused_by_the_schema() {
    let db = TestDb::new().await;
    let store = PgStore::new(db.pool.clone());
    let (class_id, ids) = seeded_class(&store, 2).await;

    let result = sqlx::query(
        "INSERT INTO pairing_records (class_id, student_a, student_b, pair_count) VALUES ($1, $2, $3, 1)",
    )
    .bind(class_id)
    .bind(ids[1])
    .bind(ids[0])
    .execute(&db.pool)
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_pair_without_timestamp_loads_as_undated() {
    let db = TestDb::new().await;
    let store = PgStore::new(db.pool.clone());
    let (class_id, ids) = seeded_class(&store, 2).await;

    sqlx::query(
        "INSERT INTO pairing_records (class_id, student_a, student_b, pair_count) VALUES ($1, $2, $3, 2)",
    )
    .bind(class_id)
    .bind(ids[0])
    .bind(ids[1])
    .execute(&db.pool)
    .await
    .unwrap();

    let key = PairKey::new(ids[0], ids[1]);
    let record = store.fetch(class_id, key).await.unwrap().unwrap();
    assert_eq!(record.pair_count, 2);
    assert_eq!(record.last_paired, None);

    let record = store.increment(class_id, key, at(0)).await.unwrap();
    assert_eq!(record.pair_count, 3);
    assert_eq!(record.last_paired, Some(at(0)));
}

#[tokio::test]
async fn test_fetch_for_students_returns_touching_pairs() {
    let db = TestDb::new().await;
    let store = PgStore::new(db.pool.clone());
    let (class_id, ids) = seeded_class(&store, 4).await;
    store
        .increment(class_id, PairKey::new(ids[0], ids[1]), at(0))
        .await
        .unwrap();
    store
        .increment(class_id, PairKey::new(ids[2], ids[3]), at(0))
        .await
        .unwrap();
    store
        .increment(class_id, PairKey::new(ids[1], ids[2]), at(0))
        .await
        .unwrap();

    let records = store.fetch_for_students(class_id, &[ids[0]]).await.unwrap();
    assert_eq!(records.len(), 1);

    let records = store
        .fetch_for_students(class_id, &[ids[1], ids[3]])
        .await
        .unwrap();
    assert_eq!(records.len(), 3);

    assert!(store.fetch_for_students(class_id, &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_increments_lose_nothing() {
    let db = TestDb::new().await;
    let store = Arc::new(PgStore::new(db.pool.clone()));
    let (class_id, ids) = seeded_class(store.as_ref(), 2).await;
    let history = PairingHistory::new(store.clone());
    let (a, b) = (ids[0], ids[1]);

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let history = history.clone();
            let (x, y) = if i % 2 == 0 { (a, b) } else { (b, a) };
            tokio::spawn(async move { history.increment(class_id, x, y, Utc::now()).await })
        })
        .collect();

    for handle in handles {
        handle.await.expect("task panicked").expect("increment failed");
    }

    assert_eq!(history.get(class_id, b, a).await.unwrap().count, 40);
}

#[tokio::test]
async fn test_clear_pairings_is_scoped_to_class() {
    let db = TestDb::new().await;
    let store = PgStore::new(db.pool.clone());
    let (first, first_ids) = seeded_class(&store, 2).await;
    let (second, second_ids) = seeded_class(&store, 2).await;
    store
        .increment(first, PairKey::new(first_ids[0], first_ids[1]), at(0))
        .await
        .unwrap();
    store
        .increment(second, PairKey::new(second_ids[0], second_ids[1]), at(0))
        .await
        .unwrap();

    assert_eq!(store.clear_pairings(first).await.unwrap(), 1);
    assert_eq!(
        store
            .fetch_for_students(second, &second_ids)
            .await
            .unwrap()
            .len(),
        1
    );
}

// =============================================================================
// History Log Tests
// =============================================================================

fn entry(mate: i32, days: i64) -> HistoryEntry {
    HistoryEntry {
        groupmate_id: mate,
        timestamp: at(days),
        group_id: Uuid::new_v4(),
    }
}

#[tokio::test]
async fn test_append_history_extends_log() {
    let db = TestDb::new().await;
    let store = PgStore::new(db.pool.clone());
    let (class_id, ids) = seeded_class(&store, 3).await;

    let len = store
        .append_history(class_id, ids[0], &[entry(ids[1], 0), entry(ids[2], 0)])
        .await
        .unwrap();
    assert_eq!(len, 2);
    let len = store
        .append_history(class_id, ids[0], &[entry(ids[1], 1)])
        .await
        .unwrap();
    assert_eq!(len, 3);

    let student = store.get_student(class_id, ids[0]).await.unwrap();
    let mates: Vec<_> = student
        .grouping_history
        .iter()
        .map(|e| e.groupmate_id)
        .collect();
    assert_eq!(mates, vec![ids[1], ids[2], ids[1]]);
}

#[tokio::test]
async fn test_concurrent_appends_keep_every_entry() {
    let db = TestDb::new().await;
    let store = Arc::new(PgStore::new(db.pool.clone()));
    let (class_id, ids) = seeded_class(store.as_ref(), 2).await;

    let handles: Vec<_> = (0..20)
        .map(|day| {
            let store = store.clone();
            let mate = ids[1];
            let student = ids[0];
            tokio::spawn(async move {
                store
                    .append_history(class_id, student, &[entry(mate, day)])
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.expect("task panicked").expect("append failed");
    }

    let student = store.get_student(class_id, ids[0]).await.unwrap();
    assert_eq!(student.grouping_history.len(), 20);
}

#[tokio::test]
async fn test_malformed_and_legacy_logs_are_tolerated() {
    let db = TestDb::new().await;
    let store = PgStore::new(db.pool.clone());
    let (class_id, ids) = seeded_class(&store, 3).await;
    let valid = json!({
        "groupmateId": ids[1],
        "timestamp": "2024-08-01T09:00:00Z",
        "groupId": "7d4ad0b2-6b55-4b9e-9a4f-0c7a7c1e2f10"
    });

    sqlx::query("UPDATE students SET grouping_history = $1 WHERE id = $2")
        .bind(json!([valid.clone(), {"groupmateId": null}, "junk"]))
        .bind(ids[0])
        .execute(&db.pool)
        .await
        .unwrap();
    sqlx::query("UPDATE students SET grouping_history = to_jsonb($1::text) WHERE id = $2")
        .bind(json!([valid]).to_string())
        .bind(ids[2])
        .execute(&db.pool)
        .await
        .unwrap();

    let malformed = store.get_student(class_id, ids[0]).await.unwrap();
    assert_eq!(malformed.grouping_history.len(), 1);

    let legacy = store.get_student(class_id, ids[2]).await.unwrap();
    assert_eq!(legacy.grouping_history.len(), 1);

    let len = store
        .append_history(class_id, ids[0], &[entry(ids[2], 0)])
        .await
        .unwrap();
    assert_eq!(len, 2);
}

#[tokio::test]
async fn test_non_standard_counter_and_reset() {
    let db = TestDb::new().await;
    let store = PgStore::new(db.pool.clone());
    let (class_id, ids) = seeded_class(&store, 3).await;

    assert_eq!(
        store
            .increment_non_standard(class_id, &[ids[0], ids[2]])
            .await
            .unwrap(),
        2
    );
    store
        .append_history(class_id, ids[0], &[entry(ids[1], 0)])
        .await
        .unwrap();
    assert_eq!(
        store
            .get_student(class_id, ids[0])
            .await
            .unwrap()
            .non_standard_groupings,
        1
    );

    assert_eq!(store.reset_history(class_id).await.unwrap(), 3);
    let student = store.get_student(class_id, ids[0]).await.unwrap();
    assert_eq!(student.non_standard_groupings, 0);
    assert!(student.grouping_history.is_empty());
}

// =============================================================================
// Rule Tests
// =============================================================================

#[tokio::test]
async fn test_rules_are_canonical_and_idempotent() {
    let db = TestDb::new().await;
    let store = PgStore::new(db.pool.clone());
    let (class_id, ids) = seeded_class(&store, 3).await;

    let rule = store
        .add_rule(CreateRule {
            class_id,
            student_a: ids[2],
            student_b: ids[0],
        })
        .await
        .unwrap();
    let again = store
        .add_rule(CreateRule {
            class_id,
            student_a: ids[0],
            student_b: ids[2],
        })
        .await
        .unwrap();

    assert_eq!(rule.id, again.id);
    assert_eq!((rule.student_a, rule.student_b), (ids[0], ids[2]));
    assert_eq!(store.list_rules(class_id).await.unwrap().len(), 1);

    let self_rule = store
        .add_rule(CreateRule {
            class_id,
            student_a: ids[1],
            student_b: ids[1],
        })
        .await;
    assert!(matches!(self_rule, Err(EngineError::InvalidArgument(_))));

    store.delete_rule(class_id, rule.id).await.unwrap();
    assert!(store.list_rules(class_id).await.unwrap().is_empty());
    assert!(matches!(
        store.delete_rule(class_id, rule.id).await,
        Err(EngineError::NotFound(_))
    ));
}

// =============================================================================
// Round Tests
// =============================================================================

fn partition_of(groups: Vec<Vec<i32>>, days: i64) -> Partition {
    Partition {
        cost: 7,
        created_at: at(days),
        groups: groups
            .into_iter()
            .enumerate()
            .map(|(i, members)| Group {
                name: format!("Group {}", i + 1),
                members,
                cost: 0,
            })
            .collect(),
    }
}

#[tokio::test]
async fn test_save_and_load_latest_round() {
    let db = TestDb::new().await;
    let store = PgStore::new(db.pool.clone());
    let (class_id, ids) = seeded_class(&store, 5).await;

    store
        .save_round(class_id, 2, &partition_of(vec![vec![ids[0], ids[1]]], 0))
        .await
        .unwrap();
    let saved = store
        .save_round(
            class_id,
            2,
            &partition_of(vec![vec![ids[4], ids[2]], vec![ids[3], ids[0]], vec![ids[1]]], 1),
        )
        .await
        .unwrap();

    let latest = store.latest_round(class_id).await.unwrap().unwrap();
    assert_eq!(latest.id, saved.id);
    assert_eq!(latest.target_size, 2);
    assert_eq!(latest.cost, 7);
    assert_eq!(latest.created_at, at(1));
    let members: Vec<_> = latest.groups.iter().map(|g| g.members.clone()).collect();
    assert_eq!(
        members,
        vec![vec![ids[4], ids[2]], vec![ids[3], ids[0]], vec![ids[1]]]
    );
    let names: Vec<_> = latest.groups.iter().map(|g| g.name.clone()).collect();
    assert_eq!(names, vec!["Group 1", "Group 2", "Group 3"]);

    assert_eq!(store.clear_rounds(class_id).await.unwrap(), 2);
    assert!(store.latest_round(class_id).await.unwrap().is_none());
}
