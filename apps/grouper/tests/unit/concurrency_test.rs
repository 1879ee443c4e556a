//! Concurrency tests for pairing increments
//!
//! Many tasks bumping the same pair must not lose updates.

use std::sync::Arc;

use grouper::models::SavedGroup;
use grouper::services::{HistoryRecorder, PairingHistory};
use grouper::store::{MemoryStore, RosterStore};
use uuid::Uuid;

use crate::common::{at, seeded_class};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_of_one_pair_lose_nothing() {
    let store = Arc::new(MemoryStore::new());
    let history = PairingHistory::new(store.clone());

    let handles: Vec<_> = (0..64)
        .map(|i| {
            let history = history.clone();
            // alternate the argument order; both map to the same pair
            let (a, b) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
            tokio::spawn(async move { history.increment(1, a, b, at(0)).await })
        })
        .collect();

    for handle in handles {
        handle.await.expect("task panicked").expect("increment failed");
    }

    assert_eq!(history.get(1, 1, 2).await.unwrap().count, 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rounds_append_every_log_entry() {
    let store = Arc::new(MemoryStore::new());
    let (class_id, ids) = seeded_class(store.as_ref(), 3).await;
    let pairings = PairingHistory::new(store.clone());
    let recorder = HistoryRecorder::new(pairings.clone(), store.clone());

    let handles: Vec<_> = (0..10)
        .map(|day| {
            let recorder = recorder.clone();
            let group = SavedGroup {
                id: Uuid::new_v4(),
                name: "Group 1".to_string(),
                members: ids.clone(),
                cost: 0,
            };
            tokio::spawn(async move { recorder.record(class_id, &[group], 3, at(day)).await })
        })
        .collect();

    for handle in handles {
        handle.await.expect("task panicked").expect("record failed");
    }

    assert_eq!(pairings.get(class_id, ids[0], ids[2]).await.unwrap().count, 10);
    let student = store.get_student(class_id, ids[1]).await.unwrap();
    assert_eq!(student.grouping_history.len(), 20);
}
