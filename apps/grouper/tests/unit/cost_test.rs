//! Unit tests for the cost model and pairing map

use chrono::Duration;
use grouper::error::EngineError;
use grouper::models::{PairKey, PairStats, PairingRecord};
use grouper::services::{CostModel, PairingMap};
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::{at, HistoryBuilder};

fn record(a: i32, b: i32, count: i32, days: i64) -> PairingRecord {
    PairingRecord {
        class_id: 1,
        student_a: a,
        student_b: b,
        pair_count: count,
        last_paired: Some(at(days)),
    }
}

// =============================================================================
// Pair Cost Tests
// =============================================================================

#[rstest]
#[case::never(0, None, 0)]
#[case::today(1, Some(0), 20)]
#[case::yesterday(1, Some(1), 19)]
#[case::twice_last_week(2, Some(7), 23)]
#[case::outside_window(3, Some(10), 30)]
#[case::long_ago(3, Some(400), 30)]
#[case::future_counts_as_today(1, Some(-3), 20)]
fn test_pair_cost(#[case] count: u32, #[case] days_ago: Option<i64>, #[case] expected: i64) {
    let now = at(0);
    let stats = PairStats {
        count,
        last_paired: days_ago.map(|d| now - Duration::days(d)),
    };

    assert_eq!(CostModel::default().pair_cost(&stats, now), expected);
}

#[test]
fn test_custom_weights() {
    let model = CostModel {
        pair_weight: 3,
        recency_window_days: 5,
    };
    let stats = PairStats {
        count: 2,
        last_paired: Some(at(-2)),
    };

    assert_eq!(model.pair_cost(&stats, at(0)), 6 + 3);
}

#[test]
fn test_group_cost_sums_every_pair() {
    let map = HistoryBuilder::new()
        .paired(1, 2, 1, at(-30))
        .paired(2, 3, 2, at(-30))
        .build();
    let model = CostModel::default();

    assert_eq!(model.group_cost(&[1, 2, 3], &map, at(0)), 30);
    assert_eq!(model.group_cost(&[3, 1], &map, at(0)), 0);
    assert_eq!(model.group_cost(&[2], &map, at(0)), 0);
    assert_eq!(
        model.partition_cost(&[vec![1, 2], vec![3, 4]], &map, at(0)),
        10
    );
}

#[test]
fn test_matrix_matches_direct_costs() {
    let map = HistoryBuilder::new()
        .paired(1, 2, 1, at(-2))
        .paired(4, 3, 2, at(-30))
        .build();
    let model = CostModel::default();
    let costs = model.matrix(&map, at(0));

    assert_eq!(costs.get(2, 1), 18);
    assert_eq!(costs.get(3, 4), 20);
    assert_eq!(costs.get(1, 3), 0);
    assert_eq!(
        costs.group_cost(&[1, 2, 3, 4]),
        model.group_cost(&[1, 2, 3, 4], &map, at(0))
    );
    assert_eq!(model.matrix(&PairingMap::new(), at(0)).partition_cost(&[[1, 2, 3, 4]]), 0);
}

// =============================================================================
// Pairing Map Tests
// =============================================================================

#[test]
fn test_map_lookup_is_order_independent() {
    let map = PairingMap::from_records(vec![record(9, 4, 2, -1)]).unwrap();

    assert_eq!(map.get(4, 9), map.get(9, 4));
    assert_eq!(map.get(4, 9).count, 2);
    assert_eq!(map.get(4, 5), PairStats::default());
}

#[test]
fn test_map_merges_both_orderings() {
    let map = PairingMap::from_records(vec![record(2, 5, 1, -8), record(5, 2, 2, -3)]).unwrap();

    assert_eq!(map.len(), 1);
    let stats = map.get(2, 5);
    assert_eq!(stats.count, 3);
    assert_eq!(stats.last_paired, Some(at(-3)));
}

#[test]
fn test_map_rejects_negative_count() {
    let result = PairingMap::from_records(vec![record(1, 2, 1, 0), record(3, 4, -2, 0)]);

    assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
}

#[test]
fn test_record_key_is_canonical() {
    assert_eq!(record(8, 3, 1, 0).key(), PairKey::new(3, 8));
}
