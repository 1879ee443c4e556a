//! Pairing-history cost model.
//!
//! A pair that has worked together before costs `count * pair_weight`, plus a
//! recency bonus that decays by one per day over `recency_window_days`, so a
//! fresh pairing is more expensive to repeat than an old one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::EngineResult;
use crate::models::{PairKey, PairStats, PairingRecord, StudentId};

pub const DEFAULT_PAIR_WEIGHT: i64 = 10;
pub const DEFAULT_RECENCY_WINDOW_DAYS: i64 = 10;

/// In-memory pairing history for one class, loaded once per generation call
#[derive(Debug, Clone, Default)]
pub struct PairingMap {
    entries: HashMap<PairKey, PairStats>,
}

impl PairingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the map from stored rows.
    ///
    /// Rows are re-normalized, so a store holding both `(a, b)` and `(b, a)`
    /// folds into a single entry. Negative counts are rejected.
    pub fn from_records<I>(records: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = PairingRecord>,
    {
        let mut map = Self::new();
        for record in records {
            map.record(record.key(), record.stats()?);
        }
        Ok(map)
    }

    /// Adds an observation, merging with any existing entry for the pair
    pub fn record(&mut self, key: PairKey, stats: PairStats) {
        self.entries.entry(key).or_default().merge(stats);
    }

    /// Stats for a pair in either order; zero when never paired
    pub fn get(&self, a: StudentId, b: StudentId) -> PairStats {
        self.entries
            .get(&PairKey::new(a, b))
            .copied()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PairKey, &PairStats)> {
        self.entries.iter()
    }
}

/// Converts pairing history into costs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostModel {
    pub pair_weight: i64,
    pub recency_window_days: i64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            pair_weight: DEFAULT_PAIR_WEIGHT,
            recency_window_days: DEFAULT_RECENCY_WINDOW_DAYS,
        }
    }
}

impl CostModel {
    /// Cost of placing one pair together again
    pub fn pair_cost(&self, stats: &PairStats, now: DateTime<Utc>) -> i64 {
        let base = i64::from(stats.count) * self.pair_weight;
        let recency = match stats.last_paired {
            // a timestamp in the future counts as today
            Some(at) => {
                let days = (now - at).num_days().max(0);
                (self.recency_window_days - days).max(0)
            }
            None => 0,
        };
        base + recency
    }

    /// Sum of pair costs over every unordered pair in the group
    pub fn group_cost(&self, group: &[StudentId], map: &PairingMap, now: DateTime<Utc>) -> i64 {
        let mut total = 0;
        for (i, &a) in group.iter().enumerate() {
            for &b in &group[i + 1..] {
                total += self.pair_cost(&map.get(a, b), now);
            }
        }
        total
    }

    /// Sum of group costs; the value the partitioner minimizes
    pub fn partition_cost<G>(&self, groups: &[G], map: &PairingMap, now: DateTime<Utc>) -> i64
    where
        G: AsRef<[StudentId]>,
    {
        groups
            .iter()
            .map(|g| self.group_cost(g.as_ref(), map, now))
            .sum()
    }

    /// Precomputes every non-zero pair cost at `now`
    pub fn matrix(&self, map: &PairingMap, now: DateTime<Utc>) -> PairCosts {
        let costs = map
            .iter()
            .map(|(key, stats)| (*key, self.pair_cost(stats, now)))
            .filter(|(_, cost)| *cost != 0)
            .collect();
        PairCosts { costs }
    }
}

/// Pair costs frozen at one instant. Lookups only, no storage access.
#[derive(Debug, Clone, Default)]
pub struct PairCosts {
    costs: HashMap<PairKey, i64>,
}

impl PairCosts {
    pub fn get(&self, a: StudentId, b: StudentId) -> i64 {
        self.costs.get(&PairKey::new(a, b)).copied().unwrap_or(0)
    }

    pub fn group_cost(&self, group: &[StudentId]) -> i64 {
        let mut total = 0;
        for (i, &a) in group.iter().enumerate() {
            for &b in &group[i + 1..] {
                total += self.get(a, b);
            }
        }
        total
    }

    pub fn partition_cost<G>(&self, groups: &[G]) -> i64
    where
        G: AsRef<[StudentId]>,
    {
        groups.iter().map(|g| self.group_cost(g.as_ref())).sum()
    }
}
