use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::EngineResult;
use crate::models::{ClassId, PairKey, PairStats, PairingRecord, StudentId};
use crate::services::cost::PairingMap;
use crate::store::PairingStore;

/// Per-class pairing counts over an injected store
#[derive(Clone)]
pub struct PairingHistory {
    store: Arc<dyn PairingStore>,
}

impl PairingHistory {
    pub fn new(store: Arc<dyn PairingStore>) -> Self {
        Self { store }
    }

    /// Stats for a pair in either order; zero when never paired
    pub async fn get(&self, class_id: ClassId, a: StudentId, b: StudentId) -> EngineResult<PairStats> {
        match self.store.fetch(class_id, PairKey::new(a, b)).await? {
            Some(record) => record.stats(),
            None => Ok(PairStats::default()),
        }
    }

    /// Loads every pair touching `student_ids` with a single store read
    pub async fn bulk_load(
        &self,
        class_id: ClassId,
        student_ids: &[StudentId],
    ) -> EngineResult<PairingMap> {
        let records = self.store.fetch_for_students(class_id, student_ids).await?;
        log::debug!(
            "Loaded {} pairing records for {} students in class {}",
            records.len(),
            student_ids.len(),
            class_id
        );
        PairingMap::from_records(records)
    }

    /// Records one more pairing of `a` and `b` at `at`
    pub async fn increment(
        &self,
        class_id: ClassId,
        a: StudentId,
        b: StudentId,
        at: DateTime<Utc>,
    ) -> EngineResult<PairingRecord> {
        let key = PairKey::distinct(a, b)?;
        self.store.increment(class_id, key, at).await
    }

    /// Forgets every pairing in the class
    pub async fn clear(&self, class_id: ClassId) -> EngineResult<u64> {
        let removed = self.store.clear_pairings(class_id).await?;
        log::info!("Cleared {} pairing records for class {}", removed, class_id);
        Ok(removed)
    }
}
