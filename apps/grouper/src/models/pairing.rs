use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::{ClassId, StudentId};
use crate::error::{EngineError, EngineResult};

/// Unordered pair of students, always stored smaller id first.
///
/// The fields are private so a key can only be built through [`PairKey::new`],
/// which means every lookup and write goes through the same normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PairKey {
    first: StudentId,
    second: StudentId,
}

impl PairKey {
    /// Builds the canonical key for `a` and `b` in either order
    pub fn new(a: StudentId, b: StudentId) -> Self {
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    /// Like [`PairKey::new`] but rejects a student paired with itself
    pub fn distinct(a: StudentId, b: StudentId) -> EngineResult<Self> {
        if a == b {
            return Err(EngineError::InvalidArgument(format!(
                "student {} cannot be paired with itself",
                a
            )));
        }
        Ok(Self::new(a, b))
    }

    /// Smaller id of the pair
    pub fn first(&self) -> StudentId {
        self.first
    }

    /// Larger id of the pair
    pub fn second(&self) -> StudentId {
        self.second
    }

}

/// Pairing history for one pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PairStats {
    pub count: u32,
    pub last_paired: Option<DateTime<Utc>>,
}

impl PairStats {
    /// Folds another observation of the same pair into this one
    pub fn merge(&mut self, other: PairStats) {
        self.count = self.count.saturating_add(other.count);
        self.last_paired = match (self.last_paired, other.last_paired) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Pairing record as stored: one row per unordered pair per class
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PairingRecord {
    pub class_id: ClassId,
    pub student_a: StudentId,
    pub student_b: StudentId,
    pub pair_count: i32,
    pub last_paired: Option<DateTime<Utc>>,
}

impl PairingRecord {
    /// Canonical key, regardless of how the row was written
    pub fn key(&self) -> PairKey {
        PairKey::new(self.student_a, self.student_b)
    }

    /// Converts the row into stats, rejecting negative counts
    pub fn stats(&self) -> EngineResult<PairStats> {
        let count = u32::try_from(self.pair_count).map_err(|_| {
            EngineError::InvalidArgument(format!(
                "negative pair count {} for students {} and {}",
                self.pair_count, self.student_a, self.student_b
            ))
        })?;

        Ok(PairStats {
            count,
            last_paired: self.last_paired,
        })
    }
}
