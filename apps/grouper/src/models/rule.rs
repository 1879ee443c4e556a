use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{ClassId, PairKey, StudentId};

/// "Never group these two together" rule. Undirected.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Rule {
    pub id: i32,
    pub class_id: ClassId,
    pub student_a: StudentId,
    pub student_b: StudentId,
    pub created_at: DateTime<Utc>,
}

impl Rule {
    /// Canonical key of the forbidden pair
    pub fn key(&self) -> PairKey {
        PairKey::new(self.student_a, self.student_b)
    }
}

/// DTO for creating a rule
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRule {
    pub class_id: ClassId,
    pub student_a: StudentId,
    pub student_b: StudentId,
}
