use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::ClassId;

/// Class model - owns students, pairing records, rules and rounds
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// DTO for creating a new class
#[derive(Debug, Deserialize)]
pub struct CreateClass {
    pub name: String,
}
