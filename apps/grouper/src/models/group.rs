use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ClassId, StudentId};

/// What to do with the students left over when the roster does not divide evenly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizePolicy {
    /// Refuse rosters that do not divide evenly
    EvenOnly,
    /// Spread the remainder as extra members over some groups
    PreferOversize,
    /// Put the remainder in one trailing short group
    #[default]
    PreferUndersize,
}

impl FromStr for SizePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "even" | "even_only" => Ok(Self::EvenOnly),
            "oversize" | "prefer_oversize" => Ok(Self::PreferOversize),
            "undersize" | "prefer_undersize" => Ok(Self::PreferUndersize),
            other => Err(format!("unknown size policy '{}'", other)),
        }
    }
}

impl fmt::Display for SizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EvenOnly => write!(f, "even_only"),
            Self::PreferOversize => write!(f, "prefer_oversize"),
            Self::PreferUndersize => write!(f, "prefer_undersize"),
        }
    }
}

/// A generated (not yet saved) group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub name: String,
    pub members: Vec<StudentId>,
    pub cost: i64,
}

impl Group {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Result of one generation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub groups: Vec<Group>,
    pub cost: i64,
    pub created_at: DateTime<Utc>,
}

impl Partition {
    /// An empty partition, produced for an empty roster
    pub fn empty(created_at: DateTime<Utc>) -> Self {
        Self {
            groups: Vec::new(),
            cost: 0,
            created_at,
        }
    }

    /// Member lists only
    pub fn member_lists(&self) -> Vec<Vec<StudentId>> {
        self.groups.iter().map(|g| g.members.clone()).collect()
    }

    /// Group sizes in order
    pub fn sizes(&self) -> Vec<usize> {
        self.groups.iter().map(Group::len).collect()
    }
}

/// A saved group within a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedGroup {
    pub id: Uuid,
    pub name: String,
    pub members: Vec<StudentId>,
    pub cost: i64,
}

/// A saved set of groups produced together
#[derive(Debug, Clone, Serialize)]
pub struct Round {
    pub id: Uuid,
    pub class_id: ClassId,
    pub target_size: i32,
    pub cost: i64,
    pub created_at: DateTime<Utc>,
    pub groups: Vec<SavedGroup>,
}
