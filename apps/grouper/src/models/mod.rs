pub mod class;
pub mod group;
pub mod pairing;
pub mod rule;
pub mod student;

pub use class::{Class, CreateClass};
pub use group::{Group, Partition, Round, SavedGroup, SizePolicy};
pub use pairing::{PairKey, PairStats, PairingRecord};
pub use rule::{CreateRule, Rule};
pub use student::{ClassmateCount, HistoryEntry, NewStudent, Student, StudentSummary};

/// Student identifier (unique within a class)
pub type StudentId = i32;

/// Class identifier
pub type ClassId = i32;
