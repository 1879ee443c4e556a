//! Storage seams.
//!
//! The engine never talks to a database directly. Everything it reads or
//! writes goes through these traits, with two implementations: [`MemoryStore`]
//! for tests and embedding, and [`PgStore`] backed by PostgreSQL.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::EngineResult;
use crate::models::{
    Class, ClassId, CreateClass, CreateRule, HistoryEntry, NewStudent, PairKey, PairingRecord,
    Partition, Round, Rule, Student, StudentId,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Classes: the owner of every other record
#[async_trait]
pub trait ClassStore: Send + Sync {
    async fn create_class(&self, input: CreateClass) -> EngineResult<Class>;

    async fn list_classes(&self) -> EngineResult<Vec<Class>>;

    /// Deletes the class along with its students, pairings, rules and rounds
    async fn delete_class(&self, class_id: ClassId) -> EngineResult<()>;
}

/// Roster provider and per-student history log
#[async_trait]
pub trait RosterStore: Send + Sync {
    async fn list_students(&self, class_id: ClassId) -> EngineResult<Vec<Student>>;

    async fn get_student(&self, class_id: ClassId, student_id: StudentId)
        -> EngineResult<Student>;

    async fn add_students(
        &self,
        class_id: ClassId,
        students: Vec<NewStudent>,
    ) -> EngineResult<Vec<Student>>;

    async fn delete_student(&self, class_id: ClassId, student_id: StudentId) -> EngineResult<()>;

    /// Appends entries to a student's log, never rewriting earlier ones.
    /// Returns the new log length.
    async fn append_history(
        &self,
        class_id: ClassId,
        student_id: StudentId,
        entries: &[HistoryEntry],
    ) -> EngineResult<usize>;

    /// Adds one to the non-standard counter of each listed student
    async fn increment_non_standard(
        &self,
        class_id: ClassId,
        student_ids: &[StudentId],
    ) -> EngineResult<u64>;

    /// Empties every log in the class and zeroes the non-standard counters
    async fn reset_history(&self, class_id: ClassId) -> EngineResult<u64>;
}

/// Pairing counts keyed by canonical pair
#[async_trait]
pub trait PairingStore: Send + Sync {
    async fn fetch(&self, class_id: ClassId, key: PairKey) -> EngineResult<Option<PairingRecord>>;

    /// Every record in the class touching any of `student_ids`, in one read
    async fn fetch_for_students(
        &self,
        class_id: ClassId,
        student_ids: &[StudentId],
    ) -> EngineResult<Vec<PairingRecord>>;

    /// Atomic insert-or-increment of one pair; returns the updated record
    async fn increment(
        &self,
        class_id: ClassId,
        key: PairKey,
        at: DateTime<Utc>,
    ) -> EngineResult<PairingRecord>;

    /// Deletes every record of the class; returns the number removed
    async fn clear_pairings(&self, class_id: ClassId) -> EngineResult<u64>;
}

/// "Never group together" rules
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list_rules(&self, class_id: ClassId) -> EngineResult<Vec<Rule>>;

    async fn add_rule(&self, input: CreateRule) -> EngineResult<Rule>;

    async fn delete_rule(&self, class_id: ClassId, rule_id: i32) -> EngineResult<()>;
}

/// Saved rounds of groups
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn save_round(
        &self,
        class_id: ClassId,
        target_size: usize,
        partition: &Partition,
    ) -> EngineResult<Round>;

    async fn latest_round(&self, class_id: ClassId) -> EngineResult<Option<Round>>;

    /// Deletes every round of the class; returns the number removed
    async fn clear_rounds(&self, class_id: ClassId) -> EngineResult<u64>;
}
