use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::{ClassStore, GroupStore, PairingStore, RosterStore, RuleStore};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    Class, ClassId, CreateClass, CreateRule, HistoryEntry, NewStudent, PairKey, PairingRecord,
    Partition, Round, Rule, SavedGroup, Student, StudentId,
};

/// Student as held in memory: the log is kept in its stored (JSON) form
#[derive(Debug, Clone)]
struct StoredStudent {
    class_id: ClassId,
    first_name: String,
    last_name: String,
    non_standard_groupings: i32,
    grouping_history: Value,
}

impl StoredStudent {
    fn to_student(&self, id: StudentId) -> Student {
        Student {
            id,
            class_id: self.class_id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            non_standard_groupings: self.non_standard_groupings,
            grouping_history: HistoryEntry::decode_log(id, Some(&self.grouping_history)),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    next_class_id: ClassId,
    next_student_id: StudentId,
    next_rule_id: i32,
    classes: BTreeMap<ClassId, Class>,
    students: BTreeMap<StudentId, StoredStudent>,
    /// Keyed exactly as written, so rows in either order can coexist
    pairings: HashMap<(ClassId, StudentId, StudentId), PairingRecord>,
    rules: BTreeMap<i32, Rule>,
    rounds: Vec<Round>,
}

/// In-process store implementing every storage seam behind one lock.
///
/// Each operation takes the lock once, so a pair increment is a single
/// read-modify-write that cannot interleave with another.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `StorageUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Writes a pairing row verbatim, without normalizing the pair
    pub fn insert_raw_pairing(&self, record: PairingRecord) -> EngineResult<()> {
        let mut state = self.state()?;
        state.pairings.insert(
            (record.class_id, record.student_a, record.student_b),
            record,
        );
        Ok(())
    }

    /// Replaces a student's stored log with an arbitrary JSON value
    pub fn set_raw_history(&self, student_id: StudentId, raw: Value) -> EngineResult<()> {
        let mut state = self.state()?;
        let student = state
            .students
            .get_mut(&student_id)
            .ok_or_else(|| not_found_student(student_id))?;
        student.grouping_history = raw;
        Ok(())
    }

    fn state(&self) -> EngineResult<MutexGuard<'_, State>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EngineError::StorageUnavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        self.state
            .lock()
            .map_err(|_| EngineError::StorageUnavailable("memory store lock poisoned".to_string()))
    }
}

fn not_found_student(student_id: StudentId) -> EngineError {
    EngineError::NotFound(format!("Student with id {} not found", student_id))
}

fn student_in_class(
    state: &mut State,
    class_id: ClassId,
    student_id: StudentId,
) -> EngineResult<&mut StoredStudent> {
    state
        .students
        .get_mut(&student_id)
        .filter(|s| s.class_id == class_id)
        .ok_or_else(|| not_found_student(student_id))
}

#[async_trait]
impl ClassStore for MemoryStore {
    async fn create_class(&self, input: CreateClass) -> EngineResult<Class> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidArgument(
                "Class name cannot be empty".to_string(),
            ));
        }

        let mut state = self.state()?;
        state.next_class_id += 1;
        let class = Class {
            id: state.next_class_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        state.classes.insert(class.id, class.clone());
        Ok(class)
    }

    async fn list_classes(&self) -> EngineResult<Vec<Class>> {
        Ok(self.state()?.classes.values().cloned().collect())
    }

    async fn delete_class(&self, class_id: ClassId) -> EngineResult<()> {
        let mut state = self.state()?;
        if state.classes.remove(&class_id).is_none() {
            return Err(EngineError::NotFound(format!(
                "Class with id {} not found",
                class_id
            )));
        }
        state.students.retain(|_, s| s.class_id != class_id);
        state.pairings.retain(|(c, _, _), _| *c != class_id);
        state.rules.retain(|_, r| r.class_id != class_id);
        state.rounds.retain(|r| r.class_id != class_id);
        Ok(())
    }
}

#[async_trait]
impl RosterStore for MemoryStore {
    async fn list_students(&self, class_id: ClassId) -> EngineResult<Vec<Student>> {
        let state = self.state()?;
        Ok(state
            .students
            .iter()
            .filter(|(_, s)| s.class_id == class_id)
            .map(|(id, s)| s.to_student(*id))
            .collect())
    }

    async fn get_student(
        &self,
        class_id: ClassId,
        student_id: StudentId,
    ) -> EngineResult<Student> {
        let mut state = self.state()?;
        let student = student_in_class(&mut state, class_id, student_id)?;
        Ok(student.to_student(student_id))
    }

    async fn add_students(
        &self,
        class_id: ClassId,
        students: Vec<NewStudent>,
    ) -> EngineResult<Vec<Student>> {
        let mut state = self.state()?;
        if !state.classes.contains_key(&class_id) {
            return Err(EngineError::NotFound(format!(
                "Class with id {} not found",
                class_id
            )));
        }

        let mut created = Vec::with_capacity(students.len());
        for input in students {
            state.next_student_id += 1;
            let id = state.next_student_id;
            let stored = StoredStudent {
                class_id,
                first_name: input.first_name.trim().to_string(),
                last_name: input.last_name.trim().to_string(),
                non_standard_groupings: 0,
                grouping_history: Value::Array(Vec::new()),
            };
            created.push(stored.to_student(id));
            state.students.insert(id, stored);
        }
        Ok(created)
    }

    async fn delete_student(&self, class_id: ClassId, student_id: StudentId) -> EngineResult<()> {
        let mut state = self.state()?;
        student_in_class(&mut state, class_id, student_id)?;
        state.students.remove(&student_id);
        Ok(())
    }

    async fn append_history(
        &self,
        class_id: ClassId,
        student_id: StudentId,
        entries: &[HistoryEntry],
    ) -> EngineResult<usize> {
        let mut state = self.state()?;
        let student = student_in_class(&mut state, class_id, student_id)?;
        let mut log = HistoryEntry::decode_log(student_id, Some(&student.grouping_history));
        log.extend_from_slice(entries);
        student.grouping_history = HistoryEntry::encode_log(&log);
        Ok(log.len())
    }

    async fn increment_non_standard(
        &self,
        class_id: ClassId,
        student_ids: &[StudentId],
    ) -> EngineResult<u64> {
        let mut state = self.state()?;
        let mut updated = 0;
        for id in student_ids {
            if let Some(student) = state
                .students
                .get_mut(id)
                .filter(|s| s.class_id == class_id)
            {
                student.non_standard_groupings += 1;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn reset_history(&self, class_id: ClassId) -> EngineResult<u64> {
        let mut state = self.state()?;
        let mut reset = 0;
        for student in state.students.values_mut().filter(|s| s.class_id == class_id) {
            student.grouping_history = Value::Array(Vec::new());
            student.non_standard_groupings = 0;
            reset += 1;
        }
        Ok(reset)
    }
}

#[async_trait]
impl PairingStore for MemoryStore {
    async fn fetch(&self, class_id: ClassId, key: PairKey) -> EngineResult<Option<PairingRecord>> {
        let state = self.state()?;
        Ok(state
            .pairings
            .get(&(class_id, key.first(), key.second()))
            .cloned())
    }

    async fn fetch_for_students(
        &self,
        class_id: ClassId,
        student_ids: &[StudentId],
    ) -> EngineResult<Vec<PairingRecord>> {
        let wanted: HashSet<StudentId> = student_ids.iter().copied().collect();
        let state = self.state()?;
        Ok(state
            .pairings
            .values()
            .filter(|r| {
                r.class_id == class_id
                    && (wanted.contains(&r.student_a) || wanted.contains(&r.student_b))
            })
            .cloned()
            .collect())
    }

    async fn increment(
        &self,
        class_id: ClassId,
        key: PairKey,
        at: DateTime<Utc>,
    ) -> EngineResult<PairingRecord> {
        let mut state = self.state()?;
        let record = state
            .pairings
            .entry((class_id, key.first(), key.second()))
            .and_modify(|r| {
                r.pair_count += 1;
                r.last_paired = Some(at);
            })
            .or_insert_with(|| PairingRecord {
                class_id,
                student_a: key.first(),
                student_b: key.second(),
                pair_count: 1,
                last_paired: Some(at),
            });
        Ok(record.clone())
    }

    async fn clear_pairings(&self, class_id: ClassId) -> EngineResult<u64> {
        let mut state = self.state()?;
        let before = state.pairings.len();
        state.pairings.retain(|(c, _, _), _| *c != class_id);
        Ok((before - state.pairings.len()) as u64)
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn list_rules(&self, class_id: ClassId) -> EngineResult<Vec<Rule>> {
        let state = self.state()?;
        Ok(state
            .rules
            .values()
            .filter(|r| r.class_id == class_id)
            .cloned()
            .collect())
    }

    async fn add_rule(&self, input: CreateRule) -> EngineResult<Rule> {
        let key = PairKey::distinct(input.student_a, input.student_b)?;
        let mut state = self.state()?;

        if let Some(existing) = state
            .rules
            .values()
            .find(|r| r.class_id == input.class_id && r.key() == key)
        {
            return Ok(existing.clone());
        }

        state.next_rule_id += 1;
        let rule = Rule {
            id: state.next_rule_id,
            class_id: input.class_id,
            student_a: key.first(),
            student_b: key.second(),
            created_at: Utc::now(),
        };
        state.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn delete_rule(&self, class_id: ClassId, rule_id: i32) -> EngineResult<()> {
        let mut state = self.state()?;
        match state.rules.get(&rule_id) {
            Some(rule) if rule.class_id == class_id => {
                state.rules.remove(&rule_id);
                Ok(())
            }
            _ => Err(EngineError::NotFound(format!(
                "Rule with id {} not found",
                rule_id
            ))),
        }
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn save_round(
        &self,
        class_id: ClassId,
        target_size: usize,
        partition: &Partition,
    ) -> EngineResult<Round> {
        let round = Round {
            id: Uuid::new_v4(),
            class_id,
            target_size: target_size as i32,
            cost: partition.cost,
            created_at: partition.created_at,
            groups: partition
                .groups
                .iter()
                .map(|g| SavedGroup {
                    id: Uuid::new_v4(),
                    name: g.name.clone(),
                    members: g.members.clone(),
                    cost: g.cost,
                })
                .collect(),
        };

        self.state()?.rounds.push(round.clone());
        Ok(round)
    }

    async fn latest_round(&self, class_id: ClassId) -> EngineResult<Option<Round>> {
        let state = self.state()?;
        Ok(state
            .rounds
            .iter()
            .filter(|r| r.class_id == class_id)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn clear_rounds(&self, class_id: ClassId) -> EngineResult<u64> {
        let mut state = self.state()?;
        let before = state.rounds.len();
        state.rounds.retain(|r| r.class_id != class_id);
        Ok((before - state.rounds.len()) as u64)
    }
}
