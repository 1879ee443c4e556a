use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    ClassId, ClassmateCount, Group, NewStudent, Partition, Round, SizePolicy, Student, StudentId,
    StudentSummary,
};
use crate::services::cost::CostModel;
use crate::services::history::{HistoryRecorder, RecordSummary};
use crate::services::pairing::PairingHistory;
use crate::services::partition::{PartitionRequest, Partitioner, Strategy};
use crate::services::rules::RuleSet;
use crate::store::{GroupStore, PairingStore, RosterStore, RuleStore};

/// Parameters for one generation call
#[derive(Debug, Clone)]
pub struct GenerateSettings {
    pub group_size: usize,
    pub size_policy: SizePolicy,
    pub partitioner: Partitioner,
    pub now: DateTime<Utc>,
}

impl GenerateSettings {
    /// Settings taken from configuration, stamped with `now`
    pub fn from_config(config: &EngineConfig, now: DateTime<Utc>) -> Self {
        Self {
            group_size: config.group_size,
            size_policy: config.size_policy,
            partitioner: Partitioner::new(config.strategy())
                .with_cost_model(config.cost_model())
                .with_max_attempts(config.max_attempts),
            now,
        }
    }

    pub fn with_group_size(mut self, group_size: usize) -> Self {
        self.group_size = group_size;
        self
    }

    pub fn with_policy(mut self, size_policy: SizePolicy) -> Self {
        self.size_policy = size_policy;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.partitioner.strategy = strategy;
        self
    }
}

/// A persisted round and what recording it changed
#[derive(Debug, Clone, Serialize)]
pub struct SavedRound {
    pub round: Round,
    pub recorded: RecordSummary,
}

/// Rows removed or reset by [`GroupingService::clear_history`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistoryCleared {
    pub pairings: u64,
    pub students: u64,
    pub rounds: u64,
}

/// Runs a whole round for a class: load, partition, save, record
#[derive(Clone)]
pub struct GroupingService {
    roster: Arc<dyn RosterStore>,
    rules: Arc<dyn RuleStore>,
    groups: Arc<dyn GroupStore>,
    pairings: PairingHistory,
    recorder: HistoryRecorder,
}

impl GroupingService {
    /// Builds the service over one store implementing every seam
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: RosterStore + RuleStore + GroupStore + PairingStore + 'static,
    {
        let pairings = PairingHistory::new(store.clone());
        let roster: Arc<dyn RosterStore> = store.clone();
        Self {
            recorder: HistoryRecorder::new(pairings.clone(), roster.clone()),
            roster,
            rules: store.clone(),
            groups: store,
            pairings,
        }
    }

    pub fn pairings(&self) -> &PairingHistory {
        &self.pairings
    }

    /// Generates (does not save) groups for the class roster.
    ///
    /// Roster, rules and pairing history are each read once; the partitioner
    /// then runs entirely in memory.
    pub async fn generate<R>(
        &self,
        class_id: ClassId,
        settings: &GenerateSettings,
        rng: &mut R,
    ) -> EngineResult<Partition>
    where
        R: Rng + ?Sized,
    {
        let students = self.roster.list_students(class_id).await?;
        let student_ids: Vec<StudentId> = students.iter().map(|s| s.id).collect();
        let priority: HashMap<StudentId, i32> = students
            .iter()
            .map(|s| (s.id, s.non_standard_groupings))
            .collect();

        let rules = RuleSet::from_rules(&self.rules.list_rules(class_id).await?);
        let pairings = self.pairings.bulk_load(class_id, &student_ids).await?;

        log::debug!(
            "Generating {} groups for class {}: {} students, size {}, {} rules, {} known pairs",
            settings.partitioner.strategy.name(),
            class_id,
            student_ids.len(),
            settings.group_size,
            rules.len(),
            pairings.len()
        );

        let request = PartitionRequest::new(&student_ids, settings.group_size, settings.now)
            .with_policy(settings.size_policy)
            .with_rules(&rules)
            .with_pairings(&pairings)
            .with_priority(&priority);

        settings.partitioner.partition(&request, rng)
    }

    /// Persists a generated partition as a round, then records its history
    pub async fn save(
        &self,
        class_id: ClassId,
        partition: &Partition,
        target_size: usize,
        now: DateTime<Utc>,
    ) -> EngineResult<SavedRound> {
        let round = self
            .groups
            .save_round(class_id, target_size, partition)
            .await?;
        log::info!(
            "Saved round {} for class {} ({} groups, cost {})",
            round.id,
            class_id,
            round.groups.len(),
            round.cost
        );

        let recorded = self
            .recorder
            .record(class_id, &round.groups, target_size, now)
            .await?;

        Ok(SavedRound { round, recorded })
    }

    /// Adds every "First Last" line of `text` to the class roster
    pub async fn import_roster(&self, class_id: ClassId, text: &str) -> EngineResult<Vec<Student>> {
        let parsed = NewStudent::parse_roster(text);
        if parsed.is_empty() {
            return Err(EngineError::InvalidArgument(
                "roster contains no \"First Last\" lines".to_string(),
            ));
        }
        let added = self.roster.add_students(class_id, parsed).await?;
        log::info!("Imported {} students into class {}", added.len(), class_id);
        Ok(added)
    }

    /// Prices hand-arranged groups against the class history.
    ///
    /// Every member must be on the roster and appear only once.
    pub async fn score(
        &self,
        class_id: ClassId,
        groups: &[Vec<StudentId>],
        cost_model: &CostModel,
        now: DateTime<Utc>,
    ) -> EngineResult<Partition> {
        let roster: HashSet<StudentId> = self
            .roster
            .list_students(class_id)
            .await?
            .iter()
            .map(|s| s.id)
            .collect();

        let mut seen = HashSet::new();
        for &id in groups.iter().flatten() {
            if !roster.contains(&id) {
                return Err(EngineError::NotFound(format!(
                    "Student {} not found in class {}",
                    id, class_id
                )));
            }
            if !seen.insert(id) {
                return Err(EngineError::InvalidArgument(format!(
                    "student {} appears more than once",
                    id
                )));
            }
        }

        let ids: Vec<StudentId> = seen.into_iter().collect();
        let pairings = self.pairings.bulk_load(class_id, &ids).await?;

        let groups: Vec<Group> = groups
            .iter()
            .enumerate()
            .map(|(i, members)| Group {
                name: format!("Group {}", i + 1),
                members: members.clone(),
                cost: cost_model.group_cost(members, &pairings, now),
            })
            .collect();

        Ok(Partition {
            cost: groups.iter().map(|g| g.cost).sum(),
            groups,
            created_at: now,
        })
    }

    pub async fn latest_round(&self, class_id: ClassId) -> EngineResult<Option<Round>> {
        self.groups.latest_round(class_id).await
    }

    /// Forgets every pairing, log entry, non-standard count and round of the class
    pub async fn clear_history(&self, class_id: ClassId) -> EngineResult<HistoryCleared> {
        let cleared = HistoryCleared {
            pairings: self.pairings.clear(class_id).await?,
            students: self.roster.reset_history(class_id).await?,
            rounds: self.groups.clear_rounds(class_id).await?,
        };
        log::info!(
            "Cleared history for class {}: {} pairings, {} students reset, {} rounds",
            class_id,
            cleared.pairings,
            cleared.students,
            cleared.rounds
        );
        Ok(cleared)
    }

    /// Who a student has and has not worked with
    pub async fn student_summary(
        &self,
        class_id: ClassId,
        student_id: StudentId,
    ) -> EngineResult<StudentSummary> {
        let student = self.roster.get_student(class_id, student_id).await?;
        let classmates = self.roster.list_students(class_id).await?;
        let pairings = self.pairings.bulk_load(class_id, &[student_id]).await?;

        let mut never_grouped = Vec::new();
        let mut grouped = Vec::new();
        for mate in classmates.iter().filter(|s| s.id != student_id) {
            let entry = ClassmateCount {
                id: mate.id,
                first_name: mate.first_name.clone(),
                last_name: mate.last_name.clone(),
                group_count: pairings.get(student_id, mate.id).count,
            };
            if entry.group_count == 0 {
                never_grouped.push((mate.sort_name(), entry));
            } else {
                grouped.push((mate.sort_name(), entry));
            }
        }

        never_grouped.sort_by(|a, b| a.0.cmp(&b.0));
        grouped.sort_by(|a, b| a.1.group_count.cmp(&b.1.group_count).then(a.0.cmp(&b.0)));

        Ok(StudentSummary {
            student_id: student.id,
            never_grouped: never_grouped.into_iter().map(|(_, c)| c).collect(),
            grouped: grouped.into_iter().map(|(_, c)| c).collect(),
            non_standard_groupings: student.non_standard_groupings,
        })
    }

    /// Times `a` and `b` have been grouped together
    pub async fn pair_count(&self, class_id: ClassId, a: StudentId, b: StudentId) -> EngineResult<u32> {
        Ok(self.pairings.get(class_id, a, b).await?.count)
    }
}
