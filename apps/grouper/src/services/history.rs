use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::EngineResult;
use crate::models::{ClassId, HistoryEntry, SavedGroup, StudentId};
use crate::services::pairing::PairingHistory;
use crate::store::RosterStore;

/// What one call to [`HistoryRecorder::record`] changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    /// Pair counters incremented
    pub updated_pairs: usize,
    /// Log entries appended across all students
    pub history_appends: usize,
    /// Students whose non-standard counter went up
    pub non_standard_students: usize,
}

/// Writes a saved round back into pairing counts and student logs
#[derive(Clone)]
pub struct HistoryRecorder {
    pairings: PairingHistory,
    roster: Arc<dyn RosterStore>,
}

impl HistoryRecorder {
    pub fn new(pairings: PairingHistory, roster: Arc<dyn RosterStore>) -> Self {
        Self { pairings, roster }
    }

    /// Records a round of saved groups.
    ///
    /// Each write is atomic on its own; there is no transaction across them.
    /// A failure is logged with the progress made so far and returned.
    pub async fn record(
        &self,
        class_id: ClassId,
        groups: &[SavedGroup],
        target_size: usize,
        now: DateTime<Utc>,
    ) -> EngineResult<RecordSummary> {
        let mut summary = RecordSummary::default();

        if let Err(e) = self
            .record_into(&mut summary, class_id, groups, target_size, now)
            .await
        {
            log::error!(
                "Recording history for class {} failed after {} pair updates, {} log entries, {} non-standard updates: {}",
                class_id,
                summary.updated_pairs,
                summary.history_appends,
                summary.non_standard_students,
                e
            );
            return Err(e);
        }

        log::info!(
            "Recorded {} groups for class {}: {} pairs, {} log entries, {} non-standard",
            groups.len(),
            class_id,
            summary.updated_pairs,
            summary.history_appends,
            summary.non_standard_students
        );
        Ok(summary)
    }

    async fn record_into(
        &self,
        summary: &mut RecordSummary,
        class_id: ClassId,
        groups: &[SavedGroup],
        target_size: usize,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        // Pair counters
        for group in groups {
            for (i, &a) in group.members.iter().enumerate() {
                for &b in &group.members[i + 1..] {
                    self.pairings.increment(class_id, a, b, now).await?;
                    summary.updated_pairs += 1;
                }
            }
        }

        // Per-student logs
        for group in groups {
            for &student_id in &group.members {
                let entries = log_entries(group, student_id, now);
                if entries.is_empty() {
                    continue;
                }
                self.roster
                    .append_history(class_id, student_id, &entries)
                    .await?;
                summary.history_appends += entries.len();
            }
        }

        // Non-standard counters, once per student per round
        let irregular: BTreeSet<StudentId> = groups
            .iter()
            .filter(|g| g.members.len() != target_size)
            .flat_map(|g| g.members.iter().copied())
            .collect();

        if !irregular.is_empty() {
            let ids: Vec<StudentId> = irregular.into_iter().collect();
            let updated = self.roster.increment_non_standard(class_id, &ids).await?;
            summary.non_standard_students = updated as usize;
        }

        Ok(())
    }
}

/// One entry per groupmate of `student_id`
fn log_entries(group: &SavedGroup, student_id: StudentId, now: DateTime<Utc>) -> Vec<HistoryEntry> {
    group
        .members
        .iter()
        .filter(|&&mate| mate != student_id)
        .map(|&groupmate_id| HistoryEntry {
            groupmate_id,
            timestamp: now,
            group_id: group.id,
        })
        .collect()
}
