use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{ClassId, StudentId};
use crate::error::EngineError;

/// Student model with the grouping history already decoded
#[derive(Debug, Clone, Serialize)]
pub struct Student {
    pub id: StudentId,
    pub class_id: ClassId,
    pub first_name: String,
    pub last_name: String,
    /// Times placed in a group whose size differed from the target
    pub non_standard_groupings: i32,
    pub grouping_history: Vec<HistoryEntry>,
}

impl Student {
    /// "Last, First", used for sorting rosters
    pub fn sort_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

/// DTO for importing a student into a roster
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
}

impl NewStudent {
    /// Parses a pasted roster, one "First Last" per line.
    ///
    /// The first word is the first name and the remaining words the last name.
    /// Blank lines are ignored; single-word lines are skipped with a warning.
    pub fn parse_roster(text: &str) -> Vec<NewStudent> {
        let mut students = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let mut words = line.split_whitespace();
            let Some(first) = words.next() else {
                continue;
            };
            let last = words.collect::<Vec<_>>().join(" ");
            if last.is_empty() {
                log::warn!("Roster line {} has no last name, skipping: {:?}", number + 1, line.trim());
                continue;
            }
            students.push(NewStudent {
                first_name: first.to_string(),
                last_name: last,
            });
        }
        students
    }
}

/// One line of a student's grouping log: who they were grouped with, when, where
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub groupmate_id: StudentId,
    pub timestamp: DateTime<Utc>,
    pub group_id: Uuid,
}

impl HistoryEntry {
    /// Decodes a stored grouping log.
    ///
    /// Absent or null logs are empty. Logs written as a JSON string (older rows)
    /// are parsed first. Entries that do not match the schema are skipped with a
    /// warning; a log that is neither an array nor a string is treated as empty.
    pub fn decode_log(student_id: StudentId, raw: Option<&Value>) -> Vec<HistoryEntry> {
        let parsed;
        let value = match raw {
            None | Some(Value::Null) => return Vec::new(),
            Some(Value::String(s)) if s.trim().is_empty() => return Vec::new(),
            Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
                Ok(v) => {
                    parsed = v;
                    &parsed
                }
                Err(e) => {
                    warn_malformed(student_id, format!("unparseable log: {}", e));
                    return Vec::new();
                }
            },
            Some(v) => v,
        };

        let Some(items) = value.as_array() else {
            warn_malformed(student_id, format!("expected an array, got {}", value));
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| match serde_json::from_value::<HistoryEntry>(item.clone()) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn_malformed(student_id, format!("skipping {}: {}", item, e));
                    None
                }
            })
            .collect()
    }

    /// Encodes a log for storage
    pub fn encode_log(entries: &[HistoryEntry]) -> Value {
        serde_json::to_value(entries).unwrap_or_else(|_| Value::Array(Vec::new()))
    }
}

fn warn_malformed(student_id: StudentId, reason: String) {
    let err = EngineError::MalformedHistoryEntry { student_id, reason };
    log::warn!("{}", err);
}

/// How often a student has been grouped with one classmate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassmateCount {
    pub id: StudentId,
    pub first_name: String,
    pub last_name: String,
    pub group_count: u32,
}

/// Per-student view of past groupings
#[derive(Debug, Clone, Serialize)]
pub struct StudentSummary {
    pub student_id: StudentId,
    /// Classmates never grouped with, sorted by "last, first"
    pub never_grouped: Vec<ClassmateCount>,
    /// Classmates grouped with at least once, fewest pairings first
    pub grouped: Vec<ClassmateCount>,
    pub non_standard_groupings: i32,
}
