use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{ClassStore, GroupStore, PairingStore, RosterStore, RuleStore};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    Class, ClassId, CreateClass, CreateRule, HistoryEntry, NewStudent, PairKey, PairingRecord,
    Partition, Round, Rule, SavedGroup, Student, StudentId,
};

/// PostgreSQL implementation of every storage seam
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Student row; the log column is decoded leniently on the way out
#[derive(Debug, FromRow)]
struct StudentRow {
    id: StudentId,
    class_id: ClassId,
    first_name: String,
    last_name: String,
    non_standard_groupings: i32,
    grouping_history: Option<Value>,
}

impl From<StudentRow> for Student {
    fn from(row: StudentRow) -> Self {
        let grouping_history = HistoryEntry::decode_log(row.id, row.grouping_history.as_ref());
        Student {
            id: row.id,
            class_id: row.class_id,
            first_name: row.first_name,
            last_name: row.last_name,
            non_standard_groupings: row.non_standard_groupings,
            grouping_history,
        }
    }
}

#[derive(Debug, FromRow)]
struct RoundRow {
    id: Uuid,
    class_id: ClassId,
    target_size: i32,
    cost: i64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct GroupRow {
    id: Uuid,
    name: String,
    cost: i64,
}

const STUDENT_COLUMNS: &str =
    "id, class_id, first_name, last_name, non_standard_groupings, grouping_history";

const PAIRING_COLUMNS: &str = "class_id, student_a, student_b, pair_count, last_paired";

#[async_trait]
impl ClassStore for PgStore {
    async fn create_class(&self, input: CreateClass) -> EngineResult<Class> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidArgument(
                "Class name cannot be empty".to_string(),
            ));
        }

        let class = sqlx::query_as::<_, Class>(
            "INSERT INTO classes (name) VALUES ($1) RETURNING id, name, created_at",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(class)
    }

    async fn list_classes(&self) -> EngineResult<Vec<Class>> {
        let classes =
            sqlx::query_as::<_, Class>("SELECT id, name, created_at FROM classes ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(classes)
    }

    async fn delete_class(&self, class_id: ClassId) -> EngineResult<()> {
        // students, pairings, rules and rounds cascade
        let result = sqlx::query("DELETE FROM classes WHERE id = $1")
            .bind(class_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!(
                "Class with id {} not found",
                class_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RosterStore for PgStore {
    async fn list_students(&self, class_id: ClassId) -> EngineResult<Vec<Student>> {
        let rows = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {} FROM students WHERE class_id = $1 ORDER BY id",
            STUDENT_COLUMNS
        ))
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Student::from).collect())
    }

    async fn get_student(
        &self,
        class_id: ClassId,
        student_id: StudentId,
    ) -> EngineResult<Student> {
        let row = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {} FROM students WHERE class_id = $1 AND id = $2",
            STUDENT_COLUMNS
        ))
        .bind(class_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("Student with id {} not found", student_id)))?;

        Ok(row.into())
    }

    async fn add_students(
        &self,
        class_id: ClassId,
        students: Vec<NewStudent>,
    ) -> EngineResult<Vec<Student>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(students.len());

        for input in students {
            let row = sqlx::query_as::<_, StudentRow>(&format!(
                r#"
                INSERT INTO students (class_id, first_name, last_name)
                VALUES ($1, $2, $3)
                RETURNING {}
                "#,
                STUDENT_COLUMNS
            ))
            .bind(class_id)
            .bind(input.first_name.trim())
            .bind(input.last_name.trim())
            .fetch_one(&mut *tx)
            .await?;
            created.push(Student::from(row));
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn delete_student(&self, class_id: ClassId, student_id: StudentId) -> EngineResult<()> {
        let result = sqlx::query("DELETE FROM students WHERE class_id = $1 AND id = $2")
            .bind(class_id)
            .bind(student_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!(
                "Student with id {} not found",
                student_id
            )));
        }
        Ok(())
    }

    async fn append_history(
        &self,
        class_id: ClassId,
        student_id: StudentId,
        entries: &[HistoryEntry],
    ) -> EngineResult<usize> {
        let mut tx = self.pool.begin().await?;

        // Row lock so concurrent saves append instead of overwriting each other
        let raw: Option<Option<Value>> = sqlx::query_scalar(
            "SELECT grouping_history FROM students WHERE class_id = $1 AND id = $2 FOR UPDATE",
        )
        .bind(class_id)
        .bind(student_id)
        .fetch_optional(&mut *tx)
        .await?;

        let raw = raw.ok_or_else(|| {
            EngineError::NotFound(format!("Student with id {} not found", student_id))
        })?;

        let mut log = HistoryEntry::decode_log(student_id, raw.as_ref());
        log.extend_from_slice(entries);

        sqlx::query("UPDATE students SET grouping_history = $3 WHERE class_id = $1 AND id = $2")
            .bind(class_id)
            .bind(student_id)
            .bind(HistoryEntry::encode_log(&log))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(log.len())
    }

    async fn increment_non_standard(
        &self,
        class_id: ClassId,
        student_ids: &[StudentId],
    ) -> EngineResult<u64> {
        if student_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE students
            SET non_standard_groupings = non_standard_groupings + 1
            WHERE class_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(class_id)
        .bind(student_ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn reset_history(&self, class_id: ClassId) -> EngineResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE students
            SET grouping_history = '[]'::jsonb, non_standard_groupings = 0
            WHERE class_id = $1
            "#,
        )
        .bind(class_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PairingStore for PgStore {
    async fn fetch(&self, class_id: ClassId, key: PairKey) -> EngineResult<Option<PairingRecord>> {
        let record = sqlx::query_as::<_, PairingRecord>(&format!(
            r#"
            SELECT {} FROM pairing_records
            WHERE class_id = $1 AND student_a = $2 AND student_b = $3
            "#,
            PAIRING_COLUMNS
        ))
        .bind(class_id)
        .bind(key.first())
        .bind(key.second())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn fetch_for_students(
        &self,
        class_id: ClassId,
        student_ids: &[StudentId],
    ) -> EngineResult<Vec<PairingRecord>> {
        if student_ids.is_empty() {
            return Ok(Vec::new());
        }

        let records = sqlx::query_as::<_, PairingRecord>(&format!(
            r#"
            SELECT {} FROM pairing_records
            WHERE class_id = $1 AND (student_a = ANY($2) OR student_b = ANY($2))
            "#,
            PAIRING_COLUMNS
        ))
        .bind(class_id)
        .bind(student_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn increment(
        &self,
        class_id: ClassId,
        key: PairKey,
        at: DateTime<Utc>,
    ) -> EngineResult<PairingRecord> {
        // Single-statement upsert: concurrent increments of one pair serialize on the row
        let record = sqlx::query_as::<_, PairingRecord>(&format!(
            r#"
            INSERT INTO pairing_records (class_id, student_a, student_b, pair_count, last_paired)
            VALUES ($1, $2, $3, 1, $4)
            ON CONFLICT (class_id, student_a, student_b)
            DO UPDATE SET pair_count = pairing_records.pair_count + 1,
                          last_paired = EXCLUDED.last_paired
            RETURNING {}
            "#,
            PAIRING_COLUMNS
        ))
        .bind(class_id)
        .bind(key.first())
        .bind(key.second())
        .bind(at)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn clear_pairings(&self, class_id: ClassId) -> EngineResult<u64> {
        let result = sqlx::query("DELETE FROM pairing_records WHERE class_id = $1")
            .bind(class_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RuleStore for PgStore {
    async fn list_rules(&self, class_id: ClassId) -> EngineResult<Vec<Rule>> {
        let rules = sqlx::query_as::<_, Rule>(
            r#"
            SELECT id, class_id, student_a, student_b, created_at
            FROM grouping_rules
            WHERE class_id = $1
            ORDER BY id
            "#,
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rules)
    }

    async fn add_rule(&self, input: CreateRule) -> EngineResult<Rule> {
        let key = PairKey::distinct(input.student_a, input.student_b)?;

        // A repeated rule returns the existing row
        let rule = sqlx::query_as::<_, Rule>(
            r#"
            INSERT INTO grouping_rules (class_id, student_a, student_b)
            VALUES ($1, $2, $3)
            ON CONFLICT (class_id, student_a, student_b)
            DO UPDATE SET student_a = EXCLUDED.student_a
            RETURNING id, class_id, student_a, student_b, created_at
            "#,
        )
        .bind(input.class_id)
        .bind(key.first())
        .bind(key.second())
        .fetch_one(&self.pool)
        .await?;

        Ok(rule)
    }

    async fn delete_rule(&self, class_id: ClassId, rule_id: i32) -> EngineResult<()> {
        let result = sqlx::query("DELETE FROM grouping_rules WHERE class_id = $1 AND id = $2")
            .bind(class_id)
            .bind(rule_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!(
                "Rule with id {} not found",
                rule_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl GroupStore for PgStore {
    async fn save_round(
        &self,
        class_id: ClassId,
        target_size: usize,
        partition: &Partition,
    ) -> EngineResult<Round> {
        let target_size = i32::try_from(target_size).map_err(|_| {
            EngineError::InvalidArgument(format!("group size {} is too large", target_size))
        })?;

        let mut tx = self.pool.begin().await?;

        let round_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO rounds (class_id, target_size, cost, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(class_id)
        .bind(target_size)
        .bind(partition.cost)
        .bind(partition.created_at)
        .fetch_one(&mut *tx)
        .await?;

        let mut groups = Vec::with_capacity(partition.groups.len());
        for (position, group) in partition.groups.iter().enumerate() {
            let group_id: Uuid = sqlx::query_scalar(
                r#"
                INSERT INTO study_groups (round_id, class_id, name, position, cost)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(round_id)
            .bind(class_id)
            .bind(&group.name)
            .bind(position as i32)
            .bind(group.cost)
            .fetch_one(&mut *tx)
            .await?;

            let positions: Vec<i32> = (0..group.members.len() as i32).collect();
            sqlx::query(
                r#"
                INSERT INTO group_assignments (group_id, student_id, position)
                SELECT $1, student_id, position
                FROM UNNEST($2::int4[], $3::int4[]) AS t(student_id, position)
                "#,
            )
            .bind(group_id)
            .bind(&group.members)
            .bind(&positions)
            .execute(&mut *tx)
            .await?;

            groups.push(SavedGroup {
                id: group_id,
                name: group.name.clone(),
                members: group.members.clone(),
                cost: group.cost,
            });
        }

        tx.commit().await?;

        Ok(Round {
            id: round_id,
            class_id,
            target_size,
            cost: partition.cost,
            created_at: partition.created_at,
            groups,
        })
    }

    async fn latest_round(&self, class_id: ClassId) -> EngineResult<Option<Round>> {
        let Some(round) = sqlx::query_as::<_, RoundRow>(
            r#"
            SELECT id, class_id, target_size, cost, created_at
            FROM rounds
            WHERE class_id = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT 1
            "#,
        )
        .bind(class_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let group_rows = sqlx::query_as::<_, GroupRow>(
            "SELECT id, name, cost FROM study_groups WHERE round_id = $1 ORDER BY position",
        )
        .bind(round.id)
        .fetch_all(&self.pool)
        .await?;

        let mut groups = Vec::with_capacity(group_rows.len());
        for row in group_rows {
            let members: Vec<StudentId> = sqlx::query_scalar(
                "SELECT student_id FROM group_assignments WHERE group_id = $1 ORDER BY position",
            )
            .bind(row.id)
            .fetch_all(&self.pool)
            .await?;

            groups.push(SavedGroup {
                id: row.id,
                name: row.name,
                members,
                cost: row.cost,
            });
        }

        Ok(Some(Round {
            id: round.id,
            class_id: round.class_id,
            target_size: round.target_size,
            cost: round.cost,
            created_at: round.created_at,
            groups,
        }))
    }

    async fn clear_rounds(&self, class_id: ClassId) -> EngineResult<u64> {
        let result = sqlx::query("DELETE FROM rounds WHERE class_id = $1")
            .bind(class_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
