use proctor_core::model::{QuestionId, Submission, TestId};
use sqlx::Row;
use std::collections::BTreeMap;

use super::SqliteRepository;
use super::mapping::{id_i64, parse_reason, reason_to_str, ser, test_id_from_i64, u32_from_i64};
use crate::repository::{StorageError, SubmissionRepository, SubmissionRow};

fn map_submission_row(row: &sqlx::sqlite::SqliteRow) -> Result<Submission, StorageError> {
    let answers_json: String = row.try_get("answers").map_err(ser)?;
    let answers: BTreeMap<QuestionId, Option<usize>> =
        serde_json::from_str(&answers_json).map_err(ser)?;
    let timing_json: String = row.try_get("time_per_question").map_err(ser)?;
    let time_per_question: BTreeMap<QuestionId, u32> =
        serde_json::from_str(&timing_json).map_err(ser)?;
    let reason: String = row.try_get("reason").map_err(ser)?;

    Ok(Submission {
        test_id: test_id_from_i64(row.try_get::<i64, _>("test_id").map_err(ser)?)?,
        answers,
        violation_count: u32_from_i64(
            "violation_count",
            row.try_get::<i64, _>("violation_count").map_err(ser)?,
        )?,
        time_taken_secs: u32_from_i64(
            "time_taken_secs",
            row.try_get::<i64, _>("time_taken_secs").map_err(ser)?,
        )?,
        time_per_question,
        started_at: row.try_get("started_at").map_err(ser)?,
        submitted_at: row.try_get("submitted_at").map_err(ser)?,
        reason: parse_reason(&reason)?,
    })
}

#[async_trait::async_trait]
impl SubmissionRepository for SqliteRepository {
    async fn append_submission(&self, submission: &Submission) -> Result<i64, StorageError> {
        let test_id = id_i64("test_id", submission.test_id.value())?;
        let answers = serde_json::to_string(&submission.answers).map_err(ser)?;
        let timing = serde_json::to_string(&submission.time_per_question).map_err(ser)?;

        let res = sqlx::query(
            r"
                INSERT INTO submissions (
                    test_id, answers, time_per_question, violation_count,
                    time_taken_secs, started_at, submitted_at, reason
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(test_id)
        .bind(answers)
        .bind(timing)
        .bind(i64::from(submission.violation_count))
        .bind(i64::from(submission.time_taken_secs))
        .bind(submission.started_at)
        .bind(submission.submitted_at)
        .bind(reason_to_str(submission.reason))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(res.last_insert_rowid())
    }

    async fn get_submission(&self, id: i64) -> Result<Submission, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    test_id, answers, time_per_question, violation_count,
                    time_taken_secs, started_at, submitted_at, reason
                FROM submissions
                WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        map_submission_row(&row)
    }

    async fn list_submissions(
        &self,
        test_id: TestId,
        limit: u32,
    ) -> Result<Vec<SubmissionRow>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    id, test_id, answers, time_per_question, violation_count,
                    time_taken_secs, started_at, submitted_at, reason
                FROM submissions
                WHERE test_id = ?1
                ORDER BY submitted_at DESC, id DESC
                LIMIT ?2
            ",
        )
        .bind(id_i64("test_id", test_id.value())?)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id").map_err(ser)?;
            out.push(SubmissionRow {
                id,
                submission: map_submission_row(&row)?,
            });
        }
        Ok(out)
    }
}
