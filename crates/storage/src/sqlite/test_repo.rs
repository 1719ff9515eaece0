use proctor_core::model::{Question, QuestionId, QuestionItem, TestId, TestPaper};
use sqlx::Row;
use std::collections::HashMap;

use super::SqliteRepository;
use super::mapping::{id_i64, question_id_from_i64, ser, test_id_from_i64, u32_from_i64};
use crate::repository::{StorageError, TestListItem, TestRepository};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let options_json: String = row.try_get("options").map_err(ser)?;
    let options: Vec<String> = serde_json::from_str(&options_json).map_err(ser)?;
    let parent_id = row
        .try_get::<Option<i64>, _>("parent_id")
        .map_err(ser)?
        .map(question_id_from_i64)
        .transpose()?;

    Ok(Question::from_persisted(
        question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get("title").map_err(ser)?,
        options,
        row.try_get("category").map_err(ser)?,
        row.try_get("sub_category").map_err(ser)?,
        parent_id,
    ))
}

/// Regroup position-ordered questions into authored items.
///
/// Consecutive questions with the same parent form one comprehensive item.
fn regroup(questions: Vec<Question>, passages: &HashMap<QuestionId, String>) -> Vec<QuestionItem> {
    let mut items: Vec<QuestionItem> = Vec::new();
    for question in questions {
        let Some(parent) = question.parent_id() else {
            items.push(QuestionItem::Single(question));
            continue;
        };
        if let Some(QuestionItem::Comprehensive {
            parent: last,
            questions: members,
            ..
        }) = items.last_mut()
        {
            if *last == parent {
                members.push(question);
                continue;
            }
        }
        items.push(QuestionItem::Comprehensive {
            parent,
            passage: passages.get(&parent).cloned().unwrap_or_default(),
            questions: vec![question],
        });
    }
    items
}

#[async_trait::async_trait]
impl TestRepository for SqliteRepository {
    async fn upsert_test(&self, paper: &TestPaper) -> Result<(), StorageError> {
        let test_id = id_i64("test_id", paper.id().value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO tests (id, title, time_budget_secs, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    time_budget_secs = excluded.time_budget_secs,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(test_id)
        .bind(paper.title())
        .bind(i64::from(paper.time_budget_secs()))
        .bind(chrono::Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM questions WHERE test_id = ?1")
            .bind(test_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        sqlx::query("DELETE FROM question_groups WHERE test_id = ?1")
            .bind(test_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for item in paper.items() {
            if let QuestionItem::Comprehensive {
                parent, passage, ..
            } = item
            {
                sqlx::query(
                    r"
                        INSERT INTO question_groups (test_id, parent_id, passage)
                        VALUES (?1, ?2, ?3)
                        ON CONFLICT(test_id, parent_id) DO UPDATE SET passage = excluded.passage
                    ",
                )
                .bind(test_id)
                .bind(id_i64("parent_id", parent.value())?)
                .bind(passage.as_str())
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            }
        }

        let questions = paper.questions();
        for (position, question) in questions.iter().enumerate() {
            let options = serde_json::to_string(question.options()).map_err(ser)?;
            let parent_id = question
                .parent_id()
                .map(|p| id_i64("parent_id", p.value()))
                .transpose()?;
            sqlx::query(
                r"
                    INSERT INTO questions (
                        test_id, id, position, title, options,
                        category, sub_category, parent_id
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ",
            )
            .bind(test_id)
            .bind(id_i64("question_id", question.id().value())?)
            .bind(i64::try_from(position).map_err(ser)?)
            .bind(question.title())
            .bind(options)
            .bind(question.category())
            .bind(question.sub_category())
            .bind(parent_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
                other => conn(other),
            })?;
        }

        tx.commit().await.map_err(conn)?;
        tracing::debug!(test_id = paper.id().value(), "stored test paper");
        Ok(())
    }

    async fn get_test(&self, id: TestId) -> Result<Option<TestPaper>, StorageError> {
        let test_id = id_i64("test_id", id.value())?;
        let Some(row) = sqlx::query(
            r"
                SELECT id, title, time_budget_secs
                FROM tests
                WHERE id = ?1
            ",
        )
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        else {
            return Ok(None);
        };

        let title: String = row.try_get("title").map_err(ser)?;
        let budget = u32_from_i64(
            "time_budget_secs",
            row.try_get::<i64, _>("time_budget_secs").map_err(ser)?,
        )?;

        let group_rows = sqlx::query(
            r"
                SELECT parent_id, passage
                FROM question_groups
                WHERE test_id = ?1
            ",
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        let mut passages = HashMap::with_capacity(group_rows.len());
        for row in group_rows {
            let parent = question_id_from_i64(row.try_get::<i64, _>("parent_id").map_err(ser)?)?;
            passages.insert(parent, row.try_get::<String, _>("passage").map_err(ser)?);
        }

        let question_rows = sqlx::query(
            r"
                SELECT id, title, options, category, sub_category, parent_id
                FROM questions
                WHERE test_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        let mut questions = Vec::with_capacity(question_rows.len());
        for row in &question_rows {
            questions.push(map_question_row(row)?);
        }

        Ok(Some(TestPaper::from_persisted(
            id,
            title,
            budget,
            regroup(questions, &passages),
        )))
    }

    async fn list_tests(&self, limit: u32) -> Result<Vec<TestListItem>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT t.id, t.title, t.time_budget_secs, COUNT(q.id) AS question_count
                FROM tests t
                LEFT JOIN questions q ON q.test_id = t.id
                GROUP BY t.id
                ORDER BY t.id ASC
                LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(TestListItem {
                id: test_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
                title: row.try_get("title").map_err(ser)?,
                time_budget_secs: u32_from_i64(
                    "time_budget_secs",
                    row.try_get::<i64, _>("time_budget_secs").map_err(ser)?,
                )?,
                question_count: u32_from_i64(
                    "question_count",
                    row.try_get::<i64, _>("question_count").map_err(ser)?,
                )?,
            });
        }
        Ok(out)
    }
}
