use async_trait::async_trait;
use proctor_core::model::{Submission, TestId, TestPaper};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Lightweight listing row for a stored test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestListItem {
    pub id: TestId,
    pub title: String,
    pub time_budget_secs: u32,
    pub question_count: u32,
}

impl TestListItem {
    #[must_use]
    pub fn from_paper(paper: &TestPaper) -> Self {
        Self {
            id: paper.id(),
            title: paper.title().to_owned(),
            time_budget_secs: paper.time_budget_secs(),
            question_count: u32::try_from(paper.questions().len()).unwrap_or(u32::MAX),
        }
    }
}

/// A persisted submission with its storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRow {
    pub id: i64,
    pub submission: Submission,
}

/// Content provider contract: test papers and their questions.
#[async_trait]
pub trait TestRepository: Send + Sync {
    /// Persist or replace a test paper, including its questions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the paper cannot be stored.
    async fn upsert_test(&self, paper: &TestPaper) -> Result<(), StorageError>;

    /// Fetch a test paper by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for backend failures.
    async fn get_test(&self, id: TestId) -> Result<Option<TestPaper>, StorageError>;

    /// List stored tests ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for backend failures.
    async fn list_tests(&self, limit: u32) -> Result<Vec<TestListItem>, StorageError>;
}

/// Persistence collaborator for finished sessions.
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Append a submission and return its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the submission cannot be stored.
    async fn append_submission(&self, submission: &Submission) -> Result<i64, StorageError>;

    /// Fetch a submission by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_submission(&self, id: i64) -> Result<Submission, StorageError>;

    /// Latest submissions for a test, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for backend failures.
    async fn list_submissions(
        &self,
        test_id: TestId,
        limit: u32,
    ) -> Result<Vec<SubmissionRow>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tests: Arc<Mutex<HashMap<TestId, TestPaper>>>,
    submissions: Arc<Mutex<Vec<Submission>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl TestRepository for InMemoryRepository {
    async fn upsert_test(&self, paper: &TestPaper) -> Result<(), StorageError> {
        let mut guard = self.tests.lock().map_err(poisoned)?;
        guard.insert(paper.id(), paper.clone());
        Ok(())
    }

    async fn get_test(&self, id: TestId) -> Result<Option<TestPaper>, StorageError> {
        let guard = self.tests.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }

    async fn list_tests(&self, limit: u32) -> Result<Vec<TestListItem>, StorageError> {
        let guard = self.tests.lock().map_err(poisoned)?;
        let mut items: Vec<TestListItem> = guard.values().map(TestListItem::from_paper).collect();
        items.sort_by_key(|item| item.id);
        items.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(items)
    }
}

#[async_trait]
impl SubmissionRepository for InMemoryRepository {
    async fn append_submission(&self, submission: &Submission) -> Result<i64, StorageError> {
        let mut guard = self.submissions.lock().map_err(poisoned)?;
        guard.push(submission.clone());
        i64::try_from(guard.len()).map_err(|_| StorageError::Conflict)
    }

    async fn get_submission(&self, id: i64) -> Result<Submission, StorageError> {
        let guard = self.submissions.lock().map_err(poisoned)?;
        let index = id
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok())
            .ok_or(StorageError::NotFound)?;
        guard.get(index).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_submissions(
        &self,
        test_id: TestId,
        limit: u32,
    ) -> Result<Vec<SubmissionRow>, StorageError> {
        let guard = self.submissions.lock().map_err(poisoned)?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let rows = guard
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, s)| s.test_id == test_id)
            .take(limit)
            .map(|(i, s)| SubmissionRow {
                id: i64::try_from(i + 1).unwrap_or(i64::MAX),
                submission: s.clone(),
            })
            .collect();
        Ok(rows)
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub tests: Arc<dyn TestRepository>,
    pub submissions: Arc<dyn SubmissionRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let tests: Arc<dyn TestRepository> = Arc::new(repo.clone());
        let submissions: Arc<dyn SubmissionRepository> = Arc::new(repo);
        Self { tests, submissions }
    }
}
