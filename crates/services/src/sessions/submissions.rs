use std::sync::Arc;

use chrono::{DateTime, Utc};
use proctor_core::model::{SubmitReason, Submission, TestId};
use serde::Serialize;
use storage::repository::{SubmissionRepository, SubmissionRow};

use crate::error::SessionError;

/// Compact listing row for a stored submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionSummary {
    pub id: i64,
    pub test_id: TestId,
    pub answered: usize,
    pub total: usize,
    pub violation_count: u32,
    pub time_taken_secs: u32,
    pub reason: SubmitReason,
    pub submitted_at: DateTime<Utc>,
}

impl SubmissionSummary {
    #[must_use]
    pub fn from_row(row: &SubmissionRow) -> Self {
        let submission = &row.submission;
        Self {
            id: row.id,
            test_id: submission.test_id,
            answered: submission.answered_count(),
            total: submission.answers.len(),
            violation_count: submission.violation_count,
            time_taken_secs: submission.time_taken_secs,
            reason: submission.reason,
            submitted_at: submission.submitted_at,
        }
    }

    #[must_use]
    pub fn unanswered(&self) -> usize {
        self.total.saturating_sub(self.answered)
    }
}

/// Read side for stored submissions.
#[derive(Clone)]
pub struct SubmissionService {
    submissions: Arc<dyn SubmissionRepository>,
}

impl SubmissionService {
    #[must_use]
    pub fn new(submissions: Arc<dyn SubmissionRepository>) -> Self {
        Self { submissions }
    }

    /// Latest submissions for a test, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` for backend failures.
    pub async fn list_for_test(
        &self,
        test_id: TestId,
        limit: u32,
    ) -> Result<Vec<SubmissionSummary>, SessionError> {
        let rows = self.submissions.list_submissions(test_id, limit).await?;
        Ok(rows.iter().map(SubmissionSummary::from_row).collect())
    }

    /// # Errors
    ///
    /// Returns `SessionError::Storage` (including `NotFound`) when the lookup fails.
    pub async fn get(&self, id: i64) -> Result<Submission, SessionError> {
        Ok(self.submissions.get_submission(id).await?)
    }
}
