use std::sync::Arc;

use proctor_core::model::{TestId, TestPaper};
use proctor_core::violation::{DevtoolsHeuristic, DimensionDelta, NoDevtoolsHeuristic, ViolationMonitor};
use proctor_core::ExamSession;
use storage::repository::{SubmissionRepository, TestListItem, TestRepository};
use tokio::sync::mpsc;

use super::controller::{SessionController, SessionHandle, SessionUpdate};
use crate::Clock;
use crate::error::SessionError;

/// A session ready to run: the paper it was built from plus its controller
/// and both channel ends a host needs.
pub struct LiveSession {
    pub paper: TestPaper,
    pub controller: SessionController,
    pub handle: SessionHandle,
    pub updates: mpsc::UnboundedReceiver<SessionUpdate>,
}

/// Loads test papers and assembles proctored sessions around them.
#[derive(Clone)]
pub struct ExamWorkflowService {
    clock: Clock,
    tests: Arc<dyn TestRepository>,
    submissions: Arc<dyn SubmissionRepository>,
    devtools: Option<DimensionDelta>,
}

impl ExamWorkflowService {
    #[must_use]
    pub fn new(
        clock: Clock,
        tests: Arc<dyn TestRepository>,
        submissions: Arc<dyn SubmissionRepository>,
    ) -> Self {
        Self {
            clock,
            tests,
            submissions,
            devtools: Some(DimensionDelta::default()),
        }
    }

    /// Replace the devtools heuristic; `None` disables detection.
    #[must_use]
    pub fn with_devtools_heuristic(mut self, devtools: Option<DimensionDelta>) -> Self {
        self.devtools = devtools;
        self
    }

    /// Stored tests available to start.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` for backend failures.
    pub async fn list_tests(&self, limit: u32) -> Result<Vec<TestListItem>, SessionError> {
        Ok(self.tests.list_tests(limit).await?)
    }

    /// Load a test paper and build a controller for a fresh attempt.
    ///
    /// Stored questions are not re-validated; a partially malformed paper still
    /// runs and the session ignores out-of-range selections.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` for unknown ids, `SessionError::Empty`
    /// when the paper has no questions, or storage failures.
    pub async fn start(&self, test_id: TestId) -> Result<LiveSession, SessionError> {
        let paper = self
            .tests
            .get_test(test_id)
            .await?
            .ok_or(SessionError::NotFound(test_id))?;
        let questions = paper.questions();
        if questions.is_empty() {
            return Err(SessionError::Empty(test_id));
        }

        let session = ExamSession::new(
            paper.id(),
            questions,
            paper.time_budget_secs(),
            ViolationMonitor::new(self.heuristic()),
            self.clock.now(),
        );
        tracing::debug!(
            test_id = test_id.value(),
            time_budget_secs = paper.time_budget_secs(),
            "session prepared"
        );

        let (controller, handle, updates) =
            SessionController::new(session, self.clock, Arc::clone(&self.submissions));
        Ok(LiveSession {
            paper,
            controller,
            handle,
            updates,
        })
    }

    fn heuristic(&self) -> Box<dyn DevtoolsHeuristic> {
        match self.devtools {
            Some(delta) => Box::new(delta),
            None => Box::new(NoDevtoolsHeuristic),
        }
    }
}
