use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::ids::{QuestionId, TestId};

/// Why a session handed its answers to persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitReason {
    /// The learner confirmed the submit dialog.
    Confirmed,
    /// The countdown reached zero.
    TimeExpired,
}

impl SubmitReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SubmitReason::Confirmed => "confirmed",
            SubmitReason::TimeExpired => "time_expired",
        }
    }
}

/// Payload handed to the persistence collaborator when a session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub test_id: TestId,
    /// Every question in the session, `None` when left unanswered.
    pub answers: BTreeMap<QuestionId, Option<usize>>,
    pub violation_count: u32,
    pub time_taken_secs: u32,
    /// Seconds spent while each question was on screen.
    #[serde(default)]
    pub time_per_question: BTreeMap<QuestionId, u32>,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub reason: SubmitReason,
}

impl Submission {
    /// Number of questions with a recorded option.
    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.values().filter(|v| v.is_some()).count()
    }
}
