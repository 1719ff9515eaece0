//! Proctored test session state machine.
//!
//! Every input is an explicit transition that returns the events the host
//! must act on. The session never performs I/O: submission payloads are
//! handed out in [`SessionEvent::Submit`] and the host reports back with
//! [`ExamSession::submission_succeeded`] or [`ExamSession::submission_failed`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::answers::AnswerStore;
use crate::model::{Question, QuestionId, SubmitReason, Submission, TestId};
use crate::navigator::{CategoryBucket, GroupInfo, QuestionNavigator};
use crate::timer::{Countdown, Tick};
use crate::violation::{MonitorAction, PlatformSignal, ViolationKind, ViolationMonitor};

//
// ─── PHASE / INPUT / EVENTS ────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Active,
    Confirming,
    Submitting,
    Terminated,
}

impl Phase {
    #[must_use]
    pub fn is_terminated(self) -> bool {
        self == Phase::Terminated
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Active => "active",
            Phase::Confirming => "confirming",
            Phase::Submitting => "submitting",
            Phase::Terminated => "terminated",
        })
    }
}

/// Learner-driven inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionInput {
    JumpTo { index: usize },
    Next,
    Previous,
    Select { question: QuestionId, option: usize },
    /// Select on the question under the cursor.
    SelectCurrent { option: usize },
    Unselect { question: QuestionId },
    UnselectCurrent,
    RequestSubmit,
    CancelSubmit,
    ConfirmSubmit,
}

/// What the host must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Tick { remaining: u32 },
    Expired,
    Navigated { index: usize },
    AnswerChanged {
        question: QuestionId,
        selected: Option<usize>,
    },
    /// Suppress the platform default for the triggering event.
    Prevented(ViolationKind),
    /// Show a non-blocking warning.
    Warning { kind: ViolationKind, count: u32 },
    /// Terminal: reload the page.
    HardReset,
    ConfirmRequested { unanswered: usize },
    SubmitCancelled,
    /// Hand the payload to persistence, then report the result back.
    Submit(Submission),
    Submitted,
    SubmitFailed { message: String },
}

/// Serializable view of the session for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub test_id: TestId,
    pub phase: Phase,
    pub current_index: usize,
    pub current_selected: Option<usize>,
    pub total: usize,
    pub answered: usize,
    pub progress: f64,
    pub remaining_secs: u32,
    pub violation_count: u32,
    pub unanswered_warning: bool,
    pub last_error: Option<String>,
    pub group: Option<GroupInfo>,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One timed attempt at a question set.
pub struct ExamSession {
    test_id: TestId,
    navigator: QuestionNavigator,
    answers: AnswerStore,
    countdown: Countdown,
    monitor: ViolationMonitor,
    phase: Phase,
    started_at: DateTime<Utc>,
    pending_reason: Option<SubmitReason>,
    unanswered_warning: bool,
    last_error: Option<String>,
    time_per_question: BTreeMap<QuestionId, u32>,
}

impl ExamSession {
    #[must_use]
    pub fn new(
        test_id: TestId,
        questions: Vec<Question>,
        time_budget_secs: u32,
        monitor: ViolationMonitor,
        started_at: DateTime<Utc>,
    ) -> Self {
        let answers = AnswerStore::new(&questions);
        Self {
            test_id,
            navigator: QuestionNavigator::new(questions),
            answers,
            countdown: Countdown::new(time_budget_secs),
            monitor,
            phase: Phase::Active,
            started_at,
            pending_reason: None,
            unanswered_warning: false,
            last_error: None,
            time_per_question: BTreeMap::new(),
        }
    }

    // ─── accessors ────────────────────────────────────────────────────────────

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn navigator(&self) -> &QuestionNavigator {
        &self.navigator
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerStore {
        &self.answers
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.navigator.current()
    }

    #[must_use]
    pub fn by_category(&self) -> Vec<CategoryBucket> {
        self.navigator.by_category()
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.countdown.remaining()
    }

    #[must_use]
    pub fn elapsed_secs(&self) -> u32 {
        self.countdown.elapsed()
    }

    #[must_use]
    pub fn violation_count(&self) -> u32 {
        self.monitor.count()
    }

    #[must_use]
    pub fn violation_tally(&self) -> &BTreeMap<ViolationKind, u32> {
        self.monitor.tally()
    }

    #[must_use]
    pub fn unanswered_warning(&self) -> bool {
        self.unanswered_warning
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            test_id: self.test_id,
            phase: self.phase,
            current_index: self.navigator.current_index(),
            current_selected: self.current_id().and_then(|id| self.answers.selected(id)),
            total: self.answers.total(),
            answered: self.answers.answered_count(),
            progress: self.answers.progress_fraction(),
            remaining_secs: self.countdown.remaining(),
            violation_count: self.monitor.count(),
            unanswered_warning: self.unanswered_warning,
            last_error: self.last_error.clone(),
            group: self.navigator.current_group_info(),
        }
    }

    // ─── timer ────────────────────────────────────────────────────────────────

    /// One second has elapsed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<SessionEvent> {
        if self.phase.is_terminated() {
            return Vec::new();
        }
        let tick = self.countdown.tick();
        if matches!(tick, Tick::Running { .. } | Tick::Expired) && self.phase == Phase::Active {
            if let Some(q) = self.navigator.current() {
                *self.time_per_question.entry(q.id()).or_insert(0) += 1;
            }
        }
        match tick {
            Tick::Running { remaining } => vec![SessionEvent::Tick { remaining }],
            Tick::Expired => {
                let mut events = vec![SessionEvent::Tick { remaining: 0 }, SessionEvent::Expired];
                events.extend(self.expire(now));
                events
            }
            Tick::Idle => Vec::new(),
        }
    }

    /// Force-submit without confirmation. Only from `Active` or `Confirming`.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<SessionEvent> {
        match self.phase {
            Phase::Active | Phase::Confirming => {
                self.begin_submit(SubmitReason::TimeExpired, now)
            }
            Phase::Submitting | Phase::Terminated => Vec::new(),
        }
    }

    // ─── platform signals ─────────────────────────────────────────────────────

    pub fn observe(&mut self, signal: &PlatformSignal) -> Vec<SessionEvent> {
        if self.phase.is_terminated() {
            return Vec::new();
        }
        // The payload is already built while submitting; later signals are not recorded.
        let response = if self.phase == Phase::Submitting {
            self.monitor.screen(signal)
        } else {
            self.monitor.observe(signal)
        };
        let mut events = Vec::new();
        let Some(kind) = response.kind else {
            return events;
        };
        if response.prevent_default {
            events.push(SessionEvent::Prevented(kind));
        }
        match response.action {
            MonitorAction::None => {}
            MonitorAction::Warn => events.push(SessionEvent::Warning {
                kind,
                count: response.count,
            }),
            MonitorAction::HardReset => events.extend(self.hard_reset()),
        }
        events
    }

    /// End the session immediately; the host reloads.
    pub fn hard_reset(&mut self) -> Vec<SessionEvent> {
        if self.phase.is_terminated() {
            return Vec::new();
        }
        self.terminate();
        vec![SessionEvent::HardReset]
    }

    // ─── learner input ────────────────────────────────────────────────────────

    pub fn apply(&mut self, input: &SessionInput, now: DateTime<Utc>) -> Vec<SessionEvent> {
        match input {
            SessionInput::JumpTo { index } => self.jump_to(*index),
            SessionInput::Next => self.navigate(QuestionNavigator::next),
            SessionInput::Previous => self.navigate(QuestionNavigator::previous),
            SessionInput::Select { question, option } => self.select(*question, *option),
            SessionInput::SelectCurrent { option } => match self.current_id() {
                Some(id) => self.select(id, *option),
                None => Vec::new(),
            },
            SessionInput::Unselect { question } => self.unselect(*question),
            SessionInput::UnselectCurrent => match self.current_id() {
                Some(id) => self.unselect(id),
                None => Vec::new(),
            },
            SessionInput::RequestSubmit => self.request_submit(),
            SessionInput::CancelSubmit => self.cancel_submit(),
            SessionInput::ConfirmSubmit => self.confirm_submit(now),
        }
    }

    fn current_id(&self) -> Option<QuestionId> {
        self.navigator.current().map(Question::id)
    }

    fn can_navigate(&self) -> bool {
        matches!(self.phase, Phase::Active | Phase::Confirming)
    }

    pub fn jump_to(&mut self, index: usize) -> Vec<SessionEvent> {
        if !self.can_navigate() || !self.navigator.jump_to(index) {
            return Vec::new();
        }
        vec![SessionEvent::Navigated { index }]
    }

    fn navigate(&mut self, step: fn(&mut QuestionNavigator) -> usize) -> Vec<SessionEvent> {
        if !self.can_navigate() || self.navigator.is_empty() {
            return Vec::new();
        }
        let index = step(&mut self.navigator);
        vec![SessionEvent::Navigated { index }]
    }

    pub fn next(&mut self) -> Vec<SessionEvent> {
        self.navigate(QuestionNavigator::next)
    }

    pub fn previous(&mut self) -> Vec<SessionEvent> {
        self.navigate(QuestionNavigator::previous)
    }

    pub fn select(&mut self, question: QuestionId, option: usize) -> Vec<SessionEvent> {
        if self.phase != Phase::Active || !self.answers.select(question, option) {
            return Vec::new();
        }
        vec![SessionEvent::AnswerChanged {
            question,
            selected: Some(option),
        }]
    }

    pub fn unselect(&mut self, question: QuestionId) -> Vec<SessionEvent> {
        if self.phase != Phase::Active || !self.answers.unselect(question) {
            return Vec::new();
        }
        vec![SessionEvent::AnswerChanged {
            question,
            selected: None,
        }]
    }

    /// Open the confirmation step. Unanswered questions only raise a warning.
    pub fn request_submit(&mut self) -> Vec<SessionEvent> {
        if self.phase != Phase::Active {
            return Vec::new();
        }
        let unanswered = self.answers.unanswered_count();
        self.unanswered_warning = unanswered > 0;
        self.pending_reason = Some(SubmitReason::Confirmed);
        self.phase = Phase::Confirming;
        vec![SessionEvent::ConfirmRequested { unanswered }]
    }

    /// Back to answering. Ignored once the countdown has expired.
    pub fn cancel_submit(&mut self) -> Vec<SessionEvent> {
        if self.phase != Phase::Confirming || self.countdown.is_expired() {
            return Vec::new();
        }
        self.phase = Phase::Active;
        self.pending_reason = None;
        self.unanswered_warning = false;
        self.last_error = None;
        vec![SessionEvent::SubmitCancelled]
    }

    /// Accepted only while confirming, which also blocks double submission.
    pub fn confirm_submit(&mut self, now: DateTime<Utc>) -> Vec<SessionEvent> {
        if self.phase != Phase::Confirming {
            return Vec::new();
        }
        let reason = self.pending_reason.unwrap_or(SubmitReason::Confirmed);
        self.begin_submit(reason, now)
    }

    // ─── submission results ───────────────────────────────────────────────────

    pub fn submission_succeeded(&mut self) -> Vec<SessionEvent> {
        if self.phase != Phase::Submitting {
            return Vec::new();
        }
        self.terminate();
        vec![SessionEvent::Submitted]
    }

    /// Return to the confirmation step with the error shown. Answers are untouched.
    pub fn submission_failed(&mut self, message: impl Into<String>) -> Vec<SessionEvent> {
        if self.phase != Phase::Submitting {
            return Vec::new();
        }
        let message = message.into();
        if self.countdown.is_expired() {
            self.pending_reason = Some(SubmitReason::TimeExpired);
        }
        self.phase = Phase::Confirming;
        self.last_error = Some(message.clone());
        vec![SessionEvent::SubmitFailed { message }]
    }

    // ─── internals ────────────────────────────────────────────────────────────

    fn begin_submit(&mut self, reason: SubmitReason, now: DateTime<Utc>) -> Vec<SessionEvent> {
        self.phase = Phase::Submitting;
        self.pending_reason = Some(reason);
        self.last_error = None;
        vec![SessionEvent::Submit(self.build_submission(reason, now))]
    }

    fn build_submission(&self, reason: SubmitReason, now: DateTime<Utc>) -> Submission {
        Submission {
            test_id: self.test_id,
            answers: self.answers.snapshot(),
            violation_count: self.monitor.count(),
            time_taken_secs: self.countdown.elapsed(),
            time_per_question: self.time_per_question.clone(),
            started_at: self.started_at,
            submitted_at: now,
            reason,
        }
    }

    fn terminate(&mut self) {
        self.countdown.stop();
        self.phase = Phase::Terminated;
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("test_id", &self.test_id)
            .field("questions_len", &self.navigator.len())
            .field("current", &self.navigator.current_index())
            .field("answered", &self.answers.answered_count())
            .field("remaining", &self.countdown.remaining())
            .field("violations", &self.monitor.count())
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
