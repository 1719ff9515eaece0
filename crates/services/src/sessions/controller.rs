use std::sync::Arc;
use std::time::Duration;

use proctor_core::model::Submission;
use proctor_core::violation::{PlatformSignal, ViolationKind};
use proctor_core::{Clock, ExamSession, Phase, SessionEvent, SessionInput, SessionSnapshot};
use serde::Serialize;
use storage::repository::{StorageError, SubmissionRepository};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, interval_at};

use crate::error::SessionError;
use crate::platform::PlatformEvents;

const TICK_PERIOD: Duration = Duration::from_secs(1);

/// A save running alongside the loop; it hands the payload back for logging.
type SaveTask = JoinHandle<(Submission, Result<i64, StorageError>)>;

/// Instructions from the learner-facing side to a running controller.
#[derive(Debug)]
pub enum SessionCommand {
    Input(SessionInput),
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

/// Notifications a controller emits while the session runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Tick {
        remaining_secs: u32,
    },
    /// Navigation, selection, or confirmation state changed.
    Changed(SessionSnapshot),
    Warning {
        kind: ViolationKind,
        count: u32,
        message: &'static str,
    },
    Prevented(ViolationKind),
    ConfirmRequested {
        unanswered: usize,
    },
    Expired,
    Submitting,
    SubmitFailed {
        message: String,
    },
    Finished(SessionOutcome),
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Submitted { submission_id: i64 },
    HardReset,
    /// Time ran out, the final submission failed, and no learner is left to retry.
    Abandoned,
}

/// Sending half used by hosts to drive a running controller.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Forward a learner input.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` once the controller has finished.
    pub fn send(&self, input: SessionInput) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::Input(input))
            .map_err(|_| SessionError::Closed)
    }

    /// Ask the controller for its current view.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` once the controller has finished.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Snapshot(tx))
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}

/// Single owner of an [`ExamSession`] and the only place it is mutated.
///
/// Timer ticks, platform signals, learner commands, and save results are
/// serialized through one `select!` loop, so no two transitions ever
/// interleave. The save itself runs as a separate task, so input keeps
/// flowing into the session while it is `Submitting`.
pub struct SessionController {
    session: ExamSession,
    clock: Clock,
    submissions: Arc<dyn SubmissionRepository>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
    stored_id: Option<i64>,
}

impl SessionController {
    #[must_use]
    pub fn new(
        session: ExamSession,
        clock: Clock,
        submissions: Arc<dyn SubmissionRepository>,
    ) -> (Self, SessionHandle, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let controller = Self {
            session,
            clock,
            submissions,
            commands: command_rx,
            updates: update_tx,
            stored_id: None,
        };
        (
            controller,
            SessionHandle {
                commands: command_tx,
            },
            update_rx,
        )
    }

    #[must_use]
    pub fn session(&self) -> &ExamSession {
        &self.session
    }

    /// Drive the session until it is submitted or hard-reset.
    ///
    /// The platform subscription and the tick interval live only inside this
    /// call and are released before it returns.
    pub async fn run(mut self, platform: &dyn PlatformEvents) -> SessionOutcome {
        let (signal_tx, mut signals) = mpsc::unbounded_channel();
        let subscription = platform.subscribe(signal_tx);
        let mut ticker = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
        let mut signals_open = true;
        let mut commands_open = true;

        tracing::info!(
            test_id = self.session.test_id().value(),
            questions = self.session.navigator().len(),
            remaining_secs = self.session.remaining_secs(),
            "session started"
        );
        self.emit(SessionUpdate::Changed(self.session.snapshot()));

        let mut saving: Option<SaveTask> = None;
        let outcome = loop {
            let save_pending = saving.is_some();
            // Ticks first, then host signals, then save results, then learner commands.
            let events = tokio::select! {
                biased;
                _ = ticker.tick() => self.session.tick(self.clock.now()),
                signal = signals.recv(), if signals_open => match signal {
                    Some(signal) => self.observe(&signal),
                    None => {
                        signals_open = false;
                        Vec::new()
                    }
                },
                saved = async {
                    match saving.as_mut() {
                        Some(task) => task.await,
                        None => std::future::pending().await,
                    }
                }, if save_pending => {
                    saving = None;
                    self.finish_save(saved)
                }
                command = self.commands.recv(), if commands_open => match command {
                    Some(SessionCommand::Input(input)) => {
                        self.session.apply(&input, self.clock.now())
                    }
                    Some(SessionCommand::Snapshot(reply)) => {
                        let _ = reply.send(self.session.snapshot());
                        Vec::new()
                    }
                    None => {
                        tracing::debug!("command channel closed");
                        commands_open = false;
                        Vec::new()
                    }
                },
            };

            if let Some(outcome) = self.handle_events(events, &mut saving) {
                break outcome;
            }
            if !commands_open && self.is_stranded() {
                tracing::warn!(
                    test_id = self.session.test_id().value(),
                    "time expired with an unsaved submission and no learner attached"
                );
                break SessionOutcome::Abandoned;
            }
        };

        if let Some(task) = saving.take() {
            // Only a hard reset leaves a save running.
            task.abort();
            tracing::warn!(
                test_id = self.session.test_id().value(),
                "in-flight submission abandoned"
            );
        }
        drop(subscription);
        drop(ticker);
        tracing::info!(
            test_id = self.session.test_id().value(),
            violation_count = self.session.violation_count(),
            wall_secs = self.clock.secs_since(self.session.started_at()),
            phase = %self.session.phase(),
            ?outcome,
            "session finished"
        );
        self.emit(SessionUpdate::Finished(outcome));
        outcome
    }

    fn observe(&mut self, signal: &PlatformSignal) -> Vec<SessionEvent> {
        tracing::trace!(?signal, "platform signal");
        self.session.observe(signal)
    }

    /// Confirming after expiry needs a learner to retry the save.
    fn is_stranded(&self) -> bool {
        self.session.phase() == Phase::Confirming && self.session.remaining_secs() == 0
    }

    fn handle_events(
        &mut self,
        events: Vec<SessionEvent>,
        saving: &mut Option<SaveTask>,
    ) -> Option<SessionOutcome> {
        for event in events {
            match event {
                SessionEvent::Tick { remaining } => self.emit(SessionUpdate::Tick {
                    remaining_secs: remaining,
                }),
                SessionEvent::Expired => {
                    tracing::info!(test_id = self.session.test_id().value(), "time expired");
                    self.emit(SessionUpdate::Expired);
                }
                SessionEvent::Navigated { .. }
                | SessionEvent::AnswerChanged { .. }
                | SessionEvent::SubmitCancelled => {
                    self.emit(SessionUpdate::Changed(self.session.snapshot()));
                }
                SessionEvent::Prevented(kind) => self.emit(SessionUpdate::Prevented(kind)),
                SessionEvent::Warning { kind, count } => {
                    tracing::warn!(
                        test_id = self.session.test_id().value(),
                        violation = %kind,
                        violation_count = count,
                        "integrity warning"
                    );
                    self.emit(SessionUpdate::Warning {
                        kind,
                        count,
                        message: kind.message(),
                    });
                }
                SessionEvent::HardReset => {
                    tracing::warn!(
                        test_id = self.session.test_id().value(),
                        "print attempt; hard reset"
                    );
                    return Some(SessionOutcome::HardReset);
                }
                SessionEvent::ConfirmRequested { unanswered } => {
                    self.emit(SessionUpdate::ConfirmRequested { unanswered });
                    self.emit(SessionUpdate::Changed(self.session.snapshot()));
                }
                SessionEvent::Submit(submission) => {
                    self.emit(SessionUpdate::Submitting);
                    *saving = Some(self.start_save(submission));
                }
                SessionEvent::Submitted => {
                    if let Some(submission_id) = self.stored_id {
                        return Some(SessionOutcome::Submitted { submission_id });
                    }
                }
                SessionEvent::SubmitFailed { message } => {
                    self.emit(SessionUpdate::SubmitFailed { message });
                    self.emit(SessionUpdate::Changed(self.session.snapshot()));
                }
            }
        }
        None
    }

    fn start_save(&self, submission: Submission) -> SaveTask {
        let submissions = Arc::clone(&self.submissions);
        tokio::spawn(async move {
            let result = submissions.append_submission(&submission).await;
            (submission, result)
        })
    }

    fn finish_save(
        &mut self,
        joined: Result<(Submission, Result<i64, StorageError>), JoinError>,
    ) -> Vec<SessionEvent> {
        match joined {
            Ok((submission, Ok(id))) => {
                tracing::info!(
                    test_id = submission.test_id.value(),
                    submission_id = id,
                    reason = submission.reason.as_str(),
                    answered = submission.answered_count(),
                    violation_count = submission.violation_count,
                    "submission stored"
                );
                self.stored_id = Some(id);
                self.session.submission_succeeded()
            }
            Ok((submission, Err(err))) => {
                tracing::error!(
                    test_id = submission.test_id.value(),
                    error = %err,
                    "submission failed"
                );
                self.session.submission_failed(err.to_string())
            }
            Err(err) => {
                tracing::error!(
                    test_id = self.session.test_id().value(),
                    error = %err,
                    "submission task did not complete"
                );
                self.session.submission_failed(err.to_string())
            }
        }
    }

    fn emit(&self, update: SessionUpdate) {
        let _ = self.updates.send(update);
    }
}
