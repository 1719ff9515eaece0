use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use proctor_core::model::{
    Question, QuestionId, QuestionItem, SubmitReason, Submission, TestId, TestPaper,
};
use proctor_core::time::fixed_clock;
use proctor_core::violation::{ClipboardAction, KeyCombo, PlatformSignal, ViolationKind};
use proctor_core::{Phase, SessionInput};
use services::{
    BroadcastPlatform, ExamWorkflowService, LiveSession, PlatformEvents, SessionError,
    SessionOutcome, SessionUpdate, Subscription,
};
use storage::repository::{
    InMemoryRepository, StorageError, SubmissionRepository, SubmissionRow, TestRepository,
};
use tokio::sync::mpsc;

fn question(id: u64, category: &str) -> Question {
    Question::new(
        QuestionId::new(id),
        format!("Question {id}"),
        vec!["a".into(), "b".into(), "c".into(), "d".into()],
        category,
        "",
    )
    .unwrap()
}

fn paper(budget_secs: u32) -> TestPaper {
    TestPaper::new(
        TestId::new(1),
        "Mock",
        budget_secs,
        vec![
            QuestionItem::Single(question(1, "Aptitude")),
            QuestionItem::Comprehensive {
                parent: QuestionId::new(50),
                passage: "Passage".into(),
                questions: vec![question(2, "Verbal"), question(3, "Verbal")],
            },
        ],
    )
    .unwrap()
}

/// Replays a fixed list of signals as soon as a session subscribes.
#[derive(Clone, Default)]
struct ScriptedPlatform {
    signals: Vec<PlatformSignal>,
    active: Arc<AtomicBool>,
}

impl ScriptedPlatform {
    fn new(signals: Vec<PlatformSignal>) -> Self {
        Self {
            signals,
            active: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl PlatformEvents for ScriptedPlatform {
    fn subscribe(&self, sender: mpsc::UnboundedSender<PlatformSignal>) -> Subscription {
        for signal in &self.signals {
            sender.send(signal.clone()).unwrap();
        }
        self.active.store(true, Ordering::SeqCst);
        let active = Arc::clone(&self.active);
        // Keep the sender alive until unsubscribed, as a real host listener would.
        Subscription::new(move || {
            drop(sender);
            active.store(false, Ordering::SeqCst);
        })
    }
}

/// Fails the first `failures` appends, then delegates to memory.
struct FlakySubmissions {
    inner: InMemoryRepository,
    failures: AtomicUsize,
    attempts: AtomicUsize,
    latency: Duration,
}

impl FlakySubmissions {
    fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryRepository::new(),
            failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    /// Every append waits this long before answering.
    fn slow(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl SubmissionRepository for FlakySubmissions {
    async fn append_submission(&self, submission: &Submission) -> Result<i64, StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::Connection("network down".into()));
        }
        self.inner.append_submission(submission).await
    }

    async fn get_submission(&self, id: i64) -> Result<Submission, StorageError> {
        self.inner.get_submission(id).await
    }

    async fn list_submissions(
        &self,
        test_id: TestId,
        limit: u32,
    ) -> Result<Vec<SubmissionRow>, StorageError> {
        self.inner.list_submissions(test_id, limit).await
    }
}

async fn start(budget_secs: u32, submissions: Arc<dyn SubmissionRepository>) -> LiveSession {
    let tests = Arc::new(InMemoryRepository::new());
    tests.upsert_test(&paper(budget_secs)).await.unwrap();
    ExamWorkflowService::new(fixed_clock(), tests, submissions)
        .start(TestId::new(1))
        .await
        .unwrap()
}

fn drain(updates: &mut mpsc::UnboundedReceiver<SessionUpdate>) -> Vec<SessionUpdate> {
    let mut out = Vec::new();
    while let Ok(update) = updates.try_recv() {
        out.push(update);
    }
    out
}

/// Receive updates up to and including the first one matching `stop`.
async fn recv_until(
    updates: &mut mpsc::UnboundedReceiver<SessionUpdate>,
    stop: impl Fn(&SessionUpdate) -> bool,
) -> Vec<SessionUpdate> {
    let mut seen = Vec::new();
    while let Some(update) = updates.recv().await {
        let done = stop(&update);
        seen.push(update);
        if done {
            return seen;
        }
    }
    panic!("updates closed before the expected one; saw {seen:?}");
}

fn tick_count(updates: &[SessionUpdate]) -> usize {
    updates
        .iter()
        .filter(|u| matches!(u, SessionUpdate::Tick { .. }))
        .count()
}

#[tokio::test(start_paused = true)]
async fn confirmed_submission_is_persisted() {
    let repo = Arc::new(InMemoryRepository::new());
    let mut live = start(600, repo.clone()).await;

    for input in [
        SessionInput::SelectCurrent { option: 1 },
        SessionInput::Next,
        SessionInput::SelectCurrent { option: 3 },
        SessionInput::RequestSubmit,
        SessionInput::ConfirmSubmit,
    ] {
        live.handle.send(input).unwrap();
    }

    let outcome = live.controller.run(&ScriptedPlatform::default()).await;
    let SessionOutcome::Submitted { submission_id } = outcome else {
        panic!("expected submission, got {outcome:?}");
    };

    let stored = repo.get_submission(submission_id).await.unwrap();
    assert_eq!(stored.reason, SubmitReason::Confirmed);
    assert_eq!(stored.answers.len(), 3);
    assert_eq!(stored.answers[&QuestionId::new(1)], Some(1));
    assert_eq!(stored.answers[&QuestionId::new(2)], Some(3));
    assert_eq!(stored.answers[&QuestionId::new(3)], None);
    assert_eq!(stored.violation_count, 0);

    let updates = drain(&mut live.updates);
    assert!(updates.contains(&SessionUpdate::ConfirmRequested { unanswered: 1 }));
    assert_eq!(updates.last(), Some(&SessionUpdate::Finished(outcome)));
    assert!(live.handle.send(SessionInput::Next).is_err());
}

#[tokio::test(start_paused = true)]
async fn expiry_auto_submits_without_confirmation() {
    let repo = Arc::new(InMemoryRepository::new());
    let mut live = start(3, repo.clone()).await;
    live.handle
        .send(SessionInput::SelectCurrent { option: 0 })
        .unwrap();

    let outcome = live.controller.run(&ScriptedPlatform::default()).await;
    let SessionOutcome::Submitted { submission_id } = outcome else {
        panic!("expected submission, got {outcome:?}");
    };

    let stored = repo.get_submission(submission_id).await.unwrap();
    assert_eq!(stored.reason, SubmitReason::TimeExpired);
    assert_eq!(stored.time_taken_secs, 3);
    assert_eq!(stored.answers[&QuestionId::new(1)], Some(0));

    let updates = drain(&mut live.updates);
    let ticks: Vec<u32> = updates
        .iter()
        .filter_map(|u| match u {
            SessionUpdate::Tick { remaining_secs } => Some(*remaining_secs),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, vec![2, 1, 0]);
    assert!(updates.contains(&SessionUpdate::Expired));
    assert!(
        !updates
            .iter()
            .any(|u| matches!(u, SessionUpdate::ConfirmRequested { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn expiry_while_confirming_submits_with_time_expired() {
    let repo = Arc::new(InMemoryRepository::new());
    let live = start(2, repo.clone()).await;
    live.handle.send(SessionInput::RequestSubmit).unwrap();

    let outcome = live.controller.run(&ScriptedPlatform::default()).await;
    let SessionOutcome::Submitted { submission_id } = outcome else {
        panic!("expected submission, got {outcome:?}");
    };
    let stored = repo.get_submission(submission_id).await.unwrap();
    assert_eq!(stored.reason, SubmitReason::TimeExpired);
}

#[tokio::test(start_paused = true)]
async fn tab_switches_warn_and_count_while_blocked_actions_do_not() {
    let repo = Arc::new(InMemoryRepository::new());
    let mut live = start(600, repo.clone()).await;
    let platform = ScriptedPlatform::new(vec![
        PlatformSignal::VisibilityHidden,
        PlatformSignal::VisibilityVisible,
        PlatformSignal::WindowBlur,
        PlatformSignal::Clipboard {
            action: ClipboardAction::Copy,
        },
        PlatformSignal::KeyDown {
            combo: KeyCombo::key("F12"),
        },
        PlatformSignal::ContextMenu,
    ]);
    live.handle.send(SessionInput::RequestSubmit).unwrap();
    live.handle.send(SessionInput::ConfirmSubmit).unwrap();

    let outcome = live.controller.run(&platform).await;
    let SessionOutcome::Submitted { submission_id } = outcome else {
        panic!("expected submission, got {outcome:?}");
    };
    assert_eq!(
        repo.get_submission(submission_id)
            .await
            .unwrap()
            .violation_count,
        2
    );

    let updates = drain(&mut live.updates);
    let warnings: Vec<(ViolationKind, u32)> = updates
        .iter()
        .filter_map(|u| match u {
            SessionUpdate::Warning { kind, count, .. } => Some((*kind, *count)),
            _ => None,
        })
        .collect();
    assert_eq!(
        warnings,
        vec![(ViolationKind::TabHidden, 1), (ViolationKind::WindowBlur, 2)]
    );
    assert!(updates.contains(&SessionUpdate::Prevented(ViolationKind::ClipboardBlocked)));
    assert!(updates.contains(&SessionUpdate::Prevented(ViolationKind::BlockedShortcut)));
    assert!(updates.contains(&SessionUpdate::Prevented(ViolationKind::ContextMenuBlocked)));
    assert!(!platform.active.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn print_attempt_hard_resets_without_persisting() {
    let repo = Arc::new(InMemoryRepository::new());
    let mut live = start(600, repo.clone()).await;
    let platform = ScriptedPlatform::new(vec![PlatformSignal::BeforePrint]);
    live.handle
        .send(SessionInput::SelectCurrent { option: 2 })
        .unwrap();

    let outcome = live.controller.run(&platform).await;
    assert_eq!(outcome, SessionOutcome::HardReset);
    assert!(
        repo.list_submissions(TestId::new(1), 10)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(!platform.active.load(Ordering::SeqCst));
    assert_eq!(
        drain(&mut live.updates).last(),
        Some(&SessionUpdate::Finished(SessionOutcome::HardReset))
    );
}

#[tokio::test(start_paused = true)]
async fn failed_submission_returns_to_confirming_and_retry_succeeds() {
    let repo = Arc::new(FlakySubmissions::new(1));
    let LiveSession {
        controller,
        handle,
        mut updates,
        ..
    } = start(600, repo.clone()).await;
    let runner = tokio::spawn(async move { controller.run(&ScriptedPlatform::default()).await });

    for input in [
        SessionInput::SelectCurrent { option: 1 },
        SessionInput::RequestSubmit,
        SessionInput::ConfirmSubmit,
    ] {
        handle.send(input).unwrap();
    }
    recv_until(&mut updates, |u| {
        matches!(u, SessionUpdate::SubmitFailed { .. })
    })
    .await;
    match updates.recv().await {
        Some(SessionUpdate::Changed(snapshot)) => {
            assert_eq!(snapshot.phase, Phase::Confirming);
            assert!(snapshot.last_error.is_some());
        }
        other => panic!("unexpected update {other:?}"),
    }
    assert_eq!(repo.attempts.load(Ordering::SeqCst), 1);

    handle.send(SessionInput::ConfirmSubmit).unwrap();
    let outcome = runner.await.unwrap();
    let SessionOutcome::Submitted { submission_id } = outcome else {
        panic!("expected submission, got {outcome:?}");
    };
    assert_eq!(repo.attempts.load(Ordering::SeqCst), 2);
    let stored = repo.get_submission(submission_id).await.unwrap();
    assert_eq!(stored.answers[&QuestionId::new(1)], Some(1));
}

#[tokio::test(start_paused = true)]
async fn confirm_during_slow_save_is_ignored_and_ticks_continue() {
    let repo = Arc::new(FlakySubmissions::new(1).slow(Duration::from_secs(5)));
    let LiveSession {
        controller,
        handle,
        mut updates,
        ..
    } = start(600, repo.clone()).await;
    let runner = tokio::spawn(async move { controller.run(&ScriptedPlatform::default()).await });

    handle.send(SessionInput::RequestSubmit).unwrap();
    handle.send(SessionInput::ConfirmSubmit).unwrap();
    recv_until(&mut updates, |u| *u == SessionUpdate::Submitting).await;

    handle.send(SessionInput::ConfirmSubmit).unwrap();
    assert_eq!(handle.snapshot().await.unwrap().phase, Phase::Submitting);

    let during = recv_until(&mut updates, |u| {
        matches!(u, SessionUpdate::SubmitFailed { .. })
    })
    .await;
    assert!(tick_count(&during) >= 4, "ticks stalled during save: {during:?}");

    // Give a wrongly queued retry every chance to run.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(repo.attempts.load(Ordering::SeqCst), 1);
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, Phase::Confirming);
    assert!(snapshot.remaining_secs <= 600 - 34);

    handle.send(SessionInput::ConfirmSubmit).unwrap();
    let outcome = runner.await.unwrap();
    assert!(matches!(outcome, SessionOutcome::Submitted { .. }));
    assert_eq!(repo.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn print_during_slow_save_hard_resets() {
    let repo = Arc::new(FlakySubmissions::new(0).slow(Duration::from_secs(5)));
    let LiveSession {
        controller,
        handle,
        mut updates,
        ..
    } = start(600, repo.clone()).await;
    let platform = BroadcastPlatform::new();
    let runner = {
        let platform = platform.clone();
        tokio::spawn(async move { controller.run(&platform).await })
    };
    while platform.subscriber_count() == 0 {
        tokio::task::yield_now().await;
    }

    handle.send(SessionInput::RequestSubmit).unwrap();
    handle.send(SessionInput::ConfirmSubmit).unwrap();
    recv_until(&mut updates, |u| *u == SessionUpdate::Submitting).await;

    assert_eq!(platform.emit(&PlatformSignal::BeforePrint), 1);
    assert_eq!(runner.await.unwrap(), SessionOutcome::HardReset);
    assert_eq!(platform.subscriber_count(), 0);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(
        repo.list_submissions(TestId::new(1), 10)
            .await
            .unwrap()
            .is_empty()
    );
    let rest = drain(&mut updates);
    assert!(rest.contains(&SessionUpdate::Prevented(ViolationKind::PrintAttempt)));
    assert_eq!(
        rest.last(),
        Some(&SessionUpdate::Finished(SessionOutcome::HardReset))
    );
}

#[tokio::test(start_paused = true)]
async fn second_confirm_after_success_is_never_persisted() {
    let repo = Arc::new(FlakySubmissions::new(0));
    let live = start(600, repo.clone()).await;
    for input in [
        SessionInput::RequestSubmit,
        SessionInput::ConfirmSubmit,
        SessionInput::ConfirmSubmit,
    ] {
        live.handle.send(input).unwrap();
    }

    live.controller.run(&ScriptedPlatform::default()).await;
    assert_eq!(repo.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_handle_still_submits_on_expiry() {
    let repo = Arc::new(InMemoryRepository::new());
    let live = start(2, repo.clone()).await;
    drop(live.handle);

    let outcome = live.controller.run(&ScriptedPlatform::default()).await;
    assert!(matches!(outcome, SessionOutcome::Submitted { .. }));
}

#[tokio::test(start_paused = true)]
async fn expired_failure_without_learner_is_abandoned() {
    let repo = Arc::new(FlakySubmissions::new(usize::MAX));
    let live = start(1, repo.clone()).await;
    drop(live.handle);

    let outcome = live.controller.run(&ScriptedPlatform::default()).await;
    assert_eq!(outcome, SessionOutcome::Abandoned);
    assert_eq!(repo.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn broadcast_listener_is_released_on_termination() {
    let repo = Arc::new(InMemoryRepository::new());
    let LiveSession {
        controller,
        handle,
        mut updates,
        ..
    } = start(600, repo).await;
    let platform = BroadcastPlatform::new();

    let runner = {
        let platform = platform.clone();
        tokio::spawn(async move { controller.run(&platform).await })
    };
    while platform.subscriber_count() == 0 {
        tokio::task::yield_now().await;
    }

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.total, 3);
    assert_eq!(snapshot.phase, Phase::Active);

    assert_eq!(platform.emit(&PlatformSignal::VisibilityHidden), 1);
    match updates.recv().await {
        Some(SessionUpdate::Changed(_)) => {}
        other => panic!("unexpected update {other:?}"),
    }
    assert_eq!(
        updates.recv().await,
        Some(SessionUpdate::Warning {
            kind: ViolationKind::TabHidden,
            count: 1,
            message: ViolationKind::TabHidden.message(),
        })
    );

    handle.send(SessionInput::RequestSubmit).unwrap();
    handle.send(SessionInput::ConfirmSubmit).unwrap();
    let outcome = runner.await.unwrap();
    assert!(matches!(outcome, SessionOutcome::Submitted { .. }));
    assert_eq!(platform.subscriber_count(), 0);
    assert!(matches!(
        handle.snapshot().await,
        Err(SessionError::Closed)
    ));
}

#[tokio::test]
async fn workflow_rejects_unknown_and_empty_tests() {
    let repo = Arc::new(InMemoryRepository::new());
    repo.upsert_test(&TestPaper::from_persisted(
        TestId::new(9),
        "Empty".into(),
        60,
        Vec::new(),
    ))
    .await
    .unwrap();
    let workflow = ExamWorkflowService::new(fixed_clock(), repo.clone(), repo);

    assert!(matches!(
        workflow.start(TestId::new(2)).await,
        Err(SessionError::NotFound(id)) if id == TestId::new(2)
    ));
    assert!(matches!(
        workflow.start(TestId::new(9)).await,
        Err(SessionError::Empty(_))
    ));
}

#[tokio::test]
async fn workflow_builds_session_from_stored_paper() {
    let repo = Arc::new(InMemoryRepository::new());
    repo.upsert_test(&paper(120)).await.unwrap();
    let workflow = ExamWorkflowService::new(fixed_clock(), repo.clone(), repo)
        .with_devtools_heuristic(None);

    let listed = workflow.list_tests(10).await.unwrap();
    assert_eq!(listed.len(), 1);

    let live = workflow.start(TestId::new(1)).await.unwrap();
    let session = live.controller.session();
    assert_eq!(session.remaining_secs(), 120);
    assert_eq!(session.phase(), Phase::Active);
    assert_eq!(
        session.navigator().questions()[1].parent_id(),
        Some(QuestionId::new(50))
    );
    assert_eq!(live.paper.passage_for(QuestionId::new(50)), Some("Passage"));
}
