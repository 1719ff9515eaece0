use std::collections::BTreeMap;

use crate::model::{Question, QuestionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    option_count: usize,
    selected: Option<usize>,
}

/// In-memory selections for a session, keyed by question id.
///
/// Nothing is written through to storage; the store is read once at submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerStore {
    slots: BTreeMap<QuestionId, Slot>,
}

impl AnswerStore {
    #[must_use]
    pub fn new(questions: &[Question]) -> Self {
        let slots = questions
            .iter()
            .map(|q| {
                (
                    q.id(),
                    Slot {
                        option_count: q.option_count(),
                        selected: None,
                    },
                )
            })
            .collect();
        Self { slots }
    }

    /// Record `option` for `question`. Unknown ids and out of range options
    /// are ignored and return `false`.
    pub fn select(&mut self, question: QuestionId, option: usize) -> bool {
        match self.slots.get_mut(&question) {
            Some(slot) if option < slot.option_count => {
                slot.selected = Some(option);
                true
            }
            _ => false,
        }
    }

    pub fn unselect(&mut self, question: QuestionId) -> bool {
        match self.slots.get_mut(&question) {
            Some(slot) => {
                slot.selected = None;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn selected(&self, question: QuestionId) -> Option<usize> {
        self.slots.get(&question).and_then(|s| s.selected)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.slots.values().filter(|s| s.selected.is_some()).count()
    }

    #[must_use]
    pub fn unanswered_count(&self) -> usize {
        self.total() - self.answered_count()
    }

    /// Share of answered questions in `[0, 1]`; `0` for an empty store.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.answered_count() as f64 / total as f64
    }

    /// Copy of every selection, for the submission payload.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<QuestionId, Option<usize>> {
        self.slots.iter().map(|(id, s)| (*id, s.selected)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn questions(n: u64) -> Vec<Question> {
        (1..=n)
            .map(|id| {
                Question::new(
                    QuestionId::new(id),
                    format!("Q{id}"),
                    vec!["a".into(), "b".into(), "c".into()],
                    "Aptitude",
                    "",
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn reselecting_is_idempotent() {
        let mut store = AnswerStore::new(&questions(3));
        assert!(store.select(QuestionId::new(2), 1));
        let before = store.snapshot();
        assert!(store.select(QuestionId::new(2), 1));
        assert_eq!(store.snapshot(), before);
        assert_eq!(store.answered_count(), 1);
    }

    #[test]
    fn select_guards_bad_input() {
        let mut store = AnswerStore::new(&questions(2));
        assert!(!store.select(QuestionId::new(1), 3));
        assert!(!store.select(QuestionId::new(99), 0));
        assert_eq!(store.answered_count(), 0);
        assert!(!store.unselect(QuestionId::new(99)));
    }

    #[test]
    fn overwrite_and_unselect() {
        let mut store = AnswerStore::new(&questions(2));
        store.select(QuestionId::new(1), 0);
        store.select(QuestionId::new(1), 2);
        assert_eq!(store.selected(QuestionId::new(1)), Some(2));
        store.unselect(QuestionId::new(1));
        assert_eq!(store.selected(QuestionId::new(1)), None);
        assert_eq!(store.answered_count(), 0);
    }

    #[test]
    fn progress_tracks_answers() {
        let mut store = AnswerStore::new(&questions(4));
        assert!(store.progress_fraction().abs() < f64::EPSILON);
        store.select(QuestionId::new(1), 0);
        store.select(QuestionId::new(3), 1);
        assert!((store.progress_fraction() - 0.5).abs() < f64::EPSILON);
        store.select(QuestionId::new(2), 0);
        store.select(QuestionId::new(4), 2);
        assert!((store.progress_fraction() - 1.0).abs() < f64::EPSILON);
        assert_eq!(store.unanswered_count(), 0);
    }

    #[test]
    fn empty_store_reports_zero_progress() {
        let store = AnswerStore::new(&[]);
        assert_eq!(store.total(), 0);
        assert!(store.progress_fraction().abs() < f64::EPSILON);
    }

    #[test]
    fn question_without_options_cannot_be_answered() {
        let broken = Question::from_persisted(
            QuestionId::new(1),
            "Broken".into(),
            Vec::new(),
            "Verbal".into(),
            String::new(),
            None,
        );
        let mut store = AnswerStore::new(&[broken]);
        assert!(!store.select(QuestionId::new(1), 0));
    }
}
