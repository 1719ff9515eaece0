use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::{QuestionId, TestId};
use crate::model::question::{Question, QuestionError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PaperError {
    #[error("test title cannot be empty")]
    EmptyTitle,

    #[error("test has no questions")]
    NoQuestions,

    #[error("duplicate question id {id}")]
    DuplicateQuestion { id: QuestionId },

    #[error("comprehensive group {parent} has no sub-questions")]
    EmptyGroup { parent: QuestionId },

    #[error(transparent)]
    Question(#[from] QuestionError),
}

/// One authored entry of a test paper.
///
/// A comprehensive item is a shared passage followed by its sub-questions;
/// sessions see it flattened (see [`flatten_items`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionItem {
    Single(Question),
    Comprehensive {
        parent: QuestionId,
        passage: String,
        questions: Vec<Question>,
    },
}

/// Flatten authored items into the ordered question list a session walks.
///
/// Sub-questions of a comprehensive item keep their authored order and get
/// `parent_id` set to the item's parent id.
#[must_use]
pub fn flatten_items(items: &[QuestionItem]) -> Vec<Question> {
    let mut out = Vec::new();
    for item in items {
        match item {
            QuestionItem::Single(q) => out.push(q.clone()),
            QuestionItem::Comprehensive {
                parent, questions, ..
            } => {
                out.extend(questions.iter().cloned().map(|q| q.with_parent(*parent)));
            }
        }
    }
    out
}

/// A timed test as supplied by the content provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPaper {
    id: TestId,
    title: String,
    time_budget_secs: u32,
    items: Vec<QuestionItem>,
}

impl TestPaper {
    /// Creates a validated test paper.
    ///
    /// # Errors
    ///
    /// Returns `PaperError` when the title is blank, there are no questions,
    /// ids repeat, a group is empty, or a question is malformed.
    pub fn new(
        id: TestId,
        title: impl Into<String>,
        time_budget_secs: u32,
        items: Vec<QuestionItem>,
    ) -> Result<Self, PaperError> {
        let paper = Self::from_persisted(id, title.into(), time_budget_secs, items);
        paper.validate()?;
        Ok(paper)
    }

    /// Rehydrate without validation.
    #[must_use]
    pub fn from_persisted(
        id: TestId,
        title: String,
        time_budget_secs: u32,
        items: Vec<QuestionItem>,
    ) -> Self {
        Self {
            id,
            title,
            time_budget_secs,
            items,
        }
    }

    /// # Errors
    ///
    /// See [`TestPaper::new`].
    pub fn validate(&self) -> Result<(), PaperError> {
        if self.title.trim().is_empty() {
            return Err(PaperError::EmptyTitle);
        }
        for item in &self.items {
            match item {
                QuestionItem::Comprehensive {
                    parent, questions, ..
                } if questions.is_empty() => {
                    return Err(PaperError::EmptyGroup { parent: *parent });
                }
                _ => {}
            }
        }
        let questions = self.questions();
        if questions.is_empty() {
            return Err(PaperError::NoQuestions);
        }
        let mut seen = HashSet::with_capacity(questions.len());
        for q in &questions {
            q.validate()?;
            if !seen.insert(q.id()) {
                return Err(PaperError::DuplicateQuestion { id: q.id() });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> TestId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn time_budget_secs(&self) -> u32 {
        self.time_budget_secs
    }

    #[must_use]
    pub fn items(&self) -> &[QuestionItem] {
        &self.items
    }

    /// The flattened question sequence for a session.
    #[must_use]
    pub fn questions(&self) -> Vec<Question> {
        flatten_items(&self.items)
    }

    /// Shared passage for a comprehensive group, if any.
    #[must_use]
    pub fn passage_for(&self, parent: QuestionId) -> Option<&str> {
        self.items.iter().find_map(|item| match item {
            QuestionItem::Comprehensive {
                parent: p, passage, ..
            } if *p == parent => Some(passage.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: u64, category: &str) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Q{id}"),
            vec!["a".into(), "b".into(), "c".into()],
            category,
            "",
        )
        .unwrap()
    }

    #[test]
    fn flatten_stamps_parent_and_keeps_order() {
        let items = vec![
            QuestionItem::Single(q(1, "Aptitude")),
            QuestionItem::Comprehensive {
                parent: QuestionId::new(50),
                passage: "Read this".into(),
                questions: vec![q(2, "Verbal"), q(3, "Verbal")],
            },
            QuestionItem::Single(q(4, "Technical")),
        ];
        let flat = flatten_items(&items);
        let ids: Vec<u64> = flat.iter().map(|q| q.id().value()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(flat[0].parent_id(), None);
        assert_eq!(flat[1].parent_id(), Some(QuestionId::new(50)));
        assert_eq!(flat[2].parent_id(), Some(QuestionId::new(50)));
    }

    #[test]
    fn paper_rejects_duplicates_and_empty_groups() {
        let err = TestPaper::new(
            TestId::new(1),
            "Mock",
            60,
            vec![
                QuestionItem::Single(q(1, "Verbal")),
                QuestionItem::Single(q(1, "Verbal")),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            PaperError::DuplicateQuestion {
                id: QuestionId::new(1)
            }
        );

        let err = TestPaper::new(
            TestId::new(1),
            "Mock",
            60,
            vec![QuestionItem::Comprehensive {
                parent: QuestionId::new(9),
                passage: String::new(),
                questions: Vec::new(),
            }],
        )
        .unwrap_err();
        assert_eq!(
            err,
            PaperError::EmptyGroup {
                parent: QuestionId::new(9)
            }
        );
    }

    #[test]
    fn paper_parses_from_json() {
        let json = r#"{
            "id": 3,
            "title": "Placement mock",
            "time_budget_secs": 600,
            "items": [
                {"kind": "single", "id": 1, "title": "2+2?", "options": ["3", "4"], "category": "Aptitude"},
                {"kind": "comprehensive", "parent": 90, "passage": "Once upon a time",
                 "questions": [
                    {"id": 2, "title": "Who?", "options": ["x", "y"], "category": "Verbal", "sub_category": "RC"}
                 ]}
            ]
        }"#;
        let paper: TestPaper = serde_json::from_str(json).unwrap();
        paper.validate().unwrap();
        assert_eq!(paper.questions().len(), 2);
        assert_eq!(paper.passage_for(QuestionId::new(90)), Some("Once upon a time"));
    }
}
