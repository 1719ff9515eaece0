use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question {id} has an empty title")]
    EmptyTitle { id: QuestionId },

    #[error("question {id} needs at least {min} options, got {count}", min = MIN_OPTIONS)]
    TooFewOptions { id: QuestionId, count: usize },

    #[error("question {id} has an empty option at index {index}")]
    EmptyOption { id: QuestionId, index: usize },
}

/// Smallest option list a well-formed multiple choice question may carry.
pub const MIN_OPTIONS: usize = 2;

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A multiple choice question as presented during a test.
///
/// Questions are read-only for the lifetime of a session. The learner's
/// selection lives in the answer store, never on the question itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    title: String,
    options: Vec<String>,
    category: String,
    #[serde(default)]
    sub_category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<QuestionId>,
}

impl Question {
    /// Creates a validated standalone question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the title is blank, fewer than two options
    /// are given, or any option is blank.
    pub fn new(
        id: QuestionId,
        title: impl Into<String>,
        options: Vec<String>,
        category: impl Into<String>,
        sub_category: impl Into<String>,
    ) -> Result<Self, QuestionError> {
        let question = Self {
            id,
            title: title.into(),
            options,
            category: category.into(),
            sub_category: sub_category.into(),
            parent_id: None,
        };
        question.validate()?;
        Ok(question)
    }

    /// Rehydrate a question from storage without validation.
    ///
    /// Sessions must keep running on partially bad data, so loading never
    /// rejects a row; index guards downstream keep it harmless.
    #[must_use]
    pub fn from_persisted(
        id: QuestionId,
        title: String,
        options: Vec<String>,
        category: String,
        sub_category: String,
        parent_id: Option<QuestionId>,
    ) -> Self {
        Self {
            id,
            title,
            options,
            category,
            sub_category,
            parent_id,
        }
    }

    /// Marks this question as a member of the comprehensive group `parent`.
    #[must_use]
    pub fn with_parent(mut self, parent: QuestionId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    /// Checks the authoring invariants.
    ///
    /// # Errors
    ///
    /// See [`Question::new`].
    pub fn validate(&self) -> Result<(), QuestionError> {
        if self.title.trim().is_empty() {
            return Err(QuestionError::EmptyTitle { id: self.id });
        }
        if self.options.len() < MIN_OPTIONS {
            return Err(QuestionError::TooFewOptions {
                id: self.id,
                count: self.options.len(),
            });
        }
        if let Some(index) = self.options.iter().position(|o| o.trim().is_empty()) {
            return Err(QuestionError::EmptyOption { id: self.id, index });
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    /// Returns true when `index` addresses one of this question's options.
    #[must_use]
    pub fn has_option(&self, index: usize) -> bool {
        index < self.options.len()
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn sub_category(&self) -> &str {
        &self.sub_category
    }

    #[must_use]
    pub fn parent_id(&self) -> Option<QuestionId> {
        self.parent_id
    }

    /// True when the question belongs to a comprehensive group.
    #[must_use]
    pub fn is_grouped(&self) -> bool {
        self.parent_id.is_some()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
