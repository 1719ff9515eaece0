use serde::Serialize;

use crate::model::{Category, Question, QuestionId};

/// Position of a question inside its comprehensive group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroupInfo {
    pub parent: Option<QuestionId>,
    /// 1-based. Zero when the question is not part of this session.
    pub position: usize,
    pub size: usize,
}

impl GroupInfo {
    #[must_use]
    pub fn in_group(&self) -> bool {
        self.parent.is_some()
    }
}

/// Questions of one palette bucket, as indices into the session order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryBucket {
    pub category: Category,
    pub positions: Vec<usize>,
}

/// Ordered question list with a bounds-checked cursor.
///
/// The order is fixed at construction and never re-sorted.
#[derive(Debug, Clone)]
pub struct QuestionNavigator {
    questions: Vec<Question>,
    current: usize,
}

impl QuestionNavigator {
    #[must_use]
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions,
            current: 0,
        }
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    /// Move to `index` if it is in range. Out of range requests are ignored.
    pub fn jump_to(&mut self, index: usize) -> bool {
        if index < self.questions.len() {
            self.current = index;
            true
        } else {
            false
        }
    }

    pub fn next(&mut self) -> usize {
        let last = self.questions.len().saturating_sub(1);
        self.current = (self.current + 1).min(last);
        self.current
    }

    pub fn previous(&mut self) -> usize {
        self.current = self.current.saturating_sub(1);
        self.current
    }

    /// Index of the question with `id`, if present.
    #[must_use]
    pub fn position_of(&self, id: QuestionId) -> Option<usize> {
        self.questions.iter().position(|q| q.id() == id)
    }

    /// Group membership of `question`, derived from the session order.
    #[must_use]
    pub fn group_info(&self, question: &Question) -> GroupInfo {
        let Some(parent) = question.parent_id() else {
            return GroupInfo {
                parent: None,
                position: 1,
                size: 1,
            };
        };
        let members: Vec<&Question> = self
            .questions
            .iter()
            .filter(|q| q.parent_id() == Some(parent))
            .collect();
        let position = members
            .iter()
            .position(|q| q.id() == question.id())
            .map_or(0, |i| i + 1);
        GroupInfo {
            parent: Some(parent),
            position,
            size: members.len(),
        }
    }

    /// Group info for the question under the cursor.
    #[must_use]
    pub fn current_group_info(&self) -> Option<GroupInfo> {
        self.current().map(|q| self.group_info(q))
    }

    /// Partition into the fixed palette buckets.
    ///
    /// Questions whose category matches no bucket are left out of this view.
    #[must_use]
    pub fn by_category(&self) -> Vec<CategoryBucket> {
        Category::ALL
            .into_iter()
            .map(|category| CategoryBucket {
                category,
                positions: self
                    .questions
                    .iter()
                    .enumerate()
                    .filter(|(_, q)| Category::from_label(q.category()) == Some(category))
                    .map(|(i, _)| i)
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: u64, category: &str, parent: Option<u64>) -> Question {
        let q = Question::new(
            QuestionId::new(id),
            format!("Q{id}"),
            vec!["a".into(), "b".into()],
            category,
            "",
        )
        .unwrap();
        match parent {
            Some(p) => q.with_parent(QuestionId::new(p)),
            None => q,
        }
    }

    fn five() -> QuestionNavigator {
        QuestionNavigator::new(vec![
            q(1, "Aptitude", None),
            q(2, "Verbal", Some(90)),
            q(3, "Verbal", Some(90)),
            q(4, "Reasoning", None),
            q(5, "Verbal", Some(90)),
        ])
    }

    #[test]
    fn jump_ignores_out_of_range() {
        let mut nav = five();
        for i in 0..10 {
            let before = nav.current_index();
            let moved = nav.jump_to(i);
            if i < nav.len() {
                assert!(moved);
                assert_eq!(nav.current_index(), i);
            } else {
                assert!(!moved);
                assert_eq!(nav.current_index(), before);
            }
        }
    }

    #[test]
    fn next_and_previous_clamp() {
        let mut nav = five();
        assert_eq!(nav.previous(), 0);
        for _ in 0..10 {
            nav.next();
        }
        assert_eq!(nav.current_index(), 4);
        assert_eq!(nav.previous(), 3);
    }

    #[test]
    fn empty_navigator_stays_at_zero() {
        let mut nav = QuestionNavigator::new(Vec::new());
        assert_eq!(nav.next(), 0);
        assert_eq!(nav.previous(), 0);
        assert!(!nav.jump_to(0));
        assert!(nav.current().is_none());
    }

    #[test]
    fn group_info_counts_members_in_session_order() {
        let nav = five();
        let info = nav.group_info(&nav.questions()[4]);
        assert_eq!(
            info,
            GroupInfo {
                parent: Some(QuestionId::new(90)),
                position: 3,
                size: 3
            }
        );
        let solo = nav.group_info(&nav.questions()[0]);
        assert!(!solo.in_group());
        assert_eq!((solo.position, solo.size), (1, 1));
    }

    #[test]
    fn by_category_preserves_order_and_drops_unknown() {
        let mut questions = five().questions().to_vec();
        questions.push(q(6, "General Knowledge", None));
        questions.push(q(7, "aptitude", None));
        let nav = QuestionNavigator::new(questions);
        let buckets = nav.by_category();
        assert_eq!(buckets.len(), 4);
        assert_eq!(buckets[0].category, Category::Aptitude);
        assert_eq!(buckets[0].positions, vec![0, 6]);
        assert_eq!(buckets[1].positions, vec![3]);
        assert_eq!(buckets[2].positions, vec![1, 2, 4]);
        assert!(buckets[3].positions.is_empty());
        let listed: usize = buckets.iter().map(|b| b.positions.len()).sum();
        assert_eq!(listed, 6);
    }
}
