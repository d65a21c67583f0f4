use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Difficulty, ids::ProblemId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProblemError {
    #[error("problem title cannot be empty")]
    EmptyTitle,
}

/// Whether a problem has ever been solved.
///
/// `SolvedAtLeastOnce` is terminal: marking the problem unsolved again does
/// not move it back, which is what keeps the solved calendar event unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveState {
    NeverSolved,
    SolvedAtLeastOnce,
}

/// Catalog entry as seen by the review core.
///
/// `difficulty` is `None` when storage holds a level this build does not
/// recognise. Such a problem can still be solved and listed, but it has no
/// review pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    id: ProblemId,
    title: String,
    difficulty: Option<Difficulty>,
    solved: bool,
    first_solved_date: Option<NaiveDate>,
    archived: bool,
}

impl Problem {
    /// Create an unsolved problem.
    ///
    /// # Errors
    ///
    /// Returns `ProblemError::EmptyTitle` for a blank title.
    pub fn new(
        id: ProblemId,
        title: impl Into<String>,
        difficulty: Difficulty,
    ) -> Result<Self, ProblemError> {
        Self::build(id, title.into(), Some(difficulty))
    }

    /// Trim a title and reject it if nothing is left.
    ///
    /// # Errors
    ///
    /// Returns `ProblemError::EmptyTitle` for a blank title.
    pub fn normalize_title(title: &str) -> Result<String, ProblemError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ProblemError::EmptyTitle);
        }
        Ok(title.to_owned())
    }

    fn build(
        id: ProblemId,
        title: String,
        difficulty: Option<Difficulty>,
    ) -> Result<Self, ProblemError> {
        Ok(Self {
            id,
            title: Self::normalize_title(&title)?,
            difficulty,
            solved: false,
            first_solved_date: None,
            archived: false,
        })
    }

    /// Rehydrate a problem from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProblemError::EmptyTitle` for a blank title.
    pub fn from_persisted(
        id: ProblemId,
        title: String,
        difficulty: Option<Difficulty>,
        solved: bool,
        first_solved_date: Option<NaiveDate>,
        archived: bool,
    ) -> Result<Self, ProblemError> {
        let mut problem = Self::build(id, title, difficulty)?;
        problem.solved = solved;
        problem.first_solved_date = first_solved_date;
        problem.archived = archived;
        Ok(problem)
    }

    #[must_use]
    pub fn id(&self) -> ProblemId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn difficulty(&self) -> Option<Difficulty> {
        self.difficulty
    }

    #[must_use]
    pub fn is_solved(&self) -> bool {
        self.solved
    }

    #[must_use]
    pub fn first_solved_date(&self) -> Option<NaiveDate> {
        self.first_solved_date
    }

    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.archived
    }

    pub fn set_solved(&mut self, solved: bool) {
        self.solved = solved;
    }

    /// Record the first solve date. Returns false if one was already set.
    pub fn mark_first_solved(&mut self, date: NaiveDate) -> bool {
        if self.first_solved_date.is_some() {
            return false;
        }
        self.first_solved_date = Some(date);
        true
    }

    pub fn archive(&mut self) {
        self.archived = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_today;

    #[test]
    fn new_problem_is_unsolved() {
        let p = Problem::new(ProblemId::new(1), "  Two Sum ", Difficulty::Easy).unwrap();
        assert_eq!(p.title(), "Two Sum");
        assert_eq!(p.difficulty(), Some(Difficulty::Easy));
        assert!(!p.is_solved());
        assert_eq!(p.first_solved_date(), None);
        assert!(!p.is_archived());
    }

    #[test]
    fn blank_title_is_rejected() {
        let err = Problem::new(ProblemId::new(1), "   ", Difficulty::Hard).unwrap_err();
        assert_eq!(err, ProblemError::EmptyTitle);
    }

    #[test]
    fn title_normalization_matches_construction() {
        assert_eq!(Problem::normalize_title("  Jump Game ").unwrap(), "Jump Game");
        assert_eq!(Problem::normalize_title("\t").unwrap_err(), ProblemError::EmptyTitle);
    }

    #[test]
    fn persisted_problem_may_lack_a_difficulty() {
        let p = Problem::from_persisted(
            ProblemId::new(7),
            "Legacy".into(),
            None,
            true,
            Some(fixed_today()),
            false,
        )
        .unwrap();
        assert_eq!(p.difficulty(), None);
        assert!(p.is_solved());
    }

    #[test]
    fn first_solved_date_is_set_once() {
        let mut p = Problem::new(ProblemId::new(1), "LRU Cache", Difficulty::Medium).unwrap();
        let day = fixed_today();
        assert!(p.mark_first_solved(day));
        assert!(!p.mark_first_solved(day + chrono::Duration::days(3)));
        assert_eq!(p.first_solved_date(), Some(day));
    }
}
