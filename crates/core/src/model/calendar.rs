use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{
    Difficulty, Problem,
    ids::{EventId, ProblemId},
};

/// Display color of a solved event, keyed off difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventColor {
    Green,
    Orange,
    Red,
    Gray,
}

impl EventColor {
    #[must_use]
    pub fn for_difficulty(difficulty: Option<Difficulty>) -> Self {
        match difficulty {
            Some(Difficulty::Easy) => EventColor::Green,
            Some(Difficulty::Medium) => EventColor::Orange,
            Some(Difficulty::Hard) => EventColor::Red,
            None => EventColor::Gray,
        }
    }

    #[must_use]
    pub fn hex(self) -> &'static str {
        match self {
            EventColor::Green => "#22c55e",
            EventColor::Orange => "#f97316",
            EventColor::Red => "#ef4444",
            EventColor::Gray => "#6b7280",
        }
    }

    /// Inverse of [`EventColor::hex`]; unrecognised values fall back to gray.
    #[must_use]
    pub fn from_hex(hex: &str) -> Self {
        match hex.to_ascii_lowercase().as_str() {
            "#22c55e" => EventColor::Green,
            "#f97316" => EventColor::Orange,
            "#ef4444" => EventColor::Red,
            _ => EventColor::Gray,
        }
    }
}

/// Kind of calendar record. Only the solved-problem subtype is owned by
/// the review core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SolvedProblem,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::SolvedProblem => "solved_problem",
        }
    }
}

/// Event content before it has been stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolvedEventDraft {
    pub problem_id: ProblemId,
    pub title: String,
    pub description: String,
    pub event_date: NaiveDate,
    pub difficulty: Option<Difficulty>,
    pub color: EventColor,
}

impl SolvedEventDraft {
    /// Build the one-time "solved" event for `problem` on `date`.
    #[must_use]
    pub fn for_problem(problem: &Problem, date: NaiveDate) -> Self {
        Self {
            problem_id: problem.id(),
            title: format!("Solved: {}", problem.title()),
            description: format!("Problem solved on {}", date.format("%Y-%m-%d")),
            event_date: date,
            difficulty: problem.difficulty(),
            color: EventColor::for_difficulty(problem.difficulty()),
        }
    }

    #[must_use]
    pub fn assign_id(self, id: EventId) -> CalendarEvent {
        CalendarEvent {
            id,
            kind: EventKind::SolvedProblem,
            problem_id: self.problem_id,
            title: self.title,
            description: self.description,
            event_date: self.event_date,
            difficulty: self.difficulty,
            color: self.color,
        }
    }
}

/// A stored calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: EventId,
    pub kind: EventKind,
    pub problem_id: ProblemId,
    pub title: String,
    pub description: String,
    pub event_date: NaiveDate,
    pub difficulty: Option<Difficulty>,
    pub color: EventColor,
}
