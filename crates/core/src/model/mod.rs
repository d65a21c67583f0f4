mod calendar;
mod difficulty;
mod ids;
mod pattern;
mod problem;
mod review;

pub use ids::{EventId, ParseIdError, ProblemId};

pub use calendar::{CalendarEvent, EventColor, EventKind, SolvedEventDraft};
pub use difficulty::{Difficulty, UnknownDifficulty};
pub use pattern::{PatternError, ReviewPattern, ReviewPatternTable};
pub use problem::{Problem, ProblemError, SolveState};
pub use review::{
    ReviewDraft, ReviewEntry, ReviewError, ReviewResult, ValidatedReview, parse_review_date,
};
