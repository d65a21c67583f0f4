use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::ProblemId;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Input validation failures. Raised before any state is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReviewError {
    #[error("review result must be \"remembered\" or \"forgot\", got {0:?}")]
    InvalidResult(String),
    #[error("time spent must be non-negative, got {0} minutes")]
    NegativeTimeSpent(i64),
    #[error("time spent is too large: {0} minutes")]
    TimeSpentOverflow(i64),
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
}

//
// ─── REVIEW RESULT ────────────────────────────────────────────────────────────
//

/// Outcome of a single review attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewResult {
    /// Solved it again from memory. Moves one stage forward.
    Remembered,
    /// Could not reproduce the solution. Drops back to stage 1.
    Forgot,
}

impl ReviewResult {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewResult::Remembered => "remembered",
            ReviewResult::Forgot => "forgot",
        }
    }
}

impl fmt::Display for ReviewResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewResult {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remembered" => Ok(ReviewResult::Remembered),
            "forgot" => Ok(ReviewResult::Forgot),
            other => Err(ReviewError::InvalidResult(other.to_owned())),
        }
    }
}

/// Parse a `YYYY-MM-DD` day as supplied by callers.
///
/// # Errors
///
/// Returns `ReviewError::InvalidDate` for anything else.
pub fn parse_review_date(raw: &str) -> Result<NaiveDate, ReviewError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ReviewError::InvalidDate(raw.to_owned()))
}

//
// ─── SUBMISSION ───────────────────────────────────────────────────────────────
//

/// Raw review submission as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewDraft {
    pub result: String,
    pub time_spent_minutes: Option<i64>,
    pub notes: Option<String>,
    pub confusion_notes: Option<String>,
}

impl ReviewDraft {
    #[must_use]
    pub fn new(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_time_spent(mut self, minutes: i64) -> Self {
        self.time_spent_minutes = Some(minutes);
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    #[must_use]
    pub fn with_confusion_notes(mut self, notes: impl Into<String>) -> Self {
        self.confusion_notes = Some(notes.into());
        self
    }

    /// Check the submission. Blank notes are dropped.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError` for an unknown result or a negative/oversized time.
    pub fn validate(self) -> Result<ValidatedReview, ReviewError> {
        let result = self.result.parse::<ReviewResult>()?;
        let time_spent_minutes = match self.time_spent_minutes {
            None => None,
            Some(m) if m < 0 => return Err(ReviewError::NegativeTimeSpent(m)),
            Some(m) => Some(u32::try_from(m).map_err(|_| ReviewError::TimeSpentOverflow(m))?),
        };

        Ok(ValidatedReview {
            result,
            time_spent_minutes,
            notes: non_blank(self.notes),
            confusion_notes: non_blank(self.confusion_notes),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// A submission that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedReview {
    pub result: ReviewResult,
    pub time_spent_minutes: Option<u32>,
    pub notes: Option<String>,
    pub confusion_notes: Option<String>,
}

impl ValidatedReview {
    #[must_use]
    pub fn new(result: ReviewResult) -> Self {
        Self {
            result,
            time_spent_minutes: None,
            notes: None,
            confusion_notes: None,
        }
    }
}

//
// ─── HISTORY ENTRY ────────────────────────────────────────────────────────────
//

/// One row of a problem's append-only review history.
///
/// `sequence` is the entry's 1-based position in the problem's log and is
/// unique per problem. `review_stage` is the stage reached by this review;
/// the latest entry's stage is the problem's current stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub id: i64,
    pub problem_id: ProblemId,
    pub sequence: u32,
    pub review_stage: u32,
    pub result: ReviewResult,
    pub interval_days: u32,
    pub next_review_date: NaiveDate,
    pub time_spent_minutes: Option<u32>,
    pub notes: Option<String>,
    pub confusion_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_parsing_is_exact() {
        assert_eq!("remembered".parse::<ReviewResult>().unwrap(), ReviewResult::Remembered);
        assert_eq!("forgot".parse::<ReviewResult>().unwrap(), ReviewResult::Forgot);
        assert!(matches!(
            "Remembered".parse::<ReviewResult>(),
            Err(ReviewError::InvalidResult(s)) if s == "Remembered"
        ));
        assert!("initial".parse::<ReviewResult>().is_err());
    }

    #[test]
    fn draft_validates_and_drops_blank_notes() {
        let review = ReviewDraft::new("forgot")
            .with_time_spent(25)
            .with_notes("   ")
            .with_confusion_notes("mixed up the two pointers")
            .validate()
            .unwrap();

        assert_eq!(review.result, ReviewResult::Forgot);
        assert_eq!(review.time_spent_minutes, Some(25));
        assert_eq!(review.notes, None);
        assert_eq!(review.confusion_notes.as_deref(), Some("mixed up the two pointers"));
    }

    #[test]
    fn draft_rejects_negative_time() {
        let err = ReviewDraft::new("remembered")
            .with_time_spent(-5)
            .validate()
            .unwrap_err();
        assert_eq!(err, ReviewError::NegativeTimeSpent(-5));
    }

    #[test]
    fn draft_rejects_unknown_result() {
        let err = ReviewDraft::new("maybe").validate().unwrap_err();
        assert_eq!(err, ReviewError::InvalidResult("maybe".into()));
    }

    #[test]
    fn parses_review_dates() {
        assert_eq!(
            parse_review_date("2024-02-29").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(matches!(
            parse_review_date("2023-02-29"),
            Err(ReviewError::InvalidDate(_))
        ));
        assert!(parse_review_date("29/02/2024").is_err());
    }
}
