use std::sync::Arc;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Difficulty, ReviewPattern, ReviewPatternTable, ReviewResult};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("no review pattern configured for difficulty {0}")]
    MissingPattern(Difficulty),
    #[error("next review date overflows the calendar ({from} + {days} days)")]
    DateOutOfRange { from: NaiveDate, days: u32 },
}

//
// ─── SCHEDULED REVIEW ──────────────────────────────────────────────────────────
//

/// Result of scheduling one review.
///
/// # Fields
///
/// * `previous_stage` - stage the problem was at before this review
/// * `next_stage` - stage reached; stored as the new entry's `review_stage`
/// * `interval_days` - `intervals[next_stage]`
/// * `next_review_date` - `today + interval_days`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledReview {
    pub previous_stage: u32,
    pub next_stage: u32,
    pub interval_days: u32,
    pub next_review_date: NaiveDate,
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// Fixed-interval scheduler driven by per-difficulty review patterns.
///
/// Pure computation: it never touches storage. Callers read the current
/// stage from the review history, schedule, and persist the result.
///
/// # Examples
///
/// ```
/// # use practice_core::scheduler::Scheduler;
/// # use practice_core::model::{Difficulty, ReviewResult};
/// let scheduler = Scheduler::standard();
/// let today = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
///
/// let first = scheduler.schedule(Difficulty::Easy, 0, ReviewResult::Remembered, today)?;
/// assert_eq!(first.next_stage, 1);
/// assert_eq!(first.interval_days, 1);
///
/// let second = scheduler.schedule(Difficulty::Easy, 1, ReviewResult::Remembered, today)?;
/// assert_eq!(second.interval_days, 3);
/// # Ok::<(), practice_core::scheduler::SchedulerError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Scheduler {
    patterns: Arc<ReviewPatternTable>,
}

impl Scheduler {
    #[must_use]
    pub fn new(patterns: Arc<ReviewPatternTable>) -> Self {
        Self { patterns }
    }

    /// Scheduler over the standard shipped patterns.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(Arc::new(ReviewPatternTable::standard()))
    }

    #[must_use]
    pub fn patterns(&self) -> &ReviewPatternTable {
        &self.patterns
    }

    /// Pattern for `difficulty`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::MissingPattern` if none is configured.
    pub fn pattern(&self, difficulty: Difficulty) -> Result<&ReviewPattern, SchedulerError> {
        self.patterns
            .get(difficulty)
            .ok_or(SchedulerError::MissingPattern(difficulty))
    }

    /// Compute the next stage, interval and due date for one review.
    ///
    /// A `current_stage` past the end of the pattern is treated as the last
    /// stage.
    ///
    /// # Errors
    ///
    /// - `MissingPattern` if the difficulty has no pattern
    /// - `DateOutOfRange` if the due date cannot be represented
    pub fn schedule(
        &self,
        difficulty: Difficulty,
        current_stage: u32,
        result: ReviewResult,
        today: NaiveDate,
    ) -> Result<ScheduledReview, SchedulerError> {
        let pattern = self.pattern(difficulty)?;
        let next_stage = pattern.next_stage(current_stage, result);
        let interval_days = pattern.interval_at(next_stage);

        Ok(ScheduledReview {
            previous_stage: current_stage,
            next_stage,
            interval_days,
            next_review_date: add_days(today, interval_days)?,
        })
    }

    /// Review dates that follow `scheduled_for` if every one of them is
    /// remembered on its due day. Once the pattern is exhausted the last
    /// interval repeats.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::schedule`].
    pub fn projected_reviews(
        &self,
        difficulty: Difficulty,
        current_stage: u32,
        scheduled_for: NaiveDate,
        count: usize,
    ) -> Result<Vec<NaiveDate>, SchedulerError> {
        let mut stage = current_stage;
        let mut date = scheduled_for;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let next = self.schedule(difficulty, stage, ReviewResult::Remembered, date)?;
            stage = next.next_stage;
            date = next.next_review_date;
            out.push(date);
        }
        Ok(out)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::standard()
    }
}

fn add_days(from: NaiveDate, days: u32) -> Result<NaiveDate, SchedulerError> {
    from.checked_add_days(Days::new(u64::from(days)))
        .ok_or(SchedulerError::DateOutOfRange { from, days })
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_today;
    use chrono::Duration;

    #[test]
    fn remembered_sequence_for_easy_climbs_then_plateaus() {
        let s = Scheduler::standard();
        let today = fixed_today();

        let mut stage = 0;
        let mut stages = Vec::new();
        let mut intervals = Vec::new();
        for _ in 0..10 {
            let next = s
                .schedule(Difficulty::Easy, stage, ReviewResult::Remembered, today)
                .unwrap();
            stage = next.next_stage;
            stages.push(next.next_stage);
            intervals.push(next.interval_days);
        }

        assert_eq!(stages, vec![1, 2, 3, 4, 5, 6, 7, 7, 7, 7]);
        assert_eq!(intervals, vec![1, 3, 7, 14, 30, 60, 120, 120, 120, 120]);
    }

    #[test]
    fn forgot_resets_to_stage_one_for_every_difficulty() {
        let s = Scheduler::standard();
        let today = fixed_today();
        for difficulty in Difficulty::ALL {
            for stage in 0..=9 {
                let next = s
                    .schedule(difficulty, stage, ReviewResult::Forgot, today)
                    .unwrap();
                assert_eq!(next.next_stage, 1);
                assert_eq!(next.interval_days, 1);
                assert_eq!(next.next_review_date, today + Duration::days(1));
            }
        }
    }

    #[test]
    fn hard_pattern_uses_its_own_intervals() {
        let s = Scheduler::standard();
        let next = s
            .schedule(Difficulty::Hard, 2, ReviewResult::Remembered, fixed_today())
            .unwrap();
        assert_eq!(next.previous_stage, 2);
        assert_eq!(next.next_stage, 3);
        assert_eq!(next.interval_days, 4);
        assert_eq!(next.next_review_date, fixed_today() + Duration::days(4));
    }

    #[test]
    fn out_of_range_stage_is_clamped() {
        let s = Scheduler::standard();
        let next = s
            .schedule(Difficulty::Medium, 42, ReviewResult::Remembered, fixed_today())
            .unwrap();
        assert_eq!(next.next_stage, 7);
        assert_eq!(next.interval_days, 120);
    }

    #[test]
    fn missing_pattern_is_reported() {
        let table =
            ReviewPatternTable::from_patterns([ReviewPattern::standard(Difficulty::Easy)]).unwrap();
        let s = Scheduler::new(Arc::new(table));
        let err = s
            .schedule(Difficulty::Hard, 0, ReviewResult::Remembered, fixed_today())
            .unwrap_err();
        assert_eq!(err, SchedulerError::MissingPattern(Difficulty::Hard));
    }

    #[test]
    fn date_overflow_is_an_error() {
        let s = Scheduler::standard();
        let err = s
            .schedule(Difficulty::Easy, 6, ReviewResult::Remembered, NaiveDate::MAX)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::DateOutOfRange { days: 120, .. }));
    }

    #[test]
    fn projected_reviews_chain_intervals() {
        let s = Scheduler::standard();
        let start = fixed_today();
        let dates = s
            .projected_reviews(Difficulty::Easy, 1, start, 3)
            .unwrap();
        assert_eq!(
            dates,
            vec![
                start + Duration::days(3),
                start + Duration::days(3 + 7),
                start + Duration::days(3 + 7 + 14),
            ]
        );
    }

    #[test]
    fn projected_reviews_repeat_last_interval() {
        let s = Scheduler::standard();
        let start = fixed_today();
        let dates = s
            .projected_reviews(Difficulty::Hard, 7, start, 2)
            .unwrap();
        assert_eq!(dates, vec![start + Duration::days(64), start + Duration::days(128)]);
    }
}
