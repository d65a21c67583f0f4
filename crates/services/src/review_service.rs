use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, warn};

use practice_core::{
    model::{
        Difficulty, Problem, ProblemId, ReviewDraft, ReviewEntry, ReviewResult, ValidatedReview,
    },
    scheduler::{ScheduledReview, Scheduler},
    time::Clock,
};
use storage::repository::{
    NewReviewEntry, ProblemRepository, ReviewHistoryRepository, StorageError,
};

use crate::error::ReviewServiceError;
use crate::locks::ProblemLocks;

/// Review dates projected ahead in a summary.
const PROJECTED_REVIEWS: usize = 3;

//
// ─── RESULTS ───────────────────────────────────────────────────────────────────
//

/// What a recorded review scheduled, returned to the caller for feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewOutcome {
    pub problem_id: ProblemId,
    pub entry_id: i64,
    pub previous_stage: u32,
    pub next_stage: u32,
    pub interval_days: u32,
    pub next_review_date: NaiveDate,
}

impl ReviewOutcome {
    fn new(entry: &ReviewEntry, scheduled: &ScheduledReview) -> Self {
        Self {
            problem_id: entry.problem_id,
            entry_id: entry.id,
            previous_stage: scheduled.previous_stage,
            next_stage: scheduled.next_stage,
            interval_days: scheduled.interval_days,
            next_review_date: scheduled.next_review_date,
        }
    }
}

/// Aggregate view over a problem's review history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewSummary {
    pub problem_id: ProblemId,
    pub total_reviews: usize,
    pub remembered: usize,
    pub forgot: usize,
    /// Percentage of remembered reviews, rounded to two decimals.
    pub success_rate: f64,
    pub current_stage: u32,
    pub next_review_date: Option<NaiveDate>,
    /// Following review dates if every upcoming review is remembered on time.
    pub projected_reviews: Vec<NaiveDate>,
}

fn success_rate(remembered: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    // Review counts stay far below 2^52.
    #[allow(clippy::cast_precision_loss)]
    let rate = remembered as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Records reviews into the append-only history and answers stage queries.
///
/// The current stage is always read from the latest history entry. Writes
/// for one problem are serialized through [`ProblemLocks`], and storage
/// rejects an entry whose sequence is not one past the latest, so two
/// submissions can never both claim the same next stage.
#[derive(Clone)]
pub struct ReviewService {
    clock: Clock,
    scheduler: Scheduler,
    problems: Arc<dyn ProblemRepository>,
    history: Arc<dyn ReviewHistoryRepository>,
    locks: ProblemLocks,
}

impl ReviewService {
    #[must_use]
    pub fn new(
        clock: Clock,
        scheduler: Scheduler,
        problems: Arc<dyn ProblemRepository>,
        history: Arc<dyn ReviewHistoryRepository>,
    ) -> Self {
        Self {
            clock,
            scheduler,
            problems,
            history,
            locks: ProblemLocks::new(),
        }
    }

    /// Share an existing lock table, e.g. with another service touching the
    /// same problems.
    #[must_use]
    pub fn with_locks(mut self, locks: ProblemLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Validate a submission, schedule it and append it to the history.
    ///
    /// A storage conflict on the append (another writer got there first) is
    /// retried once against a fresh read of the latest entry.
    ///
    /// # Errors
    ///
    /// - `Validation` for malformed input, before anything is read or written
    /// - `NotFound` if the problem does not exist
    /// - `Configuration` if the problem's difficulty has no review pattern
    /// - `ConcurrentModification` if the retry conflicts as well
    /// - `Storage` for backend failures
    pub async fn record_review(
        &self,
        problem_id: ProblemId,
        draft: ReviewDraft,
    ) -> Result<ReviewOutcome, ReviewServiceError> {
        let review = draft.validate()?;
        let problem = self.load_problem(problem_id).await?;

        let _guard = self.locks.lock(problem_id).await;
        let (entry, scheduled) = match self.append_next(&problem, review.clone()).await {
            Err(ReviewServiceError::Storage(StorageError::Conflict)) => {
                warn!(problem_id = %problem_id, "review append conflicted, retrying once");
                match self.append_next(&problem, review).await {
                    Err(ReviewServiceError::Storage(StorageError::Conflict)) => {
                        return Err(ReviewServiceError::ConcurrentModification(problem_id));
                    }
                    other => other?,
                }
            }
            other => other?,
        };

        info!(
            problem_id = %problem_id,
            result = %entry.result,
            stage = scheduled.next_stage,
            interval_days = scheduled.interval_days,
            next_review_date = %scheduled.next_review_date,
            "review recorded"
        );
        Ok(ReviewOutcome::new(&entry, &scheduled))
    }

    /// Convenience wrapper for a bare result with no metadata.
    ///
    /// # Errors
    ///
    /// Same as [`ReviewService::record_review`].
    pub async fn record_result(
        &self,
        problem_id: ProblemId,
        result: ReviewResult,
    ) -> Result<ReviewOutcome, ReviewServiceError> {
        self.record_review(problem_id, ReviewDraft::new(result.as_str()))
            .await
    }

    async fn append_next(
        &self,
        problem: &Problem,
        review: ValidatedReview,
    ) -> Result<(ReviewEntry, ScheduledReview), ReviewServiceError> {
        let latest = self.history.latest_entry(problem.id()).await?;
        let current_stage = latest.as_ref().map_or(0, |e| e.review_stage);

        let difficulty = pattern_difficulty(problem)?;
        let scheduled = self
            .scheduler
            .schedule(difficulty, current_stage, review.result, self.clock.today())
            .inspect_err(|err| {
                error!(problem_id = %problem.id(), %err, "cannot schedule review");
            })?;

        let entry = NewReviewEntry::from_scheduled(
            problem.id(),
            latest.as_ref(),
            &scheduled,
            review,
            self.clock.now(),
        );
        let stored = self
            .history
            .append_entry(entry)
            .await
            .map_err(|err| match err {
                StorageError::NotFound => ReviewServiceError::NotFound(problem.id()),
                other => other.into(),
            })?;
        Ok((stored, scheduled))
    }

    /// Stage of the latest history entry, or 0 when the problem has none.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown problem, `Storage` for backend failures.
    pub async fn current_stage(&self, problem_id: ProblemId) -> Result<u32, ReviewServiceError> {
        self.load_problem(problem_id).await?;
        let latest = self.history.latest_entry(problem_id).await?;
        Ok(latest.map_or(0, |e| e.review_stage))
    }

    /// The problem's history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown problem, `Storage` for backend failures.
    pub async fn history(
        &self,
        problem_id: ProblemId,
    ) -> Result<Vec<ReviewEntry>, ReviewServiceError> {
        self.load_problem(problem_id).await?;
        Ok(self.history.entries_for_problem(problem_id).await?)
    }

    /// Counts, success rate and projected schedule for one problem.
    ///
    /// A solved problem without history projects from its first solve date
    /// at stage 0; an unsolved one has no projection.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown problem
    /// - `Configuration` if a projection is needed and the pattern is missing
    /// - `Storage` for backend failures
    pub async fn summary(&self, problem_id: ProblemId) -> Result<ReviewSummary, ReviewServiceError> {
        let problem = self.load_problem(problem_id).await?;
        let entries = self.history.entries_for_problem(problem_id).await?;

        let remembered = entries
            .iter()
            .filter(|e| e.result == ReviewResult::Remembered)
            .count();
        let total_reviews = entries.len();
        let latest = entries.last();

        let current_stage = latest.map_or(0, |e| e.review_stage);
        let next_review_date = match latest {
            Some(entry) => Some(entry.next_review_date),
            None if problem.is_solved() => problem.first_solved_date(),
            None => None,
        };
        let projected_reviews = match next_review_date {
            Some(from) => self.scheduler.projected_reviews(
                pattern_difficulty(&problem)?,
                current_stage,
                from,
                PROJECTED_REVIEWS,
            )?,
            None => Vec::new(),
        };

        Ok(ReviewSummary {
            problem_id,
            total_reviews,
            remembered,
            forgot: total_reviews - remembered,
            success_rate: success_rate(remembered, total_reviews),
            current_stage,
            next_review_date,
            projected_reviews,
        })
    }

    async fn load_problem(&self, problem_id: ProblemId) -> Result<Problem, ReviewServiceError> {
        self.problems
            .get_problem(problem_id)
            .await
            .map_err(|err| match err {
                StorageError::NotFound => ReviewServiceError::NotFound(problem_id),
                other => other.into(),
            })
    }
}

/// Difficulty to schedule `problem` with. A stored level we do not recognise
/// has no review pattern.
fn pattern_difficulty(problem: &Problem) -> Result<Difficulty, ReviewServiceError> {
    problem.difficulty().ok_or_else(|| {
        error!(problem_id = %problem.id(), "problem has an unrecognised difficulty");
        ReviewServiceError::Configuration(None)
    })
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
