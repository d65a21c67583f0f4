use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{error, info};

use practice_core::{
    due::DueItem,
    model::{
        CalendarEvent, Difficulty, Problem, ProblemId, ReviewDraft, ReviewEntry, ReviewPattern,
        ReviewPatternTable,
    },
    scheduler::Scheduler,
};
use storage::repository::{NewProblemRecord, Storage, StorageError};

use crate::Clock;
use crate::due_service::DueQueueService;
use crate::error::PracticeError;
use crate::locks::ProblemLocks;
use crate::review_service::{ReviewOutcome, ReviewService, ReviewSummary};
use crate::solve_service::{SolveEventRecorder, SolveOutcome};

/// Assembles the review services over one storage backend.
///
/// Review patterns are read once here and shared, read-only, with the
/// scheduler for the lifetime of the value.
#[derive(Clone)]
pub struct PracticeServices {
    clock: Clock,
    storage: Storage,
    patterns: Arc<ReviewPatternTable>,
    reviews: Arc<ReviewService>,
    solves: Arc<SolveEventRecorder>,
    due: Arc<DueQueueService>,
}

impl PracticeServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError` if storage initialization or pattern loading fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, PracticeError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::from_storage(storage, clock).await
    }

    /// Build services over an already initialized backend.
    ///
    /// A difficulty without a pattern is logged and left out; reviews for
    /// problems of that difficulty fail with a configuration error.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError` if patterns cannot be loaded or are duplicated.
    pub async fn from_storage(storage: Storage, clock: Clock) -> Result<Self, PracticeError> {
        let table = ReviewPatternTable::from_patterns(storage.patterns.load_patterns().await?)?;
        for difficulty in table.missing() {
            error!(%difficulty, "no review pattern configured");
        }
        let patterns = Arc::new(table);
        let scheduler = Scheduler::new(Arc::clone(&patterns));
        let locks = ProblemLocks::new();

        let reviews = Arc::new(
            ReviewService::new(
                clock,
                scheduler,
                Arc::clone(&storage.problems),
                Arc::clone(&storage.history),
            )
            .with_locks(locks.clone()),
        );
        let solves = Arc::new(
            SolveEventRecorder::new(
                clock,
                Arc::clone(&storage.problems),
                Arc::clone(&storage.calendar),
                Arc::clone(&storage.solves),
            )
            .with_locks(locks),
        );
        let due = Arc::new(DueQueueService::new(clock, Arc::clone(&storage.history)));

        Ok(Self {
            clock,
            storage,
            patterns,
            reviews,
            solves,
            due,
        })
    }

    /// Patterns in effect for this process.
    #[must_use]
    pub fn patterns(&self) -> &ReviewPatternTable {
        &self.patterns
    }

    //
    // ─── REVIEWS ───────────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// See [`ReviewService::record_review`].
    pub async fn submit_review(
        &self,
        problem_id: ProblemId,
        draft: ReviewDraft,
    ) -> Result<ReviewOutcome, PracticeError> {
        Ok(self.reviews.record_review(problem_id, draft).await?)
    }

    /// # Errors
    ///
    /// See [`ReviewService::current_stage`].
    pub async fn current_stage(&self, problem_id: ProblemId) -> Result<u32, PracticeError> {
        Ok(self.reviews.current_stage(problem_id).await?)
    }

    /// # Errors
    ///
    /// See [`ReviewService::history`].
    pub async fn history(&self, problem_id: ProblemId) -> Result<Vec<ReviewEntry>, PracticeError> {
        Ok(self.reviews.history(problem_id).await?)
    }

    /// # Errors
    ///
    /// See [`ReviewService::summary`].
    pub async fn summary(&self, problem_id: ProblemId) -> Result<ReviewSummary, PracticeError> {
        Ok(self.reviews.summary(problem_id).await?)
    }

    //
    // ─── DUE QUEUE ─────────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// Returns `PracticeError::Due` for a malformed date or backend failure.
    pub async fn get_due_today(&self, date: Option<&str>) -> Result<Vec<DueItem>, PracticeError> {
        Ok(self.due.due_today(date).await?)
    }

    /// # Errors
    ///
    /// Returns `PracticeError::Due` for a malformed date or backend failure.
    pub async fn get_overdue(&self, date: Option<&str>) -> Result<Vec<DueItem>, PracticeError> {
        Ok(self.due.overdue(date).await?)
    }

    /// # Errors
    ///
    /// Returns `PracticeError::Due` for a malformed date or backend failure.
    pub async fn get_upcoming(
        &self,
        date: Option<&str>,
        window_days: u32,
    ) -> Result<Vec<DueItem>, PracticeError> {
        Ok(self.due.upcoming(date, window_days).await?)
    }

    /// # Errors
    ///
    /// Returns `PracticeError::Due` for a malformed date or backend failure.
    pub async fn get_due_by(&self, date: Option<&str>) -> Result<Vec<DueItem>, PracticeError> {
        Ok(self.due.due_by(date).await?)
    }

    //
    // ─── SOLVES ────────────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// See [`SolveEventRecorder::toggle_solved`].
    pub async fn toggle_solved(
        &self,
        problem_id: ProblemId,
        solved: bool,
    ) -> Result<SolveOutcome, PracticeError> {
        Ok(self.solves.toggle_solved(problem_id, solved).await?)
    }

    /// # Errors
    ///
    /// Returns `PracticeError::Solve` on backend failure.
    pub async fn solved_events(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CalendarEvent>, PracticeError> {
        Ok(self.solves.solved_events(from, to).await?)
    }

    //
    // ─── CATALOG ───────────────────────────────────────────────────────────────
    //

    /// Add an unsolved problem to the catalog.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Problem` for a blank title, `Storage` on
    /// backend failure.
    pub async fn add_problem(
        &self,
        title: &str,
        difficulty: Difficulty,
    ) -> Result<ProblemId, PracticeError> {
        let title = Problem::normalize_title(title)?;
        let id = self
            .storage
            .problems
            .insert_problem(NewProblemRecord::new(title, difficulty, self.clock.now()))
            .await?;
        info!(problem_id = %id, %difficulty, "problem added");
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, `Storage` on backend failure.
    pub async fn get_problem(&self, problem_id: ProblemId) -> Result<Problem, PracticeError> {
        self.storage
            .problems
            .get_problem(problem_id)
            .await
            .map_err(|err| catalog_err(problem_id, err))
    }

    /// # Errors
    ///
    /// Returns `Storage` on backend failure.
    pub async fn list_problems(&self) -> Result<Vec<Problem>, PracticeError> {
        Ok(self.storage.problems.list_problems().await?)
    }

    /// Archived problems leave the due queue; their history is kept.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, `Storage` on backend failure.
    pub async fn archive_problem(&self, problem_id: ProblemId) -> Result<(), PracticeError> {
        self.storage
            .problems
            .archive_problem(problem_id)
            .await
            .map_err(|err| catalog_err(problem_id, err))
    }

    //
    // ─── PATTERNS ──────────────────────────────────────────────────────────────
    //

    /// Validate and store a replacement pattern.
    ///
    /// The running process keeps its loaded table; the new row is picked up
    /// on the next start.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Pattern` for a malformed sequence, `Storage`
    /// on backend failure.
    pub async fn set_pattern(
        &self,
        difficulty: Difficulty,
        intervals: Vec<u32>,
    ) -> Result<ReviewPattern, PracticeError> {
        let pattern = ReviewPattern::new(difficulty, intervals)?;
        self.storage.patterns.upsert_pattern(&pattern).await?;
        info!(%difficulty, intervals = ?pattern.intervals(), "review pattern stored");
        Ok(pattern)
    }
}

fn catalog_err(problem_id: ProblemId, err: StorageError) -> PracticeError {
    match err {
        StorageError::NotFound => PracticeError::NotFound(problem_id),
        other => PracticeError::Storage(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use practice_core::model::PatternError;
    use practice_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;

    #[tokio::test]
    async fn loads_standard_patterns_from_storage() {
        let services = PracticeServices::from_storage(Storage::in_memory(), fixed_clock())
            .await
            .unwrap();
        assert!(services.patterns().missing().is_empty());
        assert_eq!(
            services.patterns().get(Difficulty::Hard).unwrap().intervals(),
            &[0, 1, 2, 4, 8, 16, 32, 64]
        );
    }

    #[tokio::test]
    async fn empty_pattern_store_still_starts() {
        let storage = Storage::from_repository(InMemoryRepository::new());
        let services = PracticeServices::from_storage(storage, fixed_clock())
            .await
            .unwrap();
        assert_eq!(services.patterns().missing().len(), 3);

        let id = services.add_problem("Rotate Image", Difficulty::Medium).await.unwrap();
        let err = services
            .submit_review(id, ReviewDraft::new("remembered"))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Server);
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let services = PracticeServices::from_storage(Storage::in_memory(), fixed_clock())
            .await
            .unwrap();
        let err = services.add_problem("   ", Difficulty::Easy).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Client);
        assert!(services.list_problems().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn added_title_is_trimmed() {
        let services = PracticeServices::from_storage(Storage::in_memory(), fixed_clock())
            .await
            .unwrap();
        let id = services.add_problem("  Coin Change ", Difficulty::Medium).await.unwrap();
        let problem = services.get_problem(id).await.unwrap();
        assert_eq!(problem.title(), "Coin Change");
        assert_eq!(problem.difficulty(), Some(Difficulty::Medium));
    }

    #[tokio::test]
    async fn set_pattern_validates_and_applies_on_next_start() {
        let storage = Storage::in_memory();
        let services = PracticeServices::from_storage(storage.clone(), fixed_clock())
            .await
            .unwrap();

        let err = services
            .set_pattern(Difficulty::Easy, vec![1, 2, 3])
            .await
            .unwrap_err();
        assert!(matches!(err, PracticeError::Pattern(PatternError::NonZeroStart(_))));

        services
            .set_pattern(Difficulty::Easy, vec![0, 2, 4])
            .await
            .unwrap();
        assert_eq!(
            services.patterns().get(Difficulty::Easy).unwrap().intervals(),
            ReviewPattern::standard(Difficulty::Easy).intervals()
        );

        let restarted = PracticeServices::from_storage(storage, fixed_clock())
            .await
            .unwrap();
        assert_eq!(
            restarted.patterns().get(Difficulty::Easy).unwrap().intervals(),
            &[0, 2, 4]
        );
    }

    #[tokio::test]
    async fn archive_unknown_problem_is_not_found() {
        let services = PracticeServices::from_storage(Storage::in_memory(), fixed_clock())
            .await
            .unwrap();
        let err = services.archive_problem(ProblemId::new(5)).await.unwrap_err();
        assert!(matches!(err, PracticeError::NotFound(_)));
    }
}
