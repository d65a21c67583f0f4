use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use practice_core::due::DueCandidate;
use practice_core::model::{
    CalendarEvent, Difficulty, EventId, Problem, ProblemError, ProblemId, ReviewEntry,
    ReviewPattern, ReviewResult, SolvedEventDraft, ValidatedReview,
};
use practice_core::scheduler::ScheduledReview;
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Insert shape for a catalog problem; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewProblemRecord {
    pub title: String,
    pub difficulty: Difficulty,
    pub created_at: DateTime<Utc>,
}

impl NewProblemRecord {
    #[must_use]
    pub fn new(title: impl Into<String>, difficulty: Difficulty, created_at: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            difficulty,
            created_at,
        }
    }
}

/// Insert shape for a review history entry.
///
/// `sequence` must be exactly one past the problem's latest entry; stores
/// reject anything else with `StorageError::Conflict`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReviewEntry {
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

impl NewReviewEntry {
    /// Build the entry that follows `previous` in the problem's log.
    #[must_use]
    pub fn from_scheduled(
        problem_id: ProblemId,
        previous: Option<&ReviewEntry>,
        scheduled: &ScheduledReview,
        review: ValidatedReview,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            problem_id,
            sequence: previous.map_or(1, |p| p.sequence.saturating_add(1)),
            review_stage: scheduled.next_stage,
            result: review.result,
            interval_days: scheduled.interval_days,
            next_review_date: scheduled.next_review_date,
            time_spent_minutes: review.time_spent_minutes,
            notes: review.notes,
            confusion_notes: review.confusion_notes,
            created_at,
        }
    }

    #[must_use]
    pub fn assign_id(self, id: i64) -> ReviewEntry {
        ReviewEntry {
            id,
            problem_id: self.problem_id,
            sequence: self.sequence,
            review_stage: self.review_stage,
            result: self.result,
            interval_days: self.interval_days,
            next_review_date: self.next_review_date,
            time_spent_minutes: self.time_spent_minutes,
            notes: self.notes,
            confusion_notes: self.confusion_notes,
            created_at: self.created_at,
        }
    }
}

/// What a solved transition changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveTransition {
    /// The solved event, if this call created it.
    pub created_event: Option<CalendarEvent>,
    /// The problem's (possibly pre-existing) first solve date.
    pub first_solved_date: Option<NaiveDate>,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Catalog access used by the review core.
#[async_trait]
pub trait ProblemRepository: Send + Sync {
    /// Insert a new unsolved problem and return its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the problem cannot be stored.
    async fn insert_problem(&self, record: NewProblemRecord) -> Result<ProblemId, StorageError>;

    /// Fetch a problem by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_problem(&self, id: ProblemId) -> Result<Problem, StorageError>;

    /// All problems ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_problems(&self) -> Result<Vec<Problem>, StorageError>;

    /// Set the solved flag.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the problem is missing.
    async fn set_solved(&self, id: ProblemId, solved: bool) -> Result<(), StorageError>;

    /// Set the first solve date unless one is already recorded.
    ///
    /// Returns `true` if this call set it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the problem is missing.
    async fn set_first_solved_date(
        &self,
        id: ProblemId,
        date: NaiveDate,
    ) -> Result<bool, StorageError>;

    /// Hide a problem from the due queue.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the problem is missing.
    async fn archive_problem(&self, id: ProblemId) -> Result<(), StorageError>;
}

/// Review pattern configuration rows.
#[async_trait]
pub trait PatternRepository: Send + Sync {
    /// Every stored pattern, ordered by difficulty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if a stored row is malformed.
    async fn load_patterns(&self) -> Result<Vec<ReviewPattern>, StorageError>;

    /// Insert or replace the pattern for its difficulty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be written.
    async fn upsert_pattern(&self, pattern: &ReviewPattern) -> Result<(), StorageError>;
}

/// Append-only review ledger.
#[async_trait]
pub trait ReviewHistoryRepository: Send + Sync {
    /// Most recent entry for a problem.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn latest_entry(&self, problem_id: ProblemId)
    -> Result<Option<ReviewEntry>, StorageError>;

    /// Entries for a problem, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn entries_for_problem(
        &self,
        problem_id: ProblemId,
    ) -> Result<Vec<ReviewEntry>, StorageError>;

    /// Append one entry, all fields or nothing.
    ///
    /// # Errors
    ///
    /// - `StorageError::NotFound` if the problem does not exist
    /// - `StorageError::Conflict` if `sequence` is not one past the latest entry
    async fn append_entry(&self, entry: NewReviewEntry) -> Result<ReviewEntry, StorageError>;

    /// Schedule snapshot of every solved, non-archived problem whose
    /// effective due date is on or before `until`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn due_candidates(&self, until: NaiveDate) -> Result<Vec<DueCandidate>, StorageError>;
}

/// Read access to calendar events.
#[async_trait]
pub trait CalendarRepository: Send + Sync {
    /// The solved event for a problem, if one was ever created.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn solved_event_for(
        &self,
        problem_id: ProblemId,
    ) -> Result<Option<CalendarEvent>, StorageError>;

    /// Events dated within `from..=to`, ordered by date then id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn events_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CalendarEvent>, StorageError>;
}

/// Atomic solved/unsolved transitions spanning problems and calendar events.
#[async_trait]
pub trait SolvePersistence: Send + Sync {
    /// In one atomic step: set `solved`, set the first solve date if unset,
    /// and create the solved event if none exists for the problem.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the problem is missing.
    async fn apply_solved(
        &self,
        draft: SolvedEventDraft,
    ) -> Result<SolveTransition, StorageError>;

    /// Clear `solved`. Events, history and the first solve date are kept.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the problem is missing.
    async fn apply_unsolved(&self, problem_id: ProblemId) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

#[derive(Default)]
struct Tables {
    problems: BTreeMap<ProblemId, Problem>,
    patterns: BTreeMap<Difficulty, ReviewPattern>,
    history: Vec<ReviewEntry>,
    events: Vec<CalendarEvent>,
    next_problem_id: u64,
    next_entry_id: i64,
    next_event_id: u64,
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// All tables live behind one lock, so every trait method is atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-loaded with the standard review patterns.
    #[must_use]
    pub fn with_standard_patterns() -> Self {
        let repo = Self::new();
        if let Ok(mut tables) = repo.tables.lock() {
            for d in Difficulty::ALL {
                tables.patterns.insert(d, ReviewPattern::standard(d));
            }
        }
        repo
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.tables
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

fn problem_err(e: ProblemError) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[async_trait]
impl ProblemRepository for InMemoryRepository {
    async fn insert_problem(&self, record: NewProblemRecord) -> Result<ProblemId, StorageError> {
        let mut guard = self.tables()?;
        guard.next_problem_id += 1;
        let id = ProblemId::new(guard.next_problem_id);
        let problem = Problem::new(id, record.title, record.difficulty).map_err(problem_err)?;
        guard.problems.insert(id, problem);
        Ok(id)
    }

    async fn get_problem(&self, id: ProblemId) -> Result<Problem, StorageError> {
        let guard = self.tables()?;
        guard.problems.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_problems(&self) -> Result<Vec<Problem>, StorageError> {
        let guard = self.tables()?;
        Ok(guard.problems.values().cloned().collect())
    }

    async fn set_solved(&self, id: ProblemId, solved: bool) -> Result<(), StorageError> {
        let mut guard = self.tables()?;
        let problem = guard.problems.get_mut(&id).ok_or(StorageError::NotFound)?;
        problem.set_solved(solved);
        Ok(())
    }

    async fn set_first_solved_date(
        &self,
        id: ProblemId,
        date: NaiveDate,
    ) -> Result<bool, StorageError> {
        let mut guard = self.tables()?;
        let problem = guard.problems.get_mut(&id).ok_or(StorageError::NotFound)?;
        Ok(problem.mark_first_solved(date))
    }

    async fn archive_problem(&self, id: ProblemId) -> Result<(), StorageError> {
        let mut guard = self.tables()?;
        let problem = guard.problems.get_mut(&id).ok_or(StorageError::NotFound)?;
        problem.archive();
        Ok(())
    }
}

#[async_trait]
impl PatternRepository for InMemoryRepository {
    async fn load_patterns(&self) -> Result<Vec<ReviewPattern>, StorageError> {
        let guard = self.tables()?;
        Ok(guard.patterns.values().cloned().collect())
    }

    async fn upsert_pattern(&self, pattern: &ReviewPattern) -> Result<(), StorageError> {
        let mut guard = self.tables()?;
        guard.patterns.insert(pattern.difficulty(), pattern.clone());
        Ok(())
    }
}

#[async_trait]
impl ReviewHistoryRepository for InMemoryRepository {
    async fn latest_entry(
        &self,
        problem_id: ProblemId,
    ) -> Result<Option<ReviewEntry>, StorageError> {
        let guard = self.tables()?;
        Ok(guard
            .history
            .iter()
            .filter(|e| e.problem_id == problem_id)
            .max_by_key(|e| e.sequence)
            .cloned())
    }

    async fn entries_for_problem(
        &self,
        problem_id: ProblemId,
    ) -> Result<Vec<ReviewEntry>, StorageError> {
        let guard = self.tables()?;
        let mut out: Vec<ReviewEntry> = guard
            .history
            .iter()
            .filter(|e| e.problem_id == problem_id)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.sequence);
        Ok(out)
    }

    async fn append_entry(&self, entry: NewReviewEntry) -> Result<ReviewEntry, StorageError> {
        let mut guard = self.tables()?;
        if !guard.problems.contains_key(&entry.problem_id) {
            return Err(StorageError::NotFound);
        }
        let latest = guard
            .history
            .iter()
            .filter(|e| e.problem_id == entry.problem_id)
            .map(|e| e.sequence)
            .max()
            .unwrap_or(0);
        if entry.sequence != latest + 1 {
            return Err(StorageError::Conflict);
        }

        guard.next_entry_id += 1;
        let stored = entry.assign_id(guard.next_entry_id);
        guard.history.push(stored.clone());
        Ok(stored)
    }

    async fn due_candidates(&self, until: NaiveDate) -> Result<Vec<DueCandidate>, StorageError> {
        let guard = self.tables()?;
        let mut out = Vec::new();
        for problem in guard.problems.values() {
            let latest = guard
                .history
                .iter()
                .filter(|e| e.problem_id == problem.id())
                .max_by_key(|e| e.sequence)
                .map(|e| (e.review_stage, e.next_review_date));
            let candidate = DueCandidate {
                problem_id: problem.id(),
                title: problem.title().to_owned(),
                difficulty: problem.difficulty(),
                solved: problem.is_solved(),
                archived: problem.is_archived(),
                first_solved_date: problem.first_solved_date(),
                latest,
            };
            if candidate.due_date().is_some_and(|d| d <= until) {
                out.push(candidate);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl CalendarRepository for InMemoryRepository {
    async fn solved_event_for(
        &self,
        problem_id: ProblemId,
    ) -> Result<Option<CalendarEvent>, StorageError> {
        let guard = self.tables()?;
        Ok(guard
            .events
            .iter()
            .find(|e| e.problem_id == problem_id)
            .cloned())
    }

    async fn events_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CalendarEvent>, StorageError> {
        let guard = self.tables()?;
        let mut out: Vec<CalendarEvent> = guard
            .events
            .iter()
            .filter(|e| e.event_date >= from && e.event_date <= to)
            .cloned()
            .collect();
        out.sort_by_key(|e| (e.event_date, e.id));
        Ok(out)
    }
}

#[async_trait]
impl SolvePersistence for InMemoryRepository {
    async fn apply_solved(
        &self,
        draft: SolvedEventDraft,
    ) -> Result<SolveTransition, StorageError> {
        let mut guard = self.tables()?;
        let tables = &mut *guard;

        let problem = tables
            .problems
            .get_mut(&draft.problem_id)
            .ok_or(StorageError::NotFound)?;
        problem.set_solved(true);
        problem.mark_first_solved(draft.event_date);
        let first_solved_date = problem.first_solved_date();

        let exists = tables
            .events
            .iter()
            .any(|e| e.problem_id == draft.problem_id);
        let created_event = if exists {
            None
        } else {
            tables.next_event_id += 1;
            let event = draft.assign_id(EventId::new(tables.next_event_id));
            tables.events.push(event.clone());
            Some(event)
        };

        Ok(SolveTransition {
            created_event,
            first_solved_date,
        })
    }

    async fn apply_unsolved(&self, problem_id: ProblemId) -> Result<(), StorageError> {
        self.set_solved(problem_id, false).await
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub problems: Arc<dyn ProblemRepository>,
    pub patterns: Arc<dyn PatternRepository>,
    pub history: Arc<dyn ReviewHistoryRepository>,
    pub calendar: Arc<dyn CalendarRepository>,
    pub solves: Arc<dyn SolvePersistence>,
}

impl Storage {
    /// In-memory storage seeded with the standard review patterns.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::with_standard_patterns())
    }

    /// Wire every repository slot to the same backend.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: ProblemRepository
            + PatternRepository
            + ReviewHistoryRepository
            + CalendarRepository
            + SolvePersistence
            + Clone
            + 'static,
    {
        Self {
            problems: Arc::new(repo.clone()),
            patterns: Arc::new(repo.clone()),
            history: Arc::new(repo.clone()),
            calendar: Arc::new(repo.clone()),
            solves: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use practice_core::time::{fixed_now, fixed_today};

    async fn seeded(repo: &InMemoryRepository, difficulty: Difficulty) -> ProblemId {
        repo.insert_problem(NewProblemRecord::new("Two Sum", difficulty, fixed_now()))
            .await
            .unwrap()
    }

    fn entry(problem_id: ProblemId, sequence: u32, stage: u32, next: NaiveDate) -> NewReviewEntry {
        NewReviewEntry {
            problem_id,
            sequence,
            review_stage: stage,
            result: ReviewResult::Remembered,
            interval_days: 1,
            next_review_date: next,
            time_spent_minutes: None,
            notes: None,
            confusion_notes: None,
            created_at: fixed_now(),
        }
    }

    #[tokio::test]
    async fn missing_problem_is_not_found() {
        let repo = InMemoryRepository::new();
        assert!(matches!(
            repo.get_problem(ProblemId::new(5)).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn append_requires_next_sequence() {
        let repo = InMemoryRepository::new();
        let id = seeded(&repo, Difficulty::Easy).await;
        let day = fixed_today();

        repo.append_entry(entry(id, 1, 1, day)).await.unwrap();
        let dup = repo.append_entry(entry(id, 1, 1, day)).await.unwrap_err();
        assert!(matches!(dup, StorageError::Conflict));
        let gap = repo.append_entry(entry(id, 3, 1, day)).await.unwrap_err();
        assert!(matches!(gap, StorageError::Conflict));

        let second = repo.append_entry(entry(id, 2, 2, day)).await.unwrap();
        let latest = repo.latest_entry(id).await.unwrap().unwrap();
        assert_eq!(latest, second);
        assert_eq!(repo.entries_for_problem(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn append_for_unknown_problem_fails() {
        let repo = InMemoryRepository::new();
        let err = repo
            .append_entry(entry(ProblemId::new(77), 1, 1, fixed_today()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn first_solved_date_is_idempotent() {
        let repo = InMemoryRepository::new();
        let id = seeded(&repo, Difficulty::Medium).await;
        assert!(repo.set_first_solved_date(id, fixed_today()).await.unwrap());
        assert!(
            !repo
                .set_first_solved_date(id, fixed_today() + Duration::days(1))
                .await
                .unwrap()
        );
        let p = repo.get_problem(id).await.unwrap();
        assert_eq!(p.first_solved_date(), Some(fixed_today()));
    }

    #[tokio::test]
    async fn apply_solved_creates_event_once() {
        let repo = InMemoryRepository::new();
        let id = seeded(&repo, Difficulty::Hard).await;
        let problem = repo.get_problem(id).await.unwrap();

        let first = repo
            .apply_solved(SolvedEventDraft::for_problem(&problem, fixed_today()))
            .await
            .unwrap();
        assert!(first.created_event.is_some());
        assert_eq!(first.first_solved_date, Some(fixed_today()));

        repo.apply_unsolved(id).await.unwrap();
        let later = fixed_today() + Duration::days(4);
        let second = repo
            .apply_solved(SolvedEventDraft::for_problem(&problem, later))
            .await
            .unwrap();
        assert!(second.created_event.is_none());
        assert_eq!(second.first_solved_date, Some(fixed_today()));

        let events = repo
            .events_between(fixed_today(), later)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn storage_in_memory_has_standard_patterns() {
        let storage = Storage::in_memory();
        let patterns = storage.patterns.load_patterns().await.unwrap();
        assert_eq!(patterns.len(), 3);
        assert_eq!(patterns[2], ReviewPattern::standard(Difficulty::Hard));
    }
}
