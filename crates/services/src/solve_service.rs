use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use practice_core::{
    model::{CalendarEvent, ProblemId, SolveState, SolvedEventDraft},
    time::Clock,
};
use storage::repository::{
    CalendarRepository, ProblemRepository, SolvePersistence, StorageError,
};

use crate::error::SolveError;
use crate::locks::ProblemLocks;

/// Result of toggling a problem's solved flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolveOutcome {
    pub problem_id: ProblemId,
    pub solved: bool,
    /// True only on the first solve this problem ever had.
    pub event_created: bool,
    pub state: SolveState,
    pub first_solved_date: Option<NaiveDate>,
}

/// Turns solved/unsolved toggles into at most one "solved" calendar event
/// per problem.
///
/// The has-event check, the event insert and the first solve date are
/// written in one storage step, under the problem's lock.
#[derive(Clone)]
pub struct SolveEventRecorder {
    clock: Clock,
    problems: Arc<dyn ProblemRepository>,
    calendar: Arc<dyn CalendarRepository>,
    solves: Arc<dyn SolvePersistence>,
    locks: ProblemLocks,
}

impl SolveEventRecorder {
    #[must_use]
    pub fn new(
        clock: Clock,
        problems: Arc<dyn ProblemRepository>,
        calendar: Arc<dyn CalendarRepository>,
        solves: Arc<dyn SolvePersistence>,
    ) -> Self {
        Self {
            clock,
            problems,
            calendar,
            solves,
            locks: ProblemLocks::new(),
        }
    }

    #[must_use]
    pub fn with_locks(mut self, locks: ProblemLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Persist a new solved value.
    ///
    /// Unsolving only clears the flag; the solved event, the first solve
    /// date and the review history stay. Solving creates the event only if
    /// the problem never had one, so re-solving leaves the schedule alone.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown problem, `Storage` for backend failures.
    pub async fn toggle_solved(
        &self,
        problem_id: ProblemId,
        solved: bool,
    ) -> Result<SolveOutcome, SolveError> {
        let _guard = self.locks.lock(problem_id).await;
        let problem = self
            .problems
            .get_problem(problem_id)
            .await
            .map_err(|err| not_found(problem_id, err))?;

        if !solved {
            self.solves
                .apply_unsolved(problem_id)
                .await
                .map_err(|err| not_found(problem_id, err))?;
            debug!(problem_id = %problem_id, "problem marked unsolved");
            let state = self.state(problem_id).await?;
            return Ok(SolveOutcome {
                problem_id,
                solved: false,
                event_created: false,
                state,
                first_solved_date: problem.first_solved_date(),
            });
        }

        let draft = SolvedEventDraft::for_problem(&problem, self.clock.today());
        let transition = self
            .solves
            .apply_solved(draft)
            .await
            .map_err(|err| not_found(problem_id, err))?;

        let event_created = transition.created_event.is_some();
        if let Some(event) = &transition.created_event {
            info!(
                problem_id = %problem_id,
                event_id = %event.id,
                date = %event.event_date,
                "first solve recorded"
            );
        } else {
            debug!(problem_id = %problem_id, "problem re-solved, no new event");
        }

        Ok(SolveOutcome {
            problem_id,
            solved: true,
            event_created,
            state: SolveState::SolvedAtLeastOnce,
            first_solved_date: transition.first_solved_date,
        })
    }

    /// Which side of the first-solve edge the problem is on.
    ///
    /// # Errors
    ///
    /// Returns `Storage` for backend failures.
    pub async fn state(&self, problem_id: ProblemId) -> Result<SolveState, SolveError> {
        let event = self.calendar.solved_event_for(problem_id).await?;
        Ok(if event.is_some() {
            SolveState::SolvedAtLeastOnce
        } else {
            SolveState::NeverSolved
        })
    }

    /// Solved events dated within `from..=to`.
    ///
    /// # Errors
    ///
    /// Returns `Storage` for backend failures.
    pub async fn solved_events(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CalendarEvent>, SolveError> {
        Ok(self.calendar.events_between(from, to).await?)
    }
}

fn not_found(problem_id: ProblemId, err: StorageError) -> SolveError {
    match err {
        StorageError::NotFound => SolveError::NotFound(problem_id),
        other => SolveError::Storage(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;
    use practice_core::model::{Difficulty, EventColor};
    use practice_core::time::{fixed_clock, fixed_now, fixed_today};
    use storage::repository::{InMemoryRepository, NewProblemRecord};

    fn recorder_with(repo: &InMemoryRepository, clock: Clock) -> SolveEventRecorder {
        SolveEventRecorder::new(
            clock,
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    async fn problem(repo: &InMemoryRepository, difficulty: Difficulty) -> ProblemId {
        repo.insert_problem(NewProblemRecord::new("Coin Change", difficulty, fixed_now()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn first_solve_creates_event_and_sets_date() {
        let repo = InMemoryRepository::new();
        let id = problem(&repo, Difficulty::Medium).await;
        let recorder = recorder_with(&repo, fixed_clock());

        assert_eq!(recorder.state(id).await.unwrap(), SolveState::NeverSolved);
        let outcome = recorder.toggle_solved(id, true).await.unwrap();

        assert!(outcome.event_created);
        assert_eq!(outcome.state, SolveState::SolvedAtLeastOnce);
        assert_eq!(outcome.first_solved_date, Some(fixed_today()));

        let event = repo.solved_event_for(id).await.unwrap().unwrap();
        assert_eq!(event.title, "Solved: Coin Change");
        assert_eq!(event.description, "Problem solved on 2023-11-14");
        assert_eq!(event.color, EventColor::Orange);
        assert_eq!(event.difficulty, Some(Difficulty::Medium));
    }

    #[tokio::test]
    async fn unsolve_keeps_event_and_first_date() {
        let repo = InMemoryRepository::new();
        let id = problem(&repo, Difficulty::Easy).await;
        let recorder = recorder_with(&repo, fixed_clock());

        recorder.toggle_solved(id, true).await.unwrap();
        let outcome = recorder.toggle_solved(id, false).await.unwrap();

        assert!(!outcome.solved);
        assert!(!outcome.event_created);
        assert_eq!(outcome.state, SolveState::SolvedAtLeastOnce);
        assert_eq!(outcome.first_solved_date, Some(fixed_today()));
        assert!(repo.solved_event_for(id).await.unwrap().is_some());
        assert!(!repo.get_problem(id).await.unwrap().is_solved());
    }

    #[tokio::test]
    async fn re_solve_on_a_later_day_keeps_the_original_date() {
        let repo = InMemoryRepository::new();
        let id = problem(&repo, Difficulty::Hard).await;
        recorder_with(&repo, fixed_clock())
            .toggle_solved(id, true)
            .await
            .unwrap();

        let mut later = fixed_clock();
        later.advance(chrono::Duration::days(4));
        let recorder = recorder_with(&repo, later);
        recorder.toggle_solved(id, false).await.unwrap();
        let outcome = recorder.toggle_solved(id, true).await.unwrap();

        assert!(!outcome.event_created);
        assert_eq!(outcome.first_solved_date, Some(fixed_today()));
        let events = recorder
            .solved_events(fixed_today(), fixed_today() + Days::new(30))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_date, fixed_today());
    }

    #[tokio::test]
    async fn toggling_unknown_problem_is_not_found() {
        let repo = InMemoryRepository::new();
        let recorder = recorder_with(&repo, fixed_clock());

        let err = recorder
            .toggle_solved(ProblemId::new(9), true)
            .await
            .unwrap_err();
        assert!(matches!(err, SolveError::NotFound(_)));
    }
}
