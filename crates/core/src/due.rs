//! Due-queue derivation.
//!
//! Nothing here is stored. A problem's due date is read off its latest
//! history entry, or off its first solve date while it has no history.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::{Difficulty, ProblemId};

/// Which slice of the queue to return, relative to a reference day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DueWindow {
    /// Due exactly on the reference day.
    Today,
    /// Due strictly before the reference day.
    Overdue,
    /// Due on or before the reference day.
    DueBy,
    /// Due after the reference day, at most `days` days out.
    Upcoming { days: u32 },
}

impl DueWindow {
    #[must_use]
    pub fn contains(self, due: NaiveDate, today: NaiveDate) -> bool {
        match self {
            DueWindow::Today => due == today,
            DueWindow::Overdue => due < today,
            DueWindow::DueBy => due <= today,
            DueWindow::Upcoming { .. } => due > today && due <= self.horizon(today),
        }
    }

    /// Latest due date the window can contain. Lets storage prune rows
    /// before they reach [`derive_due`].
    #[must_use]
    pub fn horizon(self, today: NaiveDate) -> NaiveDate {
        match self {
            DueWindow::Today | DueWindow::Overdue | DueWindow::DueBy => today,
            DueWindow::Upcoming { days } => today
                .checked_add_days(Days::new(u64::from(days)))
                .unwrap_or(NaiveDate::MAX),
        }
    }
}

/// Snapshot of one problem's schedule, as read from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueCandidate {
    pub problem_id: ProblemId,
    pub title: String,
    pub difficulty: Option<Difficulty>,
    pub solved: bool,
    pub archived: bool,
    pub first_solved_date: Option<NaiveDate>,
    /// `review_stage` and `next_review_date` of the latest history entry.
    pub latest: Option<(u32, NaiveDate)>,
}

impl DueCandidate {
    /// Effective due date, if the problem takes part in reviews at all.
    #[must_use]
    pub fn due_date(&self) -> Option<NaiveDate> {
        if !self.solved || self.archived {
            return None;
        }
        match self.latest {
            Some((_, next)) => Some(next),
            // stage 0: review on the day of solving
            None => self.first_solved_date,
        }
    }

    #[must_use]
    pub fn stage(&self) -> u32 {
        self.latest.map_or(0, |(stage, _)| stage)
    }
}

/// One row of the due queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueItem {
    pub problem_id: ProblemId,
    pub title: String,
    pub difficulty: Option<Difficulty>,
    pub stage: u32,
    pub next_review_date: NaiveDate,
}

/// Filter candidates into `window` and order by due date, then problem id.
#[must_use]
pub fn derive_due(
    candidates: impl IntoIterator<Item = DueCandidate>,
    window: DueWindow,
    today: NaiveDate,
) -> Vec<DueItem> {
    let mut items: Vec<DueItem> = candidates
        .into_iter()
        .filter_map(|c| {
            let due = c.due_date()?;
            window.contains(due, today).then(|| DueItem {
                stage: c.stage(),
                problem_id: c.problem_id,
                title: c.title,
                difficulty: c.difficulty,
                next_review_date: due,
            })
        })
        .collect();

    items.sort_by(|a, b| {
        a.next_review_date
            .cmp(&b.next_review_date)
            .then(a.problem_id.cmp(&b.problem_id))
    });
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_today;
    use chrono::Duration;

    fn candidate(id: u64, latest: Option<(u32, NaiveDate)>) -> DueCandidate {
        DueCandidate {
            problem_id: ProblemId::new(id),
            title: format!("Problem {id}"),
            difficulty: Some(Difficulty::Easy),
            solved: true,
            archived: false,
            first_solved_date: Some(fixed_today() - Duration::days(30)),
            latest,
        }
    }

    fn ids(items: &[DueItem]) -> Vec<u64> {
        items.iter().map(|i| i.problem_id.value()).collect()
    }

    #[test]
    fn yesterday_is_overdue_not_due_today() {
        let today = fixed_today();
        let c = vec![candidate(1, Some((2, today - Duration::days(1))))];

        assert_eq!(ids(&derive_due(c.clone(), DueWindow::Overdue, today)), vec![1]);
        assert!(derive_due(c.clone(), DueWindow::Today, today).is_empty());
        assert_eq!(ids(&derive_due(c, DueWindow::DueBy, today)), vec![1]);
    }

    #[test]
    fn future_dates_only_show_as_upcoming() {
        let today = fixed_today();
        let c = vec![candidate(1, Some((3, today + Duration::days(5))))];

        assert!(derive_due(c.clone(), DueWindow::Today, today).is_empty());
        assert!(derive_due(c.clone(), DueWindow::Overdue, today).is_empty());
        assert!(derive_due(c.clone(), DueWindow::Upcoming { days: 4 }, today).is_empty());
        assert_eq!(
            ids(&derive_due(c, DueWindow::Upcoming { days: 5 }, today)),
            vec![1]
        );
    }

    #[test]
    fn unreviewed_problem_is_due_on_its_solve_day() {
        let today = fixed_today();
        let mut c = candidate(4, None);
        c.first_solved_date = Some(today);

        let items = derive_due(vec![c], DueWindow::Today, today);
        assert_eq!(ids(&items), vec![4]);
        assert_eq!(items[0].stage, 0);
    }

    #[test]
    fn unsolved_and_archived_problems_are_excluded() {
        let today = fixed_today();
        let mut unsolved = candidate(1, Some((1, today)));
        unsolved.solved = false;
        let mut archived = candidate(2, Some((1, today)));
        archived.archived = true;
        let mut never_dated = candidate(3, None);
        never_dated.first_solved_date = None;

        assert!(derive_due(vec![unsolved, archived, never_dated], DueWindow::DueBy, today).is_empty());
    }

    #[test]
    fn ordering_is_by_date_then_id() {
        let today = fixed_today();
        let c = vec![
            candidate(9, Some((1, today - Duration::days(1)))),
            candidate(2, Some((1, today))),
            candidate(5, Some((1, today - Duration::days(1)))),
            candidate(1, Some((1, today - Duration::days(3)))),
        ];
        assert_eq!(ids(&derive_due(c, DueWindow::DueBy, today)), vec![1, 5, 9, 2]);
    }

    #[test]
    fn problem_without_difficulty_still_shows_up() {
        let today = fixed_today();
        let mut c = candidate(6, Some((2, today)));
        c.difficulty = None;

        let items = derive_due(vec![c], DueWindow::Today, today);
        assert_eq!(ids(&items), vec![6]);
        assert_eq!(items[0].difficulty, None);
    }

    #[test]
    fn upcoming_excludes_today() {
        let today = fixed_today();
        let c = vec![candidate(1, Some((1, today)))];
        assert!(derive_due(c, DueWindow::Upcoming { days: 7 }, today).is_empty());
    }
}
