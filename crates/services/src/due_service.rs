use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use practice_core::{
    due::{DueItem, DueWindow, derive_due},
    model::parse_review_date,
    time::Clock,
};
use storage::repository::ReviewHistoryRepository;

use crate::error::DueQueueError;

/// Read-only due queue, derived from review history on every call.
#[derive(Clone)]
pub struct DueQueueService {
    clock: Clock,
    history: Arc<dyn ReviewHistoryRepository>,
}

impl DueQueueService {
    #[must_use]
    pub fn new(clock: Clock, history: Arc<dyn ReviewHistoryRepository>) -> Self {
        Self { clock, history }
    }

    /// Resolve an optional `YYYY-MM-DD` reference day, defaulting to today.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed date.
    pub fn reference_day(&self, date: Option<&str>) -> Result<NaiveDate, DueQueueError> {
        match date {
            Some(raw) => Ok(parse_review_date(raw)?),
            None => Ok(self.clock.today()),
        }
    }

    /// Problems due exactly on the reference day.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed date, `Storage` for backend failures.
    pub async fn due_today(&self, date: Option<&str>) -> Result<Vec<DueItem>, DueQueueError> {
        let day = self.reference_day(date)?;
        self.query(DueWindow::Today, day).await
    }

    /// Problems whose due date is strictly before the reference day.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed date, `Storage` for backend failures.
    pub async fn overdue(&self, date: Option<&str>) -> Result<Vec<DueItem>, DueQueueError> {
        let day = self.reference_day(date)?;
        self.query(DueWindow::Overdue, day).await
    }

    /// Problems due after the reference day and at most `window_days` out.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed date, `Storage` for backend failures.
    pub async fn upcoming(
        &self,
        date: Option<&str>,
        window_days: u32,
    ) -> Result<Vec<DueItem>, DueQueueError> {
        let day = self.reference_day(date)?;
        self.query(DueWindow::Upcoming { days: window_days }, day)
            .await
    }

    /// Everything due on or before the reference day.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed date, `Storage` for backend failures.
    pub async fn due_by(&self, date: Option<&str>) -> Result<Vec<DueItem>, DueQueueError> {
        let day = self.reference_day(date)?;
        self.query(DueWindow::DueBy, day).await
    }

    /// Run one window against a reference day.
    ///
    /// # Errors
    ///
    /// Returns `Storage` for backend failures.
    pub async fn query(
        &self,
        window: DueWindow,
        day: NaiveDate,
    ) -> Result<Vec<DueItem>, DueQueueError> {
        let candidates = self.history.due_candidates(window.horizon(day)).await?;
        let items = derive_due(candidates, window, day);
        debug!(?window, %day, count = items.len(), "due queue derived");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use practice_core::model::ReviewError;
    use practice_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;

    #[tokio::test]
    async fn malformed_date_is_rejected() {
        let service = DueQueueService::new(fixed_clock(), Arc::new(InMemoryRepository::new()));
        let err = service.due_today(Some("2024-13-40")).await.unwrap_err();
        assert!(matches!(
            err,
            DueQueueError::Validation(ReviewError::InvalidDate(_))
        ));
    }

    #[tokio::test]
    async fn empty_store_has_empty_queue() {
        let service = DueQueueService::new(fixed_clock(), Arc::new(InMemoryRepository::new()));
        assert!(service.due_today(None).await.unwrap().is_empty());
        assert!(service.upcoming(Some("2024-01-01"), 7).await.unwrap().is_empty());
    }
}
