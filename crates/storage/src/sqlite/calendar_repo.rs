use chrono::{NaiveDate, Utc};
use practice_core::model::{
    CalendarEvent, Difficulty, EventId, EventKind, ProblemId, SolvedEventDraft,
};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{db_err, map_event_row, problem_id_to_i64, ser},
};
use crate::repository::{CalendarRepository, SolvePersistence, SolveTransition, StorageError};

#[async_trait::async_trait]
impl CalendarRepository for SqliteRepository {
    async fn solved_event_for(
        &self,
        problem_id: ProblemId,
    ) -> Result<Option<CalendarEvent>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, event_type, problem_id, title, description, event_date, difficulty, color
                FROM calendar_events
                WHERE problem_id = ?1 AND event_type = ?2
                ORDER BY id ASC
                LIMIT 1
            ",
        )
        .bind(problem_id_to_i64(problem_id)?)
        .bind(EventKind::SolvedProblem.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_event_row).transpose()
    }

    async fn events_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CalendarEvent>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, event_type, problem_id, title, description, event_date, difficulty, color
                FROM calendar_events
                WHERE event_date >= ?1 AND event_date <= ?2
                ORDER BY event_date ASC, id ASC
            ",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_event_row(&row)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl SolvePersistence for SqliteRepository {
    async fn apply_solved(
        &self,
        draft: SolvedEventDraft,
    ) -> Result<SolveTransition, StorageError> {
        let pid = problem_id_to_i64(draft.problem_id)?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let updated = sqlx::query(
            r"
                UPDATE problems
                SET solved = 1,
                    first_solved_date = COALESCE(first_solved_date, ?1)
                WHERE id = ?2
            ",
        )
        .bind(draft.event_date)
        .bind(pid)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if updated.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        // The partial unique index on solved events makes this insert-once
        // even if two writers get here together.
        let inserted = sqlx::query(
            r"
                INSERT INTO calendar_events (
                    event_type, problem_id, title, description, event_date,
                    difficulty, color, created_at
                )
                SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
                WHERE NOT EXISTS (
                    SELECT 1 FROM calendar_events WHERE problem_id = ?2 AND event_type = ?1
                )
            ",
        )
        .bind(EventKind::SolvedProblem.as_str())
        .bind(pid)
        .bind(draft.title.as_str())
        .bind(draft.description.as_str())
        .bind(draft.event_date)
        .bind(draft.difficulty.map(Difficulty::as_str))
        .bind(draft.color.hex())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let created_event = if inserted.rows_affected() == 1 {
            let raw = u64::try_from(inserted.last_insert_rowid())
                .map_err(|_| StorageError::Serialization("event_id sign overflow".into()))?;
            Some(draft.assign_id(EventId::new(raw)))
        } else {
            None
        };

        let first_solved_date: Option<NaiveDate> =
            sqlx::query("SELECT first_solved_date FROM problems WHERE id = ?1")
                .bind(pid)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?
                .try_get("first_solved_date")
                .map_err(ser)?;

        tx.commit().await.map_err(db_err)?;

        if let Some(event) = &created_event {
            tracing::debug!(
                problem_id = %event.problem_id,
                event_id = %event.id,
                "solved event created"
            );
        }

        Ok(SolveTransition {
            created_event,
            first_solved_date,
        })
    }

    async fn apply_unsolved(&self, problem_id: ProblemId) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE problems SET solved = 0 WHERE id = ?1")
            .bind(problem_id_to_i64(problem_id)?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
