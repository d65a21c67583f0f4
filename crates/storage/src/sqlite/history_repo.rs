use chrono::NaiveDate;
use practice_core::due::DueCandidate;
use practice_core::model::{ProblemId, ReviewEntry};

use super::{
    SqliteRepository,
    mapping::{db_err, map_candidate_row, map_entry_row, problem_id_to_i64},
};
use crate::repository::{NewReviewEntry, ReviewHistoryRepository, StorageError};

const ENTRY_COLUMNS: &str = "id, problem_id, sequence, review_stage, result, interval_days, \
     next_review_date, time_spent_minutes, notes, confusion_notes, created_at";

#[async_trait::async_trait]
impl ReviewHistoryRepository for SqliteRepository {
    async fn latest_entry(
        &self,
        problem_id: ProblemId,
    ) -> Result<Option<ReviewEntry>, StorageError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM review_history \
             WHERE problem_id = ?1 ORDER BY sequence DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(problem_id_to_i64(problem_id)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(map_entry_row).transpose()
    }

    async fn entries_for_problem(
        &self,
        problem_id: ProblemId,
    ) -> Result<Vec<ReviewEntry>, StorageError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM review_history \
             WHERE problem_id = ?1 ORDER BY sequence ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(problem_id_to_i64(problem_id)?)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_entry_row(&row)?);
        }
        Ok(out)
    }

    async fn append_entry(&self, entry: NewReviewEntry) -> Result<ReviewEntry, StorageError> {
        let pid = problem_id_to_i64(entry.problem_id)?;

        // One statement, so the sequence check and the insert cannot interleave
        // with another writer. UNIQUE(problem_id, sequence) backs it up.
        let res = sqlx::query(
            r"
                INSERT INTO review_history (
                    problem_id, sequence, review_stage, result, interval_days,
                    next_review_date, time_spent_minutes, notes, confusion_notes, created_at
                )
                SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10
                WHERE EXISTS (SELECT 1 FROM problems WHERE id = ?1)
                  AND COALESCE(
                        (SELECT MAX(sequence) FROM review_history WHERE problem_id = ?1),
                        0
                      ) = ?2 - 1
            ",
        )
        .bind(pid)
        .bind(i64::from(entry.sequence))
        .bind(i64::from(entry.review_stage))
        .bind(entry.result.as_str())
        .bind(i64::from(entry.interval_days))
        .bind(entry.next_review_date)
        .bind(entry.time_spent_minutes.map(i64::from))
        .bind(entry.notes.as_deref())
        .bind(entry.confusion_notes.as_deref())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM problems WHERE id = ?1")
                .bind(pid)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?
                .is_some();
            return Err(if exists {
                StorageError::Conflict
            } else {
                StorageError::NotFound
            });
        }

        Ok(entry.assign_id(res.last_insert_rowid()))
    }

    async fn due_candidates(&self, until: NaiveDate) -> Result<Vec<DueCandidate>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT p.id, p.title, p.difficulty, p.solved, p.archived, p.first_solved_date,
                       h.review_stage, h.next_review_date
                FROM problems p
                LEFT JOIN review_history h
                  ON h.problem_id = p.id
                 AND h.sequence = (
                        SELECT MAX(sequence) FROM review_history WHERE problem_id = p.id
                     )
                WHERE p.solved = 1
                  AND p.archived = 0
                  AND COALESCE(h.next_review_date, p.first_solved_date) <= ?1
                ORDER BY COALESCE(h.next_review_date, p.first_solved_date) ASC, p.id ASC
            ",
        )
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_candidate_row(&row)?);
        }
        Ok(out)
    }
}
