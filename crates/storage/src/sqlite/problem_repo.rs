use chrono::NaiveDate;
use practice_core::model::{Problem, ProblemId};

use super::{
    SqliteRepository,
    mapping::{db_err, map_problem_row, problem_id_from_i64, problem_id_to_i64},
};
use crate::repository::{NewProblemRecord, ProblemRepository, StorageError};

fn expect_row(rows_affected: u64) -> Result<(), StorageError> {
    if rows_affected == 0 {
        return Err(StorageError::NotFound);
    }
    Ok(())
}

#[async_trait::async_trait]
impl ProblemRepository for SqliteRepository {
    async fn insert_problem(&self, record: NewProblemRecord) -> Result<ProblemId, StorageError> {
        let title = record.title.trim();
        if title.is_empty() {
            return Err(StorageError::Serialization("problem title cannot be empty".into()));
        }

        let res = sqlx::query(
            r"
                INSERT INTO problems (title, difficulty, solved, archived, created_at)
                VALUES (?1, ?2, 0, 0, ?3)
            ",
        )
        .bind(title)
        .bind(record.difficulty.as_str())
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        problem_id_from_i64(res.last_insert_rowid())
    }

    async fn get_problem(&self, id: ProblemId) -> Result<Problem, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, title, difficulty, solved, first_solved_date, archived
                FROM problems
                WHERE id = ?1
            ",
        )
        .bind(problem_id_to_i64(id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(StorageError::NotFound)?;

        map_problem_row(&row)
    }

    async fn list_problems(&self) -> Result<Vec<Problem>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, title, difficulty, solved, first_solved_date, archived
                FROM problems
                ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_problem_row(&row)?);
        }
        Ok(out)
    }

    async fn set_solved(&self, id: ProblemId, solved: bool) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE problems SET solved = ?1 WHERE id = ?2")
            .bind(solved)
            .bind(problem_id_to_i64(id)?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        expect_row(res.rows_affected())
    }

    async fn set_first_solved_date(
        &self,
        id: ProblemId,
        date: NaiveDate,
    ) -> Result<bool, StorageError> {
        let pid = problem_id_to_i64(id)?;
        let res = sqlx::query(
            r"
                UPDATE problems
                SET first_solved_date = ?1
                WHERE id = ?2 AND first_solved_date IS NULL
            ",
        )
        .bind(date)
        .bind(pid)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 1 {
            return Ok(true);
        }

        // Either already set, or the problem does not exist.
        self.get_problem(id).await?;
        Ok(false)
    }

    async fn archive_problem(&self, id: ProblemId) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE problems SET archived = 1 WHERE id = ?1")
            .bind(problem_id_to_i64(id)?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        expect_row(res.rows_affected())
    }
}
