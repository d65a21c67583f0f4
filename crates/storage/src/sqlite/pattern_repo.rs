use chrono::Utc;
use practice_core::model::ReviewPattern;

use super::{
    SqliteRepository,
    mapping::{db_err, encode_intervals, map_pattern_row},
};
use crate::repository::{PatternRepository, StorageError};

#[async_trait::async_trait]
impl PatternRepository for SqliteRepository {
    async fn load_patterns(&self) -> Result<Vec<ReviewPattern>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT difficulty, intervals
                FROM review_patterns
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_pattern_row(&row)?);
        }
        out.sort_by_key(ReviewPattern::difficulty);
        Ok(out)
    }

    async fn upsert_pattern(&self, pattern: &ReviewPattern) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO review_patterns (difficulty, intervals, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(difficulty) DO UPDATE SET
                    intervals = excluded.intervals,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(pattern.difficulty().as_str())
        .bind(encode_intervals(pattern)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
