use chrono::Utc;
use practice_core::model::{Difficulty, ReviewPattern};
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs versioned migrations for the current schema.
///
/// Version 1 creates problems, review patterns, review history and calendar
/// events, then seeds the standard review patterns.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS problems (
                    id INTEGER PRIMARY KEY,
                    title TEXT NOT NULL,
                    difficulty TEXT NOT NULL,
                    solved INTEGER NOT NULL DEFAULT 0,
                    first_solved_date TEXT,
                    archived INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS review_patterns (
                    difficulty TEXT PRIMARY KEY,
                    intervals TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        // (problem_id, sequence) is the per-problem ordering; the unique
        // constraint is what turns a lost update into a detectable conflict.
        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS review_history (
                    id INTEGER PRIMARY KEY,
                    problem_id INTEGER NOT NULL,
                    sequence INTEGER NOT NULL CHECK (sequence >= 1),
                    review_stage INTEGER NOT NULL CHECK (review_stage >= 0),
                    result TEXT NOT NULL CHECK (result IN ('remembered', 'forgot')),
                    interval_days INTEGER NOT NULL CHECK (interval_days >= 0),
                    next_review_date TEXT NOT NULL,
                    time_spent_minutes INTEGER CHECK (time_spent_minutes >= 0),
                    notes TEXT,
                    confusion_notes TEXT,
                    created_at TEXT NOT NULL,
                    UNIQUE (problem_id, sequence),
                    FOREIGN KEY (problem_id) REFERENCES problems(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS calendar_events (
                    id INTEGER PRIMARY KEY,
                    event_type TEXT NOT NULL,
                    problem_id INTEGER,
                    title TEXT NOT NULL,
                    description TEXT,
                    event_date TEXT NOT NULL,
                    difficulty TEXT,
                    color TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (problem_id) REFERENCES problems(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_calendar_events_solved_once
                    ON calendar_events (problem_id)
                    WHERE event_type = 'solved_problem';
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_calendar_events_date
                    ON calendar_events (event_date, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_review_history_next_review
                    ON review_history (next_review_date);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_problems_solved_archived
                    ON problems (solved, archived);
            ",
        )
        .execute(&mut *tx)
        .await?;

        let now = Utc::now();
        for difficulty in Difficulty::ALL {
            let pattern = ReviewPattern::standard(difficulty);
            let intervals = serde_json::to_string(pattern.intervals())
                .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
            sqlx::query(
                r"
                    INSERT INTO review_patterns (difficulty, intervals, updated_at)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(difficulty) DO NOTHING
                ",
            )
            .bind(difficulty.as_str())
            .bind(intervals)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
