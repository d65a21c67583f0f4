use chrono::NaiveDate;
use practice_core::due::DueCandidate;
use practice_core::model::{
    CalendarEvent, Difficulty, EventColor, EventId, EventKind, Problem, ProblemId, ReviewEntry,
    ReviewPattern, ReviewResult,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Map driver errors: constraint violations become domain conflicts.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StorageError::Conflict;
        }
        if db.is_foreign_key_violation() {
            return StorageError::NotFound;
        }
    }
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn problem_id_to_i64(id: ProblemId) -> Result<i64, StorageError> {
    id_i64("problem_id", id.value())
}

pub(crate) fn problem_id_from_i64(v: i64) -> Result<ProblemId, StorageError> {
    Ok(ProblemId::new(i64_to_u64("problem_id", v)?))
}

pub(crate) fn parse_difficulty(s: &str) -> Result<Difficulty, StorageError> {
    s.parse::<Difficulty>().map_err(ser)
}

/// Problem and event rows may carry a level this build does not know; those
/// load with no difficulty instead of failing the whole read.
pub(crate) fn stored_difficulty(s: &str) -> Option<Difficulty> {
    s.parse::<Difficulty>().ok()
}

pub(crate) fn parse_result(s: &str) -> Result<ReviewResult, StorageError> {
    s.parse::<ReviewResult>().map_err(ser)
}

pub(crate) fn parse_event_kind(s: &str) -> Result<EventKind, StorageError> {
    match s {
        "solved_problem" => Ok(EventKind::SolvedProblem),
        other => Err(StorageError::Serialization(format!(
            "invalid event type: {other}"
        ))),
    }
}

pub(crate) fn encode_intervals(pattern: &ReviewPattern) -> Result<String, StorageError> {
    serde_json::to_string(pattern.intervals()).map_err(ser)
}

pub(crate) fn map_problem_row(row: &sqlx::sqlite::SqliteRow) -> Result<Problem, StorageError> {
    let difficulty: String = row.try_get("difficulty").map_err(ser)?;
    Problem::from_persisted(
        problem_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get("title").map_err(ser)?,
        stored_difficulty(&difficulty),
        row.try_get("solved").map_err(ser)?,
        row.try_get("first_solved_date").map_err(ser)?,
        row.try_get("archived").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_pattern_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ReviewPattern, StorageError> {
    let difficulty: String = row.try_get("difficulty").map_err(ser)?;
    let raw: String = row.try_get("intervals").map_err(ser)?;
    let intervals: Vec<u32> = serde_json::from_str(&raw).map_err(ser)?;
    ReviewPattern::new(parse_difficulty(&difficulty)?, intervals).map_err(ser)
}

pub(crate) fn map_entry_row(row: &sqlx::sqlite::SqliteRow) -> Result<ReviewEntry, StorageError> {
    let result: String = row.try_get("result").map_err(ser)?;
    Ok(ReviewEntry {
        id: row.try_get("id").map_err(ser)?,
        problem_id: problem_id_from_i64(row.try_get::<i64, _>("problem_id").map_err(ser)?)?,
        sequence: i64_to_u32("sequence", row.try_get("sequence").map_err(ser)?)?,
        review_stage: i64_to_u32("review_stage", row.try_get("review_stage").map_err(ser)?)?,
        result: parse_result(&result)?,
        interval_days: i64_to_u32("interval_days", row.try_get("interval_days").map_err(ser)?)?,
        next_review_date: row.try_get("next_review_date").map_err(ser)?,
        time_spent_minutes: row
            .try_get::<Option<i64>, _>("time_spent_minutes")
            .map_err(ser)?
            .map(|m| i64_to_u32("time_spent_minutes", m))
            .transpose()?,
        notes: row.try_get("notes").map_err(ser)?,
        confusion_notes: row.try_get("confusion_notes").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}

pub(crate) fn map_event_row(row: &sqlx::sqlite::SqliteRow) -> Result<CalendarEvent, StorageError> {
    let kind: String = row.try_get("event_type").map_err(ser)?;
    let color: String = row.try_get("color").map_err(ser)?;
    let difficulty = row
        .try_get::<Option<String>, _>("difficulty")
        .map_err(ser)?
        .as_deref()
        .and_then(stored_difficulty);
    Ok(CalendarEvent {
        id: EventId::new(i64_to_u64("event_id", row.try_get("id").map_err(ser)?)?),
        kind: parse_event_kind(&kind)?,
        problem_id: problem_id_from_i64(row.try_get::<i64, _>("problem_id").map_err(ser)?)?,
        title: row.try_get("title").map_err(ser)?,
        description: row
            .try_get::<Option<String>, _>("description")
            .map_err(ser)?
            .unwrap_or_default(),
        event_date: row.try_get("event_date").map_err(ser)?,
        difficulty,
        color: EventColor::from_hex(&color),
    })
}

pub(crate) fn map_candidate_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<DueCandidate, StorageError> {
    let difficulty: String = row.try_get("difficulty").map_err(ser)?;
    let stage: Option<i64> = row.try_get("review_stage").map_err(ser)?;
    let next: Option<NaiveDate> = row.try_get("next_review_date").map_err(ser)?;
    let latest = match (stage, next) {
        (Some(stage), Some(next)) => Some((i64_to_u32("review_stage", stage)?, next)),
        _ => None,
    };
    Ok(DueCandidate {
        problem_id: problem_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        title: row.try_get("title").map_err(ser)?,
        difficulty: stored_difficulty(&difficulty),
        solved: row.try_get("solved").map_err(ser)?,
        archived: row.try_get("archived").map_err(ser)?,
        first_solved_date: row.try_get("first_solved_date").map_err(ser)?,
        latest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_parsing_rejects_other_types() {
        assert_eq!(parse_event_kind("solved_problem").unwrap(), EventKind::SolvedProblem);
        assert!(matches!(
            parse_event_kind("practice_session"),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn unrecognised_stored_difficulty_is_none() {
        assert_eq!(stored_difficulty("Hard"), Some(Difficulty::Hard));
        assert_eq!(stored_difficulty("unknown"), None);
        assert_eq!(stored_difficulty(""), None);
    }

    #[test]
    fn intervals_encode_as_json_array() {
        let encoded = encode_intervals(&ReviewPattern::standard(Difficulty::Hard)).unwrap();
        assert_eq!(encoded, "[0,1,2,4,8,16,32,64]");
    }

    #[test]
    fn id_conversion_rejects_overflow() {
        assert!(id_i64("problem_id", u64::MAX).is_err());
        assert!(problem_id_from_i64(-1).is_err());
    }
}
