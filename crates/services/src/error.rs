//! Shared error types for the services crate.

use thiserror::Error;

use practice_core::model::{Difficulty, PatternError, ProblemError, ProblemId, ReviewError};
use practice_core::scheduler::SchedulerError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Coarse classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input or unknown id; the caller should not retry.
    Client,
    /// Deployment or backend defect.
    Server,
    /// Safe to retry.
    Transient,
}

fn storage_class(err: &StorageError) -> ErrorClass {
    match err {
        StorageError::NotFound => ErrorClass::Client,
        StorageError::Conflict => ErrorClass::Transient,
        _ => ErrorClass::Server,
    }
}

fn difficulty_label(difficulty: &Option<Difficulty>) -> &'static str {
    Difficulty::label(*difficulty)
}

/// Errors emitted by `ReviewService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReviewServiceError {
    #[error("problem {0} not found")]
    NotFound(ProblemId),
    /// `None` when the problem's stored difficulty is not one we recognise.
    #[error("no review pattern configured for difficulty {}", difficulty_label(.0))]
    Configuration(Option<Difficulty>),
    #[error("problem {0} was modified concurrently, try again")]
    ConcurrentModification(ProblemId),
    #[error(transparent)]
    Validation(#[from] ReviewError),
    #[error(transparent)]
    Schedule(SchedulerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<SchedulerError> for ReviewServiceError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::MissingPattern(difficulty) => Self::Configuration(Some(difficulty)),
            other => Self::Schedule(other),
        }
    }
}

impl ReviewServiceError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) | Self::Validation(_) => ErrorClass::Client,
            Self::Configuration(_) | Self::Schedule(_) => ErrorClass::Server,
            Self::ConcurrentModification(_) => ErrorClass::Transient,
            Self::Storage(err) => storage_class(err),
        }
    }
}

/// Errors emitted by `SolveEventRecorder`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SolveError {
    #[error("problem {0} not found")]
    NotFound(ProblemId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SolveError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::Client,
            Self::Storage(err) => storage_class(err),
        }
    }
}

/// Errors emitted by `DueQueueService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DueQueueError {
    #[error(transparent)]
    Validation(#[from] ReviewError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DueQueueError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) => ErrorClass::Client,
            Self::Storage(err) => storage_class(err),
        }
    }
}

/// Errors emitted by the `PracticeServices` facade.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PracticeError {
    #[error(transparent)]
    Review(#[from] ReviewServiceError),
    #[error(transparent)]
    Solve(#[from] SolveError),
    #[error(transparent)]
    Due(#[from] DueQueueError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Problem(#[from] ProblemError),
    #[error(transparent)]
    Validation(#[from] ReviewError),
    #[error("problem {0} not found")]
    NotFound(ProblemId),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}

impl PracticeError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Review(err) => err.class(),
            Self::Solve(err) => err.class(),
            Self::Due(err) => err.class(),
            Self::Pattern(_) | Self::Problem(_) | Self::Validation(_) | Self::NotFound(_) => {
                ErrorClass::Client
            }
            Self::Storage(err) => storage_class(err),
            Self::Sqlite(_) => ErrorClass::Server,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pattern_is_a_server_side_configuration_error() {
        let err = ReviewServiceError::from(SchedulerError::MissingPattern(Difficulty::Hard));
        assert!(matches!(err, ReviewServiceError::Configuration(Some(Difficulty::Hard))));
        assert_eq!(err.class(), ErrorClass::Server);
    }

    #[test]
    fn unrecognised_difficulty_reads_as_unknown() {
        let err = ReviewServiceError::Configuration(None);
        assert_eq!(
            err.to_string(),
            "no review pattern configured for difficulty unknown"
        );
        assert_eq!(err.class(), ErrorClass::Server);
    }

    #[test]
    fn date_overflow_is_server_side() {
        let err = ReviewServiceError::from(SchedulerError::DateOutOfRange {
            from: chrono::NaiveDate::MAX,
            days: 1,
        });
        assert!(matches!(err, ReviewServiceError::Schedule(_)));
        assert_eq!(err.class(), ErrorClass::Server);
    }

    #[test]
    fn classes_follow_the_taxonomy() {
        let id = ProblemId::new(3);
        assert_eq!(ReviewServiceError::NotFound(id).class(), ErrorClass::Client);
        assert_eq!(
            ReviewServiceError::ConcurrentModification(id).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            ReviewServiceError::from(ReviewError::NegativeTimeSpent(-5)).class(),
            ErrorClass::Client
        );
        assert_eq!(
            PracticeError::from(StorageError::Connection("down".into())).class(),
            ErrorClass::Server
        );
        assert_eq!(
            PracticeError::from(SolveError::NotFound(id)).class(),
            ErrorClass::Client
        );
    }
}
