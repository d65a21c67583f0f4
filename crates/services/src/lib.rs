#![forbid(unsafe_code)]

pub mod due_service;
pub mod error;
pub mod locks;
pub mod practice;
pub mod review_service;
pub mod solve_service;

pub use practice_core::Clock;

pub use due_service::DueQueueService;
pub use error::{DueQueueError, ErrorClass, PracticeError, ReviewServiceError, SolveError};
pub use locks::ProblemLocks;
pub use practice::PracticeServices;
pub use review_service::{ReviewOutcome, ReviewService, ReviewSummary};
pub use solve_service::{SolveEventRecorder, SolveOutcome};
