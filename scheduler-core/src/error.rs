use thiserror::Error;

use crate::model::WorkerId;

/// Reasons a candidate assignment fails the constraint evaluator. Expected,
/// enumerated, recovered locally by trying the next candidate — never
/// propagated as a fatal error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalFailure {
    #[error("cell is already occupied")]
    CellOccupied,
    #[error("worker already holds a post that day")]
    SameDayConflict,
    #[error("date outside worker's declared work period")]
    OutsideWorkPeriod,
    #[error("date is a declared day off")]
    DayOff,
    #[error("assignment violates the minimum gap between shifts")]
    GapViolation,
    #[error("assignment violates the 7/14-day same-weekday prohibition")]
    Pattern7_14,
    #[error("incompatible with worker {0}")]
    Incompatibility(WorkerId),
    #[error("assignment would exceed the weekend shift cap")]
    WeekendCap,
    #[error("assignment would exceed the maximum consecutive weekends")]
    ConsecutiveWeekendCap,
    #[error("assignment would exceed the worker's target ceiling")]
    OverTarget,
    #[error("cell is protected by a locked mandatory assignment")]
    LockedMandatory,
}

/// Fatal errors surfaced to the driver. Recoverable failures (constraint
/// evaluator rejections, stagnation, remaining tolerance violations) never
/// become a `SchedulerError` — they are handled inside the engine.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("infeasible mandatory layout: {0}")]
    InfeasibleMandatoryLayout(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl From<SchedulerError> for shared::DomainError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Configuration(msg) => shared::DomainError::ConfigurationError(msg),
            SchedulerError::InfeasibleMandatoryLayout(msg) => {
                shared::DomainError::InfeasibleMandatoryLayout(msg)
            }
            SchedulerError::Runtime(msg) => shared::DomainError::InternalError(msg),
        }
    }
}
