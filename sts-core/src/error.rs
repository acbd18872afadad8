use thiserror::Error;

use crate::schedule::ScheduleViolation;

pub type StsResult<T> = Result<T, StsError>;

/// The errors which can be produced by the scheduling pipeline.
///
/// A solver timeout is deliberately *not* an error; it is a terminal state of
/// a run and is reported through the result record instead.
#[derive(Debug, Error)]
pub enum StsError {
    /// The number of teams does not admit a round-robin tournament.
    #[error("invalid instance: the number of teams must be an even integer >= 2, got {0}")]
    InvalidInstance(i64),

    /// The solver subprocess terminated abnormally or produced output which
    /// cannot be interpreted.
    #[error("solver run failed: {0}")]
    SolverCrash(String),

    /// The solver reported an identifier which the reverse index of the
    /// encoding cannot map back to a model variable. This indicates a bug in
    /// an encoder/decoder pair and is always fatal.
    #[error("cannot map solver output '{0}' back to the constraint model")]
    EncodingInconsistency(String),

    /// The decoded schedule violates a tournament invariant. Like
    /// [`StsError::EncodingInconsistency`] this points at an encoder/decoder
    /// bug and must never be masked as a successful run.
    #[error("decoded schedule is invalid: {0}")]
    Checker(#[from] ScheduleViolation),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
}

impl StsError {
    /// Shorthand for a [`StsError::SolverCrash`] with a formatted reason.
    pub fn crash(reason: impl Into<String>) -> StsError {
        StsError::SolverCrash(reason.into())
    }
}
