//! Error types for Cadence.
//!
//! Only genuine failures are modelled as [`Error`]. Deferred completion is a
//! [`Completion::Async`] success, and the transient `Again` / end-of-stream
//! outcomes of the data path live on
//! [`ReadOutcome`](crate::component::ReadOutcome) and
//! [`WriteOutcome`](crate::component::WriteOutcome).

use thiserror::Error;

/// Result type alias using Cadence's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Cadence operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A parameter was out of range or malformed.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// The call is not valid in the current state or direction.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The component does not implement this capability.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Allocation failed.
    #[error("out of memory")]
    NoMem,

    /// Generic internal failure.
    #[error("operation failed: {0}")]
    OpFailed(String),

    /// A required collaborator (listener, clock anchor, ...) is missing.
    #[error("not initialized: {0}")]
    NotInited(String),

    /// The message actor has exited and can no longer answer.
    #[error("message actor has exited")]
    ActorExited,

    /// A bounded wait expired.
    #[error("timed out: {0}")]
    Timeout(String),
}

impl Error {
    /// Numeric code for this error, suitable for event payloads.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidParam(_) => ErrorCode::InvalidParam,
            Error::InvalidOperation(_) => ErrorCode::InvalidOperation,
            Error::Unsupported(_) => ErrorCode::Unsupported,
            Error::NoMem => ErrorCode::NoMem,
            Error::OpFailed(_) | Error::ActorExited => ErrorCode::OpFailed,
            Error::NotInited(_) => ErrorCode::NotInited,
            Error::Timeout(_) => ErrorCode::Timeout,
        }
    }
}

/// Flat status code covering the whole status taxonomy.
///
/// Events carry this instead of a full [`Error`] so listeners can match on a
/// plain value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Completed.
    Success = 0,
    /// Completion reported later through an event.
    Async = 1,
    /// Transient condition, retry later.
    Again = 2,
    /// End of stream.
    Eos = 3,
    /// Bad argument.
    InvalidParam = -1,
    /// Wrong call order or direction.
    InvalidOperation = -2,
    /// Capability not implemented.
    Unsupported = -3,
    /// Allocation failure.
    NoMem = -4,
    /// Generic internal failure.
    OpFailed = -5,
    /// Missing collaborator.
    NotInited = -6,
    /// Bounded wait expired.
    Timeout = -7,
}

impl ErrorCode {
    /// Whether this code reports a failure.
    #[inline]
    pub fn is_error(self) -> bool {
        (self as i32) < 0
    }
}

impl From<&Error> for ErrorCode {
    fn from(err: &Error) -> Self {
        err.code()
    }
}

/// Successful outcome of a lifecycle operation.
///
/// Callers must branch on this before assuming the transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The transition is already complete.
    Done,
    /// The transition was accepted; a completion event follows.
    Async,
}

impl Completion {
    /// Check if completion is deferred.
    #[inline]
    pub fn is_async(self) -> bool {
        matches!(self, Completion::Async)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::NoMem.code(), ErrorCode::NoMem);
        assert_eq!(Error::ActorExited.code(), ErrorCode::OpFailed);
        assert_eq!(
            Error::InvalidOperation("x".into()).code(),
            ErrorCode::InvalidOperation
        );
        assert!(ErrorCode::OpFailed.is_error());
        assert!(!ErrorCode::Again.is_error());
        assert!(!ErrorCode::Eos.is_error());
    }

    #[test]
    fn test_error_display() {
        let err = Error::Unsupported("seek".into());
        assert_eq!(err.to_string(), "unsupported: seek");
        assert_eq!(Error::ActorExited.to_string(), "message actor has exited");
    }

    #[test]
    fn test_completion() {
        assert!(Completion::Async.is_async());
        assert!(!Completion::Done.is_async());
    }
}
