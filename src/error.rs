//! Error Types
//!
//! Error taxonomy for keystroke synthesis and job control, with a
//! classification used by the scheduler to pick a recovery strategy.

use thiserror::Error;

/// Result type for typist operations
pub type Result<T> = std::result::Result<T, Error>;

/// Typist error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// No addressable target matched the request
    #[error("target unavailable: {0}")]
    TargetUnavailable(String),

    /// Opening a session on the target failed
    #[error("failed to attach to target: {0}")]
    AttachFailed(String),

    /// Dispatching an input event failed
    #[error("failed to send input event: {0}")]
    SendFailed(String),

    /// The transport connection itself is gone
    #[error("transport connection error: {0}")]
    Connection(String),

    /// A transport command did not complete in time
    #[error("transport command timed out: {0}")]
    Timeout(String),

    /// Resume requested but no paused job with remaining text exists
    #[error("nothing to resume")]
    NothingToResume,

    /// A job is running on the target
    #[error("busy")]
    Busy,

    /// Typing rate is not a positive finite number
    #[error("invalid typing rate: {0}")]
    InvalidRate(f64),

    /// Request type not understood
    #[error("unknown request: {0}")]
    UnknownRequest(String),

    /// Request could not be decoded
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

/// Error classification for recovery strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Fatal to the request; no job is created
    Fatal,
    /// Transport trouble; the job is paused and can be resumed
    Recoverable,
    /// Rejected synchronously; the job is left untouched
    Misuse,
    /// The request itself is invalid; no state change
    Rejected,
}

/// Classify error for recovery strategy selection
pub fn classify_error(error: &Error) -> ErrorClass {
    match error {
        Error::TargetUnavailable(_) => ErrorClass::Fatal,

        Error::AttachFailed(_)
        | Error::SendFailed(_)
        | Error::Connection(_)
        | Error::Timeout(_) => ErrorClass::Recoverable,

        Error::NothingToResume | Error::Busy | Error::InvalidRate(_) => ErrorClass::Misuse,

        Error::UnknownRequest(_) | Error::MalformedRequest(_) => ErrorClass::Rejected,
    }
}

impl Error {
    /// Whether a job hit by this error is worth keeping for a later resume
    pub fn is_recoverable(&self) -> bool {
        classify_error(self) == ErrorClass::Recoverable
    }
}
