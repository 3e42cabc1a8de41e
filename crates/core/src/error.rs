//! Error taxonomy shared by the core and every backend adapter
//!
//! Adapters translate transport-level failures into these kinds before
//! returning control to the core; the core never inspects raw SDK errors or
//! HTTP status codes. Messages always include the path(s) involved.

use thiserror::Error;

use crate::transfer::TransferOutcome;

/// Result type alias for obstor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for obstor operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or ambiguous path. Raised locally by parsing and path
    /// algebra, never retried.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A caller supplied an argument the operation cannot act on
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Resource absent (404 class). Retried only by explicit caller opt-in.
    #[error("not found: {0}")]
    NotFound(String),

    /// Credential problem (401/403 class). Triggers one credential-cache
    /// invalidation and a single retry before surfacing.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Transient backend overload (503/429 class), eligible for backoff retry
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Concurrent mutation observed by the backend (409 class)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Checksum or content-length mismatch while moving bytes. Seen when a
    /// cluster is under replication load; worth re-reading.
    #[error("inconsistent transfer: {0}")]
    InconsistentTransfer(String),

    /// The result set never satisfied the caller's condition within the
    /// retry budget. Carries the names seen in the final attempt.
    #[error("condition not met after {} attempt(s); last attempt yielded {} result(s)", .attempts, .last.len())]
    ConditionNotMet {
        /// Attempts consumed before giving up
        attempts: u32,
        /// Object names observed in the final attempt
        last: Vec<String>,
    },

    /// Some objects in a bulk transfer failed. The outcome carries both the
    /// completed and the failed sets; completed work is not lost.
    #[error("partial transfer: {}", .0.summary())]
    PartialTransfer(Box<TransferOutcome>),

    /// Settings file missing a value or failing to parse
    #[error("config error: {0}")]
    Config(String),

    /// Local filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Adapter fault that fits no narrower kind
    #[error("remote error: {0}")]
    Remote(String),
}

impl Error {
    /// Whether a retry with backoff may reasonably re-attempt the operation.
    ///
    /// `Unauthorized` is deliberately absent: it gets exactly one retry
    /// through credential-cache invalidation (see [`crate::creds`]), not an
    /// open-ended backoff loop.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Unavailable(_) | Error::InconsistentTransfer(_) | Error::Conflict(_) => true,
            Error::PartialTransfer(outcome) => {
                !outcome.failed.is_empty() && outcome.failed.iter().all(|f| f.error.is_retryable())
            }
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// True for the 404 kind, regardless of which layer produced it
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
