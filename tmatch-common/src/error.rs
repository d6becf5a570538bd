//! Common error types for TutorMatch

use crate::model::RequestStatus;
use thiserror::Error;
use uuid::Uuid;

/// Common result type for TutorMatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the TutorMatch services
///
/// `AlreadyClaimed` and `InvalidTransition` are routine outcomes of racing
/// clients, not faults: callers surface them as a normal negative result and
/// never retry them against the same request.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown session request id
    #[error("Session request not found: {0}")]
    NotFound(Uuid),

    /// The conditional claim update lost the race: another tutor got there first
    #[error("Session request {0} already claimed")]
    AlreadyClaimed(Uuid),

    /// Attempted transition is not legal from the request's current status
    #[error("Cannot {action} session request {id} while {from}")]
    InvalidTransition {
        id: Uuid,
        from: RequestStatus,
        action: &'static str,
    },

    /// Caller is not the owning student or the assigned tutor
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Meeting link could not be obtained after bounded retries
    #[error("Meeting provisioning failed: {0}")]
    Provisioning(String),

    /// Push fan-out channel is down (recovered by polling, never user-facing)
    #[error("Push channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code for API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::Database(_) => "database",
            Error::Io(_) => "io",
            Error::Config(_) => "config",
            Error::InvalidInput(_) => "invalid_input",
            Error::NotFound(_) => "not_found",
            Error::AlreadyClaimed(_) => "already_claimed",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::Unauthorized(_) => "unauthorized",
            Error::Provisioning(_) => "provisioning_failure",
            Error::ChannelUnavailable(_) => "channel_unavailable",
            Error::Internal(_) => "internal",
        }
    }
}
