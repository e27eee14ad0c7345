use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the clone lifecycle core.
///
/// Every domain variant maps to one illegal transition or backend rule, so a
/// caller can tell which remediation applies without parsing messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloneError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Role '{role}' is at its clone limit of {limit}")]
    CapacityExceeded { role: String, limit: u32 },

    #[error("Invalid modifiers: {0}")]
    InvalidModifiers(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Clone '{0}' is already archived")]
    AlreadyArchived(String),

    #[error("Clone '{0}' is not archived")]
    NotArchived(String),

    #[error("Forbidden on this interface: {0}")]
    Forbidden(String),

    #[error("Call '{operation}' timed out after {}ms", after.as_millis())]
    Timeout { operation: String, after: Duration },

    #[error("RPC error: {0}")]
    Rpc(String),
}

pub type Result<T> = std::result::Result<T, CloneError>;

/// Wire-level classification of [`CloneError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    CapacityExceeded,
    InvalidModifiers,
    NotFound,
    AlreadyArchived,
    NotArchived,
    Forbidden,
    Timeout,
    Rpc,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::CapacityExceeded => "capacity_exceeded",
            ErrorKind::InvalidModifiers => "invalid_modifiers",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyArchived => "already_archived",
            ErrorKind::NotArchived => "not_archived",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Rpc => "rpc",
        };
        f.write_str(name)
    }
}

impl CloneError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloneError::Connection(_) => ErrorKind::Connection,
            CloneError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            CloneError::InvalidModifiers(_) => ErrorKind::InvalidModifiers,
            CloneError::NotFound(_) => ErrorKind::NotFound,
            CloneError::AlreadyArchived(_) => ErrorKind::AlreadyArchived,
            CloneError::NotArchived(_) => ErrorKind::NotArchived,
            CloneError::Forbidden(_) => ErrorKind::Forbidden,
            CloneError::Timeout { .. } => ErrorKind::Timeout,
            CloneError::Rpc(_) => ErrorKind::Rpc,
        }
    }

    /// Transport failures end the session; everything else only ends the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CloneError::Connection(_))
    }
}

impl From<serde_json::Error> for CloneError {
    fn from(err: serde_json::Error) -> Self {
        Self::Rpc(format!("malformed payload: {}", err))
    }
}

impl From<std::io::Error> for CloneError {
    fn from(err: std::io::Error) -> Self {
        Self::Connection(err.to_string())
    }
}
