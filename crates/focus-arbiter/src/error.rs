//! Error types for focus arbitration.

use std::{io, path::PathBuf, result::Result as StdResult};

use ron::error::SpannedError;
use thiserror::Error;

use crate::client::ClientId;

/// Convenient result type for the arbiter crate.
pub type Result<T> = StdResult<T, Error>;

/// Unified error type for focus arbitration.
#[derive(Debug, Error)]
pub enum Error {
    /// The identity is already linked for disconnect notification or already registered.
    #[error("Client {0} is already registered")]
    DuplicateRegistration(ClientId),

    /// The client disconnected before (or while) the operation could link it.
    #[error("Client {0} has disconnected")]
    ClientDead(ClientId),

    /// A notification could not be delivered to a remote endpoint.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// A worker queue no longer accepts jobs.
    #[error("Queue {0} is closed")]
    QueueClosed(String),

    /// I/O failure while spawning a worker or reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration text could not be parsed.
    #[error("Config error{}: {message}", path.as_ref().map(|p| format!(" at {}", p.display())).unwrap_or_default())]
    Config {
        /// Optional path of the offending file.
        path: Option<PathBuf>,
        /// Human-readable parse error.
        message: String,
    },
}

impl Error {
    /// Helper for endpoint implementations reporting an unreachable target.
    pub fn delivery<M: Into<String>>(msg: M) -> Self {
        Self::Delivery(msg.into())
    }
}

impl From<SpannedError> for Error {
    fn from(err: SpannedError) -> Self {
        Self::Config {
            path: None,
            message: err.to_string(),
        }
    }
}
