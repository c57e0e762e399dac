//! Error handling for the arbiter-sim crate.

use std::{io, path::PathBuf, result, time::Duration};

use focus_arbiter::{AppType, FocusRequest};
use thiserror::Error;

/// Convenient result type for arbiter-sim operations.
pub type Result<T> = result::Result<T, Error>;

/// Errors that can occur while replaying a scenario.
#[derive(Debug, Error)]
pub enum Error {
    /// Wrapper for standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Errors surfaced by the arbiter.
    #[error("Arbiter error: {0}")]
    Arbiter(#[from] focus_arbiter::Error),
    /// The scenario file could not be parsed.
    #[error("Scenario {}: {message}", path.display())]
    Scenario {
        /// Scenario path.
        path: PathBuf,
        /// Parse error.
        message: String,
    },
    /// A step named a client that was never connected.
    #[error("Step {step}: unknown client {name:?}")]
    UnknownClient {
        /// 1-based step number.
        step: usize,
        /// Client name.
        name: String,
    },
    /// A step connected a name that is already in use.
    #[error("Step {step}: client {name:?} is already connected")]
    DuplicateClient {
        /// 1-based step number.
        step: usize,
        /// Client name.
        name: String,
    },
    /// A step named an observer that is not registered.
    #[error("Step {step}: unknown observer {name:?}")]
    UnknownObserver {
        /// 1-based step number.
        step: usize,
        /// Observer name.
        name: String,
    },
    /// A step registered an observer name that is already in use.
    #[error("Step {step}: observer {name:?} is already registered")]
    DuplicateObserver {
        /// 1-based step number.
        step: usize,
        /// Observer name.
        name: String,
    },
    /// A request returned something other than the scenario expected.
    #[error("Step {step}: request for {app_type} returned {actual:?}, expected {expected:?}")]
    Expectation {
        /// 1-based step number.
        step: usize,
        /// Requested category.
        app_type: AppType,
        /// Expected outcome.
        expected: FocusRequest,
        /// Actual outcome.
        actual: FocusRequest,
    },
    /// The arbiter queues did not empty in time.
    #[error("Arbiter did not drain within {0:?}")]
    DrainTimeout(Duration),
    /// RON serialization failure.
    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),
    /// JSON serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
