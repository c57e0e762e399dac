//! Small value types shared across the arbiter.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Resource category that clients compete for.
///
/// The arbiter treats the value as opaque; the two well-known categories are
/// provided as constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppType(pub i32);

impl AppType {
    /// Turn-by-turn navigation.
    pub const NAVIGATION: Self = Self(1);
    /// Voice command session.
    pub const VOICE_COMMAND: Self = Self(2);
}

impl From<i32> for AppType {
    fn from(v: i32) -> Self {
        Self(v)
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NAVIGATION => write!(f, "navigation"),
            Self::VOICE_COMMAND => write!(f, "voice-command"),
            Self(other) => write!(f, "app-type-{}", other),
        }
    }
}

/// Process identity of a caller, captured when the call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    /// User id of the calling process.
    pub uid: u32,
    /// Process id of the calling process.
    pub pid: u32,
}

impl Caller {
    /// Construct a caller identity from parts.
    pub fn new(uid: u32, pid: u32) -> Self {
        Self { uid, pid }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uid={} pid={}", self.uid, self.pid)
    }
}

/// Outcome of a focus request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusRequest {
    /// The caller now owns the requested category.
    Granted,
    /// A foreground owner could not be displaced by a background requester.
    Failed,
}

impl FocusRequest {
    /// True when focus was granted.
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}
