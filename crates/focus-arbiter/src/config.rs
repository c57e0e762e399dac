//! Arbiter configuration.

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// When the authoritative owner entry is committed after a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OwnerCommit {
    /// Commit (and echo to local observers) on the state-apply queue, after
    /// the request has returned.
    #[default]
    Deferred,
    /// Commit inside the request; echo to local observers on the calling
    /// thread before it returns.
    Immediate,
}

/// Configuration for the focus arbiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArbiterCfg {
    /// Name of the notification delivery thread.
    pub dispatch_thread: String,
    /// Name of the state-apply thread.
    pub apply_thread: String,
    /// Owner commit policy.
    pub commit: OwnerCommit,
    /// Upper bound used by `FocusArbiter::flush`.
    pub drain_timeout_ms: u64,
}

impl Default for ArbiterCfg {
    fn default() -> Self {
        Self {
            dispatch_thread: "focus-dispatch".into(),
            apply_thread: "focus-apply".into(),
            commit: OwnerCommit::Deferred,
            drain_timeout_ms: 1000,
        }
    }
}

impl ArbiterCfg {
    /// Parse a RON configuration. Missing fields take their defaults.
    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    /// Load a RON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_ron(&text).map_err(|e| match e {
            Error::Config { message, .. } => Error::Config {
                path: Some(path.to_path_buf()),
                message,
            },
            other => other,
        })
    }

    /// `drain_timeout_ms` as a duration.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_struct_uses_defaults() {
        assert_eq!(ArbiterCfg::from_ron("()").unwrap(), ArbiterCfg::default());
    }

    #[test]
    fn parses_overrides() {
        let cfg = ArbiterCfg::from_ron("(commit: Immediate, drain_timeout_ms: 50)").unwrap();
        assert_eq!(cfg.commit, OwnerCommit::Immediate);
        assert_eq!(cfg.drain_timeout(), Duration::from_millis(50));
        assert_eq!(cfg.apply_thread, "focus-apply");
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = ArbiterCfg::from_ron("(bogus: 1)").unwrap_err();
        assert!(matches!(err, Error::Config { path: None, .. }));
    }
}
