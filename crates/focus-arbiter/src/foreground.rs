//! Foreground classification consumed during conflict resolution.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::Caller;

/// Answers whether a process is currently in the foreground.
///
/// Queried while the arbiter holds its state lock, so implementations must
/// not call back into the arbiter.
pub trait ForegroundOracle: Send + Sync {
    /// True if the process `(pid, uid)` is in the foreground.
    fn is_in_foreground(&self, pid: u32, uid: u32) -> bool;

    /// Convenience wrapper taking a [`Caller`].
    fn caller_in_foreground(&self, caller: Caller) -> bool {
        self.is_in_foreground(caller.pid, caller.uid)
    }
}

impl<F> ForegroundOracle for F
where
    F: Fn(u32, u32) -> bool + Send + Sync,
{
    fn is_in_foreground(&self, pid: u32, uid: u32) -> bool {
        self(pid, uid)
    }
}

/// Mutable set of foreground pids.
#[derive(Debug, Default)]
pub struct ForegroundSet {
    /// Pids currently classified as foreground.
    pids: Mutex<HashSet<u32>>,
}

impl ForegroundSet {
    /// Empty set: every process is background.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `pid` as foreground (`true`) or background (`false`).
    pub fn set(&self, pid: u32, foreground: bool) {
        let mut pids = self.pids.lock();
        if foreground {
            pids.insert(pid);
        } else {
            pids.remove(&pid);
        }
    }

    /// Make every process background.
    pub fn clear(&self) {
        self.pids.lock().clear();
    }
}

impl ForegroundOracle for ForegroundSet {
    fn is_in_foreground(&self, pid: u32, _uid: u32) -> bool {
        self.pids.lock().contains(&pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_oracles() {
        let oracle = |pid: u32, _uid: u32| pid == 7;
        assert!(oracle.caller_in_foreground(Caller::new(0, 7)));
        assert!(!oracle.caller_in_foreground(Caller::new(0, 8)));
    }

    #[test]
    fn set_toggles_membership() {
        let set = ForegroundSet::new();
        set.set(10, true);
        assert!(set.is_in_foreground(10, 0));
        set.set(10, false);
        assert!(!set.is_in_foreground(10, 0));
    }
}
