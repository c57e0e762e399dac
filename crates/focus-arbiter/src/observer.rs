//! In-process observers of focus ownership.

use std::sync::Arc;

use crate::{AppType, Caller};

/// Local (non-remote) subscriber to ownership changes.
///
/// Callbacks run on arbiter threads without the arbiter's state lock held,
/// so they may query the arbiter. They should return promptly.
pub trait OwnershipObserver: Send + Sync {
    /// `owner` now holds focus on `app_type`.
    fn on_focus_acquired(&self, app_type: AppType, owner: Caller);
    /// `owner` gave up focus on `app_type`.
    fn on_focus_abandoned(&self, app_type: AppType, owner: Caller);
}

/// Ordered list of registered observers.
#[derive(Default)]
pub struct ObserverList {
    /// Observers in registration order.
    observers: Vec<Arc<dyn OwnershipObserver>>,
}

impl ObserverList {
    /// Append an observer.
    pub fn add(&mut self, observer: Arc<dyn OwnershipObserver>) {
        self.observers.push(observer);
    }

    /// Remove every registration of `observer`. Returns true if one was found.
    pub fn remove(&mut self, observer: &Arc<dyn OwnershipObserver>) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| !same_observer(o, observer));
        self.observers.len() != before
    }

    /// Copy of the current list, for delivery outside the lock.
    pub fn snapshot(&self) -> Vec<Arc<dyn OwnershipObserver>> {
        self.observers.clone()
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Drop every observer.
    pub fn clear(&mut self) {
        self.observers.clear();
    }
}

/// Identity comparison on the data pointer only.
fn same_observer(a: &Arc<dyn OwnershipObserver>, b: &Arc<dyn OwnershipObserver>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    impl OwnershipObserver for Nop {
        fn on_focus_acquired(&self, _app_type: AppType, _owner: Caller) {}
        fn on_focus_abandoned(&self, _app_type: AppType, _owner: Caller) {}
    }

    #[test]
    fn remove_matches_by_identity() {
        let a: Arc<dyn OwnershipObserver> = Arc::new(Nop);
        let b: Arc<dyn OwnershipObserver> = Arc::new(Nop);
        let mut list = ObserverList::default();
        list.add(a.clone());
        list.add(b.clone());
        assert!(list.remove(&a));
        assert!(!list.remove(&a));
        assert_eq!(list.len(), 1);
        assert!(same_observer(&list.snapshot()[0], &b));
    }
}
