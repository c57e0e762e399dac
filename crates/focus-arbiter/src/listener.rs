//! Focus listeners: clients notified when app types become active or inactive.

use std::{collections::BTreeSet, fmt, sync::Arc};

use crate::{AppType, Caller, Result, registry::ClientRegistry};

/// Remote endpoint told about activity changes.
pub trait FocusListener: Send + Sync {
    /// `app_type` became active (`true`) or inactive (`false`).
    fn on_app_focus_changed(&self, app_type: AppType, active: bool) -> Result<()>;
}

/// Per-client listener state.
#[derive(Clone)]
pub struct ListenerInfo {
    /// Identity captured when the listener first registered.
    pub caller: Caller,
    /// App types the listener wants change notifications for.
    pub app_types: BTreeSet<AppType>,
    /// Delivery target.
    pub endpoint: Arc<dyn FocusListener>,
}

impl ListenerInfo {
    /// New listener with no subscriptions.
    pub fn new(caller: Caller, endpoint: Arc<dyn FocusListener>) -> Self {
        Self {
            caller,
            app_types: BTreeSet::new(),
            endpoint,
        }
    }

    /// True when subscribed to `app_type`.
    pub fn wants(&self, app_type: AppType) -> bool {
        self.app_types.contains(&app_type)
    }
}

impl fmt::Debug for ListenerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerInfo")
            .field("caller", &self.caller)
            .field("app_types", &self.app_types)
            .finish_non_exhaustive()
    }
}

/// Registry of focus listeners.
pub type ListenerRegistry = ClientRegistry<ListenerInfo>;
