//! Ownership clients: holders (or would-be holders) of exclusive focus.

use std::{collections::BTreeSet, fmt, sync::Arc};

use crate::{AppType, Caller, Result, registry::ClientRegistry};

/// Remote endpoint told when it gains or loses focus.
pub trait OwnershipCallback: Send + Sync {
    /// Focus on `app_type` was granted to this client.
    fn on_ownership_granted(&self, app_type: AppType) -> Result<()>;
    /// Focus on `app_type` was taken away by another client.
    fn on_ownership_lost(&self, app_type: AppType) -> Result<()>;
}

/// Per-client ownership state.
#[derive(Clone)]
pub struct OwnerInfo {
    /// Identity captured when the client first requested focus.
    pub caller: Caller,
    /// App types this client currently owns.
    pub owned: BTreeSet<AppType>,
    /// Delivery target.
    pub endpoint: Arc<dyn OwnershipCallback>,
}

impl OwnerInfo {
    /// New ownership client owning nothing.
    pub fn new(caller: Caller, endpoint: Arc<dyn OwnershipCallback>) -> Self {
        Self {
            caller,
            owned: BTreeSet::new(),
            endpoint,
        }
    }

    /// True when this client owns `app_type`.
    pub fn owns(&self, app_type: AppType) -> bool {
        self.owned.contains(&app_type)
    }
}

impl fmt::Debug for OwnerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerInfo")
            .field("caller", &self.caller)
            .field("owned", &self.owned)
            .finish_non_exhaustive()
    }
}

/// Registry of ownership clients.
pub type OwnershipRegistry = ClientRegistry<OwnerInfo>;
