//! Diagnostic snapshot of arbiter state.

use std::fmt;

use serde::Serialize;

use crate::{AppType, Caller, client::ClientId};

/// A committed owner entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerEntry {
    /// Owned category.
    pub app_type: AppType,
    /// Owning client.
    pub client: ClientId,
    /// Process identity of the owner.
    pub caller: Caller,
}

/// One registered client and the categories it holds or watches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientDump {
    /// Client identity.
    pub client: ClientId,
    /// Process identity captured at registration.
    pub caller: Caller,
    /// Owned (ownership clients) or subscribed (listeners) categories.
    pub app_types: Vec<AppType>,
}

/// Point-in-time view of the arbiter, sorted for stable output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArbiterDump {
    /// Active categories.
    pub active: Vec<AppType>,
    /// Committed owners.
    pub owners: Vec<OwnerEntry>,
    /// Ownership clients and their owned sets.
    pub ownership_clients: Vec<ClientDump>,
    /// Listeners and their subscriptions.
    pub listeners: Vec<ClientDump>,
    /// Number of local ownership observers.
    pub observers: usize,
}

/// Render a list of app types as `[a, b]`.
fn types(list: &[AppType]) -> String {
    let parts: Vec<String> = list.iter().map(|t| t.0.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

impl fmt::Display for ArbiterDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "**FocusArbiter**")?;
        writeln!(f, "active: {}", types(&self.active))?;
        for o in &self.owners {
            writeln!(f, "owner {}: {} ({})", o.app_type, o.client, o.caller)?;
        }
        for c in &self.ownership_clients {
            writeln!(f, "ownership {} ({}): owns {}", c.client, c.caller, types(&c.app_types))?;
        }
        for c in &self.listeners {
            writeln!(f, "listener {} ({}): wants {}", c.client, c.caller, types(&c.app_types))?;
        }
        write!(f, "observers: {}", self.observers)
    }
}
