//! Ordered delivery of remote notifications.

use std::{fmt, sync::Arc, time::Duration};

use tracing::{trace, warn};

use crate::{
    AppType, Result, client::ClientId, listener::FocusListener, owner::OwnershipCallback,
    worker::SerialQueue,
};

/// A notification bound for one remote endpoint.
#[derive(Clone)]
pub enum Notification {
    /// `client` lost focus on `app_type` to another client.
    OwnershipLost {
        /// Target identity.
        client: ClientId,
        /// Target endpoint.
        target: Arc<dyn OwnershipCallback>,
        /// Category lost.
        app_type: AppType,
    },
    /// `client` was granted focus on `app_type`.
    OwnershipGranted {
        /// Target identity.
        client: ClientId,
        /// Target endpoint.
        target: Arc<dyn OwnershipCallback>,
        /// Category granted.
        app_type: AppType,
    },
    /// `app_type` became active or inactive; sent to a subscribed listener.
    ActivityChanged {
        /// Target identity.
        client: ClientId,
        /// Target endpoint.
        target: Arc<dyn FocusListener>,
        /// Category whose activity changed.
        app_type: AppType,
        /// New activity state.
        active: bool,
    },
}

impl Notification {
    /// Stable name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OwnershipLost { .. } => "ownership_lost",
            Self::OwnershipGranted { .. } => "ownership_granted",
            Self::ActivityChanged { .. } => "activity_changed",
        }
    }

    /// Identity of the recipient.
    pub fn client(&self) -> ClientId {
        match self {
            Self::OwnershipLost { client, .. }
            | Self::OwnershipGranted { client, .. }
            | Self::ActivityChanged { client, .. } => *client,
        }
    }

    /// Category the notification concerns.
    pub fn app_type(&self) -> AppType {
        match self {
            Self::OwnershipLost { app_type, .. }
            | Self::OwnershipGranted { app_type, .. }
            | Self::ActivityChanged { app_type, .. } => *app_type,
        }
    }

    /// Call into the remote endpoint.
    pub fn deliver(&self) -> Result<()> {
        match self {
            Self::OwnershipLost {
                target, app_type, ..
            } => target.on_ownership_lost(*app_type),
            Self::OwnershipGranted {
                target, app_type, ..
            } => target.on_ownership_granted(*app_type),
            Self::ActivityChanged {
                target,
                app_type,
                active,
                ..
            } => target.on_app_focus_changed(*app_type, *active),
        }
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Notification");
        d.field("kind", &self.kind())
            .field("client", &self.client())
            .field("app_type", &self.app_type());
        if let Self::ActivityChanged { active, .. } = self {
            d.field("active", active);
        }
        d.finish()
    }
}

/// Delivers notifications to remote endpoints, in order, on one worker thread.
///
/// Delivery is best-effort: failures are logged and dropped, never retried.
/// Cleanup of unreachable clients belongs to the registries' disconnect path.
#[derive(Debug)]
pub struct NotificationDispatcher {
    /// Worker running deliveries.
    queue: SerialQueue,
}

impl NotificationDispatcher {
    /// Spawn the delivery worker.
    pub fn spawn(thread_name: &str) -> Result<Self> {
        Ok(Self {
            queue: SerialQueue::spawn(thread_name)?,
        })
    }

    /// Queue `notification` behind everything already queued.
    pub fn post(&self, notification: Notification) {
        trace!(
            kind = notification.kind(),
            client = %notification.client(),
            app_type = %notification.app_type(),
            "notification_queued"
        );
        let res = self.queue.post(move || {
            if let Err(e) = notification.deliver() {
                warn!(
                    kind = notification.kind(),
                    client = %notification.client(),
                    app_type = %notification.app_type(),
                    error = %e,
                    "notification_dropped"
                );
            }
        });
        if let Err(e) = res {
            warn!(error = %e, "dispatcher_closed");
        }
    }

    /// Wait until everything posted so far has been delivered (or dropped).
    pub fn drain(&self, timeout: Duration) -> bool {
        self.queue.drain(timeout)
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::{Error, client::ClientHandle};

    /// Listener that fails its first delivery.
    #[derive(Default)]
    struct Flaky {
        calls: Mutex<Vec<(AppType, bool)>>,
    }

    impl FocusListener for Flaky {
        fn on_app_focus_changed(&self, app_type: AppType, active: bool) -> Result<()> {
            let mut calls = self.calls.lock();
            calls.push((app_type, active));
            if calls.len() == 1 {
                return Err(Error::delivery("unreachable"));
            }
            Ok(())
        }
    }

    #[test]
    fn failed_delivery_does_not_block_later_jobs() {
        let d = NotificationDispatcher::spawn("test-dispatch").unwrap();
        let target = Arc::new(Flaky::default());
        let client = ClientHandle::new().id();
        for (t, active) in [(1, true), (2, true), (1, false)] {
            d.post(Notification::ActivityChanged {
                client,
                target: target.clone(),
                app_type: AppType(t),
                active,
            });
        }
        assert!(d.drain(Duration::from_secs(2)));
        assert_eq!(
            *target.calls.lock(),
            vec![(AppType(1), true), (AppType(2), true), (AppType(1), false)]
        );
    }
}
