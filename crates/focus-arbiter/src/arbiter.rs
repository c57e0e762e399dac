//! Focus arbitration engine.
//!
//! # Locking
//!
//! - One `parking_lot::Mutex` guards all arbitration state: both client
//!   registries, the committed owners map, the active set and the observer
//!   list.
//! - No remote endpoint or local observer is ever called with that mutex
//!   held. Remote notifications go through the [`NotificationDispatcher`];
//!   observer callbacks run after the state guard is dropped.
//! - Observer delivery is serialized by a re-entrant `delivery` lock that is
//!   always taken before the state mutex. Commits, abandons and observer
//!   replays therefore never interleave, and observers may call back into
//!   the arbiter from their callbacks.
//!
//! # Two-phase owner commit
//!
//! With [`OwnerCommit::Deferred`] a successful request updates the
//! requester's owned set and the active set synchronously, then posts the
//! owners-map commit (and its `on_focus_acquired` echo) to the state-apply
//! queue. Until that queue drains, [`FocusArbiter::is_owning_focus`] already
//! reports the grant while [`FocusArbiter::focus_owner`] may still report
//! the previous owner or none. A deferred commit is dropped if, when it
//! runs, the client no longer holds the category.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, trace, warn};

use crate::{
    AppType, Caller, FocusRequest, Result,
    client::{ClientId, DeathRecipient, Remote},
    config::{ArbiterCfg, OwnerCommit},
    dispatch::{Notification, NotificationDispatcher},
    dump::{ArbiterDump, ClientDump, OwnerEntry},
    foreground::ForegroundOracle,
    listener::{FocusListener, ListenerInfo, ListenerRegistry},
    observer::{ObserverList, OwnershipObserver},
    owner::{OwnerInfo, OwnershipCallback, OwnershipRegistry},
    registry::{ClientRegistry, Evictor},
    worker::SerialQueue,
};

/// Observers to call once the state lock is released.
type Observers = Vec<Arc<dyn OwnershipObserver>>;

/// A committed owners-map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FocusOwner {
    /// Owning client.
    client: ClientId,
    /// Process identity captured when the client registered.
    caller: Caller,
}

/// Everything guarded by the state mutex.
struct ArbiterState {
    /// Focus listeners.
    listeners: ListenerRegistry,
    /// Ownership clients.
    clients: OwnershipRegistry,
    /// Committed owner per category.
    owners: BTreeMap<AppType, FocusOwner>,
    /// Categories currently in use.
    active: BTreeSet<AppType>,
    /// Local ownership observers.
    observers: ObserverList,
}

impl ArbiterState {
    /// The live client other than `except` whose owned set contains `app_type`.
    fn holder_of(
        &self,
        app_type: AppType,
        except: ClientId,
    ) -> Option<(ClientId, Caller, Arc<dyn OwnershipCallback>)> {
        self.clients
            .iter()
            .find(|r| r.id() != except && !r.is_evicting() && r.payload().owns(app_type))
            .map(|r| (r.id(), r.payload().caller, r.payload().endpoint.clone()))
    }

    /// Drop `app_type` from a holder whose eviction is in progress, so its
    /// pending abandon finds nothing to release.
    fn release_evicting(&mut self, app_type: AppType) {
        let dying = self
            .clients
            .iter()
            .find(|r| r.is_evicting() && r.payload().owns(app_type))
            .map(|r| r.id());
        if let Some(record) = dying.and_then(|id| self.clients.get_mut(id)) {
            record.payload_mut().owned.remove(&app_type);
            trace!(%app_type, client = %record.id(), "evicting_holder_released");
        }
    }

    /// Record `owner` for `app_type` if it still holds it.
    ///
    /// Returns the observers to notify, or `None` if nothing changed.
    fn commit_owner(&mut self, app_type: AppType, owner: FocusOwner) -> Option<Observers> {
        let holds = self
            .clients
            .get(owner.client)
            .is_some_and(|r| r.payload().owns(app_type));
        if !holds {
            trace!(%app_type, client = %owner.client, "owner_commit_stale");
            return None;
        }
        if self.owners.get(&app_type) == Some(&owner) {
            return None;
        }
        self.owners.insert(app_type, owner);
        debug!(
            %app_type,
            client = %owner.client,
            uid = owner.caller.uid,
            pid = owner.caller.pid,
            "focus_owner_committed"
        );
        Some(self.observers.snapshot())
    }

    /// Queue an activity change for every listener subscribed to `app_type`.
    fn notify_listeners(
        &self,
        dispatcher: &NotificationDispatcher,
        app_type: AppType,
        active: bool,
    ) {
        for listener in self.listeners.iter().filter(|r| r.payload().wants(app_type)) {
            dispatcher.post(Notification::ActivityChanged {
                client: listener.id(),
                target: listener.payload().endpoint.clone(),
                app_type,
                active,
            });
        }
    }
}

/// State shared by every arbiter handle and by the disconnect evictors.
struct Shared {
    /// Arbitration state.
    state: Mutex<ArbiterState>,
    /// Serializes local observer delivery. Taken before `state`.
    delivery: ReentrantMutex<()>,
    /// Remote notification worker.
    dispatcher: NotificationDispatcher,
    /// Deferred owner-commit worker.
    apply: SerialQueue,
    /// Foreground classification.
    foreground: Arc<dyn ForegroundOracle>,
    /// Configuration the arbiter was built with.
    cfg: ArbiterCfg,
}

impl Shared {
    /// Commit a deferred owner entry and echo it to observers.
    fn apply_owner(&self, app_type: AppType, owner: FocusOwner) {
        let _delivery = self.delivery.lock();
        let observers = self.state.lock().commit_owner(app_type, owner);
        for observer in observers.unwrap_or_default() {
            observer.on_focus_acquired(app_type, owner.caller);
        }
    }
}

/// Evicts listeners whose client disconnected.
struct ListenerEvictor(Weak<Shared>);

impl Evictor<ListenerInfo> for ListenerEvictor {
    fn with_registry<R>(&self, f: impl FnOnce(&mut ListenerRegistry) -> R) -> Option<R> {
        let shared = self.0.upgrade()?;
        let mut st = shared.state.lock();
        Some(f(&mut st.listeners))
    }

    fn evict(&self, id: ClientId, payload: ListenerInfo) {
        debug!(client = %id, app_types = ?payload.app_types, "focus_listener_disconnected");
    }
}

impl DeathRecipient for ListenerEvictor {
    fn client_died(&self, id: ClientId) {
        self.on_disconnect(id);
    }
}

/// Releases everything an ownership client held when it disconnects.
struct OwnerEvictor(Weak<Shared>);

impl Evictor<OwnerInfo> for OwnerEvictor {
    fn with_registry<R>(&self, f: impl FnOnce(&mut OwnershipRegistry) -> R) -> Option<R> {
        let shared = self.0.upgrade()?;
        let mut st = shared.state.lock();
        Some(f(&mut st.clients))
    }

    fn evict(&self, id: ClientId, payload: OwnerInfo) {
        let Some(shared) = self.0.upgrade() else {
            return;
        };
        debug!(client = %id, owned = ?payload.owned, "focus_owner_disconnected");
        let arbiter = FocusArbiter { shared };
        for app_type in payload.owned {
            arbiter.abandon_client(id, app_type);
        }
    }
}

impl DeathRecipient for OwnerEvictor {
    fn client_died(&self, id: ClientId) {
        self.on_disconnect(id);
    }
}

/// Grants exclusive focus on app types and tells interested parties about it.
///
/// Cheap to clone; all clones share one state. Dropping the last clone stops
/// both worker threads after they finish their queued work.
#[derive(Clone)]
pub struct FocusArbiter {
    /// Shared state.
    shared: Arc<Shared>,
}

impl fmt::Debug for FocusArbiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FocusArbiter")
            .field("cfg", &self.shared.cfg)
            .finish_non_exhaustive()
    }
}

impl FocusArbiter {
    /// Create an arbiter and start its worker threads.
    pub fn new(cfg: ArbiterCfg, foreground: Arc<dyn ForegroundOracle>) -> Result<Self> {
        let dispatcher = NotificationDispatcher::spawn(&cfg.dispatch_thread)?;
        let apply = SerialQueue::spawn(&cfg.apply_thread)?;
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let listener_evictor: Arc<dyn DeathRecipient> =
                Arc::new(ListenerEvictor(weak.clone()));
            let owner_evictor: Arc<dyn DeathRecipient> = Arc::new(OwnerEvictor(weak.clone()));
            Shared {
                state: Mutex::new(ArbiterState {
                    listeners: ClientRegistry::new("listeners", listener_evictor),
                    clients: ClientRegistry::new("owners", owner_evictor),
                    owners: BTreeMap::new(),
                    active: BTreeSet::new(),
                    observers: ObserverList::default(),
                }),
                delivery: ReentrantMutex::new(()),
                dispatcher,
                apply,
                foreground,
                cfg,
            }
        });
        debug!(commit = ?shared.cfg.commit, "focus_arbiter_started");
        Ok(Self { shared })
    }

    /// Configuration the arbiter was built with.
    pub fn config(&self) -> &ArbiterCfg {
        &self.shared.cfg
    }

    /// Subscribe `listener` to activity changes of `app_type`. Idempotent.
    pub fn register_focus_listener(
        &self,
        caller: Caller,
        listener: &Remote<dyn FocusListener>,
        app_type: AppType,
    ) -> Result<()> {
        let mut st = self.shared.state.lock();
        let (record, created) = st.listeners.add_or_get(listener.handle(), || {
            ListenerInfo::new(caller, listener.endpoint().clone())
        })?;
        record.payload_mut().app_types.insert(app_type);
        debug!(client = %listener.id(), %app_type, created, "focus_listener_registered");
        Ok(())
    }

    /// Drop the subscription; a listener left with none is forgotten.
    pub fn unregister_focus_listener(
        &self,
        listener: &Remote<dyn FocusListener>,
        app_type: AppType,
    ) {
        let id = listener.id();
        let mut st = self.shared.state.lock();
        let Some(record) = st.listeners.get_mut(id) else {
            return;
        };
        record.payload_mut().app_types.remove(&app_type);
        let empty = record.payload().app_types.is_empty();
        if empty {
            st.listeners.remove(id);
        }
        debug!(client = %id, %app_type, removed = empty, "focus_listener_unregistered");
    }

    /// Snapshot of the active categories.
    pub fn active_app_types(&self) -> BTreeSet<AppType> {
        self.shared.state.lock().active.clone()
    }

    /// True if `owner` currently owns `app_type`.
    pub fn is_owning_focus(
        &self,
        owner: &Remote<dyn OwnershipCallback>,
        app_type: AppType,
    ) -> bool {
        self.shared
            .state
            .lock()
            .clients
            .get(owner.id())
            .is_some_and(|r| r.payload().owns(app_type))
    }

    /// Committed owner of `app_type`, if any.
    pub fn focus_owner(&self, app_type: AppType) -> Option<Caller> {
        self.shared
            .state
            .lock()
            .owners
            .get(&app_type)
            .map(|o| o.caller)
    }

    /// True if the committed owner of `app_type` is the process `caller`.
    pub fn is_focus_owner(&self, caller: Caller, app_type: AppType) -> bool {
        self.focus_owner(app_type) == Some(caller)
    }

    /// Ask for exclusive focus on `app_type`.
    ///
    /// A current owner in the foreground cannot be displaced by a requester
    /// in the background; the request then fails without changing anything.
    /// Otherwise the previous owner loses focus and the requester gains it.
    pub fn request_app_focus(
        &self,
        caller: Caller,
        owner: &Remote<dyn OwnershipCallback>,
        app_type: AppType,
    ) -> Result<FocusRequest> {
        let shared = &self.shared;
        let immediate = shared.cfg.commit == OwnerCommit::Immediate;
        let _delivery = immediate.then(|| shared.delivery.lock());
        let id = owner.id();

        let (requester, observers) = {
            let mut guard = shared.state.lock();
            let st = &mut *guard;
            let (record, created) = st
                .clients
                .add_or_get(owner.handle(), || OwnerInfo::new(caller, owner.endpoint().clone()))?;
            let requester = record.payload().caller;
            let regrant = record.payload().owns(app_type);
            if !regrant {
                st.release_evicting(app_type);
            }

            if !regrant
                && let Some((prev, prev_caller, prev_endpoint)) = st.holder_of(app_type, id)
            {
                let fg = &shared.foreground;
                if fg.caller_in_foreground(prev_caller) && !fg.caller_in_foreground(requester) {
                    warn!(
                        %app_type,
                        client = %id,
                        owner = %prev,
                        "focus_request_rejected_foreground_owner"
                    );
                    if created {
                        st.clients.remove(id);
                    }
                    return Ok(FocusRequest::Failed);
                }
                if let Some(prev_record) = st.clients.get_mut(prev) {
                    prev_record.payload_mut().owned.remove(&app_type);
                }
                shared.dispatcher.post(Notification::OwnershipLost {
                    client: prev,
                    target: prev_endpoint,
                    app_type,
                });
                debug!(%app_type, from = %prev, to = %id, "focus_preempted");
            }

            let endpoint = match st.clients.get_mut(id) {
                Some(record) => {
                    record.payload_mut().owned.insert(app_type);
                    record.payload().endpoint.clone()
                }
                None => owner.endpoint().clone(),
            };
            shared.dispatcher.post(Notification::OwnershipGranted {
                client: id,
                target: endpoint,
                app_type,
            });
            st.active.insert(app_type);
            st.notify_listeners(&shared.dispatcher, app_type, true);
            debug!(%app_type, client = %id, regrant, "focus_granted");

            let owner_entry = FocusOwner {
                client: id,
                caller: requester,
            };
            let observers = if regrant {
                None
            } else if immediate {
                st.commit_owner(app_type, owner_entry)
            } else {
                self.post_owner_commit(app_type, owner_entry);
                None
            };
            (requester, observers)
        };

        for observer in observers.unwrap_or_default() {
            observer.on_focus_acquired(app_type, requester);
        }
        Ok(FocusRequest::Granted)
    }

    /// Queue the owners-map commit on the state-apply worker.
    fn post_owner_commit(&self, app_type: AppType, owner: FocusOwner) {
        let weak = Arc::downgrade(&self.shared);
        let res = self.shared.apply.post(move || {
            if let Some(shared) = weak.upgrade() {
                shared.apply_owner(app_type, owner);
            }
        });
        if let Err(e) = res {
            warn!(%app_type, error = %e, "owner_commit_not_queued");
        }
    }

    /// Give up focus on `app_type`. No-op unless `owner` holds it.
    pub fn abandon_app_focus(&self, owner: &Remote<dyn OwnershipCallback>, app_type: AppType) {
        self.abandon_client(owner.id(), app_type);
    }

    /// Abandon path shared by explicit calls and disconnect eviction.
    fn abandon_client(&self, id: ClientId, app_type: AppType) {
        let shared = &self.shared;
        let _delivery = shared.delivery.lock();
        let released = {
            let mut guard = shared.state.lock();
            let st = &mut *guard;
            let Some(record) = st.clients.get_mut(id) else {
                trace!(client = %id, %app_type, "abandon_unknown_client");
                return;
            };
            if !st.active.contains(&app_type) || !record.payload().owns(app_type) {
                trace!(client = %id, %app_type, "abandon_not_owner");
                return;
            }
            let caller = record.payload().caller;
            record.payload_mut().owned.remove(&app_type);
            st.active.remove(&app_type);
            let committed = st.owners.remove(&app_type);
            st.notify_listeners(&shared.dispatcher, app_type, false);
            debug!(client = %id, %app_type, "focus_abandoned");
            // Without a committed entry the pending commit goes stale and
            // observers never saw this client acquire.
            committed.map(|prev| (caller, prev.client != id, st.observers.snapshot()))
        };

        if let Some((caller, uncommitted, observers)) = released {
            for observer in observers {
                // The entry still named the previous holder, so this
                // client's acquisition is reported before its abandon.
                if uncommitted {
                    observer.on_focus_acquired(app_type, caller);
                }
                observer.on_focus_abandoned(app_type, caller);
            }
        }
    }

    /// Add a local observer and replay the committed owners to it.
    pub fn register_ownership_observer(&self, observer: Arc<dyn OwnershipObserver>) {
        let _delivery = self.shared.delivery.lock();
        let owners = {
            let mut st = self.shared.state.lock();
            st.observers.add(observer.clone());
            st.owners.clone()
        };
        trace!(replay = owners.len(), "ownership_observer_registered");
        for (app_type, owner) in owners {
            observer.on_focus_acquired(app_type, owner.caller);
        }
    }

    /// Remove a local observer. No callbacks reach it after this returns.
    pub fn unregister_ownership_observer(&self, observer: &Arc<dyn OwnershipObserver>) {
        let _delivery = self.shared.delivery.lock();
        let removed = self.shared.state.lock().observers.remove(observer);
        trace!(removed, "ownership_observer_unregistered");
    }

    /// Diagnostic snapshot of the whole arbiter.
    pub fn dump(&self) -> ArbiterDump {
        let st = self.shared.state.lock();
        let mut ownership_clients: Vec<ClientDump> = st
            .clients
            .snapshot()
            .into_iter()
            .map(|(client, info)| ClientDump {
                client,
                caller: info.caller,
                app_types: info.owned.into_iter().collect(),
            })
            .collect();
        ownership_clients.sort_by_key(|c| c.client);
        let mut listeners: Vec<ClientDump> = st
            .listeners
            .snapshot()
            .into_iter()
            .map(|(client, info)| ClientDump {
                client,
                caller: info.caller,
                app_types: info.app_types.into_iter().collect(),
            })
            .collect();
        listeners.sort_by_key(|c| c.client);
        ArbiterDump {
            active: st.active.iter().copied().collect(),
            owners: st
                .owners
                .iter()
                .map(|(app_type, o)| OwnerEntry {
                    app_type: *app_type,
                    client: o.client,
                    caller: o.caller,
                })
                .collect(),
            ownership_clients,
            listeners,
            observers: st.observers.len(),
        }
    }

    /// Reset all state: forget every client, owner, active type and observer.
    ///
    /// Notifications already queued are still delivered.
    pub fn release(&self) {
        let _delivery = self.shared.delivery.lock();
        let mut st = self.shared.state.lock();
        st.listeners.clear();
        st.clients.clear();
        st.owners.clear();
        st.active.clear();
        st.observers.clear();
        debug!("focus_arbiter_released");
    }

    /// Wait until both workers have processed everything queued so far.
    pub fn drain(&self, timeout: Duration) -> bool {
        self.shared.apply.drain(timeout) && self.shared.dispatcher.drain(timeout)
    }

    /// [`drain`](Self::drain) with the configured timeout.
    pub fn flush(&self) -> bool {
        self.drain(self.shared.cfg.drain_timeout())
    }
}
