//! Generic registry of live remote clients.
//!
//! A [`ClientRegistry`] maps a [`ClientId`] to a [`ClientRecord`] holding the
//! client's payload and its death link. The registry is not internally
//! synchronized: the arbiter keeps both of its registries under its single
//! state mutex, and disconnect handling goes through an [`Evictor`] that knows
//! how to reacquire that mutex.
//!
//! Eviction is two-phase so the eviction handler runs with the registry
//! released and may call back into it:
//! 1. `begin_eviction` marks the record and hands out a payload snapshot;
//! 2. the handler runs;
//! 3. `finish_eviction` drops the record (and with it the death link).

use std::{
    collections::{
        HashMap,
        hash_map::{Entry, Values},
    },
    fmt,
    sync::Arc,
};

use tracing::{debug, trace};

use crate::{
    Error, Result,
    client::{ClientHandle, ClientId, DeathLink, DeathRecipient},
};

/// One registered client.
pub struct ClientRecord<K> {
    /// Identity of the client.
    id: ClientId,
    /// Set once a disconnect has been observed for this client.
    evicting: bool,
    /// Keeps the disconnect subscription alive for the record's lifetime.
    _link: DeathLink,
    /// Registry-specific client state.
    payload: K,
}

impl<K> ClientRecord<K> {
    /// Identity of the client.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Registry-specific state.
    pub fn payload(&self) -> &K {
        &self.payload
    }

    /// Mutable registry-specific state.
    pub fn payload_mut(&mut self) -> &mut K {
        &mut self.payload
    }

    /// True while the client's eviction handler is running.
    pub fn is_evicting(&self) -> bool {
        self.evicting
    }
}

impl<K: fmt::Debug> fmt::Debug for ClientRecord<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRecord")
            .field("id", &self.id)
            .field("evicting", &self.evicting)
            .field("payload", &self.payload)
            .finish()
    }
}

/// Identity → record map with disconnect tracking.
pub struct ClientRegistry<K> {
    /// Name used in logs.
    name: &'static str,
    /// Recipient linked to every registered handle.
    recipient: Arc<dyn DeathRecipient>,
    /// Registered clients.
    records: HashMap<ClientId, ClientRecord<K>>,
}

impl<K> ClientRegistry<K> {
    /// Create an empty registry whose clients report disconnects to `recipient`.
    pub fn new(name: &'static str, recipient: Arc<dyn DeathRecipient>) -> Self {
        Self {
            name,
            recipient,
            records: HashMap::new(),
        }
    }

    /// Return the record for `handle`, creating it with `init` if absent.
    ///
    /// The boolean is true when the record was created by this call. A record
    /// that is mid-eviction is not handed out: the client is gone.
    pub fn add_or_get<F>(
        &mut self,
        handle: &ClientHandle,
        init: F,
    ) -> Result<(&mut ClientRecord<K>, bool)>
    where
        F: FnOnce() -> K,
    {
        match self.records.entry(handle.id()) {
            Entry::Occupied(e) => {
                if e.get().evicting {
                    return Err(Error::ClientDead(handle.id()));
                }
                Ok((e.into_mut(), false))
            }
            Entry::Vacant(e) => {
                let link = handle.link_to_death(Arc::downgrade(&self.recipient))?;
                debug!(registry = self.name, client = %handle.id(), "client_registered");
                let record = e.insert(ClientRecord {
                    id: handle.id(),
                    evicting: false,
                    _link: link,
                    payload: init(),
                });
                Ok((record, true))
            }
        }
    }

    /// Look up a record.
    pub fn get(&self, id: ClientId) -> Option<&ClientRecord<K>> {
        self.records.get(&id)
    }

    /// Look up a record mutably.
    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut ClientRecord<K>> {
        self.records.get_mut(&id)
    }

    /// Detach a record. Unknown ids are a no-op.
    pub fn remove(&mut self, id: ClientId) -> Option<ClientRecord<K>> {
        let removed = self.records.remove(&id);
        if removed.is_some() {
            debug!(registry = self.name, client = %id, "client_removed");
        }
        removed
    }

    /// Iterate over live records.
    pub fn iter(&self) -> Values<'_, ClientId, ClientRecord<K>> {
        self.records.values()
    }

    /// Drop every record, unlinking all handles.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Mark `id` as evicting and snapshot its payload.
    ///
    /// Returns `None` for unknown ids and for records already being evicted,
    /// which makes repeated disconnect notifications no-ops.
    pub fn begin_eviction(&mut self, id: ClientId) -> Option<K>
    where
        K: Clone,
    {
        let record = self.records.get_mut(&id)?;
        if record.evicting {
            trace!(registry = self.name, client = %id, "eviction_already_running");
            return None;
        }
        record.evicting = true;
        Some(record.payload.clone())
    }

    /// Drop a record whose eviction handler has completed.
    pub fn finish_eviction(&mut self, id: ClientId) {
        if self.records.get(&id).is_some_and(|r| r.evicting) {
            self.records.remove(&id);
            debug!(registry = self.name, client = %id, "client_evicted");
        }
    }

    /// Point-in-time copy of every record's payload.
    pub fn snapshot(&self) -> Vec<(ClientId, K)>
    where
        K: Clone,
    {
        self.records
            .values()
            .map(|r| (r.id, r.payload.clone()))
            .collect()
    }
}

/// Owner of a registry that reacts to client disconnects.
pub trait Evictor<K: Clone>: Send + Sync {
    /// Run `f` with exclusive access to the registry, or return `None` if it is gone.
    fn with_registry<R>(&self, f: impl FnOnce(&mut ClientRegistry<K>) -> R) -> Option<R>;

    /// Eviction handler. Runs without the registry borrowed.
    fn evict(&self, id: ClientId, payload: K);

    /// Handle a disconnect for `id`: evict at most once, then drop the record.
    fn on_disconnect(&self, id: ClientId) {
        let Some(Some(payload)) = self.with_registry(|r| r.begin_eviction(id)) else {
            return;
        };
        self.evict(id, payload);
        self.with_registry(|r| r.finish_eviction(id));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Weak,
        atomic::{AtomicUsize, Ordering},
    };

    use parking_lot::Mutex;

    use super::*;

    /// Test evictor that records evictions and re-enters the registry from its handler.
    struct Probe {
        registry: Mutex<Option<ClientRegistry<Vec<u32>>>>,
        evicted: Mutex<Vec<(ClientId, Vec<u32>)>>,
        reentries: AtomicUsize,
    }

    impl Evictor<Vec<u32>> for Probe {
        fn with_registry<R>(
            &self,
            f: impl FnOnce(&mut ClientRegistry<Vec<u32>>) -> R,
        ) -> Option<R> {
            self.registry.lock().as_mut().map(f)
        }

        fn evict(&self, id: ClientId, payload: Vec<u32>) {
            // The handler may look the record up again while it runs.
            let seen = self.with_registry(|r| r.get(id).map(|rec| rec.is_evicting()));
            if seen == Some(Some(true)) {
                self.reentries.fetch_add(1, Ordering::SeqCst);
            }
            self.evicted.lock().push((id, payload));
        }
    }

    impl DeathRecipient for Probe {
        fn client_died(&self, id: ClientId) {
            self.on_disconnect(id);
        }
    }

    fn probe() -> Arc<Probe> {
        Arc::new_cyclic(|weak: &Weak<Probe>| {
            let recipient: Arc<dyn DeathRecipient> = Arc::new(Forward(weak.clone()));
            Probe {
                registry: Mutex::new(Some(ClientRegistry::new("probe", recipient))),
                evicted: Mutex::new(Vec::new()),
                reentries: AtomicUsize::new(0),
            }
        })
    }

    /// Forwards disconnects to the probe without a strong cycle.
    struct Forward(Weak<Probe>);

    impl DeathRecipient for Forward {
        fn client_died(&self, id: ClientId) {
            if let Some(p) = self.0.upgrade() {
                p.client_died(id);
            }
        }
    }

    #[test]
    fn add_or_get_returns_existing_record() {
        let p = probe();
        let handle = ClientHandle::new();
        let created = p
            .with_registry(|r| {
                let (rec, created) = r.add_or_get(&handle, Vec::new).unwrap();
                rec.payload_mut().push(1);
                created
            })
            .unwrap();
        assert!(created);
        let (created, payload) = p
            .with_registry(|r| {
                let (rec, created) = r.add_or_get(&handle, Vec::new).unwrap();
                (created, rec.payload().clone())
            })
            .unwrap();
        assert!(!created);
        assert_eq!(payload, vec![1]);
        assert_eq!(handle.link_count(), 1);
    }

    #[test]
    fn evicting_record_is_not_handed_out() {
        let p = probe();
        let handle = ClientHandle::new();
        p.with_registry(|r| r.add_or_get(&handle, || vec![7]).map(|_| ()))
            .unwrap()
            .unwrap();
        assert_eq!(p.with_registry(|r| r.begin_eviction(handle.id())), Some(Some(vec![7])));
        assert_eq!(p.with_registry(|r| r.begin_eviction(handle.id())), Some(None));
        let err = p
            .with_registry(|r| r.add_or_get(&handle, Vec::new).map(|_| ()))
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, Error::ClientDead(_)));
    }

    #[test]
    fn disconnect_evicts_once_and_removes() {
        let p = probe();
        let handle = ClientHandle::new();
        p.with_registry(|r| r.add_or_get(&handle, || vec![4, 5]).map(|_| ()))
            .unwrap()
            .unwrap();

        handle.disconnect();
        handle.disconnect();
        p.on_disconnect(handle.id());

        let evicted = p.evicted.lock().clone();
        assert_eq!(evicted, vec![(handle.id(), vec![4, 5])]);
        assert_eq!(p.reentries.load(Ordering::SeqCst), 1);
        assert_eq!(p.with_registry(|r| r.snapshot()), Some(Vec::new()));
    }

    #[test]
    fn remove_is_idempotent_and_unlinks() {
        let p = probe();
        let handle = ClientHandle::new();
        p.with_registry(|r| r.add_or_get(&handle, Vec::new).map(|_| ()))
            .unwrap()
            .unwrap();
        assert!(p.with_registry(|r| r.remove(handle.id()).is_some()).unwrap());
        assert!(p.with_registry(|r| r.remove(handle.id()).is_none()).unwrap());
        assert_eq!(handle.link_count(), 0);

        handle.disconnect();
        assert!(p.evicted.lock().is_empty());
    }

    #[test]
    fn snapshot_is_not_affected_by_later_mutation() {
        let p = probe();
        let a = ClientHandle::new();
        let b = ClientHandle::new();
        p.with_registry(|r| {
            r.add_or_get(&a, || vec![1]).map(|_| ()).unwrap();
            r.add_or_get(&b, || vec![2]).map(|_| ()).unwrap();
        });
        let snap = p.with_registry(|r| r.snapshot()).unwrap();
        p.with_registry(|r| {
            r.remove(a.id());
            if let Some(rec) = r.get_mut(b.id()) {
                rec.payload_mut().push(3);
            }
        });
        assert_eq!(snap.len(), 2);
        assert!(snap.contains(&(b.id(), vec![2])));
    }

    #[test]
    fn dead_handle_cannot_register() {
        let p = probe();
        let handle = ClientHandle::new();
        handle.disconnect();
        let res = p.with_registry(|r| r.add_or_get(&handle, Vec::new).map(|_| ()));
        assert!(matches!(res, Some(Err(Error::ClientDead(_)))));
    }
}
