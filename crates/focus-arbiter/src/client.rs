//! Client identity and liveness.
//!
//! A [`ClientHandle`] stands in for the transport-level object that represents
//! one connected remote endpoint. Registries link to it for disconnect
//! notification; the transport calls [`ClientHandle::disconnect`] once the
//! endpoint is permanently unreachable, and every linked [`DeathRecipient`] is
//! told exactly once.

use std::{
    fmt, mem,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

use crate::{Error, Result};

/// Source of unique client ids.
static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one connected remote endpoint.
///
/// Ids are never reused within a process, so equality is identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ClientId(u64);

impl ClientId {
    /// Allocate a fresh id.
    fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Receiver of disconnect notifications.
pub trait DeathRecipient: Send + Sync {
    /// Called at most once per link when the client becomes unreachable.
    ///
    /// May be invoked on any thread.
    fn client_died(&self, id: ClientId);
}

/// A single linked recipient.
struct LinkEntry {
    /// Token used to unlink.
    token: u64,
    /// The recipient; held weakly so the handle never keeps a registry alive.
    recipient: Weak<dyn DeathRecipient>,
}

/// Shared state behind a handle and its clones.
struct HandleInner {
    /// Identity of this endpoint.
    id: ClientId,
    /// Cleared exactly once by `disconnect`.
    alive: AtomicBool,
    /// Next link token.
    next_token: AtomicU64,
    /// Linked recipients.
    links: Mutex<Vec<LinkEntry>>,
}

/// Liveness handle for one remote endpoint.
#[derive(Clone)]
pub struct ClientHandle {
    /// Shared handle state.
    inner: Arc<HandleInner>,
}

impl Default for ClientHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.inner.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl ClientHandle {
    /// Create a handle for a newly connected endpoint.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: ClientId::next(),
                alive: AtomicBool::new(true),
                next_token: AtomicU64::new(0),
                links: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Identity of this endpoint.
    pub fn id(&self) -> ClientId {
        self.inner.id
    }

    /// False once `disconnect` has been called.
    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::Acquire)
    }

    /// Number of recipients currently linked.
    pub fn link_count(&self) -> usize {
        self.inner.links.lock().len()
    }

    /// Link `recipient` for disconnect notification.
    ///
    /// Fails with [`Error::ClientDead`] if the endpoint is already gone and with
    /// [`Error::DuplicateRegistration`] if this recipient is already linked.
    /// Dropping the returned [`DeathLink`] unlinks.
    pub fn link_to_death(&self, recipient: Weak<dyn DeathRecipient>) -> Result<DeathLink> {
        let mut links = self.inner.links.lock();
        if !self.is_alive() {
            return Err(Error::ClientDead(self.id()));
        }
        if links
            .iter()
            .any(|l| Weak::ptr_eq(&l.recipient, &recipient))
        {
            return Err(Error::DuplicateRegistration(self.id()));
        }
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        links.push(LinkEntry { token, recipient });
        trace!(client = %self.id(), token, "link_to_death");
        Ok(DeathLink {
            handle: Arc::downgrade(&self.inner),
            token,
        })
    }

    /// Mark the endpoint unreachable and notify every linked recipient once.
    ///
    /// Repeated calls are no-ops.
    pub fn disconnect(&self) {
        if !self.inner.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        let links = mem::take(&mut *self.inner.links.lock());
        trace!(client = %self.id(), recipients = links.len(), "client_disconnected");
        for link in links {
            if let Some(recipient) = link.recipient.upgrade() {
                recipient.client_died(self.id());
            }
        }
    }
}

/// Registration of one recipient on one handle. Unlinks on drop.
pub struct DeathLink {
    /// The handle this link belongs to.
    handle: Weak<HandleInner>,
    /// Token identifying the entry.
    token: u64,
}

impl fmt::Debug for DeathLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeathLink")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl Drop for DeathLink {
    fn drop(&mut self) {
        if let Some(inner) = self.handle.upgrade() {
            inner.links.lock().retain(|l| l.token != self.token);
        }
    }
}

/// A remote endpoint paired with its liveness handle.
pub struct Remote<T: ?Sized> {
    /// Liveness handle; its id is the endpoint identity.
    handle: ClientHandle,
    /// The endpoint that receives notifications.
    endpoint: Arc<T>,
}

impl<T: ?Sized> Clone for Remote<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Remote<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remote")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> Remote<T> {
    /// Pair `endpoint` with a fresh handle.
    pub fn new(endpoint: Arc<T>) -> Self {
        Self::with_handle(ClientHandle::new(), endpoint)
    }

    /// Pair `endpoint` with an existing handle, e.g. several endpoints of one connection.
    pub fn with_handle(handle: ClientHandle, endpoint: Arc<T>) -> Self {
        Self { handle, endpoint }
    }

    /// Identity of the endpoint.
    pub fn id(&self) -> ClientId {
        self.handle.id()
    }

    /// Liveness handle.
    pub fn handle(&self) -> &ClientHandle {
        &self.handle
    }

    /// The endpoint itself.
    pub fn endpoint(&self) -> &Arc<T> {
        &self.endpoint
    }
}
