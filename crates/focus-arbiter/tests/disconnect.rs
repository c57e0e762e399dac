mod common;

use std::sync::Arc;

use common::*;
use focus_arbiter::{
    AppType, Caller, ClientHandle, Error, FocusArbiter, FocusListener, FocusRequest,
    OwnershipCallback, OwnershipObserver, Remote, recorder::Event,
};
use parking_lot::Mutex;

/// Owner "A" holding {nav, voice}, a listener on both, and an observer.
fn populated() -> (Harness, Remote<dyn OwnershipCallback>) {
    let h = Harness::new();
    let (l, _) = h.listener("L");
    let (a, _) = h.owner("A");
    h.arbiter.register_ownership_observer(h.observer("obs"));
    for t in [NAV, VOICE] {
        h.arbiter.register_focus_listener(caller(10), &l, t).unwrap();
        h.arbiter.request_app_focus(caller(100), &a, t).unwrap();
    }
    h.take();
    (h, a)
}

/// Split a transcript into observer callbacks and remote deliveries; each
/// stream is ordered, but the two interleave freely.
fn split(events: Vec<Event>) -> (Vec<Event>, Vec<Event>) {
    events
        .into_iter()
        .partition(|e| matches!(e, Event::Acquired { .. } | Event::Abandoned { .. }))
}

#[test]
fn disconnect_matches_abandoning_each_type() {
    let (disconnected, a) = populated();
    a.handle().disconnect();
    let by_disconnect = disconnected.take();

    let (abandoned_h, a2) = populated();
    abandoned_h.arbiter.abandon_app_focus(&a2, NAV);
    abandoned_h.arbiter.abandon_app_focus(&a2, VOICE);
    let by_abandon = abandoned_h.take();

    assert_eq!(split(by_disconnect.clone()), split(by_abandon));
    let (observed, delivered) = split(by_disconnect);
    assert_eq!(
        observed,
        vec![abandoned("obs", NAV, 100), abandoned("obs", VOICE, 100)]
    );
    assert_eq!(
        delivered,
        vec![changed("L", NAV, false), changed("L", VOICE, false)]
    );
    assert!(disconnected.arbiter.active_app_types().is_empty());
    assert!(disconnected.arbiter.dump().ownership_clients.is_empty());
    assert_eq!(disconnected.arbiter.focus_owner(NAV), None);
}

#[test]
fn disconnect_is_delivered_once() {
    let (h, a) = populated();
    a.handle().disconnect();
    a.handle().disconnect();
    assert_eq!(h.take().len(), 4);
    assert!(!a.handle().is_alive());
}

#[test]
fn dead_client_cannot_register_again() {
    let (h, a) = populated();
    a.handle().disconnect();
    let err = h.arbiter.request_app_focus(caller(100), &a, NAV).unwrap_err();
    assert!(matches!(err, Error::ClientDead(id) if id == a.id()));
    assert!(!h.arbiter.is_owning_focus(&a, NAV));
}

#[test]
fn disconnect_of_preempted_owner_leaves_new_owner() {
    let h = Harness::new();
    let (a, _) = h.owner("A");
    let (b, _) = h.owner("B");
    h.arbiter.request_app_focus(caller(100), &a, NAV).unwrap();
    h.arbiter.request_app_focus(caller(200), &b, NAV).unwrap();
    h.settle();
    a.handle().disconnect();
    h.settle();
    assert!(h.arbiter.is_owning_focus(&b, NAV));
    assert_eq!(h.arbiter.focus_owner(NAV), Some(caller(200)));
}

#[test]
fn listener_disconnect_drops_subscriptions() {
    let h = Harness::new();
    let (l, _) = h.listener("L");
    let (a, _) = h.owner("A");
    h.arbiter.register_focus_listener(caller(10), &l, NAV).unwrap();
    l.handle().disconnect();
    assert!(h.arbiter.dump().listeners.is_empty());

    h.arbiter.request_app_focus(caller(100), &a, NAV).unwrap();
    assert_eq!(h.take(), vec![granted("A", NAV)]);
}

#[test]
fn shared_connection_evicts_both_roles() {
    let h = Harness::new();
    let conn = ClientHandle::new();
    let (_, l_rec) = h.listener("L");
    let (_, a_rec) = h.owner("A");
    let l_ep: Arc<dyn FocusListener> = l_rec;
    let a_ep: Arc<dyn OwnershipCallback> = a_rec;
    let l = Remote::with_handle(conn.clone(), l_ep);
    let a = Remote::with_handle(conn.clone(), a_ep);
    h.arbiter.register_focus_listener(caller(100), &l, NAV).unwrap();
    h.arbiter.request_app_focus(caller(100), &a, NAV).unwrap();
    assert_eq!(conn.link_count(), 2);

    conn.disconnect();
    h.settle();
    let dump = h.arbiter.dump();
    assert!(dump.listeners.is_empty());
    assert!(dump.ownership_clients.is_empty());
    assert!(dump.active.is_empty());
}

#[test]
fn unregistering_last_type_creates_fresh_record() {
    let h = Harness::new();
    let (l, _) = h.listener("L");
    for t in [NAV, VOICE] {
        h.arbiter.register_focus_listener(caller(10), &l, t).unwrap();
    }
    h.arbiter.unregister_focus_listener(&l, NAV);
    assert_eq!(h.arbiter.dump().listeners[0].app_types, vec![VOICE]);
    h.arbiter.unregister_focus_listener(&l, VOICE);
    assert!(h.arbiter.dump().listeners.is_empty());
    assert_eq!(l.handle().link_count(), 0);

    let t = AppType(7);
    h.arbiter.register_focus_listener(caller(11), &l, t).unwrap();
    let dump = h.arbiter.dump();
    assert_eq!(dump.listeners.len(), 1);
    assert_eq!(dump.listeners[0].app_types, vec![t]);
    assert_eq!(dump.listeners[0].caller, caller(11));

    // Unknown listeners and types are ignored.
    let (stranger, _) = h.listener("S");
    h.arbiter.unregister_focus_listener(&stranger, t);
    h.arbiter.unregister_focus_listener(&l, NAV);
    assert_eq!(h.arbiter.dump().listeners.len(), 1);
}

/// Observer that has a background client request `target` as soon as
/// `trigger` is abandoned.
struct Takeover {
    arbiter: FocusArbiter,
    client: Remote<dyn OwnershipCallback>,
    trigger: AppType,
    target: AppType,
    outcome: Mutex<Option<FocusRequest>>,
}

impl OwnershipObserver for Takeover {
    fn on_focus_acquired(&self, _app_type: AppType, _owner: Caller) {}

    fn on_focus_abandoned(&self, app_type: AppType, _owner: Caller) {
        if app_type == self.trigger {
            let res = self.arbiter.request_app_focus(caller(200), &self.client, self.target);
            *self.outcome.lock() = res.ok();
        }
    }
}

#[test]
fn evicting_foreground_owner_does_not_block_requests() {
    let h = Harness::new();
    let (a, _) = h.owner("A");
    let (b, _) = h.owner("B");
    h.fg.set(100, true);
    for t in [NAV, VOICE] {
        h.arbiter.request_app_focus(caller(100), &a, t).unwrap();
    }
    h.settle();
    let takeover = Arc::new(Takeover {
        arbiter: h.arbiter.clone(),
        client: b.clone(),
        trigger: NAV,
        target: VOICE,
        outcome: Mutex::new(None),
    });
    h.arbiter.register_ownership_observer(takeover.clone());
    h.transcript.take();

    // A is still mid-eviction, holding voice, when B asks for it.
    a.handle().disconnect();
    let events = h.take();

    assert_eq!(*takeover.outcome.lock(), Some(FocusRequest::Granted));
    assert!(!events.contains(&lost("A", VOICE)));
    assert!(events.contains(&granted("B", VOICE)));
    assert!(h.arbiter.is_owning_focus(&b, VOICE));
    assert_eq!(h.arbiter.active_app_types().into_iter().collect::<Vec<_>>(), vec![VOICE]);
    assert_eq!(h.arbiter.focus_owner(VOICE), Some(caller(200)));
    assert_eq!(h.arbiter.focus_owner(NAV), None);
}
