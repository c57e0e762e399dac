//! Shared fixtures for the arbiter integration tests.
#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use focus_arbiter::{
    AppType, ArbiterCfg, Caller, FocusArbiter, FocusListener, ForegroundSet, OwnerCommit,
    OwnershipCallback, OwnershipObserver, Remote,
    recorder::{Event, RecordingListener, RecordingObserver, RecordingOwner, Transcript},
};
use tracing_subscriber::EnvFilter;

pub const NAV: AppType = AppType::NAVIGATION;
pub const VOICE: AppType = AppType::VOICE_COMMAND;

/// Route arbiter logs through the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Arbiter wired to a controllable foreground set and one transcript.
pub struct Harness {
    pub arbiter: FocusArbiter,
    pub fg: Arc<ForegroundSet>,
    pub transcript: Transcript,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_commit(OwnerCommit::Deferred)
    }

    pub fn with_commit(commit: OwnerCommit) -> Self {
        init_tracing();
        let fg = Arc::new(ForegroundSet::new());
        let cfg = ArbiterCfg {
            commit,
            ..ArbiterCfg::default()
        };
        let arbiter = FocusArbiter::new(cfg, fg.clone()).unwrap();
        Self {
            arbiter,
            fg,
            transcript: Transcript::new(),
        }
    }

    pub fn owner(&self, name: &str) -> (Remote<dyn OwnershipCallback>, Arc<RecordingOwner>) {
        let rec = Arc::new(RecordingOwner::new(name, &self.transcript));
        let endpoint: Arc<dyn OwnershipCallback> = rec.clone();
        (Remote::new(endpoint), rec)
    }

    pub fn listener(&self, name: &str) -> (Remote<dyn FocusListener>, Arc<RecordingListener>) {
        let rec = Arc::new(RecordingListener::new(name, &self.transcript));
        let endpoint: Arc<dyn FocusListener> = rec.clone();
        (Remote::new(endpoint), rec)
    }

    pub fn observer(&self, name: &str) -> Arc<dyn OwnershipObserver> {
        Arc::new(RecordingObserver::new(name, &self.transcript))
    }

    /// Wait for both worker queues to empty.
    pub fn settle(&self) {
        assert!(self.arbiter.drain(Duration::from_secs(5)), "arbiter did not drain");
    }

    /// Settle, then take everything recorded so far.
    pub fn take(&self) -> Vec<Event> {
        self.settle();
        self.transcript.take()
    }
}

pub fn caller(pid: u32) -> Caller {
    Caller::new(1000, pid)
}

pub fn granted(owner: &str, app_type: AppType) -> Event {
    Event::Granted {
        owner: owner.into(),
        app_type,
    }
}

pub fn lost(owner: &str, app_type: AppType) -> Event {
    Event::Lost {
        owner: owner.into(),
        app_type,
    }
}

pub fn changed(listener: &str, app_type: AppType, active: bool) -> Event {
    Event::FocusChanged {
        listener: listener.into(),
        app_type,
        active,
    }
}

pub fn acquired(observer: &str, app_type: AppType, pid: u32) -> Event {
    Event::Acquired {
        observer: observer.into(),
        app_type,
        caller: caller(pid),
    }
}

pub fn abandoned(observer: &str, app_type: AppType, pid: u32) -> Event {
    Event::Abandoned {
        observer: observer.into(),
        app_type,
        caller: caller(pid),
    }
}
