//! Recording endpoints for simulations and tests.
//!
//! Each recorder appends what it receives to a shared [`Transcript`], so a
//! scenario can assert on the global order in which listeners, ownership
//! clients and observers were called.

use std::{
    fmt, mem,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    AppType, Caller, Error, Result, listener::FocusListener, observer::OwnershipObserver,
    owner::OwnershipCallback,
};

/// One recorded callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A listener was told about an activity change.
    FocusChanged {
        /// Recorder name.
        listener: String,
        /// Category.
        app_type: AppType,
        /// New activity state.
        active: bool,
    },
    /// An ownership client was granted focus.
    Granted {
        /// Recorder name.
        owner: String,
        /// Category.
        app_type: AppType,
    },
    /// An ownership client lost focus to another client.
    Lost {
        /// Recorder name.
        owner: String,
        /// Category.
        app_type: AppType,
    },
    /// An observer saw an owner acquire focus.
    Acquired {
        /// Recorder name.
        observer: String,
        /// Category.
        app_type: AppType,
        /// Reported owner.
        caller: Caller,
    },
    /// An observer saw an owner abandon focus.
    Abandoned {
        /// Recorder name.
        observer: String,
        /// Category.
        app_type: AppType,
        /// Reported owner.
        caller: Caller,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FocusChanged {
                listener,
                app_type,
                active,
            } => write!(f, "{listener}: {app_type} active={active}"),
            Self::Granted { owner, app_type } => write!(f, "{owner}: granted {app_type}"),
            Self::Lost { owner, app_type } => write!(f, "{owner}: lost {app_type}"),
            Self::Acquired {
                observer,
                app_type,
                caller,
            } => write!(f, "{observer}: acquired {app_type} by {caller}"),
            Self::Abandoned {
                observer,
                app_type,
                caller,
            } => write!(f, "{observer}: abandoned {app_type} by {caller}"),
        }
    }
}

/// Shared, ordered log of recorded events.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    /// Events in arrival order.
    events: Arc<Mutex<Vec<Event>>>,
}

impl Transcript {
    /// Empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn push(&self, event: Event) {
        self.events.lock().push(event);
    }

    /// Copy of every event so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Remove and return every event so far.
    pub fn take(&self) -> Vec<Event> {
        mem::take(&mut *self.events.lock())
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

/// Common state of the remote recorders.
#[derive(Debug)]
struct Recorder {
    /// Name written into events.
    name: String,
    /// Destination.
    transcript: Transcript,
    /// When set, deliveries are rejected and not recorded.
    failing: AtomicBool,
}

impl Recorder {
    /// Build a recorder.
    fn new(name: &str, transcript: &Transcript) -> Self {
        Self {
            name: name.to_string(),
            transcript: transcript.clone(),
            failing: AtomicBool::new(false),
        }
    }

    /// Record `event` unless the endpoint is marked unreachable.
    fn record(&self, event: Event) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::delivery(format!("{} is unreachable", self.name)));
        }
        self.transcript.push(event);
        Ok(())
    }
}

/// [`FocusListener`] that records every change it is told about.
#[derive(Debug)]
pub struct RecordingListener {
    /// Shared recorder state.
    inner: Recorder,
}

impl RecordingListener {
    /// Listener named `name` writing into `transcript`.
    pub fn new(name: &str, transcript: &Transcript) -> Self {
        Self {
            inner: Recorder::new(name, transcript),
        }
    }

    /// Make later deliveries fail (`true`) or succeed again (`false`).
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }
}

impl FocusListener for RecordingListener {
    fn on_app_focus_changed(&self, app_type: AppType, active: bool) -> Result<()> {
        self.inner.record(Event::FocusChanged {
            listener: self.inner.name.clone(),
            app_type,
            active,
        })
    }
}

/// [`OwnershipCallback`] that records grants and losses.
#[derive(Debug)]
pub struct RecordingOwner {
    /// Shared recorder state.
    inner: Recorder,
}

impl RecordingOwner {
    /// Ownership client named `name` writing into `transcript`.
    pub fn new(name: &str, transcript: &Transcript) -> Self {
        Self {
            inner: Recorder::new(name, transcript),
        }
    }

    /// Make later deliveries fail (`true`) or succeed again (`false`).
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }
}

impl OwnershipCallback for RecordingOwner {
    fn on_ownership_granted(&self, app_type: AppType) -> Result<()> {
        self.inner.record(Event::Granted {
            owner: self.inner.name.clone(),
            app_type,
        })
    }

    fn on_ownership_lost(&self, app_type: AppType) -> Result<()> {
        self.inner.record(Event::Lost {
            owner: self.inner.name.clone(),
            app_type,
        })
    }
}

/// [`OwnershipObserver`] that records acquisitions and abandons.
#[derive(Debug)]
pub struct RecordingObserver {
    /// Name written into events.
    name: String,
    /// Destination.
    transcript: Transcript,
}

impl RecordingObserver {
    /// Observer named `name` writing into `transcript`.
    pub fn new(name: &str, transcript: &Transcript) -> Self {
        Self {
            name: name.to_string(),
            transcript: transcript.clone(),
        }
    }
}

impl OwnershipObserver for RecordingObserver {
    fn on_focus_acquired(&self, app_type: AppType, owner: Caller) {
        self.transcript.push(Event::Acquired {
            observer: self.name.clone(),
            app_type,
            caller: owner,
        });
    }

    fn on_focus_abandoned(&self, app_type: AppType, owner: Caller) {
        self.transcript.push(Event::Abandoned {
            observer: self.name.clone(),
            app_type,
            caller: owner,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_listener_reports_error_and_records_nothing() {
        let t = Transcript::new();
        let l = RecordingListener::new("l", &t);
        l.set_failing(true);
        assert!(l.on_app_focus_changed(AppType::NAVIGATION, true).is_err());
        assert!(t.is_empty());
        l.set_failing(false);
        l.on_app_focus_changed(AppType::NAVIGATION, true).unwrap();
        let lines: Vec<String> = t.events().iter().map(ToString::to_string).collect();
        assert_eq!(lines, vec!["l: navigation active=true"]);
    }
}
