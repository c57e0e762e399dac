//! Scenario files and the replay engine.
//!
//! A scenario is a RON list of [`Step`]s. Each connected client gets one
//! [`ClientHandle`] shared by a recording listener and a recording ownership
//! endpoint, so disconnecting it evicts both roles at once.

use std::{collections::HashMap, fmt, fs, path::Path, sync::Arc, time::Duration};

use focus_arbiter::{
    AppType, ArbiterCfg, ArbiterDump, Caller, ClientHandle, FocusArbiter, FocusListener,
    FocusRequest, ForegroundSet, OwnershipCallback, OwnershipObserver, Remote,
    recorder::{Event, RecordingListener, RecordingObserver, RecordingOwner, Transcript},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Uid used when a `Connect` step does not name one.
fn default_uid() -> u32 {
    1000
}

/// A named list of steps.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Label printed in the report.
    #[serde(default)]
    pub name: String,
    /// Steps, replayed in order.
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Parse scenario text; `path` is only used for error reporting.
    pub fn from_ron(text: &str, path: &Path) -> Result<Self> {
        ron::from_str(text).map_err(|e| Error::Scenario {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_ron(&text, path)
    }
}

/// One scenario step.
#[derive(Debug, Clone, Deserialize)]
pub enum Step {
    /// Create a client with the given process identity.
    Connect {
        /// Client name.
        client: String,
        /// Process id.
        pid: u32,
        /// User id.
        #[serde(default = "default_uid")]
        uid: u32,
    },
    /// Classify a pid as foreground or background.
    Foreground {
        /// Process id.
        pid: u32,
        /// New classification.
        foreground: bool,
    },
    /// Subscribe a client to activity changes.
    Listen {
        /// Client name.
        client: String,
        /// Category.
        app_type: AppType,
    },
    /// Drop a subscription.
    Unlisten {
        /// Client name.
        client: String,
        /// Category.
        app_type: AppType,
    },
    /// Request focus, optionally checking the outcome.
    Request {
        /// Client name.
        client: String,
        /// Category.
        app_type: AppType,
        /// Outcome the scenario requires.
        #[serde(default)]
        expect: Option<FocusRequest>,
    },
    /// Abandon focus.
    Abandon {
        /// Client name.
        client: String,
        /// Category.
        app_type: AppType,
    },
    /// Disconnect a client and forget its name.
    Disconnect {
        /// Client name.
        client: String,
    },
    /// Register a local ownership observer.
    Observe {
        /// Observer name.
        name: String,
    },
    /// Unregister a local ownership observer.
    Unobserve {
        /// Observer name.
        name: String,
    },
    /// Wait for the arbiter queues and collect what was delivered.
    Drain,
    /// Drain, then record an arbiter dump.
    Dump,
    /// Reset the arbiter.
    Release,
}

/// One line of a replay report.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entry {
    /// Outcome of a `Request` step.
    Request {
        /// 1-based step number.
        step: usize,
        /// Client name.
        client: String,
        /// Category.
        app_type: AppType,
        /// Outcome.
        result: FocusRequest,
    },
    /// A callback recorded by one of the endpoints.
    Event(Event),
    /// Output of a `Dump` step.
    Dump {
        /// 1-based step number.
        step: usize,
        /// Arbiter state.
        dump: ArbiterDump,
    },
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request {
                step,
                client,
                app_type,
                result,
            } => write!(f, "step {step}: {client} requests {app_type} -> {result:?}"),
            Self::Event(event) => write!(f, "  {event}"),
            Self::Dump { step, dump } => write!(f, "step {step}: dump\n{dump}"),
        }
    }
}

/// Result of replaying a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Scenario label.
    pub scenario: String,
    /// Everything observed, in order.
    pub entries: Vec<Entry>,
}

impl Report {
    /// Recorded callbacks only.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Event(ev) => Some(ev),
            _ => None,
        })
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scenario: {}", self.scenario)?;
        for entry in &self.entries {
            write!(f, "\n{entry}")?;
        }
        Ok(())
    }
}

/// A connected scenario client.
struct SimClient {
    /// Identity captured at connect time.
    caller: Caller,
    /// Listener role.
    listener: Remote<dyn FocusListener>,
    /// Ownership role.
    owner: Remote<dyn OwnershipCallback>,
}

/// Replays scenarios against a fresh arbiter.
pub struct Simulator {
    /// Arbiter under test.
    arbiter: FocusArbiter,
    /// Foreground classification driven by `Foreground` steps.
    foreground: Arc<ForegroundSet>,
    /// Shared by every recorder.
    transcript: Transcript,
    /// Connected clients by name.
    clients: HashMap<String, SimClient>,
    /// Registered observers by name.
    observers: HashMap<String, Arc<dyn OwnershipObserver>>,
    /// Upper bound for each drain.
    drain_timeout: Duration,
    /// Report under construction.
    entries: Vec<Entry>,
}

impl Simulator {
    /// Build a simulator around a new arbiter.
    pub fn new(cfg: ArbiterCfg) -> Result<Self> {
        let foreground = Arc::new(ForegroundSet::new());
        let drain_timeout = cfg.drain_timeout();
        let arbiter = FocusArbiter::new(cfg, foreground.clone())?;
        Ok(Self {
            arbiter,
            foreground,
            transcript: Transcript::new(),
            clients: HashMap::new(),
            observers: HashMap::new(),
            drain_timeout,
            entries: Vec::new(),
        })
    }

    /// Replay every step, then drain once more and return the report.
    pub fn run(mut self, scenario: &Scenario) -> Result<Report> {
        info!(scenario = %scenario.name, steps = scenario.steps.len(), "scenario_started");
        for (i, step) in scenario.steps.iter().enumerate() {
            self.apply(i + 1, step)?;
        }
        self.settle()?;
        info!(scenario = %scenario.name, entries = self.entries.len(), "scenario_finished");
        Ok(Report {
            scenario: scenario.name.clone(),
            entries: self.entries,
        })
    }

    /// Execute one step.
    fn apply(&mut self, step: usize, s: &Step) -> Result<()> {
        debug!(step, ?s, "scenario_step");
        match s {
            Step::Connect { client, pid, uid } => {
                self.connect(step, client, Caller::new(*uid, *pid))?;
            }
            Step::Foreground { pid, foreground } => self.foreground.set(*pid, *foreground),
            Step::Listen { client, app_type } => {
                let c = self.client(step, client)?;
                self.arbiter
                    .register_focus_listener(c.caller, &c.listener, *app_type)?;
            }
            Step::Unlisten { client, app_type } => {
                let c = self.client(step, client)?;
                self.arbiter.unregister_focus_listener(&c.listener, *app_type);
            }
            Step::Request {
                client,
                app_type,
                expect,
            } => {
                let c = self.client(step, client)?;
                let result = self.arbiter.request_app_focus(c.caller, &c.owner, *app_type)?;
                self.entries.push(Entry::Request {
                    step,
                    client: client.clone(),
                    app_type: *app_type,
                    result,
                });
                if let Some(expected) = *expect
                    && expected != result
                {
                    return Err(Error::Expectation {
                        step,
                        app_type: *app_type,
                        expected,
                        actual: result,
                    });
                }
            }
            Step::Abandon { client, app_type } => {
                let c = self.client(step, client)?;
                self.arbiter.abandon_app_focus(&c.owner, *app_type);
            }
            Step::Disconnect { client } => {
                let c = self.clients.remove(client).ok_or_else(|| Error::UnknownClient {
                    step,
                    name: client.clone(),
                })?;
                c.owner.handle().disconnect();
            }
            Step::Observe { name } => {
                if self.observers.contains_key(name) {
                    return Err(Error::DuplicateObserver {
                        step,
                        name: name.clone(),
                    });
                }
                let observer: Arc<dyn OwnershipObserver> =
                    Arc::new(RecordingObserver::new(name, &self.transcript));
                self.arbiter.register_ownership_observer(observer.clone());
                self.observers.insert(name.clone(), observer);
            }
            Step::Unobserve { name } => {
                let observer = self.observers.remove(name).ok_or_else(|| Error::UnknownObserver {
                    step,
                    name: name.clone(),
                })?;
                self.arbiter.unregister_ownership_observer(&observer);
            }
            Step::Drain => self.settle()?,
            Step::Dump => {
                self.settle()?;
                self.entries.push(Entry::Dump {
                    step,
                    dump: self.arbiter.dump(),
                });
            }
            Step::Release => self.arbiter.release(),
        }
        Ok(())
    }

    /// Register a new named client.
    fn connect(&mut self, step: usize, name: &str, caller: Caller) -> Result<()> {
        if self.clients.contains_key(name) {
            return Err(Error::DuplicateClient {
                step,
                name: name.to_string(),
            });
        }
        let handle = ClientHandle::new();
        let listener: Arc<dyn FocusListener> =
            Arc::new(RecordingListener::new(name, &self.transcript));
        let owner: Arc<dyn OwnershipCallback> =
            Arc::new(RecordingOwner::new(name, &self.transcript));
        debug!(client = name, id = %handle.id(), %caller, "scenario_client_connected");
        self.clients.insert(
            name.to_string(),
            SimClient {
                caller,
                listener: Remote::with_handle(handle.clone(), listener),
                owner: Remote::with_handle(handle, owner),
            },
        );
        Ok(())
    }

    /// Look up a connected client.
    fn client(&self, step: usize, name: &str) -> Result<&SimClient> {
        self.clients.get(name).ok_or_else(|| Error::UnknownClient {
            step,
            name: name.to_string(),
        })
    }

    /// Drain the arbiter and move recorded callbacks into the report.
    fn settle(&mut self) -> Result<()> {
        if !self.arbiter.drain(self.drain_timeout) {
            return Err(Error::DrainTimeout(self.drain_timeout));
        }
        self.entries
            .extend(self.transcript.take().into_iter().map(Entry::Event));
        Ok(())
    }
}
