//! focus-arbiter: exclusive app-focus arbitration.
//!
//! Remote clients compete for exclusive ownership of app types (navigation,
//! voice command, ...). The [`FocusArbiter`] decides who owns what, tracks
//! which categories are active, and tells three audiences about changes:
//!
//! - focus listeners, remote clients subscribed to activity changes of
//!   particular app types;
//! - ownership clients, told when they gain or lose focus;
//! - local [`OwnershipObserver`]s inside the hosting process.
//!
//! Remote notifications are delivered in order on one dispatch thread and
//! never while arbitration state is locked. Client disconnects (see
//! [`ClientHandle::disconnect`]) release everything the client held.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use focus_arbiter::{
//!     AppType, ArbiterCfg, Caller, FocusArbiter, ForegroundSet, OwnershipCallback, Remote,
//!     recorder::{RecordingOwner, Transcript},
//! };
//!
//! let arbiter = FocusArbiter::new(ArbiterCfg::default(), Arc::new(ForegroundSet::new()))?;
//! let transcript = Transcript::new();
//! let endpoint: Arc<dyn OwnershipCallback> = Arc::new(RecordingOwner::new("nav", &transcript));
//! let owner = Remote::new(endpoint);
//! arbiter.request_app_focus(Caller::new(1000, 42), &owner, AppType::NAVIGATION)?;
//! arbiter.flush();
//! # Ok::<(), focus_arbiter::Error>(())
//! ```

mod arbiter;
mod client;
mod config;
mod dispatch;
mod dump;
mod error;
mod foreground;
mod listener;
mod observer;
mod owner;
pub mod recorder;
mod registry;
mod types;
mod worker;

pub use arbiter::FocusArbiter;
pub use client::{ClientHandle, ClientId, DeathLink, DeathRecipient, Remote};
pub use config::{ArbiterCfg, OwnerCommit};
pub use dispatch::{Notification, NotificationDispatcher};
pub use dump::{ArbiterDump, ClientDump, OwnerEntry};
pub use error::{Error, Result};
pub use foreground::{ForegroundOracle, ForegroundSet};
pub use listener::{FocusListener, ListenerInfo, ListenerRegistry};
pub use observer::OwnershipObserver;
pub use owner::{OwnerInfo, OwnershipCallback, OwnershipRegistry};
pub use registry::{ClientRecord, ClientRegistry, Evictor};
pub use types::{AppType, Caller, FocusRequest};
pub use worker::SerialQueue;
