//! Event sink for progress, error, and lifecycle notifications.
//!
//! Every user-visible decision the planner or applier takes is posted
//! here before any error return, so UI layers can narrate the outcome.

use std::fmt;
use std::sync::{Arc, Mutex};

/// Notifications emitted by a job session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    AlreadyInstalled {
        origin: String,
        version: String,
    },
    NewPkgVersion,
    MissingDependency {
        origin: String,
    },
    Locked {
        origin: String,
    },
    InstallBegin {
        origin: String,
        version: String,
    },
    InstallFinished {
        origin: String,
        version: String,
    },
    UpgradeBegin {
        origin: String,
        version: String,
        new_version: String,
    },
    UpgradeFinished {
        origin: String,
        version: String,
        new_version: String,
    },
    IntegrityCheckBegin,
    IntegrityCheckFinished,
    CircularDependency,
    Error {
        message: String,
    },
    Errno {
        syscall: String,
        arg: String,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::AlreadyInstalled { origin, version } => {
                write!(f, "{}-{} is already installed", origin, version)
            }
            Event::NewPkgVersion => {
                write!(f, "a newer version of the package manager is available")
            }
            Event::MissingDependency { origin } => {
                write!(f, "missing dependency matching '{}'", origin)
            }
            Event::Locked { origin } => write!(f, "{} is locked", origin),
            Event::InstallBegin { origin, version } => {
                write!(f, "installing {}-{}", origin, version)
            }
            Event::InstallFinished { origin, version } => {
                write!(f, "installed {}-{}", origin, version)
            }
            Event::UpgradeBegin {
                origin,
                version,
                new_version,
            } => write!(f, "upgrading {} from {} to {}", origin, version, new_version),
            Event::UpgradeFinished {
                origin,
                version,
                new_version,
            } => write!(f, "upgraded {} from {} to {}", origin, version, new_version),
            Event::IntegrityCheckBegin => write!(f, "checking integrity"),
            Event::IntegrityCheckFinished => write!(f, "integrity check finished"),
            Event::CircularDependency => {
                write!(f, "error while ordering the jobs, probably a circular dependency")
            }
            Event::Error { message } => write!(f, "{}", message),
            Event::Errno { syscall, arg } => write!(f, "{}({}) failed", syscall, arg),
        }
    }
}

/// Receives events as they happen.
pub trait EventSink {
    fn post(&self, event: &Event);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvents;

impl EventSink for NullEvents {
    fn post(&self, _event: &Event) {}
}

/// Sink forwarding events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEvents;

impl EventSink for LogEvents {
    fn post(&self, event: &Event) {
        match event {
            Event::Error { .. }
            | Event::Errno { .. }
            | Event::MissingDependency { .. }
            | Event::CircularDependency
            | Event::Locked { .. } => log::warn!("{}", event),
            _ => log::info!("{}", event),
        }
    }
}

/// Sink recording every event; clones share the same buffer, so a handle
/// kept by the caller observes what the session posted.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything posted so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &Event) -> bool {
        self.events.lock().unwrap().iter().any(|e| e == event)
    }
}

impl EventSink for EventLog {
    fn post(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}
