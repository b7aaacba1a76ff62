//! Change notifications
//!
//! The server calls back into a [`ChangeSignal`] whenever something in its
//! object graph changes. Only newly created streams matter here; they raise a
//! single pending flag which the reconciler consumes once it is idle.

use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, info};

use crate::domain::server::{AudioServer, ChangeKind, Facility};

/// Shared "something new appeared" flag.
///
/// Cloned into the server's subscription callback. Both sides live on the
/// thread that drives the connection, so a plain cell suffices.
#[derive(Debug, Clone, Default)]
pub struct ChangeSignal(Rc<Cell<bool>>);

impl ChangeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a subscription event; raises the flag for new streams only
    pub fn notify(&self, facility: Facility, kind: ChangeKind) {
        if kind != ChangeKind::New {
            return;
        }
        if matches!(facility, Facility::SinkInput | Facility::SourceOutput) {
            self.raise();
        }
    }

    pub fn raise(&self) {
        self.0.set(true);
    }

    /// Consume the flag, returning whether it was set
    pub fn take(&self) -> bool {
        self.0.replace(false)
    }
}

/// Owns the subscription and its signal
#[derive(Debug, Default)]
pub struct EventMonitor {
    signal: ChangeSignal,
    subscribed: bool,
}

impl EventMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe on the first call; later calls do nothing
    pub fn ensure_subscribed<S: AudioServer>(&mut self, server: &mut S) {
        if self.subscribed {
            debug!("Already subscribed to stream events");
            return;
        }
        info!("Subscribing to new sink input and source output events");
        server.subscribe(self.signal.clone());
        self.subscribed = true;
    }

    pub fn signal(&self) -> &ChangeSignal {
        &self.signal
    }

    /// Consume a pending signal
    pub fn take_pending(&self) -> bool {
        self.signal.take()
    }
}
