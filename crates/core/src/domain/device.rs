//! Device discovery and topology resolution
//!
//! Each enumerated source or sink is matched against two kinds of identity:
//! the loopback pair (driver signature plus device class) and the real
//! devices named on the command line (exact hardware identifier). Matches are
//! recorded in a [`Topology`]; when several devices claim the same role the
//! last one enumerated wins.

use std::fmt;
use tracing::debug;

use crate::domain::server::{DeviceEntry, DeviceKind, Index};

/// Device class of the loopback capture endpoint
pub const CLASS_SOUND: &str = "sound";

/// Device class of a sink monitor
pub const CLASS_MONITOR: &str = "monitor";

/// Role a device plays in the routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    RealCapture,
    RealPlayback,
    LoopbackCapture,
    LoopbackMonitor,
    LoopbackSink,
}

/// Hardware identifiers of the physical devices to route through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTargets {
    pub capture_id: String,
    pub playback_id: String,
}

impl DeviceTargets {
    pub fn new(capture_id: impl Into<String>, playback_id: impl Into<String>) -> Self {
        Self {
            capture_id: capture_id.into(),
            playback_id: playback_id.into(),
        }
    }
}

/// Resolved endpoint indices; `None` means no device matched the role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Topology {
    pub real_capture: Option<Index>,
    pub real_playback: Option<Index>,
    pub loopback_capture: Option<Index>,
    pub loopback_monitor: Option<Index>,
    pub loopback_sink: Option<Index>,
}

impl Topology {
    pub fn get(&self, role: Role) -> Option<Index> {
        match role {
            Role::RealCapture => self.real_capture,
            Role::RealPlayback => self.real_playback,
            Role::LoopbackCapture => self.loopback_capture,
            Role::LoopbackMonitor => self.loopback_monitor,
            Role::LoopbackSink => self.loopback_sink,
        }
    }

    fn set(&mut self, role: Role, index: Index) {
        let slot = match role {
            Role::RealCapture => &mut self.real_capture,
            Role::RealPlayback => &mut self.real_playback,
            Role::LoopbackCapture => &mut self.loopback_capture,
            Role::LoopbackMonitor => &mut self.loopback_monitor,
            Role::LoopbackSink => &mut self.loopback_sink,
        };
        *slot = Some(index);
    }
}

struct Slot(Option<Index>);

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(index) => write!(f, "{}", index),
            None => write!(f, "unresolved"),
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "real capture {}, real playback {}, loopback capture {}, loopback monitor {}, loopback sink {}",
            Slot(self.real_capture),
            Slot(self.real_playback),
            Slot(self.loopback_capture),
            Slot(self.loopback_monitor),
            Slot(self.loopback_sink),
        )
    }
}

/// Classifies enumerated devices into routing roles
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    targets: DeviceTargets,
    loopback_driver: String,
    topology: Topology,
}

impl DeviceRegistry {
    pub fn new(targets: DeviceTargets, loopback_driver: impl Into<String>) -> Self {
        Self {
            targets,
            loopback_driver: loopback_driver.into(),
            topology: Topology::default(),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Roles a single device matches. A device may be both a loopback endpoint
    /// and a real one if the hardware id happens to coincide.
    pub fn roles_of(&self, kind: DeviceKind, entry: &DeviceEntry) -> Vec<Role> {
        let mut roles = Vec::with_capacity(2);

        if entry.driver.as_deref() == Some(self.loopback_driver.as_str()) {
            match kind {
                DeviceKind::Sink => roles.push(Role::LoopbackSink),
                DeviceKind::Source => match entry.class.as_deref() {
                    Some(CLASS_SOUND) => roles.push(Role::LoopbackCapture),
                    Some(CLASS_MONITOR) => roles.push(Role::LoopbackMonitor),
                    _ => {}
                },
            }
        }

        let real_id = match kind {
            DeviceKind::Source => &self.targets.capture_id,
            DeviceKind::Sink => &self.targets.playback_id,
        };
        if entry.hardware_id.as_deref() == Some(real_id.as_str()) {
            roles.push(match kind {
                DeviceKind::Source => Role::RealCapture,
                DeviceKind::Sink => Role::RealPlayback,
            });
        }

        roles
    }

    /// Record every role matched by a completed enumeration.
    ///
    /// Returns the number of role assignments made.
    pub fn classify(&mut self, kind: DeviceKind, entries: &[DeviceEntry]) -> usize {
        let mut assigned = 0;
        for entry in entries {
            for role in self.roles_of(kind, entry) {
                if let Some(previous) = self.topology.get(role) {
                    debug!(?role, previous, index = entry.index, "Role matched again, keeping the later device");
                }
                self.topology.set(role, entry.index);
                assigned += 1;
            }
        }
        assigned
    }
}
