//! Domain entities and routing rules

pub mod config;
pub mod device;
pub mod monitor;
pub mod moves;
pub mod reconciler;
pub mod server;
pub mod stream;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export specific items to avoid ambiguous glob imports
pub use config::{AppConfig, ConfigError, ConfigManager, LoopmeConfig, PropertyKeys, RoutingConfig};
pub use device::{DeviceRegistry, DeviceTargets, Role, Topology};
pub use monitor::{ChangeSignal, EventMonitor};
pub use moves::{MoveQueue, MoveRequest, MOVE_QUEUE_CAPACITY};
pub use reconciler::{Phase, ReconcileError, ReconcileStats, Reconciler};
pub use server::{
    AudioServer, ChangeKind, ConnectionState, DeviceEntry, DeviceKind, Facility, Index, Listing,
    OpStatus, Operation, ServerError, StreamEntry, StreamKind, INVALID_INDEX,
};
pub use stream::{Plan, StreamClassifier, UnresolvedPolicy};
