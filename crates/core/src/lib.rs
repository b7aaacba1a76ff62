//! Loopme core
//!
//! Platform-agnostic routing logic: device discovery, stream classification,
//! the bounded move queue and the reconciliation state machine. The audio
//! server itself is reached through the traits in [`domain::server`]; the
//! PulseAudio implementation lives in the `infra` crate.

pub mod domain;

pub use domain::{
    ChangeSignal, Phase, Reconciler, ReconcileError, ReconcileStats, Topology,
};
