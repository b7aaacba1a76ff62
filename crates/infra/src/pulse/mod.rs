//! PulseAudio backend
//!
//! Talks to the sound server through libpulse's standard mainloop, which is
//! polled from the reconciler's own thread. Works against PulseAudio itself
//! and against `pipewire-pulse`.
//!
//! - `server`: connection, requests, subscription
//! - `ops`: pollable handles for introspection operations
//! - `convert`: mapping libpulse enums onto domain types

mod convert;
mod ops;
mod server;

pub use server::PulseServer;
