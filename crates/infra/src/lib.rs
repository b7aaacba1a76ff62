//! Loopme infrastructure
//!
//! Audio server backends implementing [`loopme_core::domain::AudioServer`].

pub mod pulse;

pub use pulse::PulseServer;
