//! Audio server abstractions
//!
//! The reconciler never talks to a sound server directly. It issues requests
//! through [`AudioServer`] and polls the returned operation handles; a concrete
//! backend (PulseAudio in the `infra` crate, [`FakeServer`] in tests) decides how
//! those requests travel.
//!
//! [`FakeServer`]: crate::domain::testing::FakeServer

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::domain::monitor::ChangeSignal;

/// Server-assigned object index (device, stream).
pub type Index = u32;

/// Index the server treats as "no such object". Moves aimed at it are rejected.
pub const INVALID_INDEX: Index = u32::MAX;

/// Errors raised by an audio server backend
#[derive(Debug, Error)]
pub enum ServerError {
    /// The connection could not be established
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// The event loop reported an error while polling
    #[error("Mainloop error: {0}")]
    Mainloop(String),

    /// Backend could not be initialised
    #[error("Initialisation failed: {0}")]
    Init(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Connection lifecycle as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Ready,
    Failed,
    Terminated,
}

impl ConnectionState {
    /// The connection is gone for good
    pub fn is_final(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Terminated)
    }
}

/// Progress of an asynchronous server operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    Running,
    Done,
    Failed,
}

/// Device direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Capture endpoints (including sink monitors)
    Source,
    /// Playback endpoints
    Sink,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Source => write!(f, "source"),
            DeviceKind::Sink => write!(f, "sink"),
        }
    }
}

/// Stream direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Playback stream, attached to a sink
    SinkInput,
    /// Capture stream, attached to a source
    SourceOutput,
}

impl StreamKind {
    /// Kind of endpoint this stream attaches to
    pub fn endpoint(self) -> DeviceKind {
        match self {
            StreamKind::SinkInput => DeviceKind::Sink,
            StreamKind::SourceOutput => DeviceKind::Source,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::SinkInput => write!(f, "sink input"),
            StreamKind::SourceOutput => write!(f, "source output"),
        }
    }
}

/// One device as reported by an enumeration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceEntry {
    pub index: Index,
    /// Kernel driver attribute, e.g. `snd_aloop`
    pub driver: Option<String>,
    /// Device class attribute, e.g. `sound` or `monitor`
    pub class: Option<String>,
    /// Hardware identifier attribute
    pub hardware_id: Option<String>,
}

/// One active stream as reported by an enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub index: Index,
    /// Application name attribute
    pub application: Option<String>,
    /// Endpoint the stream is currently attached to
    pub endpoint: Index,
}

/// Facility of a subscription event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facility {
    Sink,
    Source,
    SinkInput,
    SourceOutput,
    Other,
}

/// What happened to the object named by a subscription event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    New,
    Changed,
    Removed,
}

/// Handle to an operation in flight
pub trait Operation {
    fn status(&self) -> OpStatus;
}

/// Enumeration in flight; yields its entries once finished
pub trait Listing<T>: Operation {
    /// Take every entry received so far
    fn take_entries(&mut self) -> Vec<T>;
}

/// Asynchronous request/callback surface of an audio server
///
/// Every request returns immediately with a handle; completion is observed by
/// polling the handle after [`AudioServer::pump`] has let the connection make
/// progress.
pub trait AudioServer {
    type DeviceList: Listing<DeviceEntry>;
    type StreamList: Listing<StreamEntry>;
    type Move: Operation;

    /// Current connection state
    fn state(&self) -> ConnectionState;

    /// Start enumerating sources or sinks
    fn list_devices(&mut self, kind: DeviceKind) -> Self::DeviceList;

    /// Start enumerating sink inputs or source outputs
    fn list_streams(&mut self, kind: StreamKind) -> Self::StreamList;

    /// Start moving a stream onto another endpoint
    fn move_stream(&mut self, kind: StreamKind, stream: Index, target: Index) -> Self::Move;

    /// Route "new stream" notifications for both stream kinds into `signal`
    fn subscribe(&mut self, signal: ChangeSignal);

    /// Let the connection make progress, waiting at most `timeout`
    fn pump(&mut self, timeout: Duration) -> Result<()>;
}
