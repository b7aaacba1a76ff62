//! Scripted in-memory audio server for tests
//!
//! Requests are recorded and stay `Running` until the next [`AudioServer::pump`],
//! which completes every outstanding operation at once. Successful moves are
//! applied to the stream tables, so a second pass sees the new routing.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::domain::monitor::ChangeSignal;
use crate::domain::server::{
    AudioServer, ChangeKind, ConnectionState, DeviceEntry, DeviceKind, Facility, Index, Listing,
    OpStatus, Operation, Result, StreamEntry, StreamKind,
};

/// Build a device entry
pub fn device(index: Index, driver: Option<&str>, class: Option<&str>, hardware_id: Option<&str>) -> DeviceEntry {
    DeviceEntry {
        index,
        driver: driver.map(str::to_string),
        class: class.map(str::to_string),
        hardware_id: hardware_id.map(str::to_string),
    }
}

/// Build a stream entry
pub fn stream(index: Index, application: &str, endpoint: Index) -> StreamEntry {
    StreamEntry {
        index,
        application: Some(application.to_string()),
        endpoint,
    }
}

/// Request received by the fake server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    ListDevices(DeviceKind),
    ListStreams(StreamKind),
    Move {
        kind: StreamKind,
        stream: Index,
        target: Index,
    },
    Subscribe,
}

pub struct FakeOp {
    status: Rc<Cell<OpStatus>>,
}

impl Operation for FakeOp {
    fn status(&self) -> OpStatus {
        self.status.get()
    }
}

pub struct FakeListing<T> {
    status: Rc<Cell<OpStatus>>,
    entries: Vec<T>,
}

impl<T> Operation for FakeListing<T> {
    fn status(&self) -> OpStatus {
        self.status.get()
    }
}

impl<T> Listing<T> for FakeListing<T> {
    fn take_entries(&mut self) -> Vec<T> {
        std::mem::take(&mut self.entries)
    }
}

enum Effect {
    Listing { fail: bool },
    Move {
        kind: StreamKind,
        stream: Index,
        target: Index,
    },
}

struct Outstanding {
    status: Rc<Cell<OpStatus>>,
    effect: Effect,
}

#[derive(Default)]
pub struct FakeServer {
    pub state: Option<ConnectionState>,
    pub sources: Vec<DeviceEntry>,
    pub sinks: Vec<DeviceEntry>,
    pub sink_inputs: Vec<StreamEntry>,
    pub source_outputs: Vec<StreamEntry>,
    /// Streams whose moves are refused
    pub reject_moves: Vec<Index>,
    /// Device enumerations report failure (entries are still delivered)
    pub fail_device_lists: bool,
    /// Stream enumerations report failure (entries are still delivered)
    pub fail_stream_lists: bool,
    /// While set, `pump` leaves every operation running
    pub paused: bool,
    requests: Vec<Request>,
    outstanding: Vec<Outstanding>,
    max_in_flight: usize,
    signal: Option<ChangeSignal>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = Some(state);
    }

    /// Every request received, in order
    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// Moves received, as `(stream, target)` pairs
    pub fn moves(&self) -> Vec<(Index, Index)> {
        self.requests
            .iter()
            .filter_map(|r| match r {
                Request::Move { stream, target, .. } => Some((*stream, *target)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_requests(&mut self) {
        self.requests.clear();
    }

    /// Highest number of operations ever outstanding together
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn in_flight(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_subscribed(&self) -> bool {
        self.signal.is_some()
    }

    /// Deliver a subscription event, if subscribed
    pub fn emit(&self, facility: Facility, kind: ChangeKind) {
        if let Some(signal) = &self.signal {
            signal.notify(facility, kind);
        }
    }

    /// Add a stream and announce it
    pub fn spawn_stream(&mut self, kind: StreamKind, entry: StreamEntry) {
        let facility = match kind {
            StreamKind::SinkInput => {
                self.sink_inputs.push(entry);
                Facility::SinkInput
            }
            StreamKind::SourceOutput => {
                self.source_outputs.push(entry);
                Facility::SourceOutput
            }
        };
        self.emit(facility, ChangeKind::New);
    }

    pub fn endpoint_of(&self, kind: StreamKind, stream: Index) -> Option<Index> {
        self.streams(kind)
            .iter()
            .find(|s| s.index == stream)
            .map(|s| s.endpoint)
    }

    fn streams(&self, kind: StreamKind) -> &Vec<StreamEntry> {
        match kind {
            StreamKind::SinkInput => &self.sink_inputs,
            StreamKind::SourceOutput => &self.source_outputs,
        }
    }

    fn devices(&self, kind: DeviceKind) -> &Vec<DeviceEntry> {
        match kind {
            DeviceKind::Source => &self.sources,
            DeviceKind::Sink => &self.sinks,
        }
    }

    fn issue(&mut self, request: Request, effect: Effect) -> Rc<Cell<OpStatus>> {
        self.requests.push(request);
        let status = Rc::new(Cell::new(OpStatus::Running));
        self.outstanding.push(Outstanding {
            status: status.clone(),
            effect,
        });
        self.max_in_flight = self.max_in_flight.max(self.outstanding.len());
        status
    }

    fn apply_move(&mut self, kind: StreamKind, stream: Index, target: Index) -> bool {
        if self.reject_moves.contains(&stream) {
            return false;
        }
        if !self.devices(kind.endpoint()).iter().any(|d| d.index == target) {
            return false;
        }
        let streams = match kind {
            StreamKind::SinkInput => &mut self.sink_inputs,
            StreamKind::SourceOutput => &mut self.source_outputs,
        };
        match streams.iter_mut().find(|s| s.index == stream) {
            Some(entry) => {
                entry.endpoint = target;
                true
            }
            None => false,
        }
    }
}

impl AudioServer for FakeServer {
    type DeviceList = FakeListing<DeviceEntry>;
    type StreamList = FakeListing<StreamEntry>;
    type Move = FakeOp;

    fn state(&self) -> ConnectionState {
        self.state.unwrap_or(ConnectionState::Ready)
    }

    fn list_devices(&mut self, kind: DeviceKind) -> Self::DeviceList {
        let entries = self.devices(kind).clone();
        let fail = self.fail_device_lists;
        let status = self.issue(Request::ListDevices(kind), Effect::Listing { fail });
        FakeListing { status, entries }
    }

    fn list_streams(&mut self, kind: StreamKind) -> Self::StreamList {
        let entries = self.streams(kind).clone();
        let fail = self.fail_stream_lists;
        let status = self.issue(Request::ListStreams(kind), Effect::Listing { fail });
        FakeListing { status, entries }
    }

    fn move_stream(&mut self, kind: StreamKind, stream: Index, target: Index) -> Self::Move {
        let status = self.issue(
            Request::Move { kind, stream, target },
            Effect::Move { kind, stream, target },
        );
        FakeOp { status }
    }

    fn subscribe(&mut self, signal: ChangeSignal) {
        self.requests.push(Request::Subscribe);
        self.signal = Some(signal);
    }

    fn pump(&mut self, _timeout: Duration) -> Result<()> {
        if self.paused {
            return Ok(());
        }
        for op in std::mem::take(&mut self.outstanding) {
            let ok = match op.effect {
                Effect::Listing { fail } => !fail,
                Effect::Move { kind, stream, target } => self.apply_move(kind, stream, target),
            };
            op.status.set(if ok { OpStatus::Done } else { OpStatus::Failed });
        }
        Ok(())
    }
}
