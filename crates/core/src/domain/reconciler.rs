//! Reconciliation state machine
//!
//! Drives discovery, classification and move dispatch in a fixed order:
//!
//! ```text
//!  DiscoverSources ─▶ AwaitSources ─▶ DiscoverSinks ─▶ AwaitSinks
//!        ┌──────────────────────────────────────────────────┘
//!        ▼
//!  DiscoverMoves(sink input) ─▶ AwaitMoveList ─▶ DispatchMove ◀─▶ AwaitMove
//!        ┌───────────────────────────────────────────┘ (queue exhausted)
//!        ▼
//!  DiscoverMoves(source output) ─▶ AwaitMoveList ─▶ DispatchMove ◀─▶ AwaitMove
//!        ┌───────────────────────────────────────────┘
//!        ▼
//!  EnsureSubscribed ─▶ Idle ──(new stream)──▶ DiscoverMoves(sink input)
//! ```
//!
//! At most one server operation is outstanding at any time, and the handle of
//! that operation lives inside the state that waits for it. Every transition
//! that does not wait on the server is taken within the same tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::config::RoutingConfig;
use crate::domain::device::{DeviceRegistry, DeviceTargets, Topology};
use crate::domain::monitor::{ChangeSignal, EventMonitor};
use crate::domain::moves::{MoveQueue, MoveRequest};
use crate::domain::server::{
    AudioServer, ConnectionState, DeviceKind, Listing, OpStatus, Operation, ServerError, StreamKind,
};
use crate::domain::stream::StreamClassifier;

/// Reasons the reconciler stops
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Connection to the audio server failed")]
    ConnectionFailed,

    #[error("Connection to the audio server terminated")]
    ConnectionTerminated,

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Position in the phase sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    DiscoverSources,
    AwaitSources,
    DiscoverSinks,
    AwaitSinks,
    DiscoverMoves(StreamKind),
    AwaitMoveList(StreamKind),
    DispatchMove(StreamKind),
    AwaitMove(StreamKind),
    EnsureSubscribed,
    Idle,
}

impl Phase {
    /// Position in the linear sequence, 0 through 13
    pub fn ordinal(self) -> u8 {
        let stream_offset = |kind| match kind {
            StreamKind::SinkInput => 0,
            StreamKind::SourceOutput => 4,
        };
        match self {
            Phase::DiscoverSources => 0,
            Phase::AwaitSources => 1,
            Phase::DiscoverSinks => 2,
            Phase::AwaitSinks => 3,
            Phase::DiscoverMoves(kind) => 4 + stream_offset(kind),
            Phase::AwaitMoveList(kind) => 5 + stream_offset(kind),
            Phase::DispatchMove(kind) => 6 + stream_offset(kind),
            Phase::AwaitMove(kind) => 7 + stream_offset(kind),
            Phase::EnsureSubscribed => 12,
            Phase::Idle => 13,
        }
    }

    /// Whether this phase belongs to device discovery
    pub fn is_device_discovery(self) -> bool {
        self.ordinal() < 4
    }
}

/// Counters kept across passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Passes that reached Idle
    pub passes: u64,
    pub moves_issued: u64,
    pub moves_failed: u64,
    /// Requests lost to queue overflow
    pub requests_dropped: u64,
    /// Misrouted streams left alone because their destination is unresolved
    pub streams_skipped: u64,
}

/// Phase together with the operation it is waiting on
enum State<S: AudioServer> {
    DiscoverSources,
    AwaitSources(S::DeviceList),
    DiscoverSinks,
    AwaitSinks(S::DeviceList),
    DiscoverMoves(StreamKind),
    AwaitMoveList(StreamKind, S::StreamList),
    DispatchMove(StreamKind),
    AwaitMove(StreamKind, MoveRequest, S::Move),
    EnsureSubscribed,
    Idle,
}

impl<S: AudioServer> State<S> {
    fn phase(&self) -> Phase {
        match self {
            State::DiscoverSources => Phase::DiscoverSources,
            State::AwaitSources(_) => Phase::AwaitSources,
            State::DiscoverSinks => Phase::DiscoverSinks,
            State::AwaitSinks(_) => Phase::AwaitSinks,
            State::DiscoverMoves(kind) => Phase::DiscoverMoves(*kind),
            State::AwaitMoveList(kind, _) => Phase::AwaitMoveList(*kind),
            State::DispatchMove(kind) => Phase::DispatchMove(*kind),
            State::AwaitMove(kind, _, _) => Phase::AwaitMove(*kind),
            State::EnsureSubscribed => Phase::EnsureSubscribed,
            State::Idle => Phase::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Evaluate the new state right away
    Continue,
    /// Waiting on the server or on a change signal
    Blocked,
}

/// Owns topology, move queue and phase; driven by the connection loop
pub struct Reconciler<S: AudioServer> {
    registry: DeviceRegistry,
    classifier: StreamClassifier,
    queue: MoveQueue,
    monitor: EventMonitor,
    state: State<S>,
    stats: ReconcileStats,
}

impl<S: AudioServer> Reconciler<S> {
    pub fn new(registry: DeviceRegistry, classifier: StreamClassifier) -> Self {
        Self {
            registry,
            classifier,
            queue: MoveQueue::new(),
            monitor: EventMonitor::new(),
            state: State::DiscoverSources,
            stats: ReconcileStats::default(),
        }
    }

    pub fn from_config(targets: DeviceTargets, routing: &RoutingConfig) -> Self {
        Self::new(
            DeviceRegistry::new(targets, routing.loopback_driver.clone()),
            StreamClassifier::new(routing.recorder_app.clone(), routing.unresolved_policy),
        )
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn topology(&self) -> &Topology {
        self.registry.topology()
    }

    pub fn queue(&self) -> &MoveQueue {
        &self.queue
    }

    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// Signal raised by the subscription; shared with the server
    pub fn signal(&self) -> &ChangeSignal {
        self.monitor.signal()
    }

    /// Advance as far as possible without waiting.
    ///
    /// Does nothing until the connection is ready; fails once it is gone.
    pub fn tick(&mut self, server: &mut S) -> Result<()> {
        match server.state() {
            ConnectionState::Ready => {
                self.drain(server);
                Ok(())
            }
            ConnectionState::Failed => Err(ReconcileError::ConnectionFailed),
            ConnectionState::Terminated => Err(ReconcileError::ConnectionTerminated),
            ConnectionState::Unconnected | ConnectionState::Connecting => Ok(()),
        }
    }

    /// Alternate ticks and connection polls until the connection ends or
    /// `stop` is set.
    pub fn run(&mut self, server: &mut S, poll_interval: Duration, stop: &AtomicBool) -> Result<()> {
        while !stop.load(Ordering::Relaxed) {
            self.tick(server)?;
            server.pump(poll_interval)?;
        }
        info!("Stop requested, leaving reconciliation loop");
        Ok(())
    }

    fn drain(&mut self, server: &mut S) {
        loop {
            let state = std::mem::replace(&mut self.state, State::Idle);
            let before = state.phase();
            let (next, step) = self.transition(state, server);
            if next.phase() != before {
                debug!(from = ?before, to = ?next.phase(), "Phase change");
            }
            self.state = next;
            if step == Step::Blocked {
                break;
            }
        }
    }

    fn transition(&mut self, state: State<S>, server: &mut S) -> (State<S>, Step) {
        match state {
            State::DiscoverSources => {
                info!("Listing sources");
                (State::AwaitSources(server.list_devices(DeviceKind::Source)), Step::Continue)
            }
            State::AwaitSources(op) => match self.finish_devices(DeviceKind::Source, op) {
                Ok(()) => (State::DiscoverSinks, Step::Continue),
                Err(op) => (State::AwaitSources(op), Step::Blocked),
            },
            State::DiscoverSinks => {
                info!("Listing sinks");
                (State::AwaitSinks(server.list_devices(DeviceKind::Sink)), Step::Continue)
            }
            State::AwaitSinks(op) => match self.finish_devices(DeviceKind::Sink, op) {
                Ok(()) => (State::DiscoverMoves(StreamKind::SinkInput), Step::Continue),
                Err(op) => (State::AwaitSinks(op), Step::Blocked),
            },
            State::DiscoverMoves(kind) => {
                info!("Listing {}s", kind);
                self.queue.reset();
                (State::AwaitMoveList(kind, server.list_streams(kind)), Step::Continue)
            }
            State::AwaitMoveList(kind, mut op) => {
                let status = op.status();
                if status == OpStatus::Running {
                    return (State::AwaitMoveList(kind, op), Step::Blocked);
                }
                if status == OpStatus::Failed {
                    warn!("Listing {}s failed, classifying the entries received", kind);
                }
                let streams = op.take_entries();
                let plan = self
                    .classifier
                    .plan(kind, &streams, self.registry.topology(), &mut self.queue);
                self.stats.requests_dropped = self.queue.dropped() as u64;
                self.stats.streams_skipped += plan.skipped as u64;
                if plan.dropped > 0 {
                    warn!(
                        "{} {}s left for the next pass, move queue holds {}",
                        plan.dropped,
                        kind,
                        self.queue.capacity()
                    );
                }
                info!("{} {}s to move", self.queue.len(), kind);
                (State::DispatchMove(kind), Step::Continue)
            }
            State::DispatchMove(kind) => match self.queue.next() {
                Some(request) => {
                    info!(
                        "Moving {} {} to {} {}",
                        kind,
                        request.stream,
                        kind.endpoint(),
                        request.target
                    );
                    self.stats.moves_issued += 1;
                    let op = server.move_stream(kind, request.stream, request.target);
                    (State::AwaitMove(kind, request, op), Step::Continue)
                }
                None => {
                    let next = match kind {
                        StreamKind::SinkInput => State::DiscoverMoves(StreamKind::SourceOutput),
                        StreamKind::SourceOutput => State::EnsureSubscribed,
                    };
                    (next, Step::Continue)
                }
            },
            State::AwaitMove(kind, request, op) => match op.status() {
                OpStatus::Running => (State::AwaitMove(kind, request, op), Step::Blocked),
                status => {
                    if status == OpStatus::Failed {
                        warn!(stream = request.stream, target = request.target, "Failed to move {}", kind);
                        self.stats.moves_failed += 1;
                    }
                    self.queue.complete();
                    (State::DispatchMove(kind), Step::Continue)
                }
            },
            State::EnsureSubscribed => {
                self.monitor.ensure_subscribed(server);
                self.stats.passes += 1;
                info!(
                    passes = self.stats.passes,
                    moves_issued = self.stats.moves_issued,
                    moves_failed = self.stats.moves_failed,
                    requests_dropped = self.stats.requests_dropped,
                    "Routing reconciled, waiting for new streams"
                );
                (State::Idle, Step::Continue)
            }
            State::Idle => {
                if self.monitor.take_pending() {
                    info!("New stream appeared, reconciling");
                    (State::DiscoverMoves(StreamKind::SinkInput), Step::Continue)
                } else {
                    (State::Idle, Step::Blocked)
                }
            }
        }
    }

    /// Classify a finished device enumeration, or hand the operation back
    fn finish_devices(&mut self, kind: DeviceKind, mut op: S::DeviceList) -> std::result::Result<(), S::DeviceList> {
        match op.status() {
            OpStatus::Running => Err(op),
            status => {
                if status == OpStatus::Failed {
                    warn!("Listing {}s failed, classifying the entries received", kind);
                }
                let entries = op.take_entries();
                let assigned = self.registry.classify(kind, &entries);
                debug!(%kind, devices = entries.len(), assigned, "Devices classified");
                info!("Topology after {} discovery: {}", kind, self.registry.topology());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::server::{ChangeKind, Facility, INVALID_INDEX};
    use crate::domain::stream::UnresolvedPolicy;
    use crate::domain::testing::{device, stream, FakeServer, Request};

    const POLL: Duration = Duration::from_millis(1);

    fn server() -> FakeServer {
        let mut server = FakeServer::new();
        server.sources = vec![
            device(1, Some("snd_hda_intel"), Some("monitor"), None),
            device(2, Some("snd_usb_audio"), Some("sound"), Some("USB-Mic")),
            device(4, Some("snd_aloop"), Some("sound"), Some("Loopback")),
            device(6, Some("snd_aloop"), Some("monitor"), None),
        ];
        server.sinks = vec![
            device(3, Some("snd_hdmi"), Some("sound"), Some("HDMI")),
            device(5, Some("snd_usb_audio"), Some("sound"), Some("Headset")),
            device(7, Some("snd_aloop"), Some("sound"), Some("Loopback")),
            device(9, Some("snd_hda_intel"), Some("sound"), Some("PCH")),
        ];
        server
    }

    fn reconciler() -> Reconciler<FakeServer> {
        Reconciler::from_config(DeviceTargets::new("USB-Mic", "PCH"), &RoutingConfig::default())
    }

    fn cycle(rec: &mut Reconciler<FakeServer>, server: &mut FakeServer) {
        rec.tick(server).unwrap();
        server.pump(POLL).unwrap();
    }

    /// Tick and pump until the machine rests in Idle
    fn settle(rec: &mut Reconciler<FakeServer>, server: &mut FakeServer) {
        for _ in 0..100 {
            rec.tick(server).unwrap();
            if rec.phase() == Phase::Idle && server.in_flight() == 0 {
                return;
            }
            server.pump(POLL).unwrap();
        }
        panic!("reconciler did not settle, stuck in {:?}", rec.phase());
    }

    #[test]
    fn test_phase_ordinals() {
        assert_eq!(Phase::DiscoverSources.ordinal(), 0);
        assert_eq!(Phase::AwaitMove(StreamKind::SinkInput).ordinal(), 7);
        assert_eq!(Phase::DiscoverMoves(StreamKind::SourceOutput).ordinal(), 8);
        assert_eq!(Phase::AwaitMove(StreamKind::SourceOutput).ordinal(), 11);
        assert_eq!(Phase::Idle.ordinal(), 13);
        assert!(Phase::AwaitSinks.is_device_discovery());
        assert!(!Phase::DiscoverMoves(StreamKind::SinkInput).is_device_discovery());
    }

    #[test]
    fn test_waits_for_ready_connection() {
        let mut server = server();
        server.set_state(ConnectionState::Connecting);
        let mut rec = reconciler();

        rec.tick(&mut server).unwrap();
        assert!(server.requests().is_empty());
        assert_eq!(rec.phase(), Phase::DiscoverSources);

        server.set_state(ConnectionState::Ready);
        rec.tick(&mut server).unwrap();
        assert_eq!(server.requests(), &[Request::ListDevices(DeviceKind::Source)]);
        assert_eq!(rec.phase(), Phase::AwaitSources);
    }

    #[test]
    fn test_connection_loss_is_fatal() {
        let mut server = server();
        let mut rec = reconciler();

        server.set_state(ConnectionState::Failed);
        assert!(matches!(rec.tick(&mut server), Err(ReconcileError::ConnectionFailed)));

        server.set_state(ConnectionState::Terminated);
        assert!(matches!(rec.tick(&mut server), Err(ReconcileError::ConnectionTerminated)));
    }

    #[test]
    fn test_blocks_while_operation_runs() {
        let mut server = server();
        server.paused = true;
        let mut rec = reconciler();

        for _ in 0..5 {
            cycle(&mut rec, &mut server);
        }
        assert_eq!(rec.phase(), Phase::AwaitSources);
        assert_eq!(server.requests().len(), 1);
    }

    #[test]
    fn test_topology_resolved_before_streams() {
        let mut server = server();
        let mut rec = reconciler();

        cycle(&mut rec, &mut server);
        cycle(&mut rec, &mut server);
        assert_eq!(rec.phase(), Phase::AwaitSinks);
        assert_eq!(rec.topology().real_capture, Some(2));
        assert_eq!(rec.topology().loopback_capture, Some(4));
        assert_eq!(rec.topology().loopback_monitor, Some(6));
        assert_eq!(rec.topology().loopback_sink, None);

        cycle(&mut rec, &mut server);
        assert_eq!(rec.phase(), Phase::AwaitMoveList(StreamKind::SinkInput));
        assert_eq!(rec.topology().loopback_sink, Some(7));
        assert_eq!(rec.topology().real_playback, Some(9));
    }

    #[test]
    fn test_playback_scenario_dispatches_in_order() {
        let mut server = server();
        server.sink_inputs = vec![stream(20, "OBS", 5), stream(21, "Music", 3)];
        let mut rec = reconciler();

        // Sources, sinks, sink input listing
        for _ in 0..3 {
            cycle(&mut rec, &mut server);
        }
        rec.tick(&mut server).unwrap();
        assert_eq!(rec.phase(), Phase::AwaitMove(StreamKind::SinkInput));
        assert_eq!(rec.queue().len(), 2);
        assert_eq!(server.moves(), vec![(20, 7)]);

        server.pump(POLL).unwrap();
        rec.tick(&mut server).unwrap();
        assert_eq!(server.moves(), vec![(20, 7), (21, 9)]);
        assert_eq!(rec.queue().completed(), 1);

        server.pump(POLL).unwrap();
        rec.tick(&mut server).unwrap();
        assert_eq!(rec.phase(), Phase::AwaitMoveList(StreamKind::SourceOutput));
        assert!(rec.queue().is_empty());
        assert_eq!(server.endpoint_of(StreamKind::SinkInput, 20), Some(7));
        assert_eq!(server.endpoint_of(StreamKind::SinkInput, 21), Some(9));
        assert_eq!(server.max_in_flight(), 1);
    }

    #[test]
    fn test_capture_streams_routed() {
        let mut server = server();
        server.source_outputs = vec![stream(30, "OBS", 6), stream(31, "Discord", 2)];
        let mut rec = reconciler();

        settle(&mut rec, &mut server);
        assert_eq!(server.moves(), vec![(30, 2), (31, 6)]);
        assert_eq!(rec.stats().moves_issued, 2);
        assert_eq!(rec.stats().passes, 1);
    }

    #[test]
    fn test_failed_move_is_counted_not_retried() {
        let mut server = server();
        server.sink_inputs = vec![stream(20, "OBS", 5), stream(21, "Music", 3)];
        server.reject_moves = vec![20];
        let mut rec = reconciler();

        settle(&mut rec, &mut server);
        assert_eq!(server.moves(), vec![(20, 7), (21, 9)]);
        assert_eq!(rec.stats().moves_failed, 1);
        assert_eq!(server.endpoint_of(StreamKind::SinkInput, 20), Some(5));
        assert_eq!(server.endpoint_of(StreamKind::SinkInput, 21), Some(9));
    }

    #[test]
    fn test_subscribes_once_and_idles() {
        let mut server = server();
        let mut rec = reconciler();

        settle(&mut rec, &mut server);
        assert!(server.is_subscribed());
        server.clear_requests();

        for _ in 0..10 {
            cycle(&mut rec, &mut server);
        }
        assert!(server.requests().is_empty());
        assert_eq!(rec.phase(), Phase::Idle);

        server.spawn_stream(StreamKind::SinkInput, stream(40, "Music", 3));
        settle(&mut rec, &mut server);
        let subscribes = server
            .requests()
            .iter()
            .filter(|r| **r == Request::Subscribe)
            .count();
        assert_eq!(subscribes, 0);
        assert_eq!(rec.stats().passes, 2);
    }

    #[test]
    fn test_new_stream_skips_device_discovery() {
        let mut server = server();
        let mut rec = reconciler();
        settle(&mut rec, &mut server);
        server.clear_requests();

        server.spawn_stream(StreamKind::SinkInput, stream(40, "OBS", 9));
        rec.tick(&mut server).unwrap();
        assert_eq!(rec.phase(), Phase::AwaitMoveList(StreamKind::SinkInput));
        assert_eq!(server.requests(), &[Request::ListStreams(StreamKind::SinkInput)]);

        settle(&mut rec, &mut server);
        assert!(!server
            .requests()
            .iter()
            .any(|r| matches!(r, Request::ListDevices(_))));
        assert_eq!(server.moves(), vec![(40, 7)]);
    }

    #[test]
    fn test_ignores_unrelated_events() {
        let mut server = server();
        let mut rec = reconciler();
        settle(&mut rec, &mut server);
        server.clear_requests();

        server.emit(Facility::Sink, ChangeKind::New);
        server.emit(Facility::SinkInput, ChangeKind::Removed);
        cycle(&mut rec, &mut server);
        assert!(server.requests().is_empty());
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let mut server = server();
        server.sink_inputs = vec![stream(20, "OBS", 5), stream(21, "Music", 3)];
        server.source_outputs = vec![stream(30, "OBS", 6)];
        let mut rec = reconciler();
        settle(&mut rec, &mut server);
        server.clear_requests();

        rec.signal().raise();
        settle(&mut rec, &mut server);
        assert!(server.moves().is_empty());
    }

    #[test]
    fn test_unresolved_destination_skipped_by_default() {
        let mut server = server();
        server.sinks.retain(|d| d.index != 7);
        server.sink_inputs = vec![stream(20, "OBS", 5)];
        let mut rec = reconciler();

        settle(&mut rec, &mut server);
        assert!(server.moves().is_empty());
        assert_eq!(rec.stats().streams_skipped, 1);
    }

    #[test]
    fn test_unresolved_destination_emitted_and_rejected() {
        let mut server = server();
        server.sinks.retain(|d| d.index != 7);
        server.sink_inputs = vec![stream(20, "OBS", 5)];
        let routing = RoutingConfig {
            unresolved_policy: UnresolvedPolicy::Emit,
            ..RoutingConfig::default()
        };
        let mut rec = Reconciler::from_config(DeviceTargets::new("USB-Mic", "PCH"), &routing);

        settle(&mut rec, &mut server);
        assert_eq!(server.moves(), vec![(20, INVALID_INDEX)]);
        assert_eq!(rec.stats().moves_failed, 1);
    }

    #[test]
    fn test_overflow_processes_accepted_subset() {
        let mut server = server();
        server.sink_inputs = (100..120).map(|i| stream(i, "Music", 3)).collect();
        let mut rec = reconciler();

        settle(&mut rec, &mut server);
        assert_eq!(server.moves().len(), 16);
        assert_eq!(rec.stats().requests_dropped, 4);
        assert_eq!(server.max_in_flight(), 1);

        // The next pass picks up the streams that did not fit
        rec.signal().raise();
        settle(&mut rec, &mut server);
        assert_eq!(server.moves().len(), 20);
    }

    #[test]
    fn test_failed_listing_still_advances() {
        let mut server = server();
        server.sink_inputs = vec![stream(20, "Music", 3)];
        server.fail_stream_lists = true;
        let mut rec = reconciler();

        settle(&mut rec, &mut server);
        assert_eq!(server.moves(), vec![(20, 9)]);
    }

    #[test]
    fn test_failed_source_listing_still_resolves() {
        let mut server = server();
        server.fail_device_lists = true;
        let mut rec = reconciler();

        cycle(&mut rec, &mut server);
        assert_eq!(rec.phase(), Phase::AwaitSources);

        cycle(&mut rec, &mut server);
        assert_eq!(rec.phase(), Phase::AwaitSinks);
        assert_eq!(rec.topology().real_capture, Some(2));
        assert_eq!(rec.topology().loopback_capture, Some(4));
        assert_eq!(rec.topology().loopback_monitor, Some(6));
        assert_eq!(
            server.requests(),
            &[Request::ListDevices(DeviceKind::Source), Request::ListDevices(DeviceKind::Sink)]
        );

        settle(&mut rec, &mut server);
        assert_eq!(rec.topology().loopback_sink, Some(7));
        assert_eq!(rec.topology().real_playback, Some(9));
    }

    #[test]
    fn test_run_stops_on_flag() {
        let mut server = server();
        let mut rec = reconciler();
        let stop = AtomicBool::new(true);

        rec.run(&mut server, POLL, &stop).unwrap();
        assert!(server.requests().is_empty());
    }

    #[test]
    fn test_run_ends_with_connection() {
        let mut server = server();
        server.set_state(ConnectionState::Terminated);
        let mut rec = reconciler();
        let stop = AtomicBool::new(false);

        let result = rec.run(&mut server, POLL, &stop);
        assert!(matches!(result, Err(ReconcileError::ConnectionTerminated)));
    }
}
