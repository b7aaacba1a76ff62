//! Integration tests for the reconciler
//!
//! These drive complete passes against the in-memory server: startup routing,
//! streams appearing later, missing devices and configuration loaded from disk.

use std::time::Duration;

use loopme_core::domain::testing::{device, stream, FakeServer, Request};
use loopme_core::domain::{
    AudioServer, ConfigManager, ConnectionState, DeviceTargets, Index, Phase, ReconcileError,
    Reconciler, RoutingConfig, StreamEntry, StreamKind,
};
use proptest::prelude::*;

const POLL: Duration = Duration::from_millis(1);

const LOOPBACK_SINK: Index = 7;
const LOOPBACK_MONITOR: Index = 6;
const REAL_CAPTURE: Index = 2;
const REAL_PLAYBACK: Index = 9;

fn create_studio() -> FakeServer {
    let mut server = FakeServer::new();
    server.sources = vec![
        device(1, Some("snd_hda_intel"), Some("monitor"), None),
        device(REAL_CAPTURE, Some("snd_usb_audio"), Some("sound"), Some("USB-Mic")),
        device(4, Some("snd_aloop"), Some("sound"), Some("Loopback")),
        device(LOOPBACK_MONITOR, Some("snd_aloop"), Some("monitor"), None),
    ];
    server.sinks = vec![
        device(3, Some("snd_hdmi"), Some("sound"), Some("HDMI")),
        device(5, Some("snd_usb_audio"), Some("sound"), Some("Headset")),
        device(LOOPBACK_SINK, Some("snd_aloop"), Some("sound"), Some("Loopback")),
        device(REAL_PLAYBACK, Some("snd_hda_intel"), Some("sound"), Some("PCH")),
    ];
    server
}

fn create_reconciler() -> Reconciler<FakeServer> {
    Reconciler::from_config(DeviceTargets::new("USB-Mic", "PCH"), &RoutingConfig::default())
}

fn settle(rec: &mut Reconciler<FakeServer>, server: &mut FakeServer) {
    for _ in 0..200 {
        rec.tick(server).unwrap();
        if rec.phase() == Phase::Idle && server.in_flight() == 0 {
            return;
        }
        server.pump(POLL).unwrap();
    }
    panic!("reconciler did not settle, stuck in {:?}", rec.phase());
}

fn expected_endpoint(kind: StreamKind, app: Option<&str>) -> Index {
    let recorder = app == Some("OBS");
    match (kind, recorder) {
        (StreamKind::SinkInput, true) => LOOPBACK_SINK,
        (StreamKind::SinkInput, false) => REAL_PLAYBACK,
        (StreamKind::SourceOutput, true) => REAL_CAPTURE,
        (StreamKind::SourceOutput, false) => LOOPBACK_MONITOR,
    }
}

fn assert_routed(server: &FakeServer) {
    for s in &server.sink_inputs {
        assert_eq!(
            s.endpoint,
            expected_endpoint(StreamKind::SinkInput, s.application.as_deref()),
            "sink input {} misrouted",
            s.index
        );
    }
    for s in &server.source_outputs {
        assert_eq!(
            s.endpoint,
            expected_endpoint(StreamKind::SourceOutput, s.application.as_deref()),
            "source output {} misrouted",
            s.index
        );
    }
}

// ============================================================================
// SESSION SCENARIOS
// ============================================================================

#[test]
fn test_streaming_session() {
    let mut server = create_studio();
    server.sink_inputs = vec![stream(20, "OBS", 5), stream(21, "Music", 3)];
    server.source_outputs = vec![stream(30, "OBS", 6), stream(31, "Discord", 2)];
    let mut rec = create_reconciler();

    settle(&mut rec, &mut server);
    assert_routed(&server);
    assert!(server.is_subscribed());
    assert_eq!(server.max_in_flight(), 1);
    assert_eq!(rec.stats().moves_issued, 4);

    // A browser starts playing, then the recorder opens another capture
    server.clear_requests();
    server.spawn_stream(StreamKind::SinkInput, stream(22, "Firefox", LOOPBACK_SINK));
    settle(&mut rec, &mut server);
    server.spawn_stream(StreamKind::SourceOutput, stream(32, "OBS", 1));
    settle(&mut rec, &mut server);

    assert_routed(&server);
    assert_eq!(server.moves(), vec![(22, REAL_PLAYBACK), (32, REAL_CAPTURE)]);
    assert!(!server
        .requests()
        .iter()
        .any(|r| matches!(r, Request::ListDevices(_) | Request::Subscribe)));
    assert_eq!(rec.stats().passes, 3);
}

#[test]
fn test_events_during_pass_trigger_another_pass() {
    let mut server = create_studio();
    server.sink_inputs = vec![stream(20, "Music", 3)];
    let mut rec = create_reconciler();
    settle(&mut rec, &mut server);

    // Stream shows up while the move list is still being fetched
    server.clear_requests();
    server.spawn_stream(StreamKind::SinkInput, stream(21, "OBS", 3));
    rec.tick(&mut server).unwrap();
    assert_eq!(rec.phase(), Phase::AwaitMoveList(StreamKind::SinkInput));
    server.spawn_stream(StreamKind::SinkInput, stream(22, "OBS", 3));
    settle(&mut rec, &mut server);

    assert_routed(&server);
    let listings = server
        .requests()
        .iter()
        .filter(|r| **r == Request::ListStreams(StreamKind::SinkInput))
        .count();
    assert_eq!(listings, 2);
    assert_eq!(rec.stats().passes, 3);
}

#[test]
fn test_missing_loopback_leaves_recorder_alone() {
    let mut server = create_studio();
    server.sources.retain(|d| d.driver.as_deref() != Some("snd_aloop"));
    server.sinks.retain(|d| d.driver.as_deref() != Some("snd_aloop"));
    server.sink_inputs = vec![stream(20, "OBS", 5), stream(21, "Music", 3)];
    server.source_outputs = vec![stream(30, "OBS", 1), stream(31, "Discord", 2)];
    let mut rec = create_reconciler();

    settle(&mut rec, &mut server);
    assert_eq!(rec.topology().loopback_sink, None);
    assert_eq!(rec.topology().loopback_monitor, None);
    assert_eq!(server.moves(), vec![(21, REAL_PLAYBACK), (30, REAL_CAPTURE)]);
    assert_eq!(rec.stats().streams_skipped, 2);
    assert_eq!(rec.stats().moves_failed, 0);
}

#[test]
fn test_duplicate_hardware_id_last_wins() {
    let mut server = create_studio();
    server.sinks.push(device(11, Some("snd_hda_intel"), Some("sound"), Some("PCH")));
    server.sink_inputs = vec![stream(21, "Music", 3)];
    let mut rec = create_reconciler();

    settle(&mut rec, &mut server);
    assert_eq!(rec.topology().real_playback, Some(11));
    assert_eq!(server.moves(), vec![(21, 11)]);
}

#[test]
fn test_connection_lost_mid_pass() {
    let mut server = create_studio();
    server.sink_inputs = vec![stream(20, "OBS", 5)];
    let mut rec = create_reconciler();

    rec.tick(&mut server).unwrap();
    server.pump(POLL).unwrap();
    server.set_state(ConnectionState::Failed);

    let result = rec.tick(&mut server);
    assert!(matches!(result, Err(ReconcileError::ConnectionFailed)));
    assert!(server.moves().is_empty());
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[tokio::test]
async fn test_routing_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    tokio::fs::write(
        &path,
        "[routing]\nrecorder_app = \"SimpleScreenRecorder\"\nunresolved_policy = \"emit\"\n",
    )
    .await
    .unwrap();

    let config = ConfigManager::new(path).load().await;
    assert_eq!(config.app.client_name, "loopme");

    let mut server = create_studio();
    server.sink_inputs = vec![stream(20, "SimpleScreenRecorder", 5), stream(21, "OBS", 3)];
    let mut rec = Reconciler::from_config(DeviceTargets::new("USB-Mic", "PCH"), &config.routing);

    settle(&mut rec, &mut server);
    assert_eq!(server.moves(), vec![(20, LOOPBACK_SINK), (21, REAL_PLAYBACK)]);
}

// ============================================================================
// PROPERTIES
// ============================================================================

fn arb_streams(kind: StreamKind) -> impl Strategy<Value = Vec<StreamEntry>> {
    let endpoints: Vec<Index> = match kind {
        StreamKind::SinkInput => vec![3, 5, LOOPBACK_SINK, REAL_PLAYBACK],
        StreamKind::SourceOutput => vec![1, REAL_CAPTURE, 4, LOOPBACK_MONITOR],
    };
    prop::collection::vec(
        (prop::sample::select(vec!["OBS", "Music", "Discord"]), prop::sample::select(endpoints)),
        0..12,
    )
    .prop_map(|pairs| {
        pairs
            .into_iter()
            .enumerate()
            .map(|(i, (app, endpoint))| stream(100 + i as Index, app, endpoint))
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_single_pass_routes_everything(
        sink_inputs in arb_streams(StreamKind::SinkInput),
        source_outputs in arb_streams(StreamKind::SourceOutput),
    ) {
        let mut server = create_studio();
        server.sink_inputs = sink_inputs;
        server.source_outputs = source_outputs;
        let mut rec = create_reconciler();

        settle(&mut rec, &mut server);
        assert_routed(&server);
        prop_assert!(server.max_in_flight() <= 1);
        prop_assert_eq!(rec.stats().moves_failed, 0);

        server.clear_requests();
        rec.signal().raise();
        settle(&mut rec, &mut server);
        prop_assert!(server.moves().is_empty());
    }
}
