use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use libpulse_binding::context::introspect::Introspector;
use libpulse_binding::context::subscribe::{Facility as PaFacility, InterestMaskSet, Operation as PaChange};
use libpulse_binding::context::{Context, FlagSet as ContextFlagSet};
use libpulse_binding::error::PAErr;
use libpulse_binding::mainloop::standard::Mainloop;
use tracing::{debug, info, warn};

use loopme_core::domain::server::Result;
use loopme_core::domain::{
    AudioServer, ChangeSignal, ConnectionState, DeviceEntry, DeviceKind, Index, PropertyKeys,
    ServerError, StreamEntry, StreamKind,
};

use super::convert::{change_kind, connection_state, device_entry, facility, mainloop_timeout, stream_entry};
use super::ops::{collect, Collected, Probe, PulseListing, PulseMove};

fn mainloop_error(err: PAErr) -> ServerError {
    ServerError::Mainloop(format!("{}", err))
}

/// Connection to a PulseAudio (or pipewire-pulse) server
pub struct PulseServer {
    // Field order matters: the context must go before its mainloop.
    introspector: Introspector,
    context: Context,
    mainloop: Mainloop,
    keys: Rc<PropertyKeys>,
}

impl PulseServer {
    /// Create the mainloop and start connecting to the default server.
    ///
    /// Returns as soon as the connection attempt is under way; readiness is
    /// observed through [`AudioServer::state`].
    pub fn connect(client_name: &str, keys: PropertyKeys) -> Result<Self> {
        let mainloop = Mainloop::new()
            .ok_or_else(|| ServerError::Init("could not create PulseAudio mainloop".to_string()))?;
        let mut context = Context::new(&mainloop, client_name)
            .ok_or_else(|| ServerError::Init("could not create PulseAudio context".to_string()))?;

        context
            .connect(None, ContextFlagSet::NOFLAGS, None)
            .map_err(|e| ServerError::ConnectionRefused(format!("{}", e)))?;
        info!(client = client_name, "Connecting to PulseAudio");

        let introspector = context.introspect();
        Ok(Self {
            introspector,
            context,
            mainloop,
            keys: Rc::new(keys),
        })
    }
}

impl AudioServer for PulseServer {
    type DeviceList = PulseListing<DeviceEntry>;
    type StreamList = PulseListing<StreamEntry>;
    type Move = PulseMove;

    fn state(&self) -> ConnectionState {
        connection_state(self.context.get_state())
    }

    fn list_devices(&mut self, kind: DeviceKind) -> Self::DeviceList {
        let collected = Rc::new(Collected::default());
        let sink = collected.clone();
        let keys = self.keys.clone();

        let probe = match kind {
            DeviceKind::Source => Probe::new(self.introspector.get_source_info_list(move |result| {
                collect(&*sink, result, |info| device_entry(info.index, &info.proplist, &keys))
            })),
            DeviceKind::Sink => Probe::new(self.introspector.get_sink_info_list(move |result| {
                collect(&*sink, result, |info| device_entry(info.index, &info.proplist, &keys))
            })),
        };
        PulseListing::new(probe, collected)
    }

    fn list_streams(&mut self, kind: StreamKind) -> Self::StreamList {
        let collected = Rc::new(Collected::default());
        let sink = collected.clone();
        let keys = self.keys.clone();

        let probe = match kind {
            StreamKind::SinkInput => Probe::new(self.introspector.get_sink_input_info_list(move |result| {
                collect(&*sink, result, |info| {
                    stream_entry(info.index, info.sink, &info.proplist, &keys)
                })
            })),
            StreamKind::SourceOutput => {
                Probe::new(self.introspector.get_source_output_info_list(move |result| {
                    collect(&*sink, result, |info| {
                        stream_entry(info.index, info.source, &info.proplist, &keys)
                    })
                }))
            }
        };
        PulseListing::new(probe, collected)
    }

    fn move_stream(&mut self, kind: StreamKind, stream: Index, target: Index) -> Self::Move {
        let succeeded = Rc::new(Cell::new(None));
        let report = succeeded.clone();
        let callback: Box<dyn FnMut(bool)> = Box::new(move |ok: bool| report.set(Some(ok)));

        let op = match kind {
            StreamKind::SinkInput => {
                self.introspector
                    .move_sink_input_by_index(stream, target, Some(callback))
            }
            StreamKind::SourceOutput => {
                self.introspector
                    .move_source_output_by_index(stream, target, Some(callback))
            }
        };
        PulseMove::new(Probe::new(op), succeeded)
    }

    fn subscribe(&mut self, signal: ChangeSignal) {
        let on_event = move |fac: Option<PaFacility>, change: Option<PaChange>, index: u32| {
            if let Some(kind) = change_kind(change) {
                debug!(?fac, ?kind, index, "Server event");
                signal.notify(facility(fac), kind);
            }
        };
        self.context.set_subscribe_callback(Some(Box::new(on_event)));

        let mask = InterestMaskSet::SINK_INPUT | InterestMaskSet::SOURCE_OUTPUT;
        // The subscription stays active after the operation handle is dropped
        self.context.subscribe(mask, |ok| {
            if !ok {
                warn!("Subscribing to stream events failed");
            }
        });
    }

    fn pump(&mut self, timeout: Duration) -> Result<()> {
        self.mainloop
            .prepare(Some(mainloop_timeout(timeout)))
            .map_err(mainloop_error)?;
        self.mainloop.poll().map_err(mainloop_error)?;
        self.mainloop.dispatch().map_err(mainloop_error)?;
        Ok(())
    }
}

impl Drop for PulseServer {
    fn drop(&mut self) {
        debug!("Disconnecting from PulseAudio");
        self.context.disconnect();
    }
}
