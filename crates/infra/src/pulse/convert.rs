use libpulse_binding::context::subscribe::{Facility as PaFacility, Operation as PaChange};
use libpulse_binding::context::State as PaContextState;
use libpulse_binding::operation::State as PaOperationState;
use libpulse_binding::proplist::Proplist;
use libpulse_binding::time::MicroSeconds;
use std::time::Duration;

use loopme_core::domain::{
    ChangeKind, ConnectionState, DeviceEntry, Facility, Index, OpStatus, PropertyKeys, StreamEntry,
};

pub(crate) fn connection_state(state: PaContextState) -> ConnectionState {
    match state {
        PaContextState::Unconnected => ConnectionState::Unconnected,
        PaContextState::Connecting | PaContextState::Authorizing | PaContextState::SettingName => {
            ConnectionState::Connecting
        }
        PaContextState::Ready => ConnectionState::Ready,
        PaContextState::Failed => ConnectionState::Failed,
        PaContextState::Terminated => ConnectionState::Terminated,
    }
}

pub(crate) fn facility(facility: Option<PaFacility>) -> Facility {
    match facility {
        Some(PaFacility::Sink) => Facility::Sink,
        Some(PaFacility::Source) => Facility::Source,
        Some(PaFacility::SinkInput) => Facility::SinkInput,
        Some(PaFacility::SourceOutput) => Facility::SourceOutput,
        _ => Facility::Other,
    }
}

pub(crate) fn change_kind(change: Option<PaChange>) -> Option<ChangeKind> {
    match change? {
        PaChange::New => Some(ChangeKind::New),
        PaChange::Changed => Some(ChangeKind::Changed),
        PaChange::Removed => Some(ChangeKind::Removed),
    }
}

/// Combine the operation state with what its callback reported.
/// `succeeded` is `None` while the callback has not run.
pub(crate) fn op_status(state: PaOperationState, succeeded: Option<bool>) -> OpStatus {
    match state {
        PaOperationState::Running => OpStatus::Running,
        PaOperationState::Done if succeeded != Some(false) => OpStatus::Done,
        PaOperationState::Done | PaOperationState::Cancelled => OpStatus::Failed,
    }
}

/// Poll timeout for the mainloop, which refuses anything above `i32::MAX` microseconds
pub(crate) fn mainloop_timeout(timeout: Duration) -> MicroSeconds {
    let micros = timeout.as_micros().min(i32::MAX as u128);
    MicroSeconds(micros as u64)
}

pub(crate) fn device_entry(index: Index, proplist: &Proplist, keys: &PropertyKeys) -> DeviceEntry {
    DeviceEntry {
        index,
        driver: proplist.get_str(&keys.driver),
        class: proplist.get_str(&keys.class),
        hardware_id: proplist.get_str(&keys.hardware_id),
    }
}

pub(crate) fn stream_entry(index: Index, endpoint: Index, proplist: &Proplist, keys: &PropertyKeys) -> StreamEntry {
    StreamEntry {
        index,
        application: proplist.get_str(&keys.application),
        endpoint,
    }
}
