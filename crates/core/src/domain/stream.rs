//! Stream classification
//!
//! Decides where every active stream belongs:
//!
//! | stream        | recorder          | anything else     |
//! |---------------|-------------------|-------------------|
//! | sink input    | loopback sink     | real playback     |
//! | source output | real capture      | loopback monitor  |
//!
//! The recorder thus hears what the speaker would play and records the real
//! microphone, while everyone else hears the speaker and captures the loopback.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::device::{Role, Topology};
use crate::domain::moves::{MoveQueue, MoveRequest};
use crate::domain::server::{Index, StreamEntry, StreamKind, INVALID_INDEX};

/// What to do with a stream whose destination role never resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Leave the stream where it is
    #[default]
    Skip,
    /// Issue the move to [`INVALID_INDEX`] and let the server reject it
    Emit,
}

/// Outcome of classifying one enumeration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Plan {
    /// Moves accepted by the queue
    pub queued: usize,
    /// Moves the queue had no room for
    pub dropped: usize,
    /// Misrouted streams left alone because their role is unresolved
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct StreamClassifier {
    recorder_app: String,
    policy: UnresolvedPolicy,
}

impl StreamClassifier {
    pub fn new(recorder_app: impl Into<String>, policy: UnresolvedPolicy) -> Self {
        Self {
            recorder_app: recorder_app.into(),
            policy,
        }
    }

    fn is_recorder(&self, stream: &StreamEntry) -> bool {
        stream.application.as_deref() == Some(self.recorder_app.as_str())
    }

    /// Role of the endpoint `stream` should be attached to
    pub fn desired_role(&self, kind: StreamKind, stream: &StreamEntry) -> Role {
        match (kind, self.is_recorder(stream)) {
            (StreamKind::SinkInput, true) => Role::LoopbackSink,
            (StreamKind::SinkInput, false) => Role::RealPlayback,
            (StreamKind::SourceOutput, true) => Role::RealCapture,
            (StreamKind::SourceOutput, false) => Role::LoopbackMonitor,
        }
    }

    /// Move required for `stream`, if any
    pub fn required_move(
        &self,
        kind: StreamKind,
        stream: &StreamEntry,
        topology: &Topology,
    ) -> Option<MoveRequest> {
        let target = match topology.get(self.desired_role(kind, stream)) {
            Some(index) => index,
            None => match self.policy {
                UnresolvedPolicy::Skip => return None,
                UnresolvedPolicy::Emit => INVALID_INDEX,
            },
        };
        (stream.endpoint != target).then(|| MoveRequest::new(stream.index, target))
    }

    /// Queue a move for every misrouted stream, in enumeration order
    pub fn plan(
        &self,
        kind: StreamKind,
        streams: &[StreamEntry],
        topology: &Topology,
        queue: &mut MoveQueue,
    ) -> Plan {
        let mut plan = Plan::default();

        for stream in streams {
            let role = self.desired_role(kind, stream);
            match self.required_move(kind, stream, topology) {
                Some(request) => {
                    debug!(
                        %kind,
                        stream = stream.index,
                        app = stream.application.as_deref().unwrap_or("?"),
                        from = stream.endpoint,
                        to = request.target,
                        "Stream misrouted"
                    );
                    if queue.enqueue(request) {
                        plan.queued += 1;
                    } else {
                        plan.dropped += 1;
                    }
                }
                None if topology.get(role).is_none() => {
                    debug!(%kind, stream = stream.index, ?role, "No device for role, leaving stream alone");
                    plan.skipped += 1;
                }
                None => {}
            }
        }

        plan
    }
}
