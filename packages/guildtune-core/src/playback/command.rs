//! Messages understood by an entity worker.
//!
//! Control actions carry a `oneshot` reply so the caller observes the result
//! of its own transition. Internal notifications (stream completion, retry,
//! utterance hand-off) come from tasks the worker spawned.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;

use super::status::StatusViewRef;
use super::types::{ChannelId, JobId, PlaybackId};
use crate::error::PlaybackResult;
use crate::media::{SpeechArtifact, TrackDescriptor};
use crate::transport::StreamOutcome;

pub(crate) type Reply<T> = oneshot::Sender<PlaybackResult<T>>;

/// Result of an enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueReceipt {
    /// Title of the first track added.
    pub title: String,
    /// Number of tracks added.
    pub added: usize,
    /// 1-based queue position of the first added track, or `None` if it
    /// started playing immediately.
    pub position: Option<usize>,
}

/// Result of a resume request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResumeOutcome {
    /// The track is playing again.
    Resumed,
    /// An announcement is on air; the track resumes when it ends.
    Deferred,
}

/// One utterance handed to the consumption loop.
pub(crate) struct UtteranceGrant {
    pub job: JobId,
    pub artifact: SpeechArtifact,
    pub finished: oneshot::Receiver<StreamOutcome>,
}

pub(crate) enum Command {
    Connect {
        channel: ChannelId,
        reply: Reply<ChannelId>,
    },
    Enqueue {
        descriptors: Vec<Arc<TrackDescriptor>>,
        reply: Reply<EnqueueReceipt>,
    },
    Skip {
        reply: Reply<String>,
    },
    Pause {
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<ResumeOutcome>,
    },
    StopAndClear {
        reply: Reply<usize>,
    },
    Seek {
        delta_secs: i64,
        reply: Reply<u64>,
    },
    Leave {
        reply: Reply<()>,
    },
    QueueSnapshot {
        reply: oneshot::Sender<Vec<String>>,
    },
    AttachView {
        view: StatusViewRef,
        reply: oneshot::Sender<Option<StatusViewRef>>,
    },
    /// Registers a job before synthesis starts; rejected when not connected.
    BeginUtterance {
        job: JobId,
        reply: Reply<()>,
    },
    UtteranceReady {
        job: JobId,
        artifact: SpeechArtifact,
    },
    UtteranceFailed {
        job: JobId,
        error: String,
    },
    /// Sent by the consumption loop; `finished` is the job it just played.
    NextUtterance {
        finished: Option<JobId>,
        reply: oneshot::Sender<Option<UtteranceGrant>>,
    },
    TrackFinished {
        playback: PlaybackId,
        outcome: StreamOutcome,
    },
    RetryAdvance,
}
