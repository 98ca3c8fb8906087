//! Event system for status renderers and other observers.
//!
//! This module provides:
//! - [`EventEmitter`] trait for playback components to emit events
//! - [`BroadcastEventBridge`] for fan-out to any number of subscribers
//! - Event types for status views and utterance jobs

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

#[cfg(test)]
pub(crate) use emitter::tests::RecordingEventEmitter;

use serde::Serialize;

use crate::playback::{EntityId, JobId, StatusSnapshot, StatusViewRef};

/// Events broadcast to observers.
///
/// Each category has its own inner event type with specific variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Status view changes for an entity.
    Status(StatusEvent),

    /// Lifecycle of synthesized-speech jobs.
    Utterance(UtteranceEvent),
}

/// Events describing what an entity's status view should show.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StatusEvent {
    /// A transition was committed; re-render from this snapshot.
    Updated {
        /// The snapshot to render.
        snapshot: StatusSnapshot,
    },
    /// A new status surface replaced an older one, which should be removed.
    ViewReplaced {
        entity: EntityId,
        previous: StatusViewRef,
        current: StatusViewRef,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The entity left; its state no longer exists.
    Removed {
        entity: EntityId,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events describing utterance jobs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UtteranceEvent {
    /// Synthesis finished and the artifact joined the utterance queue.
    Queued {
        entity: EntityId,
        job: JobId,
        timestamp: u64,
    },
    /// The artifact started playing on the connection.
    Started {
        entity: EntityId,
        job: JobId,
        timestamp: u64,
    },
    /// Playback of the artifact ended.
    Finished {
        entity: EntityId,
        job: JobId,
        timestamp: u64,
    },
    /// Synthesis or playback failed; the job was dropped.
    Failed {
        entity: EntityId,
        job: JobId,
        error: String,
        timestamp: u64,
    },
    /// The entity left before the job could play.
    Discarded {
        entity: EntityId,
        job: JobId,
        timestamp: u64,
    },
}

impl From<StatusEvent> for BroadcastEvent {
    fn from(event: StatusEvent) -> Self {
        BroadcastEvent::Status(event)
    }
}

impl From<UtteranceEvent> for BroadcastEvent {
    fn from(event: UtteranceEvent) -> Self {
        BroadcastEvent::Utterance(event)
    }
}
