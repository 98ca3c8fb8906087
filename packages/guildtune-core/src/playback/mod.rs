//! Per-entity sequential playback.
//!
//! - [`PlaybackScheduler`]: entity table and public API
//! - worker: the actor that owns one entity's queue, track and connection
//! - seek: relative seeking by reopening the current track
//! - utterance: synthesized announcements sharing the connection
//! - [`ConnectionArbiter`]: who may stream on the connection right now
//! - [`StatusPublisher`]: revisioned status snapshots

mod arbiter;
mod command;
mod scheduler;
mod seek;
mod status;
mod types;
mod utterance;
mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use arbiter::{ConnectionArbiter, Lease, TrackDemand};
pub use command::{EnqueueReceipt, ResumeOutcome};
pub use scheduler::PlaybackScheduler;
pub use seek::seek_target;
pub use status::{
    controls_for, ControlAction, NowPlaying, PlaybackPhase, StatusPublisher, StatusSnapshot,
    StatusViewRef,
};
pub use types::{ChannelId, CurrentTrack, EntityId, JobId, PlaybackId};
