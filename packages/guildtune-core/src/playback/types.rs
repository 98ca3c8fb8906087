use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::media::TrackDescriptor;

/// An independently scheduled playback context (one guild's voice presence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A voice channel within an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one stream attempt within an entity.
///
/// Completion notifications carry the id of the attempt they belong to; a
/// notification whose id is no longer current is stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PlaybackId(pub u64);

/// Identifies one utterance job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The track an entity is playing or has paused.
///
/// Never mutated in place: a seek builds a new `CurrentTrack` from the same
/// descriptor and swaps it in.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentTrack {
    pub descriptor: Arc<TrackDescriptor>,
    /// Position the stream was last (re)started from, in seconds.
    pub offset_secs: u64,
}

impl CurrentTrack {
    pub fn new(descriptor: Arc<TrackDescriptor>, offset_secs: u64) -> Self {
        Self {
            descriptor,
            offset_secs,
        }
    }

    /// Builds the replacement for a seek to `offset_secs`.
    pub fn at_offset(&self, offset_secs: u64) -> Self {
        Self::new(Arc::clone(&self.descriptor), offset_secs)
    }
}
