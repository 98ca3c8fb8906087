//! Status snapshots and their publication.
//!
//! The entity worker builds an immutable [`StatusSnapshot`] after every
//! committed transition and hands it to the [`StatusPublisher`], which stamps
//! a revision and publishes it on a watch channel and to the event emitter.
//! Renderers only ever see whole snapshots, never worker internals.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::types::{ChannelId, CurrentTrack, EntityId};
use crate::events::{EventEmitter, StatusEvent};
use crate::utils::{format_clock, now_millis};

/// Coarse playback state of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackPhase {
    Idle,
    Playing,
    Paused,
    /// Terminal state published by `leave`.
    Disconnected,
}

/// A control a status view may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlAction {
    Pause,
    Resume,
    Skip,
    Stop,
    Queue,
    Rewind,
    Forward,
    Leave,
}

/// Returns the controls that are valid in `phase`.
///
/// `track_controllable` is false while a skip is in flight, when the track
/// can no longer be skipped or seeked.
#[must_use]
pub fn controls_for(
    phase: PlaybackPhase,
    track_controllable: bool,
    connected: bool,
) -> Vec<ControlAction> {
    use ControlAction::*;

    let mut controls = match phase {
        PlaybackPhase::Disconnected => return Vec::new(),
        PlaybackPhase::Playing => vec![Pause],
        PlaybackPhase::Paused => vec![Resume],
        PlaybackPhase::Idle => vec![],
    };
    if phase != PlaybackPhase::Idle && track_controllable {
        controls.push(Skip);
    }
    controls.push(Stop);
    controls.push(Queue);
    if phase != PlaybackPhase::Idle && track_controllable {
        controls.push(Rewind);
        controls.push(Forward);
    }
    if connected {
        controls.push(Leave);
    }
    controls
}

/// Display data for the current track.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    pub title: String,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub offset_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
}

impl From<&CurrentTrack> for NowPlaying {
    fn from(current: &CurrentTrack) -> Self {
        let d = &current.descriptor;
        Self {
            title: d.title.clone(),
            link: d.link().to_string(),
            thumbnail: d.thumbnail.clone(),
            offset_secs: current.offset_secs,
            duration_secs: d.duration_secs,
        }
    }
}

/// Identifiers of an externally rendered status surface (e.g. a chat message).
///
/// Only identifiers: the view never holds connection or worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusViewRef {
    pub channel: ChannelId,
    pub message_id: u64,
}

/// Immutable picture of one entity after a committed transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub entity: EntityId,
    /// Increases by one with every published snapshot of the entity.
    pub revision: u64,
    pub phase: PlaybackPhase,
    pub now_playing: Option<NowPlaying>,
    pub queue_len: usize,
    /// Utterances being synthesized, queued or on air.
    pub pending_utterances: usize,
    /// True while an utterance holds the connection.
    pub announcing: bool,
    pub connected_channel: Option<ChannelId>,
    pub controls: Vec<ControlAction>,
    /// Result of the last action or the last reported error.
    pub notice: Option<String>,
    pub view: Option<StatusViewRef>,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

impl StatusSnapshot {
    /// The snapshot of a freshly created, unconnected entity.
    pub fn initial(entity: EntityId) -> Self {
        Self {
            entity,
            revision: 0,
            phase: PlaybackPhase::Idle,
            now_playing: None,
            queue_len: 0,
            pending_utterances: 0,
            announcing: false,
            connected_channel: None,
            controls: controls_for(PlaybackPhase::Idle, false, false),
            notice: None,
            view: None,
            timestamp: now_millis(),
        }
    }

    /// True when nothing is playing, queued or waiting to be announced.
    pub fn is_settled(&self) -> bool {
        self.phase == PlaybackPhase::Idle && self.queue_len == 0 && self.pending_utterances == 0
    }

    /// Renders the snapshot as plain text for simple status surfaces.
    pub fn render_text(&self) -> String {
        let mut out = match (&self.phase, &self.now_playing) {
            (PlaybackPhase::Disconnected, _) => "Disconnected.".to_string(),
            (PlaybackPhase::Playing, Some(np)) | (PlaybackPhase::Paused, Some(np)) => {
                let verb = if self.phase == PlaybackPhase::Paused {
                    "Paused"
                } else {
                    "Now Playing"
                };
                let mut line = format!("{}: {} <{}> @ {}", verb, np.title, np.link, format_clock(np.offset_secs));
                if let Some(total) = np.duration_secs {
                    line.push_str(&format!(" / {}", format_clock(total)));
                }
                line
            }
            _ => "No track is currently playing.".to_string(),
        };
        if self.queue_len > 0 {
            out.push_str(&format!(" | {} queued", self.queue_len));
        }
        if self.announcing {
            out.push_str(" | announcing");
        }
        if let Some(ref notice) = self.notice {
            out.push_str(&format!(" | {}", notice));
        }
        out
    }
}

/// Publishes one entity's snapshots.
///
/// Owned by the entity worker, so publication is serialized with every other
/// transition of that entity and the watch channel always holds the last
/// committed state.
pub struct StatusPublisher {
    entity: EntityId,
    tx: watch::Sender<StatusSnapshot>,
    emitter: Arc<dyn EventEmitter>,
    revision: u64,
    view: Option<StatusViewRef>,
}

impl StatusPublisher {
    pub fn new(entity: EntityId, emitter: Arc<dyn EventEmitter>) -> Self {
        let (tx, _) = watch::channel(StatusSnapshot::initial(entity));
        Self {
            entity,
            tx,
            emitter,
            revision: 0,
            view: None,
        }
    }

    /// Returns a receiver that always observes the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }

    /// Returns the last published snapshot.
    pub fn latest(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }

    /// Stamps and publishes `snapshot`.
    pub fn publish(&mut self, mut snapshot: StatusSnapshot) -> StatusSnapshot {
        self.revision += 1;
        snapshot.entity = self.entity;
        snapshot.revision = self.revision;
        snapshot.view = self.view;
        snapshot.timestamp = now_millis();

        self.tx.send_replace(snapshot.clone());
        self.emitter.emit_status(StatusEvent::Updated {
            snapshot: snapshot.clone(),
        });
        snapshot
    }

    /// Attaches a new status surface, returning the one it replaces.
    ///
    /// Emits [`StatusEvent::ViewReplaced`] so the old surface can be removed.
    pub fn attach_view(&mut self, view: StatusViewRef) -> Option<StatusViewRef> {
        let previous = self.view.replace(view);
        if let Some(previous) = previous.filter(|p| *p != view) {
            self.emitter.emit_status(StatusEvent::ViewReplaced {
                entity: self.entity,
                previous,
                current: view,
                timestamp: now_millis(),
            });
        }
        previous
    }

    /// Announces that the entity no longer exists.
    pub fn publish_removed(&self) {
        self.emitter.emit_status(StatusEvent::Removed {
            entity: self.entity,
            timestamp: now_millis(),
        });
    }
}
