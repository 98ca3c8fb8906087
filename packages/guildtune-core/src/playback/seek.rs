//! Relative seeking within the current track.
//!
//! A stream cannot move its read position, so a seek reopens the current
//! descriptor at the new offset and swaps it in for the old stream. The queue
//! is never touched.

use super::types::PlaybackId;
use super::worker::EntityWorker;
use crate::error::{PlaybackError, PlaybackResult};

pub(crate) const NOTHING_TO_SEEK: &str = "No active track to seek.";

/// Offset after moving `delta_secs` from `offset_secs`, clamped at zero.
///
/// There is no upper clamp; seeking past the end simply ends the track.
#[must_use]
pub fn seek_target(offset_secs: u64, delta_secs: i64) -> u64 {
    if delta_secs.is_negative() {
        offset_secs.saturating_sub(delta_secs.unsigned_abs())
    } else {
        offset_secs.saturating_add(delta_secs.unsigned_abs())
    }
}

impl EntityWorker {
    /// Moves the current track by `delta_secs` and returns the new offset.
    pub(super) async fn seek(&mut self, delta_secs: i64) -> PlaybackResult<u64> {
        let current = match (&self.current, self.skip_in_flight) {
            (Some(current), false) => current.clone(),
            _ => return Err(PlaybackError::invalid_state(NOTHING_TO_SEEK)),
        };
        let target = seek_target(current.offset_secs, delta_secs);
        let replacement = current.at_offset(target);

        if !self.playing {
            // Paused: retire the old stream and reopen cold on resume.
            if let Some(stream) = self.stream.take() {
                stream.control.stop();
            }
            self.current = Some(replacement);
            self.notice = Some(format!("Position set to {}.", crate::utils::format_clock(target)));
            log::info!("[Seek] Entity {} paused track moved to {}s", self.entity, target);
            return Ok(target);
        }

        // Open the replacement first so a failed reopen leaves the old stream playing.
        let source = self
            .ctx
            .resolver
            .reopen_at(&replacement.descriptor, target)
            .await
            .map_err(|e| PlaybackError::StreamOpen(e.to_string()))?;

        let retired: Option<PlaybackId> = self.stream.take().map(|stream| {
            stream.control.stop();
            stream.id
        });
        log::debug!(
            "[Seek] Entity {} retired stream {:?} for offset {}s",
            self.entity,
            retired,
            target
        );

        if let Err(err) = self.open_track_stream(replacement, source).await {
            log::warn!("[Seek] Entity {} could not reopen track: {}", self.entity, err);
            self.report(&err);
            self.advance().await;
            return Err(err);
        }
        self.notice = Some(format!("Position set to {}.", crate::utils::format_clock(target)));
        Ok(target)
    }
}
