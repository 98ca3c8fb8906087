//! Core configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Limits for mixing tracks from several artists into one batch.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MixConfig {
    /// Maximum number of artists per mix request.
    pub max_artists: usize,

    /// Search results requested per artist.
    pub results_per_artist: usize,

    /// Maximum tracks enqueued from one mix after shuffling.
    pub max_tracks: usize,
}

impl MixConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_artists == 0 {
            return Err("mix.max_artists must be >= 1".to_string());
        }
        if self.results_per_artist == 0 {
            return Err("mix.results_per_artist must be >= 1".to_string());
        }
        if self.max_tracks == 0 {
            return Err("mix.max_tracks must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            max_artists: 5,
            results_per_artist: 10,
            max_tracks: 50,
        }
    }
}

/// Configuration for the playback scheduler.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Delay between a stream's completion and the resulting advance
    /// (milliseconds). Lets a skip's explicit stop settle before the same
    /// stream's natural end could be observed.
    pub advance_debounce_ms: u64,

    /// Unplayable queue entries skipped by a single advance before it yields
    /// and retries after the debounce delay.
    pub max_advance_skips: usize,

    /// Step used by rewind / forward (seconds).
    pub seek_step_secs: u64,

    /// Capacity of each entity's command mailbox.
    pub command_channel_capacity: usize,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,

    /// Mix limits.
    pub mix: MixConfig,
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_advance_skips == 0 {
            return Err("max_advance_skips must be >= 1".to_string());
        }
        if self.seek_step_secs == 0 {
            return Err("seek_step_secs must be >= 1".to_string());
        }
        if self.command_channel_capacity == 0 {
            return Err("command_channel_capacity must be >= 1 (mpsc::channel panics on 0)".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        self.mix.validate()
    }

    /// The advance debounce as a [`Duration`].
    #[must_use]
    pub fn advance_debounce(&self) -> Duration {
        Duration::from_millis(self.advance_debounce_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            advance_debounce_ms: 250,
            max_advance_skips: 5,
            seek_step_secs: 10,
            command_channel_capacity: 32,
            event_channel_capacity: 100,
            mix: MixConfig::default(),
        }
    }
}
