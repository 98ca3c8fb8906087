//! Player configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use guildtune_core::{Config, FfmpegConfig, SynthConfig, YtDlpConfig};
use serde::Deserialize;

/// Player configuration loaded from YAML with environment overrides.
///
/// ```yaml
/// playback:
///   advance_debounce_ms: 250
///   seek_step_secs: 10
/// ytdlp:
///   program: /usr/local/bin/yt-dlp
/// ffmpeg:
///   volume: 0.8
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Scheduler settings.
    pub playback: Config,

    /// Track resolver.
    /// Override: `GUILDTUNE_YTDLP` (program path)
    pub ytdlp: YtDlpConfig,

    /// Speech synthesizer.
    /// Override: `GUILDTUNE_TTS` (program path), `GUILDTUNE_ARTIFACT_DIR`
    pub synth: SynthConfig,

    /// Audio transport.
    /// Override: `GUILDTUNE_FFMPEG` (program path)
    pub ffmpeg: FfmpegConfig,
}

impl PlayerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GUILDTUNE_ADVANCE_DEBOUNCE_MS") {
            if let Ok(ms) = val.parse() {
                self.playback.advance_debounce_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("GUILDTUNE_SEEK_STEP_SECS") {
            if let Ok(secs) = val.parse() {
                self.playback.seek_step_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("GUILDTUNE_YTDLP") {
            self.ytdlp.program = val;
        }

        if let Ok(val) = std::env::var("GUILDTUNE_TTS") {
            self.synth.program = val;
        }

        if let Ok(val) = std::env::var("GUILDTUNE_ARTIFACT_DIR") {
            self.synth.artifact_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("GUILDTUNE_FFMPEG") {
            self.ffmpeg.program = val;
        }

        // Note: GUILDTUNE_LOG_LEVEL is handled by clap via #[arg(env = ...)] in main.rs
    }
}
