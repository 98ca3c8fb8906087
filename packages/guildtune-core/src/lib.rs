//! Guildtune Core - per-entity sequential playback.
//!
//! This crate schedules audio playback for any number of independent
//! entities (guilds). Each entity has a track queue, a current track that can
//! be paused, skipped and seeked, a queue of synthesized announcements sharing
//! the same connection, and a status snapshot that renderers observe.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`playback`]: Scheduler, per-entity workers, seeking, utterances and status
//! - [`media`]: Track resolution (yt-dlp) and speech synthesis (TTS command)
//! - [`transport`]: Voice connections and stream control (ffmpeg)
//! - [`events`]: Event system for status renderers
//! - [`runtime`]: Task spawning abstraction with tracked shutdown
//! - [`state`]: Configuration
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! The crate defines several traits to decouple scheduling from the outside
//! world:
//!
//! - [`MediaResolver`](media::MediaResolver): Finding and reopening tracks
//! - [`SpeechSynthesizer`](media::SpeechSynthesizer): Rendering text to audio
//! - [`VoiceGateway`](transport::VoiceGateway): Opening outbound connections
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//!
//! Each trait has a process-backed implementation used by the player binary.

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod error;
pub mod events;
pub mod media;
pub mod playback;
pub mod runtime;
pub mod state;
pub mod transport;
pub mod utils;

// Re-export commonly used types at the crate root
pub use error::{ErrorCode, PlaybackError, PlaybackResult};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, EventEmitter, LoggingEventEmitter, NoopEventEmitter,
    StatusEvent, UtteranceEvent,
};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::{Config, MixConfig};
pub use utils::{format_clock, now_millis};

// Re-export playback types
pub use playback::{
    ChannelId, ControlAction, EnqueueReceipt, EntityId, JobId, NowPlaying, PlaybackPhase,
    PlaybackScheduler, ResumeOutcome, StatusSnapshot, StatusViewRef,
};

// Re-export adapter types
pub use media::{SynthConfig, TrackDescriptor, YtDlpConfig};
pub use transport::FfmpegConfig;

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, Adapters, BootstrappedServices};
