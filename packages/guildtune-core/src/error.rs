//! Centralized error types for the Guildtune core library.
//!
//! Adapter layers (media resolution, speech synthesis, voice transport) define
//! their own `thiserror` enums next to their traits. Everything that crosses
//! the scheduler boundary is converted into [`PlaybackError`], which carries a
//! machine-readable code and a user-facing message.

use serde::Serialize;
use thiserror::Error;

use crate::media::{ResolveError, SynthesisError};
use crate::transport::TransportError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for ResolveError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "no_playable_result",
            Self::Process(_) => "resolver_process_failed",
            Self::Parse(_) => "resolver_output_invalid",
            Self::Unplayable(_) => "descriptor_unplayable",
        }
    }
}

impl ErrorCode for SynthesisError {
    fn code(&self) -> &'static str {
        match self {
            Self::EmptyText => "empty_utterance",
            Self::Process(_) => "synthesizer_process_failed",
            Self::Io(_) => "artifact_io_failed",
        }
    }
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::Connect(_) => "voice_connect_failed",
            Self::Open(_) => "stream_open_failed",
            Self::Control(_) => "stream_control_failed",
            Self::Unsupported(_) => "transport_unsupported",
        }
    }
}

/// Error type for every operation exposed by the playback scheduler.
///
/// None of these variants terminate an entity worker; each one is reported to
/// the caller and, where it affects playback, surfaced as a status notice.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum PlaybackError {
    /// The query had no playable result. The queue is unaffected.
    #[error("Could not find anything to play: {0}")]
    Resolution(String),

    /// A resolved item could not be opened on the transport.
    /// The worker moves on to the next queue entry.
    #[error("Could not start stream: {0}")]
    StreamOpen(String),

    /// A stream failed while it was being delivered.
    #[error("Stream failed: {0}")]
    TransportRuntime(String),

    /// The action is not valid in the entity's current state.
    #[error("{0}")]
    InvalidState(String),

    /// Speech synthesis failed; the utterance was dropped.
    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    /// Joining or moving the voice connection failed.
    #[error("Voice connection failed: {0}")]
    Connection(String),

    /// Caller sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The entity's worker is gone (typically raced with `leave`).
    #[error("Playback worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// Configuration error detected at bootstrap.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl PlaybackError {
    /// Returns a machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Resolution(_) => "resolution_error",
            Self::StreamOpen(_) => "stream_open_error",
            Self::TransportRuntime(_) => "transport_runtime_error",
            Self::InvalidState(_) => "invalid_state",
            Self::Synthesis(_) => "synthesis_error",
            Self::Connection(_) => "connection_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::WorkerUnavailable(_) => "worker_unavailable",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Shorthand for [`PlaybackError::InvalidState`].
    pub(crate) fn invalid_state(message: &str) -> Self {
        Self::InvalidState(message.to_string())
    }

    /// Returns true if the error should be shown as a status notice.
    ///
    /// Invalid-state rejections are answered to the caller only; they never
    /// change the rendered view.
    #[must_use]
    pub fn is_notice(&self) -> bool {
        !matches!(self, Self::InvalidState(_) | Self::InvalidRequest(_))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result Type Aliases
// ─────────────────────────────────────────────────────────────────────────────

/// Convenient Result alias for scheduler operations.
pub type PlaybackResult<T> = Result<T, PlaybackError>;

impl From<ResolveError> for PlaybackError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Unplayable(_) => Self::StreamOpen(err.to_string()),
            _ => Self::Resolution(err.to_string()),
        }
    }
}

impl From<SynthesisError> for PlaybackError {
    fn from(err: SynthesisError) -> Self {
        Self::Synthesis(err.to_string())
    }
}

impl From<TransportError> for PlaybackError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connect(_) => Self::Connection(err.to_string()),
            TransportError::Open(_) => Self::StreamOpen(err.to_string()),
            TransportError::Control(_) | TransportError::Unsupported(_) => {
                Self::TransportRuntime(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_displays_bare_message() {
        let err = PlaybackError::invalid_state("Nothing to skip.");
        assert_eq!(err.to_string(), "Nothing to skip.");
        assert_eq!(err.code(), "invalid_state");
        assert!(!err.is_notice());
    }

    #[test]
    fn unplayable_descriptor_maps_to_stream_open() {
        let err: PlaybackError = ResolveError::Unplayable("no locator".into()).into();
        assert_eq!(err.code(), "stream_open_error");

        let err: PlaybackError = ResolveError::NotFound("zzz".into()).into();
        assert_eq!(err.code(), "resolution_error");
    }

    #[test]
    fn transport_errors_map_by_kind() {
        let err: PlaybackError = TransportError::Connect("refused".into()).into();
        assert_eq!(err.code(), "connection_error");
        assert_eq!(TransportError::Connect("x".into()).code(), "voice_connect_failed");

        let err: PlaybackError = TransportError::Unsupported("pause").into();
        assert_eq!(err.code(), "transport_runtime_error");
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(PlaybackError::Resolution("zzz".into())).unwrap();
        assert_eq!(json["type"], "Resolution");
        assert_eq!(json["details"], "zzz");
    }
}
