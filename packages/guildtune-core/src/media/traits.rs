//! Trait abstractions for media collaborators.
//!
//! These traits keep the scheduler independent of how tracks are found and
//! how speech is produced, enabling deterministic fakes in tests.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{SpeechArtifact, StreamSource, TrackDescriptor};

/// Errors raised while turning a query into something playable.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Search or lookup returned no usable entry.
    #[error("No playable result for \"{0}\"")]
    NotFound(String),

    /// The resolver process could not be run or exited unsuccessfully.
    #[error("Resolver process failed: {0}")]
    Process(String),

    /// The resolver produced output that could not be understood.
    #[error("Malformed resolver output: {0}")]
    Parse(String),

    /// A descriptor lacks what is needed to rebuild its stream.
    #[error("Track cannot be reopened: {0}")]
    Unplayable(String),
}

/// Errors raised while producing a speech artifact.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Nothing to say.
    #[error("Utterance text is empty")]
    EmptyText,

    /// The synthesizer process could not be run or exited unsuccessfully.
    #[error("Synthesizer process failed: {0}")]
    Process(String),

    /// Filesystem error around the artifact.
    #[error("Artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns text queries or direct locators into track descriptors.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Resolves a query or direct URL to a single playable track.
    async fn resolve(&self, query: &str) -> Result<TrackDescriptor, ResolveError>;

    /// Returns up to `limit` playable tracks for a text query.
    async fn search(&self, query: &str, limit: usize)
        -> Result<Vec<TrackDescriptor>, ResolveError>;

    /// Rebuilds a stream source for `descriptor` starting at `offset_secs`.
    ///
    /// Must not perform a fresh search: the descriptor already carries the
    /// direct stream locator.
    async fn reopen_at(
        &self,
        descriptor: &TrackDescriptor,
        offset_secs: u64,
    ) -> Result<StreamSource, ResolveError>;
}

/// Turns text into a playable audio artifact.
///
/// Implementations may take seconds; callers never await this while holding
/// an entity's serialized section.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesizes `text` into a new artifact owned by the caller.
    async fn synthesize(&self, text: &str) -> Result<SpeechArtifact, SynthesisError>;
}
