use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Fallback title for entries the resolver could not name.
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// A resolved, replayable reference to a piece of media.
///
/// Immutable once resolved. The scheduler shares descriptors as
/// `Arc<TrackDescriptor>` between the queue, the current track and snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDescriptor {
    /// Direct stream locator, used to reopen the track at any offset.
    pub stream_url: String,
    /// Display title.
    pub title: String,
    /// Canonical web page for the track.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webpage_url: Option<String>,
    /// Thumbnail image URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Duration in seconds, when the resolver reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    /// Opaque resolver metadata, passed through untouched.
    #[serde(default, skip_serializing)]
    pub raw: serde_json::Value,
}

impl TrackDescriptor {
    /// Creates a descriptor with only a locator and a title.
    pub fn new(stream_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            stream_url: stream_url.into(),
            title: title.into(),
            webpage_url: None,
            thumbnail: None,
            duration_secs: None,
            raw: serde_json::Value::Null,
        }
    }

    /// Link shown to users: the web page when known, else the stream locator.
    pub fn link(&self) -> &str {
        self.webpage_url.as_deref().unwrap_or(&self.stream_url)
    }
}

/// What a stream source carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    /// A music track from the track queue.
    Track,
    /// A synthesized announcement.
    Utterance,
}

/// Everything the transport needs to open one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSource {
    /// URL or filesystem path handed to the transport.
    pub locator: String,
    /// Position to start from, in whole seconds.
    pub start_offset_secs: u64,
    /// Track or utterance.
    pub kind: SourceKind,
}

impl StreamSource {
    pub fn track(locator: impl Into<String>, start_offset_secs: u64) -> Self {
        Self {
            locator: locator.into(),
            start_offset_secs,
            kind: SourceKind::Track,
        }
    }

    pub fn utterance(artifact: &SpeechArtifact) -> Self {
        Self {
            locator: artifact.path().to_string_lossy().into_owned(),
            start_offset_secs: 0,
            kind: SourceKind::Utterance,
        }
    }
}

/// An ephemeral synthesized-speech file.
///
/// The artifact is consumed exactly once and must be discarded afterwards,
/// whether it was played or abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechArtifact {
    path: PathBuf,
}

impl SpeechArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the artifact file. A file that is already gone is not an error.
    pub fn discard(self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("[Utterance] Deleted artifact {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "[Utterance] Failed to delete artifact {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_prefers_webpage_url() {
        let mut d = TrackDescriptor::new("https://cdn/a.webm", "A");
        assert_eq!(d.link(), "https://cdn/a.webm");
        d.webpage_url = Some("https://video/a".into());
        assert_eq!(d.link(), "https://video/a");
    }

    #[test]
    fn discard_removes_file_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tts_test.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let artifact = SpeechArtifact::new(&path);
        artifact.clone().discard();
        assert!(!path.exists());

        // Second discard of the same path is a no-op.
        artifact.discard();
    }
}
