//! Media resolution and speech synthesis.
//!
//! The scheduler only sees the [`MediaResolver`] and [`SpeechSynthesizer`]
//! traits. The concrete adapters shell out to `yt-dlp` and to a configurable
//! text-to-speech command.

mod synth;
mod traits;
mod types;
mod ytdlp;

pub use synth::{CommandSynthesizer, SynthConfig};
pub use traits::{MediaResolver, ResolveError, SpeechSynthesizer, SynthesisError};
pub use types::{SourceKind, SpeechArtifact, StreamSource, TrackDescriptor};
pub use ytdlp::{build_search_input, clean_query, is_url, YtDlpConfig, YtDlpResolver};
