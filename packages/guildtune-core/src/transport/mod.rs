//! Outbound voice transport.
//!
//! A [`VoiceGateway`] hands out one exclusive [`VoiceConnection`] per entity.
//! Each `play` call yields a [`StreamHandle`]: a control surface plus a
//! one-shot completion notification that fires exactly once per stream.

mod ffmpeg;
mod traits;

pub use ffmpeg::{build_args, FfmpegConfig, FfmpegGateway};
pub use traits::{
    StreamControl, StreamHandle, StreamOutcome, TransportError, VoiceConnection, VoiceGateway,
};
