use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::media::StreamSource;
use crate::playback::{ChannelId, EntityId};

/// Errors raised by the voice transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Joining or moving to a voice channel failed.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// A stream could not be opened.
    #[error("Open failed: {0}")]
    Open(String),

    /// Pausing or resuming a running stream failed.
    #[error("Control failed: {0}")]
    Control(String),

    /// The operation is not available on this platform or transport.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Natural end of stream.
    Finished,
    /// Stopped through [`StreamControl::stop`] or by disconnecting.
    Stopped,
    /// Mid-stream transport failure.
    Failed(String),
}

/// Live control over one running stream.
pub trait StreamControl: Send + Sync {
    /// Suspends delivery. Must not complete the stream.
    fn pause(&self) -> Result<(), TransportError>;

    /// Continues a suspended stream.
    fn resume(&self) -> Result<(), TransportError>;

    /// Stops the stream. Idempotent; completion reports [`StreamOutcome::Stopped`].
    fn stop(&self);
}

/// Returned by [`VoiceConnection::play`].
pub struct StreamHandle {
    pub control: Box<dyn StreamControl>,
    /// Resolves exactly once, when the stream ends for any reason.
    pub finished: oneshot::Receiver<StreamOutcome>,
}

/// An exclusive outbound audio connection for one entity.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Channel the connection currently targets.
    fn channel(&self) -> ChannelId;

    /// Moves the connection to another channel of the same entity.
    async fn move_to(&mut self, channel: ChannelId) -> Result<(), TransportError>;

    /// Starts streaming `source`.
    async fn play(&mut self, source: StreamSource) -> Result<StreamHandle, TransportError>;

    /// Stops every stream and releases the connection.
    async fn disconnect(&mut self);
}

/// Opens voice connections.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn connect(
        &self,
        entity: EntityId,
        channel: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, TransportError>;
}
