//! Event emitter abstraction for decoupling playback from renderers.
//!
//! Playback components depend on the [`EventEmitter`] trait rather than
//! concrete channels, enabling testing and alternative delivery.

use super::{StatusEvent, UtteranceEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// # Example
///
/// ```ignore
/// struct Announcer {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl Announcer {
///     fn dropped(&self, entity: EntityId, job: JobId) {
///         self.emitter.emit_utterance(UtteranceEvent::Discarded { entity, job, timestamp: now_millis() });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a status view event.
    fn emit_status(&self, event: StatusEvent);

    /// Emits an utterance job event.
    fn emit_utterance(&self, event: UtteranceEvent);
}

/// No-op emitter for headless use or testing.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_status(&self, _event: StatusEvent) {}

    fn emit_utterance(&self, _event: UtteranceEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_status(&self, event: StatusEvent) {
        tracing::debug!(?event, "status_event");
    }

    fn emit_utterance(&self, event: UtteranceEvent) {
        tracing::debug!(?event, "utterance_event");
    }
}
