//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where the
//! scheduler and its collaborators are instantiated and wired together. The
//! external adapters (resolver, synthesizer, voice gateway) are passed in as
//! [`Adapters`], so tests and embedders can swap any of them.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{PlaybackError, PlaybackResult};
use crate::events::{BroadcastEventBridge, EventEmitter};
use crate::media::{
    CommandSynthesizer, MediaResolver, SpeechSynthesizer, SynthConfig, YtDlpConfig, YtDlpResolver,
};
use crate::playback::PlaybackScheduler;
use crate::runtime::TokioSpawner;
use crate::state::Config;
use crate::transport::{FfmpegConfig, FfmpegGateway, VoiceGateway};

/// How long shutdown waits for background tasks to finish.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The external collaborators of the scheduler.
#[derive(Clone)]
pub struct Adapters {
    pub resolver: Arc<dyn MediaResolver>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub gateway: Arc<dyn VoiceGateway>,
}

impl Adapters {
    /// Builds the process-backed adapters (yt-dlp, TTS command, ffmpeg).
    ///
    /// Stream supervisors run on `spawner`; pass the same spawner to
    /// [`bootstrap_services`] so shutdown waits for them.
    pub fn from_configs(
        ytdlp: YtDlpConfig,
        synth: SynthConfig,
        ffmpeg: FfmpegConfig,
        spawner: &TokioSpawner,
    ) -> Self {
        Self {
            resolver: Arc::new(YtDlpResolver::new(ytdlp)),
            synthesizer: Arc::new(CommandSynthesizer::new(synth)),
            gateway: Arc::new(FfmpegGateway::new(ffmpeg, spawner.clone())),
        }
    }
}

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// The playback scheduler for every entity.
    pub scheduler: Arc<PlaybackScheduler>,
    /// Event bridge for emitting events to subscribers and optional external consumers.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // Leave every entity first so artifacts are discarded and
        // connections released before tasks are cancelled.
        self.scheduler.shutdown().await;
        self.cancel_token.cancel();

        if self.spawner.drain(SHUTDOWN_DRAIN_TIMEOUT).await {
            log::info!("[Bootstrap] Shutdown complete");
        } else {
            log::warn!(
                "[Bootstrap] {} task(s) still running after {:?}",
                self.spawner.active_tasks(),
                SHUTDOWN_DRAIN_TIMEOUT
            );
        }
    }
}

/// Bootstraps the scheduler with its dependencies.
///
/// Every background task, including those the adapters start, should run on
/// `spawner`.
///
/// # Errors
///
/// Returns [`PlaybackError::Configuration`] if `config` is invalid.
pub fn bootstrap_services(
    config: &Config,
    spawner: TokioSpawner,
    adapters: Adapters,
) -> PlaybackResult<BootstrappedServices> {
    config.validate().map_err(PlaybackError::Configuration)?;

    // Broadcast channel for status and utterance events
    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));

    let cancel_token = CancellationToken::new();

    let scheduler = Arc::new(PlaybackScheduler::new(
        adapters.resolver,
        adapters.synthesizer,
        adapters.gateway,
        Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        spawner.clone(),
        Arc::new(config.clone()),
        cancel_token.clone(),
    ));

    log::info!(
        "[Bootstrap] Scheduler ready (debounce {}ms, seek step {}s)",
        config.advance_debounce_ms,
        config.seek_step_secs
    );

    Ok(BootstrappedServices {
        scheduler,
        event_bridge,
        spawner,
        cancel_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BroadcastEvent, StatusEvent};
    use crate::playback::{ChannelId, EntityId, PlaybackPhase};

    fn adapters(spawner: &TokioSpawner) -> Adapters {
        Adapters::from_configs(
            YtDlpConfig::default(),
            SynthConfig::default(),
            FfmpegConfig::default(),
            spawner,
        )
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = Config {
            command_channel_capacity: 0,
            ..Config::default()
        };
        let spawner = TokioSpawner::current();
        let err = bootstrap_services(&config, spawner.clone(), adapters(&spawner)).err();
        assert!(matches!(err, Some(PlaybackError::Configuration(_))));
    }

    #[tokio::test]
    async fn status_events_reach_broadcast_subscribers() {
        let spawner = TokioSpawner::current();
        let services =
            bootstrap_services(&Config::default(), spawner.clone(), adapters(&spawner)).unwrap();
        let mut rx = services.event_bridge.subscribe();

        let entity = EntityId(1);
        services
            .scheduler
            .attach_status_view(
                entity,
                crate::playback::StatusViewRef {
                    channel: ChannelId(2),
                    message_id: 3,
                },
            )
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            BroadcastEvent::Status(StatusEvent::Updated { snapshot }) => {
                assert_eq!(snapshot.entity, entity);
                assert_eq!(snapshot.phase, PlaybackPhase::Idle);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        services.shutdown().await;
        assert!(services.scheduler.active_entities().is_empty());
        assert_eq!(services.spawner.active_tasks(), 0);
    }
}
