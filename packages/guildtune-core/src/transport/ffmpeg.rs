//! ffmpeg-backed voice transport.
//!
//! Every stream is one `ffmpeg` child process decoding the source and writing
//! to a configurable output (a PulseAudio sink by default). A supervisor task
//! per process turns its exit into the stream's completion notification.
//! Pause and resume suspend the process with `SIGSTOP` / `SIGCONT`.

use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::traits::{
    StreamControl, StreamHandle, StreamOutcome, TransportError, VoiceConnection, VoiceGateway,
};
use crate::media::StreamSource;
use crate::playback::{ChannelId, EntityId};
use crate::runtime::{TaskSpawner, TokioSpawner};

/// Placeholder for the entity id in [`FfmpegConfig::output_args`].
pub const ENTITY_PLACEHOLDER: &str = "{entity}";
/// Placeholder for the channel id in [`FfmpegConfig::output_args`].
pub const CHANNEL_PLACEHOLDER: &str = "{channel}";

/// Configuration for [`FfmpegGateway`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    /// Executable to run.
    pub program: String,
    /// Output gain applied with an audio filter (1.0 = unchanged).
    pub volume: f32,
    /// Output argument template; `{entity}` and `{channel}` are substituted.
    pub output_args: Vec<String>,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            volume: 0.5,
            output_args: vec![
                "-f".to_string(),
                "pulse".to_string(),
                format!("guildtune-{}-{}", ENTITY_PLACEHOLDER, CHANNEL_PLACEHOLDER),
            ],
        }
    }
}

/// Builds the full ffmpeg argument list for one stream.
///
/// The seek offset goes before `-i` so ffmpeg seeks the input instead of
/// decoding and discarding up to the offset.
#[must_use]
pub fn build_args(
    config: &FfmpegConfig,
    entity: EntityId,
    channel: ChannelId,
    source: &StreamSource,
) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "quiet", "-nostdin"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    if source.start_offset_secs > 0 {
        args.push("-ss".to_string());
        args.push(source.start_offset_secs.to_string());
    }

    args.push("-i".to_string());
    args.push(source.locator.clone());

    if (config.volume - 1.0).abs() > f32::EPSILON {
        args.push("-filter:a".to_string());
        args.push(format!("volume={}", config.volume));
    }

    let entity = entity.to_string();
    let channel = channel.to_string();
    args.extend(config.output_args.iter().map(|arg| {
        arg.replace(ENTITY_PLACEHOLDER, &entity)
            .replace(CHANNEL_PLACEHOLDER, &channel)
    }));
    args
}

/// Gateway that opens ffmpeg-backed connections.
///
/// Stream supervisors run on `spawner`, so draining it at shutdown also waits
/// for every ffmpeg process to be reaped.
pub struct FfmpegGateway {
    config: FfmpegConfig,
    spawner: TokioSpawner,
}

impl FfmpegGateway {
    pub fn new(config: FfmpegConfig, spawner: TokioSpawner) -> Self {
        Self { config, spawner }
    }
}

#[async_trait]
impl VoiceGateway for FfmpegGateway {
    async fn connect(
        &self,
        entity: EntityId,
        channel: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, TransportError> {
        log::info!("[Ffmpeg] Connected entity {} to channel {}", entity, channel);
        Ok(Box::new(FfmpegConnection {
            entity,
            channel,
            config: self.config.clone(),
            spawner: self.spawner.clone(),
            shutdown: CancellationToken::new(),
        }))
    }
}

struct FfmpegConnection {
    entity: EntityId,
    channel: ChannelId,
    config: FfmpegConfig,
    spawner: TokioSpawner,
    /// Parent of every stream's stop token; cancelled on disconnect.
    shutdown: CancellationToken,
}

#[async_trait]
impl VoiceConnection for FfmpegConnection {
    fn channel(&self) -> ChannelId {
        self.channel
    }

    async fn move_to(&mut self, channel: ChannelId) -> Result<(), TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Connect("connection is closed".to_string()));
        }
        log::info!(
            "[Ffmpeg] Entity {} moved from channel {} to {}",
            self.entity,
            self.channel,
            channel
        );
        self.channel = channel;
        Ok(())
    }

    async fn play(&mut self, source: StreamSource) -> Result<StreamHandle, TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Open("connection is closed".to_string()));
        }

        let args = build_args(&self.config, self.entity, self.channel, &source);
        let child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Open(format!("{}: {}", self.config.program, e)))?;

        let pid = child.id();
        let stop = self.shutdown.child_token();
        let exited = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        log::debug!(
            "[Ffmpeg] Entity {} started pid {:?} at {}s",
            self.entity,
            pid,
            source.start_offset_secs
        );
        self.spawner
            .spawn(supervise(child, stop.clone(), exited.clone(), tx));

        Ok(StreamHandle {
            control: Box::new(FfmpegStream { pid, stop, exited }),
            finished: rx,
        })
    }

    async fn disconnect(&mut self) {
        self.shutdown.cancel();
        log::info!("[Ffmpeg] Entity {} disconnected", self.entity);
    }
}

/// Waits for the process to exit or to be stopped, then reports once.
///
/// `exited` is cancelled once the child is reaped, before the outcome is sent.
async fn supervise(
    mut child: Child,
    stop: CancellationToken,
    exited: CancellationToken,
    tx: oneshot::Sender<StreamOutcome>,
) {
    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => StreamOutcome::Finished,
            Ok(status) => StreamOutcome::Failed(format!("ffmpeg exited with {}", status)),
            Err(e) => StreamOutcome::Failed(e.to_string()),
        },
        _ = stop.cancelled() => {
            // SIGKILL also terminates a SIGSTOPped process.
            if let Err(e) = child.kill().await {
                log::warn!("[Ffmpeg] Failed to kill stream process: {}", e);
            }
            StreamOutcome::Stopped
        }
    };
    exited.cancel();
    let _ = tx.send(outcome);
}

struct FfmpegStream {
    pid: Option<u32>,
    stop: CancellationToken,
    /// Cancelled by the supervisor once the process is reaped; its pid may
    /// belong to another process after that.
    exited: CancellationToken,
}

impl FfmpegStream {
    #[cfg(unix)]
    fn signal(&self, signal: libc::c_int) -> Result<(), TransportError> {
        let pid = self
            .pid
            .filter(|_| !self.exited.is_cancelled())
            .ok_or_else(|| TransportError::Control("process already exited".to_string()))?;
        // SAFETY: kill(2) has no memory-safety preconditions.
        let result = unsafe { libc::kill(pid as libc::pid_t, signal) };
        if result == 0 {
            Ok(())
        } else {
            Err(TransportError::Control(
                std::io::Error::last_os_error().to_string(),
            ))
        }
    }
}

impl StreamControl for FfmpegStream {
    #[cfg(unix)]
    fn pause(&self) -> Result<(), TransportError> {
        self.signal(libc::SIGSTOP)
    }

    #[cfg(not(unix))]
    fn pause(&self) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("pause"))
    }

    #[cfg(unix)]
    fn resume(&self) -> Result<(), TransportError> {
        self.signal(libc::SIGCONT)
    }

    #[cfg(not(unix))]
    fn resume(&self) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("resume"))
    }

    fn stop(&self) {
        self.stop.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_output(program: &str) -> FfmpegConfig {
        FfmpegConfig {
            program: program.to_string(),
            volume: 1.0,
            output_args: vec![],
        }
    }

    #[test]
    fn build_args_places_seek_before_input() {
        let config = FfmpegConfig::default();
        let source = StreamSource::track("https://cdn/a.webm", 30);
        let args = build_args(&config, EntityId(7), ChannelId(9), &source);

        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
        assert_eq!(args[ss + 1], "30");
        assert_eq!(args[input + 1], "https://cdn/a.webm");
        assert!(args.contains(&"volume=0.5".to_string()));
        assert_eq!(args.last().unwrap(), "guildtune-7-9");
    }

    #[test]
    fn build_args_omits_zero_offset_and_unit_volume() {
        let source = StreamSource::track("a.wav", 0);
        let args = build_args(&no_output("ffmpeg"), EntityId(1), ChannelId(2), &source);
        assert!(!args.contains(&"-ss".to_string()));
        assert!(!args.contains(&"-filter:a".to_string()));
        assert_eq!(args.last().unwrap(), "a.wav");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn clean_exit_reports_finished() {
        let gateway = FfmpegGateway::new(no_output("true"), TokioSpawner::current());
        let mut conn = gateway.connect(EntityId(1), ChannelId(1)).await.unwrap();

        let handle = conn.play(StreamSource::track("x", 0)).await.unwrap();
        assert_eq!(handle.finished.await.unwrap(), StreamOutcome::Finished);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_exit_reports_failure() {
        let gateway = FfmpegGateway::new(no_output("false"), TokioSpawner::current());
        let mut conn = gateway.connect(EntityId(1), ChannelId(1)).await.unwrap();

        let handle = conn.play(StreamSource::track("x", 0)).await.unwrap();
        assert!(matches!(
            handle.finished.await.unwrap(),
            StreamOutcome::Failed(_)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exited_process_rejects_pause_and_resume() {
        let gateway = FfmpegGateway::new(no_output("true"), TokioSpawner::current());
        let mut conn = gateway.connect(EntityId(1), ChannelId(1)).await.unwrap();

        let handle = conn.play(StreamSource::track("x", 0)).await.unwrap();
        assert_eq!(handle.finished.await.unwrap(), StreamOutcome::Finished);

        assert!(matches!(handle.control.pause(), Err(TransportError::Control(_))));
        assert!(matches!(handle.control.resume(), Err(TransportError::Control(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn supervisors_are_tracked_by_the_spawner() {
        let spawner = TokioSpawner::current();
        let gateway = FfmpegGateway::new(no_output("true"), spawner.clone());
        let mut conn = gateway.connect(EntityId(1), ChannelId(1)).await.unwrap();

        let handle = conn.play(StreamSource::track("x", 0)).await.unwrap();
        assert_eq!(spawner.active_tasks(), 1);

        assert!(spawner.drain(std::time::Duration::from_secs(5)).await);
        assert_eq!(spawner.active_tasks(), 0);
        assert_eq!(handle.finished.await.unwrap(), StreamOutcome::Finished);
    }

    #[tokio::test]
    async fn missing_program_fails_to_open() {
        let gateway = FfmpegGateway::new(
            no_output("guildtune-no-such-binary"),
            TokioSpawner::current(),
        );
        let mut conn = gateway.connect(EntityId(1), ChannelId(1)).await.unwrap();

        assert!(matches!(
            conn.play(StreamSource::track("x", 0)).await,
            Err(TransportError::Open(_))
        ));
    }

    #[tokio::test]
    async fn closed_connection_rejects_play_and_move() {
        let gateway = FfmpegGateway::new(no_output("true"), TokioSpawner::current());
        let mut conn = gateway.connect(EntityId(1), ChannelId(1)).await.unwrap();

        conn.move_to(ChannelId(5)).await.unwrap();
        assert_eq!(conn.channel(), ChannelId(5));

        conn.disconnect().await;
        assert!(conn.play(StreamSource::track("x", 0)).await.is_err());
        assert!(conn.move_to(ChannelId(6)).await.is_err());
    }
}
