//! The per-entity playback worker.
//!
//! One [`EntityWorker`] task exists per entity. It exclusively owns the
//! entity's queue, current track, voice connection and status publisher, and
//! drains a mailbox of [`Command`]s one at a time, so every transition of an
//! entity is totally ordered and nothing outside the task can observe a
//! half-applied one. Work that may suspend for long (speech synthesis, waiting
//! for a stream to end, the advance debounce) runs in tasks the worker spawns;
//! those tasks report back through the same mailbox.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::arbiter::{ConnectionArbiter, TrackDemand};
use super::command::{Command, EnqueueReceipt, ResumeOutcome};
use super::status::{controls_for, NowPlaying, PlaybackPhase, StatusPublisher, StatusSnapshot};
use super::types::{ChannelId, CurrentTrack, EntityId, PlaybackId};
use super::utterance::UtteranceQueue;
use crate::error::{PlaybackError, PlaybackResult};
use crate::events::EventEmitter;
use crate::media::{MediaResolver, StreamSource, TrackDescriptor};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::state::Config;
use crate::transport::{StreamControl, StreamOutcome, VoiceConnection, VoiceGateway};

pub(crate) const NOTHING_TO_SKIP: &str = "Nothing to skip.";
pub(crate) const NOTHING_TO_PAUSE: &str = "No track playing to pause.";
pub(crate) const NOTHING_TO_RESUME: &str = "No track paused to resume.";
pub(crate) const NOT_CONNECTED: &str = "Not connected to a voice channel.";

/// Collaborators shared by every entity worker.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub resolver: Arc<dyn MediaResolver>,
    pub gateway: Arc<dyn VoiceGateway>,
    pub emitter: Arc<dyn EventEmitter>,
    pub spawner: TokioSpawner,
    pub config: Arc<Config>,
}

/// A track stream currently open on the connection.
pub(super) struct ActiveStream {
    pub id: PlaybackId,
    pub control: Box<dyn StreamControl>,
    /// Cancelled as soon as the transport reports the end, ahead of the
    /// debounced [`Command::TrackFinished`].
    pub ended: CancellationToken,
}

impl ActiveStream {
    /// True while the transport has not reported the end of the stream.
    pub(super) fn is_live(&self) -> bool {
        !self.ended.is_cancelled()
    }
}

pub(crate) struct EntityWorker {
    pub(super) entity: EntityId,
    pub(super) ctx: WorkerContext,
    /// Mailbox of this worker, for tasks it spawns.
    pub(super) tx: mpsc::Sender<Command>,
    /// Cancelled by `leave` and by global shutdown.
    pub(super) cancel: CancellationToken,

    pub(super) queue: VecDeque<Arc<TrackDescriptor>>,
    pub(super) current: Option<CurrentTrack>,
    /// Stream carrying `current`. `None` with `current` set means the track
    /// was seeked while paused and reopens on resume.
    pub(super) stream: Option<ActiveStream>,
    pub(super) playing: bool,
    /// The current stream was stopped by a skip and its completion is pending.
    pub(super) skip_in_flight: bool,
    pub(super) retry_scheduled: bool,
    pub(super) connection: Option<Box<dyn VoiceConnection>>,
    pub(super) arbiter: ConnectionArbiter,
    pub(super) utterances: UtteranceQueue,
    next_playback: u64,

    pub(super) status: StatusPublisher,
    pub(super) notice: Option<String>,
}

impl EntityWorker {
    pub(crate) fn new(
        entity: EntityId,
        ctx: WorkerContext,
        tx: mpsc::Sender<Command>,
        cancel: CancellationToken,
    ) -> Self {
        let status = StatusPublisher::new(entity, Arc::clone(&ctx.emitter));
        Self {
            entity,
            ctx,
            tx,
            cancel,
            queue: VecDeque::new(),
            current: None,
            stream: None,
            playing: false,
            skip_in_flight: false,
            retry_scheduled: false,
            connection: None,
            arbiter: ConnectionArbiter::new(),
            utterances: UtteranceQueue::default(),
            next_playback: 0,
            status,
            notice: None,
        }
    }

    pub(crate) fn status_publisher(&self) -> &StatusPublisher {
        &self.status
    }

    /// Drains the mailbox until `leave`, shutdown, or every sender is gone.
    pub(crate) async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        log::info!("[Worker] Entity {} started", self.entity);
        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("[Worker] Entity {} cancelled", self.entity);
                    self.teardown().await;
                    break;
                }

                cmd = rx.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle(cmd).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        self.teardown().await;
                        break;
                    }
                }
            }
        }

        // Artifacts that arrived after the last command must not leak.
        rx.close();
        while let Ok(cmd) = rx.try_recv() {
            if let Command::UtteranceReady { job, artifact } = cmd {
                artifact.discard();
                self.utterances.discarded(self.entity, job, &self.ctx.emitter);
            }
        }
        log::info!("[Worker] Entity {} stopped", self.entity);
    }

    async fn handle(&mut self, cmd: Command) -> ControlFlow<()> {
        match cmd {
            Command::Connect { channel, reply } => {
                let result = self.connect(channel).await;
                self.commit().await;
                let _ = reply.send(result);
            }
            Command::Enqueue { descriptors, reply } => {
                let result = self.enqueue(descriptors).await;
                self.commit().await;
                let _ = reply.send(result);
            }
            Command::Skip { reply } => {
                let result = self.skip().await;
                self.commit().await;
                let _ = reply.send(result);
            }
            Command::Pause { reply } => {
                let result = self.pause();
                self.commit().await;
                let _ = reply.send(result);
            }
            Command::Resume { reply } => {
                let result = self.resume().await;
                self.commit().await;
                let _ = reply.send(result);
            }
            Command::StopAndClear { reply } => {
                let cleared = self.stop_and_clear();
                self.commit().await;
                let _ = reply.send(Ok(cleared));
            }
            Command::Seek { delta_secs, reply } => {
                let result = self.seek(delta_secs).await;
                self.commit().await;
                let _ = reply.send(result);
            }
            Command::Leave { reply } => {
                self.teardown().await;
                let _ = reply.send(Ok(()));
                return ControlFlow::Break(());
            }
            Command::QueueSnapshot { reply } => {
                let titles = self.queue.iter().map(|d| d.title.clone()).collect();
                let _ = reply.send(titles);
            }
            Command::AttachView { view, reply } => {
                let previous = self.status.attach_view(view);
                self.commit().await;
                let _ = reply.send(previous);
            }
            Command::BeginUtterance { job, reply } => {
                let result = self.begin_utterance(job);
                self.commit().await;
                let _ = reply.send(result);
            }
            Command::UtteranceReady { job, artifact } => {
                self.utterance_ready(job, artifact);
                self.commit().await;
            }
            Command::UtteranceFailed { job, error } => {
                self.utterance_failed(job, error);
                self.commit().await;
            }
            Command::NextUtterance { finished, reply } => {
                self.next_utterance(finished, reply).await;
                self.commit().await;
            }
            Command::TrackFinished { playback, outcome } => {
                if self.track_finished(playback, outcome).await {
                    self.commit().await;
                }
            }
            Command::RetryAdvance => {
                self.retry_scheduled = false;
                if self.current.is_none() {
                    self.advance().await;
                }
                self.commit().await;
            }
        }
        ControlFlow::Continue(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection
    // ─────────────────────────────────────────────────────────────────────────

    async fn connect(&mut self, channel: ChannelId) -> PlaybackResult<ChannelId> {
        if let Some(conn) = self.connection.as_mut() {
            if conn.channel() != channel {
                conn.move_to(channel).await.map_err(PlaybackError::from)?;
                log::info!("[Worker] Entity {} moved to channel {}", self.entity, channel);
                self.notice = Some(format!("Moved to channel {}.", channel));
            }
            return Ok(channel);
        }

        let conn = self
            .ctx
            .gateway
            .connect(self.entity, channel)
            .await
            .map_err(PlaybackError::from)?;
        self.connection = Some(conn);
        log::info!("[Worker] Entity {} joined channel {}", self.entity, channel);
        self.notice = Some(format!("Joined channel {}.", channel));

        if self.current.is_none() && !self.queue.is_empty() {
            self.advance().await;
        }
        Ok(channel)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Track Queue
    // ─────────────────────────────────────────────────────────────────────────

    async fn enqueue(
        &mut self,
        descriptors: Vec<Arc<TrackDescriptor>>,
    ) -> PlaybackResult<EnqueueReceipt> {
        let first = descriptors
            .first()
            .cloned()
            .ok_or_else(|| PlaybackError::InvalidRequest("nothing to enqueue".to_string()))?;
        let added = descriptors.len();
        self.queue.extend(descriptors);
        log::info!(
            "[Worker] Entity {} queued {} track(s), queue length {}",
            self.entity,
            added,
            self.queue.len()
        );

        if self.current.is_none()
            && !self.retry_scheduled
            && self.arbiter.demand() != TrackDemand::Advance
        {
            self.advance().await;
        }

        let position = self
            .queue
            .iter()
            .position(|d| Arc::ptr_eq(d, &first))
            .map(|i| i + 1);
        Ok(EnqueueReceipt {
            title: first.title.clone(),
            added,
            position,
        })
    }

    /// Starts the next playable queue entry, or goes idle.
    ///
    /// Must only be called once the previous track stream has ended or been
    /// stopped. Entries that fail to open are reported and skipped, up to
    /// `max_advance_skips` per call; past that, a retry is scheduled after the
    /// debounce delay so the worker neither stalls nor spins.
    pub(super) async fn advance(&mut self) {
        self.current = None;
        self.stream = None;
        self.playing = false;
        self.skip_in_flight = false;
        self.arbiter.release_track();

        if self.connection.is_none() || self.queue.is_empty() {
            return;
        }
        if !self.arbiter.request_track(TrackDemand::Advance) {
            log::debug!(
                "[Worker] Entity {} advance deferred behind announcement",
                self.entity
            );
            return;
        }

        let max_skips = self.ctx.config.max_advance_skips;
        let mut skipped = 0;
        while let Some(descriptor) = self.queue.pop_front() {
            let title = descriptor.title.clone();
            match self.start_track(CurrentTrack::new(descriptor, 0)).await {
                Ok(()) => return,
                Err(err) => {
                    log::warn!(
                        "[Worker] Entity {} skipping unplayable {:?}: {}",
                        self.entity,
                        title,
                        err
                    );
                    self.notice = Some(format!("Skipped \"{}\": {}", title, err));
                    skipped += 1;
                    if skipped >= max_skips && !self.queue.is_empty() {
                        self.schedule_retry();
                        return;
                    }
                }
            }
        }
    }

    fn schedule_retry(&mut self) {
        if self.retry_scheduled {
            return;
        }
        self.retry_scheduled = true;
        let tx = self.tx.clone();
        let delay = self.ctx.config.advance_debounce();
        self.ctx.spawner.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Command::RetryAdvance).await;
        });
    }

    /// Reopens `track` at its offset and starts it on the connection.
    pub(super) async fn start_track(&mut self, track: CurrentTrack) -> PlaybackResult<()> {
        let source = self
            .ctx
            .resolver
            .reopen_at(&track.descriptor, track.offset_secs)
            .await
            .map_err(|e| PlaybackError::StreamOpen(e.to_string()))?;
        self.open_track_stream(track, source).await
    }

    /// Opens `source` for `track` and makes it current.
    pub(super) async fn open_track_stream(
        &mut self,
        track: CurrentTrack,
        source: StreamSource,
    ) -> PlaybackResult<()> {
        let conn = self
            .connection
            .as_mut()
            .ok_or_else(|| PlaybackError::invalid_state(NOT_CONNECTED))?;
        let handle = conn
            .play(source)
            .await
            .map_err(|e| PlaybackError::StreamOpen(e.to_string()))?;

        self.next_playback += 1;
        let id = PlaybackId(self.next_playback);
        self.arbiter.grant_track(id);
        let ended = CancellationToken::new();
        self.watch_track(id, handle.finished, ended.clone());

        log::info!(
            "[Worker] Entity {} playing {:?} from {}s",
            self.entity,
            track.descriptor.title,
            track.offset_secs
        );
        self.stream = Some(ActiveStream {
            id,
            control: handle.control,
            ended,
        });
        self.current = Some(track);
        self.playing = true;
        self.skip_in_flight = false;
        Ok(())
    }

    /// Turns the stream's one-shot completion into a debounced
    /// [`Command::TrackFinished`] for attempt `id`. `ended` is cancelled
    /// without waiting for the debounce.
    fn watch_track(
        &self,
        id: PlaybackId,
        finished: tokio::sync::oneshot::Receiver<StreamOutcome>,
        ended: CancellationToken,
    ) {
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        let debounce = self.ctx.config.advance_debounce();
        self.ctx.spawner.spawn(async move {
            let outcome = finished.await.unwrap_or(StreamOutcome::Stopped);
            ended.cancel();
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(debounce) => {
                    let _ = tx.send(Command::TrackFinished { playback: id, outcome }).await;
                }
            }
        });
    }

    /// Returns false for stale notifications, which change nothing.
    async fn track_finished(&mut self, playback: PlaybackId, outcome: StreamOutcome) -> bool {
        if self.stream.as_ref().map(|s| s.id) != Some(playback) {
            log::debug!(
                "[Worker] Entity {} ignoring stale completion of {:?}",
                self.entity,
                playback
            );
            return false;
        }

        match outcome {
            StreamOutcome::Failed(reason) => {
                let err = PlaybackError::TransportRuntime(reason);
                log::warn!("[Worker] Entity {}: {}", self.entity, err);
                self.report(&err);
            }
            StreamOutcome::Finished | StreamOutcome::Stopped => {
                log::debug!("[Worker] Entity {} stream {:?} ended", self.entity, playback);
            }
        }
        self.advance().await;
        true
    }

    async fn skip(&mut self) -> PlaybackResult<String> {
        let title = match (&self.current, self.skip_in_flight) {
            (Some(current), false) => current.descriptor.title.clone(),
            _ => return Err(PlaybackError::invalid_state(NOTHING_TO_SKIP)),
        };

        // With a live stream the completion notification performs the advance.
        let stopped = self.stream.as_ref().map(|s| s.control.stop()).is_some();
        if stopped {
            self.skip_in_flight = true;
        } else {
            self.advance().await;
        }
        log::info!("[Worker] Entity {} skipped {:?}", self.entity, title);
        self.notice = Some(format!("Skipped \"{}\".", title));
        Ok(title)
    }

    fn pause(&mut self) -> PlaybackResult<()> {
        if !self.playing && self.arbiter.demand() == TrackDemand::Resume {
            // Cancels a resume still waiting for an announcement to end.
            self.arbiter.clear_demand();
            return Ok(());
        }
        // A stream that already ended is about to be replaced by the next entry.
        let stream = match (&self.stream, self.playing, self.skip_in_flight) {
            (Some(stream), true, false) if stream.is_live() => stream,
            _ => return Err(PlaybackError::invalid_state(NOTHING_TO_PAUSE)),
        };

        stream.control.pause().map_err(PlaybackError::from)?;
        self.playing = false;
        self.arbiter.release_track();
        self.notice = Some("Paused.".to_string());
        Ok(())
    }

    async fn resume(&mut self) -> PlaybackResult<ResumeOutcome> {
        let ended = self.stream.as_ref().is_some_and(|s| !s.is_live());
        if self.playing || self.current.is_none() || self.skip_in_flight || ended {
            return Err(PlaybackError::invalid_state(NOTHING_TO_RESUME));
        }
        if !self.arbiter.request_track(TrackDemand::Resume) {
            self.notice = Some("Resuming after the announcement.".to_string());
            return Ok(ResumeOutcome::Deferred);
        }
        self.resume_now().await?;
        self.notice = Some("Resumed.".to_string());
        Ok(ResumeOutcome::Resumed)
    }

    /// Resumes the paused current track; the caller holds the track side's
    /// claim on the connection.
    async fn resume_now(&mut self) -> PlaybackResult<()> {
        if let Some(stream) = self.stream.as_ref() {
            if !stream.is_live() {
                return Err(PlaybackError::invalid_state(NOTHING_TO_RESUME));
            }
            stream.control.resume().map_err(PlaybackError::from)?;
            let id = stream.id;
            self.arbiter.grant_track(id);
            self.playing = true;
            return Ok(());
        }

        let Some(track) = self.current.clone() else {
            return Ok(());
        };
        if let Err(err) = self.start_track(track).await {
            log::warn!("[Worker] Entity {} could not resume: {}", self.entity, err);
            self.report(&err);
            self.advance().await;
            return Err(err);
        }
        Ok(())
    }

    /// Serves track work that waited for an announcement to finish.
    pub(super) async fn serve_demand(&mut self, demand: TrackDemand) {
        match demand {
            TrackDemand::None => {}
            TrackDemand::Advance => {
                if self.current.is_none() {
                    self.advance().await;
                }
            }
            TrackDemand::Resume => {
                if self.current.is_some() && !self.playing {
                    if let Err(err) = self.resume_now().await {
                        log::warn!("[Worker] Entity {} deferred resume failed: {}", self.entity, err);
                    }
                }
            }
        }
    }

    fn stop_and_clear(&mut self) -> usize {
        let cleared = self.queue.len();
        self.queue.clear();
        // Dropping the stream record retires its id, so its completion is stale.
        if let Some(stream) = self.stream.take() {
            stream.control.stop();
        }
        self.current = None;
        self.playing = false;
        self.skip_in_flight = false;
        self.arbiter.release_track();
        self.arbiter.clear_demand();

        log::info!(
            "[Worker] Entity {} stopped, cleared {} queued track(s)",
            self.entity,
            cleared
        );
        self.notice = Some(format!("Stopped playback and cleared {} track(s).", cleared));
        cleared
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Teardown & Status
    // ─────────────────────────────────────────────────────────────────────────

    /// Stops everything, releases the connection and publishes the terminal
    /// snapshot. Safe to call more than once.
    async fn teardown(&mut self) {
        self.cancel.cancel();
        self.queue.clear();
        if let Some(stream) = self.stream.take() {
            stream.control.stop();
        }
        self.current = None;
        self.playing = false;
        self.skip_in_flight = false;
        self.arbiter.release_track();
        self.arbiter.clear_demand();
        self.utterances
            .abandon(self.entity, &mut self.arbiter, &self.ctx.emitter);

        let was_connected = self.connection.is_some();
        if let Some(mut conn) = self.connection.take() {
            conn.disconnect().await;
        }

        if was_connected || self.status.latest().phase != PlaybackPhase::Disconnected {
            let mut snapshot = self.build_snapshot();
            snapshot.phase = PlaybackPhase::Disconnected;
            snapshot.controls = Vec::new();
            self.status.publish(snapshot);
            self.status.publish_removed();
            log::info!("[Worker] Entity {} left", self.entity);
        }
    }

    /// Shows `err` as the next notice unless it only concerns the caller.
    pub(super) fn report(&mut self, err: &PlaybackError) {
        if err.is_notice() {
            self.notice = Some(err.to_string());
        }
    }

    fn phase(&self) -> PlaybackPhase {
        if self.playing {
            PlaybackPhase::Playing
        } else if self.current.is_some() {
            PlaybackPhase::Paused
        } else {
            PlaybackPhase::Idle
        }
    }

    fn build_snapshot(&mut self) -> StatusSnapshot {
        let phase = self.phase();
        let connected_channel = self.connection.as_ref().map(|c| c.channel());
        StatusSnapshot {
            entity: self.entity,
            revision: 0,
            phase,
            now_playing: self.current.as_ref().map(NowPlaying::from),
            queue_len: self.queue.len(),
            pending_utterances: self.utterances.pending(),
            announcing: self.arbiter.utterance_on_air(),
            connected_channel,
            controls: controls_for(phase, !self.skip_in_flight, connected_channel.is_some()),
            notice: self.notice.take(),
            view: None,
            timestamp: 0,
        }
    }

    /// Finishes a transition: hands a free connection to a waiting
    /// announcement, then publishes the resulting state.
    async fn commit(&mut self) {
        self.dispatch_utterances().await;
        let snapshot = self.build_snapshot();
        self.status.publish(snapshot);
    }
}
