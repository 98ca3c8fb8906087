//! Entity table and public playback API.
//!
//! [`PlaybackScheduler`] maps each [`EntityId`] to the mailbox of its worker.
//! Workers are spawned lazily on first use and removed on `leave`; entities
//! never share state, so operations on different entities run concurrently
//! while operations on one entity are serialized by its worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use rand::seq::SliceRandom;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use super::command::{Command, EnqueueReceipt, Reply, ResumeOutcome};
use super::seek::NOTHING_TO_SEEK;
use super::status::{StatusSnapshot, StatusViewRef};
use super::types::{ChannelId, EntityId, JobId};
use super::utterance::synthesize_job;
use super::worker::{
    EntityWorker, WorkerContext, NOTHING_TO_PAUSE, NOTHING_TO_RESUME, NOTHING_TO_SKIP,
    NOT_CONNECTED,
};
use crate::error::{PlaybackError, PlaybackResult};
use crate::events::EventEmitter;
use crate::media::{MediaResolver, SpeechSynthesizer, TrackDescriptor};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::state::Config;
use crate::transport::VoiceGateway;

const NOT_IN_CHANNEL: &str = "Not currently connected.";

/// Handle to one running entity worker.
#[derive(Clone)]
struct EntityHandle {
    /// Distinguishes successive workers of the same entity.
    session: u64,
    tx: mpsc::Sender<Command>,
    status: watch::Receiver<StatusSnapshot>,
    cancel: CancellationToken,
}

/// Schedules sequential playback for any number of entities.
pub struct PlaybackScheduler {
    entities: DashMap<EntityId, EntityHandle>,
    next_session: AtomicU64,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    ctx: WorkerContext,
    cancel: CancellationToken,
}

impl PlaybackScheduler {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        gateway: Arc<dyn VoiceGateway>,
        emitter: Arc<dyn EventEmitter>,
        spawner: TokioSpawner,
        config: Arc<Config>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            entities: DashMap::new(),
            next_session: AtomicU64::new(1),
            synthesizer,
            ctx: WorkerContext {
                resolver,
                gateway,
                emitter,
                spawner,
                config,
            },
            cancel,
        }
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entity Table
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns the entity's handle, spawning its worker if needed.
    fn handle_for(&self, entity: EntityId) -> EntityHandle {
        match self.entities.entry(entity) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().tx.is_closed() {
                    log::debug!("[Scheduler] Replacing exited worker of entity {}", entity);
                    let handle = self.spawn_worker(entity);
                    occupied.insert(handle.clone());
                    handle
                } else {
                    occupied.get().clone()
                }
            }
            Entry::Vacant(vacant) => {
                let handle = self.spawn_worker(entity);
                vacant.insert(handle.clone());
                handle
            }
        }
    }

    fn spawn_worker(&self, entity: EntityId) -> EntityHandle {
        let (tx, rx) = mpsc::channel(self.ctx.config.command_channel_capacity);
        let cancel = self.cancel.child_token();
        let worker = EntityWorker::new(entity, self.ctx.clone(), tx.clone(), cancel.clone());
        let status = worker.status_publisher().subscribe();
        self.ctx.spawner.spawn(worker.run(rx));

        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        log::info!("[Scheduler] Spawned worker for entity {} (session {})", entity, session);
        EntityHandle {
            session,
            tx,
            status,
            cancel,
        }
    }

    /// Returns the handle of a live worker without creating one.
    fn existing(&self, entity: EntityId) -> Option<EntityHandle> {
        self.entities
            .get(&entity)
            .map(|h| h.value().clone())
            .filter(|h| !h.tx.is_closed())
    }

    /// Sends a command and waits for the worker's reply.
    async fn ask<T>(
        &self,
        handle: &EntityHandle,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> PlaybackResult<T> {
        let (reply, response) = oneshot::channel();
        handle
            .tx
            .send(make(reply))
            .await
            .map_err(|_| PlaybackError::WorkerUnavailable("worker has exited".to_string()))?;
        response
            .await
            .map_err(|_| PlaybackError::WorkerUnavailable("worker dropped the request".to_string()))?
    }

    /// Like [`ask`](Self::ask), but answers `message` when the entity has no worker.
    async fn ask_existing<T>(
        &self,
        entity: EntityId,
        message: &str,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> PlaybackResult<T> {
        let handle = self
            .existing(entity)
            .ok_or_else(|| PlaybackError::invalid_state(message))?;
        self.ask(&handle, make).await
    }

    /// Entities that currently have a worker.
    pub fn active_entities(&self) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|e| !e.value().tx.is_closed())
            .map(|e| *e.key())
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection
    // ─────────────────────────────────────────────────────────────────────────

    /// Joins `channel`, or moves there if the entity is already connected.
    pub async fn connect(&self, entity: EntityId, channel: ChannelId) -> PlaybackResult<ChannelId> {
        let handle = self.handle_for(entity);
        self.ask(&handle, |reply| Command::Connect { channel, reply })
            .await
    }

    /// Stops everything, disconnects and forgets the entity.
    pub async fn leave(&self, entity: EntityId) -> PlaybackResult<()> {
        let handle = self
            .existing(entity)
            .ok_or_else(|| PlaybackError::invalid_state(NOT_IN_CHANNEL))?;
        let result = self.ask(&handle, |reply| Command::Leave { reply }).await;
        self.entities
            .remove_if(&entity, |_, h| h.session == handle.session);
        log::info!("[Scheduler] Entity {} removed", entity);
        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Track Queue
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolves `query` and appends the result to the entity's queue.
    ///
    /// Resolution runs before the worker is involved, so a slow lookup never
    /// delays other actions on the entity. A failed lookup leaves the queue
    /// untouched.
    pub async fn enqueue(&self, entity: EntityId, query: &str) -> PlaybackResult<EnqueueReceipt> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PlaybackError::InvalidRequest(
                "Provide a song name or URL.".to_string(),
            ));
        }
        let descriptor = self
            .ctx
            .resolver
            .resolve(query)
            .await
            .map_err(PlaybackError::from)?;
        self.enqueue_descriptor(entity, descriptor).await
    }

    /// Appends an already resolved descriptor.
    pub async fn enqueue_descriptor(
        &self,
        entity: EntityId,
        descriptor: TrackDescriptor,
    ) -> PlaybackResult<EnqueueReceipt> {
        self.enqueue_all(entity, vec![Arc::new(descriptor)]).await
    }

    async fn enqueue_all(
        &self,
        entity: EntityId,
        descriptors: Vec<Arc<TrackDescriptor>>,
    ) -> PlaybackResult<EnqueueReceipt> {
        let handle = self.handle_for(entity);
        self.ask(&handle, |reply| Command::Enqueue { descriptors, reply })
            .await
    }

    /// Searches each artist, shuffles the combined results and queues them.
    pub async fn enqueue_mix(
        &self,
        entity: EntityId,
        artists: &[String],
    ) -> PlaybackResult<EnqueueReceipt> {
        let mix = &self.ctx.config.mix;
        let artists: Vec<&str> = artists
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .collect();
        if artists.is_empty() {
            return Err(PlaybackError::InvalidRequest(
                "Provide at least 1 artist.".to_string(),
            ));
        }
        if artists.len() > mix.max_artists {
            return Err(PlaybackError::InvalidRequest(format!(
                "Max {} artists allowed.",
                mix.max_artists
            )));
        }

        let searches = artists
            .iter()
            .map(|artist| self.ctx.resolver.search(artist, mix.results_per_artist));
        let mut tracks = Vec::new();
        for (artist, result) in artists.iter().zip(join_all(searches).await) {
            match result {
                Ok(found) => tracks.extend(found),
                Err(e) => log::warn!("[Scheduler] Mix search for {:?} failed: {}", artist, e),
            }
        }
        if tracks.is_empty() {
            return Err(PlaybackError::Resolution(
                "No results found for these artists.".to_string(),
            ));
        }

        tracks.shuffle(&mut rand::thread_rng());
        tracks.truncate(mix.max_tracks);
        log::info!(
            "[Scheduler] Mix of {} artist(s) for entity {}: {} track(s)",
            artists.len(),
            entity,
            tracks.len()
        );
        self.enqueue_all(entity, tracks.into_iter().map(Arc::new).collect())
            .await
    }

    /// Stops the current track; the next entry starts after the debounce.
    /// Returns the skipped title.
    pub async fn skip(&self, entity: EntityId) -> PlaybackResult<String> {
        self.ask_existing(entity, NOTHING_TO_SKIP, |reply| Command::Skip { reply })
            .await
    }

    pub async fn pause(&self, entity: EntityId) -> PlaybackResult<()> {
        self.ask_existing(entity, NOTHING_TO_PAUSE, |reply| Command::Pause { reply })
            .await
    }

    pub async fn resume(&self, entity: EntityId) -> PlaybackResult<ResumeOutcome> {
        self.ask_existing(entity, NOTHING_TO_RESUME, |reply| Command::Resume {
            reply,
        })
        .await
    }

    /// Stops playback and empties the queue. Returns how many queued tracks
    /// were dropped. Succeeds even when nothing is playing.
    pub async fn stop_and_clear(&self, entity: EntityId) -> PlaybackResult<usize> {
        match self.existing(entity) {
            Some(handle) => {
                self.ask(&handle, |reply| Command::StopAndClear { reply })
                    .await
            }
            None => Ok(0),
        }
    }

    /// Titles of the waiting entries, in play order.
    pub async fn queue_snapshot(&self, entity: EntityId) -> Vec<String> {
        let Some(handle) = self.existing(entity) else {
            return Vec::new();
        };
        let (reply, response) = oneshot::channel();
        if handle.tx.send(Command::QueueSnapshot { reply }).await.is_err() {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Seek
    // ─────────────────────────────────────────────────────────────────────────

    /// Moves the current track by `delta_secs`; returns the new offset.
    pub async fn seek(&self, entity: EntityId, delta_secs: i64) -> PlaybackResult<u64> {
        self.ask_existing(entity, NOTHING_TO_SEEK, |reply| Command::Seek {
            delta_secs,
            reply,
        })
        .await
    }

    /// Seeks back by the configured step.
    pub async fn rewind(&self, entity: EntityId) -> PlaybackResult<u64> {
        let step = i64::try_from(self.ctx.config.seek_step_secs).unwrap_or(i64::MAX);
        self.seek(entity, -step).await
    }

    /// Seeks forward by the configured step.
    pub async fn forward(&self, entity: EntityId) -> PlaybackResult<u64> {
        let step = i64::try_from(self.ctx.config.seek_step_secs).unwrap_or(i64::MAX);
        self.seek(entity, step).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Utterances
    // ─────────────────────────────────────────────────────────────────────────

    /// Queues `text` for synthesis and returns its job id immediately.
    ///
    /// Requires a connected entity. The announcement plays once synthesis is
    /// done and the connection is free of track playback.
    pub async fn submit_utterance(&self, entity: EntityId, text: &str) -> PlaybackResult<JobId> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PlaybackError::InvalidRequest(
                "Provide some text to say.".to_string(),
            ));
        }
        let handle = self
            .existing(entity)
            .ok_or_else(|| PlaybackError::invalid_state(NOT_CONNECTED))?;

        let job = JobId::new();
        self.ask(&handle, |reply| Command::BeginUtterance { job, reply })
            .await?;

        self.ctx.spawner.spawn(synthesize_job(
            entity,
            job,
            text.to_string(),
            Arc::clone(&self.synthesizer),
            handle.tx.clone(),
            handle.cancel.clone(),
            Arc::clone(&self.ctx.emitter),
        ));
        log::info!("[Scheduler] Entity {} accepted utterance job {}", entity, job);
        Ok(job)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Status
    // ─────────────────────────────────────────────────────────────────────────

    /// Last committed snapshot of the entity.
    pub fn status_snapshot(&self, entity: EntityId) -> StatusSnapshot {
        self.existing(entity)
            .map(|h| h.status.borrow().clone())
            .unwrap_or_else(|| StatusSnapshot::initial(entity))
    }

    /// Receiver that always holds the entity's latest snapshot.
    pub fn watch_status(&self, entity: EntityId) -> Option<watch::Receiver<StatusSnapshot>> {
        self.existing(entity).map(|h| h.status)
    }

    /// Stream of the entity's snapshots, starting with the current one.
    pub fn status_stream(&self, entity: EntityId) -> Option<WatchStream<StatusSnapshot>> {
        self.watch_status(entity).map(WatchStream::new)
    }

    /// Registers a new status surface; returns the one it replaces.
    pub async fn attach_status_view(
        &self,
        entity: EntityId,
        view: StatusViewRef,
    ) -> PlaybackResult<Option<StatusViewRef>> {
        let handle = self.handle_for(entity);
        let (reply, response) = oneshot::channel();
        handle
            .tx
            .send(Command::AttachView { view, reply })
            .await
            .map_err(|_| PlaybackError::WorkerUnavailable("worker has exited".to_string()))?;
        response
            .await
            .map_err(|_| PlaybackError::WorkerUnavailable("worker dropped the request".to_string()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shutdown
    // ─────────────────────────────────────────────────────────────────────────

    /// Leaves every entity, then cancels anything still running.
    pub async fn shutdown(&self) {
        let entities = self.active_entities();
        log::info!("[Scheduler] Shutting down {} entity worker(s)", entities.len());
        let leaves = entities.iter().map(|&entity| self.leave(entity));
        for (entity, result) in entities.iter().zip(join_all(leaves).await) {
            if let Err(e) = result {
                log::debug!("[Scheduler] Entity {} leave during shutdown: {}", entity, e);
            }
        }
        self.cancel.cancel();
    }
}
