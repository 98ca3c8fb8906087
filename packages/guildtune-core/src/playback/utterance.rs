//! Synthesized announcements.
//!
//! Each utterance moves through three stages:
//!
//! 1. a synthesis task renders the text to a [`SpeechArtifact`] outside the
//!    worker and reports it back as [`Command::UtteranceReady`];
//! 2. the worker queues the artifact and, when the connection arbiter grants
//!    it, opens it on the connection and hands it to the consumption loop;
//! 3. the consumption loop waits for the stream to end, deletes the artifact
//!    and asks for the next one.
//!
//! At most one consumption loop runs per entity, so utterances play strictly
//! in the order their synthesis finished.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::arbiter::ConnectionArbiter;
use super::command::{Command, UtteranceGrant};
use super::types::{EntityId, JobId};
use super::worker::{EntityWorker, NOT_CONNECTED};
use crate::error::{PlaybackError, PlaybackResult};
use crate::events::{EventEmitter, UtteranceEvent};
use crate::media::{SpeechArtifact, SpeechSynthesizer, StreamSource};
use crate::runtime::TaskSpawner;
use crate::transport::{StreamControl, StreamOutcome};
use crate::utils::now_millis;

/// Utterance jobs owned by one entity worker.
#[derive(Default)]
pub(crate) struct UtteranceQueue {
    /// Jobs whose synthesis is still running.
    synthesizing: HashSet<JobId>,
    /// Artifacts waiting for the connection, in arrival order.
    ready: VecDeque<(JobId, SpeechArtifact)>,
    on_air: Option<(JobId, Box<dyn StreamControl>)>,
    /// The consumption loop's pending request for its next grant.
    waiter: Option<oneshot::Sender<Option<UtteranceGrant>>>,
    loop_active: bool,
}

impl UtteranceQueue {
    /// Jobs synthesizing, waiting, or on air.
    pub(crate) fn pending(&self) -> usize {
        self.synthesizing.len() + self.ready.len() + usize::from(self.on_air.is_some())
    }

    pub(crate) fn discarded(
        &mut self,
        entity: EntityId,
        job: JobId,
        emitter: &Arc<dyn EventEmitter>,
    ) {
        self.synthesizing.remove(&job);
        emitter.emit_utterance(UtteranceEvent::Discarded {
            entity,
            job,
            timestamp: now_millis(),
        });
    }

    /// Stops the utterance on air and drops every waiting artifact.
    ///
    /// Jobs still synthesizing discard their own artifact once they see the
    /// entity's cancellation.
    pub(crate) fn abandon(
        &mut self,
        entity: EntityId,
        arbiter: &mut ConnectionArbiter,
        emitter: &Arc<dyn EventEmitter>,
    ) {
        if let Some((job, control)) = self.on_air.take() {
            control.stop();
            arbiter.release_utterance(job);
        }
        for (job, artifact) in self.ready.drain(..) {
            artifact.discard();
            emitter.emit_utterance(UtteranceEvent::Discarded {
                entity,
                job,
                timestamp: now_millis(),
            });
        }
        self.synthesizing.clear();
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.send(None);
        }
        self.loop_active = false;
    }
}

impl EntityWorker {
    pub(super) fn begin_utterance(&mut self, job: JobId) -> PlaybackResult<()> {
        if self.connection.is_none() {
            return Err(PlaybackError::invalid_state(NOT_CONNECTED));
        }
        self.utterances.synthesizing.insert(job);
        log::debug!("[Utterance] Entity {} synthesizing job {}", self.entity, job);
        Ok(())
    }

    pub(super) fn utterance_ready(&mut self, job: JobId, artifact: SpeechArtifact) {
        self.utterances.synthesizing.remove(&job);
        self.utterances.ready.push_back((job, artifact));
        self.ctx.emitter.emit_utterance(UtteranceEvent::Queued {
            entity: self.entity,
            job,
            timestamp: now_millis(),
        });
        log::info!(
            "[Utterance] Entity {} queued job {} ({} waiting)",
            self.entity,
            job,
            self.utterances.ready.len()
        );
        self.ensure_consumer();
    }

    pub(super) fn utterance_failed(&mut self, job: JobId, error: String) {
        self.utterances.synthesizing.remove(&job);
        log::warn!("[Utterance] Entity {} job {} failed: {}", self.entity, job, error);
        self.report(&PlaybackError::Synthesis(error.clone()));
        self.ctx.emitter.emit_utterance(UtteranceEvent::Failed {
            entity: self.entity,
            job,
            error,
            timestamp: now_millis(),
        });
    }

    /// Handles the consumption loop asking for its next grant.
    pub(super) async fn next_utterance(
        &mut self,
        finished: Option<JobId>,
        reply: oneshot::Sender<Option<UtteranceGrant>>,
    ) {
        if let Some(job) = finished {
            if self.utterances.on_air.as_ref().map(|(j, _)| *j) == Some(job) {
                self.utterances.on_air = None;
            }
            self.ctx.emitter.emit_utterance(UtteranceEvent::Finished {
                entity: self.entity,
                job,
                timestamp: now_millis(),
            });
            let demand = self.arbiter.release_utterance(job);
            self.serve_demand(demand).await;
        }

        if self.utterances.ready.is_empty() {
            self.utterances.loop_active = false;
            let _ = reply.send(None);
        } else {
            self.utterances.waiter = Some(reply);
        }
    }

    fn ensure_consumer(&mut self) {
        if self.utterances.loop_active || self.utterances.ready.is_empty() {
            return;
        }
        self.utterances.loop_active = true;
        let entity = self.entity;
        let tx = self.tx.clone();
        self.ctx.spawner.spawn(run_utterance_loop(entity, tx));
    }

    /// Starts the next waiting utterance if the arbiter lets it on air.
    pub(super) async fn dispatch_utterances(&mut self) {
        loop {
            if self.connection.is_none() || self.utterances.waiter.is_none() {
                return;
            }
            let Some(job) = self.utterances.ready.front().map(|(job, _)| *job) else {
                return;
            };
            if !self.arbiter.try_grant_utterance(job) {
                return;
            }
            let Some((job, artifact)) = self.utterances.ready.pop_front() else {
                return;
            };
            let Some(conn) = self.connection.as_mut() else {
                return;
            };

            let played = conn.play(StreamSource::utterance(&artifact)).await;
            match played {
                Ok(handle) => {
                    let Some(waiter) = self.utterances.waiter.take() else {
                        return;
                    };
                    log::info!("[Utterance] Entity {} playing job {}", self.entity, job);
                    self.utterances.on_air = Some((job, handle.control));
                    self.ctx.emitter.emit_utterance(UtteranceEvent::Started {
                        entity: self.entity,
                        job,
                        timestamp: now_millis(),
                    });

                    let grant = UtteranceGrant {
                        job,
                        artifact,
                        finished: handle.finished,
                    };
                    if let Err(Some(grant)) = waiter.send(Some(grant)) {
                        log::warn!("[Utterance] Entity {} consumer went away", self.entity);
                        if let Some((_, control)) = self.utterances.on_air.take() {
                            control.stop();
                        }
                        grant.artifact.discard();
                        self.utterances.loop_active = false;
                        let demand = self.arbiter.release_utterance(job);
                        self.serve_demand(demand).await;
                        self.ensure_consumer();
                    }
                    return;
                }
                Err(err) => {
                    log::warn!(
                        "[Utterance] Entity {} could not play job {}: {}",
                        self.entity,
                        job,
                        err
                    );
                    artifact.discard();
                    let demand = self.arbiter.release_utterance(job);
                    let err = PlaybackError::from(err);
                    self.report(&err);
                    self.ctx.emitter.emit_utterance(UtteranceEvent::Failed {
                        entity: self.entity,
                        job,
                        error: err.to_string(),
                        timestamp: now_millis(),
                    });
                    self.serve_demand(demand).await;
                }
            }
        }
    }
}

/// Plays granted utterances one after another until none are left.
pub(crate) async fn run_utterance_loop(entity: EntityId, tx: mpsc::Sender<Command>) {
    let mut finished = None;
    loop {
        let (reply, granted) = oneshot::channel();
        let request = Command::NextUtterance {
            finished: finished.take(),
            reply,
        };
        if tx.send(request).await.is_err() {
            break;
        }
        let grant = match granted.await {
            Ok(Some(grant)) => grant,
            _ => break,
        };

        match grant.finished.await.unwrap_or(StreamOutcome::Stopped) {
            StreamOutcome::Failed(reason) => {
                log::warn!("[Utterance] Entity {} job {} failed mid-stream: {}", entity, grant.job, reason);
            }
            outcome => {
                log::debug!("[Utterance] Entity {} job {} ended: {:?}", entity, grant.job, outcome);
            }
        }
        grant.artifact.discard();
        finished = Some(grant.job);
    }
    log::debug!("[Utterance] Entity {} consumer stopped", entity);
}

/// Synthesizes `text` and delivers the artifact to the entity's worker.
///
/// If the entity left in the meantime the artifact is deleted on the spot.
pub(crate) async fn synthesize_job(
    entity: EntityId,
    job: JobId,
    text: String,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
    emitter: Arc<dyn EventEmitter>,
) {
    let discarded = |artifact: SpeechArtifact| {
        artifact.discard();
        emitter.emit_utterance(UtteranceEvent::Discarded {
            entity,
            job,
            timestamp: now_millis(),
        });
    };

    match synthesizer.synthesize(&text).await {
        Ok(artifact) => {
            if cancel.is_cancelled() {
                log::debug!("[Utterance] Entity {} gone, dropping job {}", entity, job);
                discarded(artifact);
                return;
            }
            if let Err(mpsc::error::SendError(cmd)) =
                tx.send(Command::UtteranceReady { job, artifact }).await
            {
                if let Command::UtteranceReady { artifact, .. } = cmd {
                    discarded(artifact);
                }
            }
        }
        Err(err) => {
            let _ = tx
                .send(Command::UtteranceFailed {
                    job,
                    error: err.to_string(),
                })
                .await;
        }
    }
}
