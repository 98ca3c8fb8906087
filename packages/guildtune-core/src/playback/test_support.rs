//! Deterministic fakes for scheduler tests.
//!
//! Streams never end on their own: tests finish or fail them by index through
//! [`FakeTransport`], in the order they were opened.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;

use super::scheduler::PlaybackScheduler;
use super::types::{ChannelId, EntityId};
use crate::events::RecordingEventEmitter;
use crate::media::{
    MediaResolver, ResolveError, SourceKind, SpeechArtifact, SpeechSynthesizer, StreamSource,
    SynthesisError, TrackDescriptor,
};
use crate::runtime::TokioSpawner;
use crate::state::Config;
use crate::transport::{
    StreamControl, StreamHandle, StreamOutcome, TransportError, VoiceConnection, VoiceGateway,
};

/// Lets spawned tasks and debounce timers run to completion.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves any query to `https://media.test/<query>` titled `<query>`.
///
/// Queries starting with `missing` resolve to nothing; titles starting with
/// `broken` cannot be reopened.
#[derive(Default)]
pub(crate) struct FakeResolver {
    reopens: Mutex<Vec<(String, u64)>>,
    fail_reopens: AtomicBool,
}

impl FakeResolver {
    pub fn reopens(&self) -> Vec<(String, u64)> {
        self.reopens.lock().clone()
    }

    pub fn fail_reopens(&self, fail: bool) {
        self.fail_reopens.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaResolver for FakeResolver {
    async fn resolve(&self, query: &str) -> Result<TrackDescriptor, ResolveError> {
        if query.starts_with("missing") {
            return Err(ResolveError::NotFound(query.to_string()));
        }
        Ok(TrackDescriptor::new(
            format!("https://media.test/{}", query),
            query,
        ))
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TrackDescriptor>, ResolveError> {
        if query.starts_with("missing") {
            return Err(ResolveError::NotFound(query.to_string()));
        }
        Ok((0..limit)
            .map(|i| {
                TrackDescriptor::new(
                    format!("https://media.test/{}/{}", query, i),
                    format!("{} #{}", query, i),
                )
            })
            .collect())
    }

    async fn reopen_at(
        &self,
        descriptor: &TrackDescriptor,
        offset_secs: u64,
    ) -> Result<StreamSource, ResolveError> {
        self.reopens
            .lock()
            .push((descriptor.title.clone(), offset_secs));
        if descriptor.title.starts_with("broken") || self.fail_reopens.load(Ordering::SeqCst) {
            return Err(ResolveError::Unplayable(descriptor.title.clone()));
        }
        Ok(StreamSource::track(&descriptor.stream_url, offset_secs))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Synthesizer
// ─────────────────────────────────────────────────────────────────────────────

/// Writes the text itself as the artifact. The text `fail` fails.
///
/// While [`FakeSynth::hold`] is in effect, synthesis blocks before writing
/// anything until [`FakeSynth::release`].
pub(crate) struct FakeSynth {
    dir: tempfile::TempDir,
    spoken: Mutex<Vec<String>>,
    counter: AtomicUsize,
    started: AtomicUsize,
    held: AtomicBool,
    gate: Notify,
}

impl FakeSynth {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            spoken: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            held: AtomicBool::new(false),
            gate: Notify::new(),
        }
    }

    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.notify_waiters();
    }

    /// Number of synthesis calls entered so far.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }

    pub fn artifacts_on_disk(&self) -> usize {
        std::fs::read_dir(self.dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynth {
    async fn synthesize(&self, text: &str) -> Result<SpeechArtifact, SynthesisError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if self.held.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        if text == "fail" {
            return Err(SynthesisError::Process("fake failure".to_string()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let path: PathBuf = self.dir.path().join(format!("tts_{}.wav", n));
        std::fs::write(&path, text)?;
        self.spoken.lock().push(text.to_string());
        Ok(SpeechArtifact::new(path))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// One stream opened on a fake connection.
pub(crate) struct FakePlay {
    pub source: StreamSource,
    finisher: Mutex<Option<oneshot::Sender<StreamOutcome>>>,
    outcome: Mutex<Option<StreamOutcome>>,
    paused: AtomicBool,
}

impl FakePlay {
    fn complete(&self, outcome: StreamOutcome) {
        if let Some(tx) = self.finisher.lock().take() {
            *self.outcome.lock() = Some(outcome.clone());
            let _ = tx.send(outcome);
        }
    }

    pub fn is_track(&self) -> bool {
        self.source.kind == SourceKind::Track
    }

    /// Title of a fake-resolved track (the last locator segment).
    pub fn title(&self) -> String {
        self.source
            .locator
            .trim_start_matches("https://media.test/")
            .to_string()
    }

    pub fn outcome(&self) -> Option<StreamOutcome> {
        self.outcome.lock().clone()
    }
}

struct FakeControl(Arc<FakePlay>);

impl StreamControl for FakeControl {
    fn pause(&self) -> Result<(), TransportError> {
        self.0.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<(), TransportError> {
        self.0.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.0.complete(StreamOutcome::Stopped);
    }
}

/// Shared record of every connection and stream.
#[derive(Default)]
pub(crate) struct FakeTransport {
    plays: Mutex<Vec<Arc<FakePlay>>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl FakeTransport {
    pub fn plays(&self) -> Vec<Arc<FakePlay>> {
        self.plays.lock().clone()
    }

    fn play(&self, index: usize) -> Arc<FakePlay> {
        Arc::clone(&self.plays.lock()[index])
    }

    /// Ends stream `index` naturally.
    pub fn finish(&self, index: usize) {
        self.play(index).complete(StreamOutcome::Finished);
    }

    /// Fails stream `index` mid-delivery.
    pub fn fail(&self, index: usize) {
        self.play(index)
            .complete(StreamOutcome::Failed("connection reset".to_string()));
    }

    pub fn is_paused(&self, index: usize) -> bool {
        self.play(index).paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self, index: usize) -> bool {
        self.play(index).outcome() == Some(StreamOutcome::Stopped)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

struct FakeConnection {
    channel: ChannelId,
    transport: Arc<FakeTransport>,
    opened: Vec<Arc<FakePlay>>,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn channel(&self) -> ChannelId {
        self.channel
    }

    async fn move_to(&mut self, channel: ChannelId) -> Result<(), TransportError> {
        self.channel = channel;
        Ok(())
    }

    async fn play(&mut self, source: StreamSource) -> Result<StreamHandle, TransportError> {
        let (tx, finished) = oneshot::channel();
        let play = Arc::new(FakePlay {
            source,
            finisher: Mutex::new(Some(tx)),
            outcome: Mutex::new(None),
            paused: AtomicBool::new(false),
        });
        self.transport.plays.lock().push(Arc::clone(&play));
        self.opened.push(Arc::clone(&play));
        Ok(StreamHandle {
            control: Box::new(FakeControl(play)),
            finished,
        })
    }

    async fn disconnect(&mut self) {
        for play in self.opened.drain(..) {
            play.complete(StreamOutcome::Stopped);
        }
        self.transport.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct FakeGateway(pub Arc<FakeTransport>);

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn connect(
        &self,
        _entity: EntityId,
        channel: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, TransportError> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            channel,
            transport: Arc::clone(&self.0),
            opened: Vec::new(),
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct Harness {
    pub scheduler: PlaybackScheduler,
    pub resolver: Arc<FakeResolver>,
    pub synth: Arc<FakeSynth>,
    pub transport: Arc<FakeTransport>,
    pub emitter: Arc<RecordingEventEmitter>,
}

impl Harness {
    pub fn new() -> Self {
        let resolver = Arc::new(FakeResolver::default());
        let synth = Arc::new(FakeSynth::new());
        let transport = Arc::new(FakeTransport::default());
        let emitter = Arc::new(RecordingEventEmitter::default());
        let scheduler = PlaybackScheduler::new(
            resolver.clone(),
            synth.clone(),
            Arc::new(FakeGateway(Arc::clone(&transport))),
            emitter.clone(),
            TokioSpawner::current(),
            Arc::new(Config::default()),
            CancellationToken::new(),
        );
        Self {
            scheduler,
            resolver,
            synth,
            transport,
            emitter,
        }
    }
}
