use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{AudioClip, Backend, PlaybackSignal, SessionId, SpeechError, Utterance, VoiceDescriptor};

/// Callback receiving session-tagged playback signals.
pub type SignalHandler = Arc<dyn Fn(SessionId, PlaybackSignal) + Send + Sync>;

/// Where an adapter reports progress for one playback session.
///
/// Every signal is tagged with the session that created the sink, so a
/// coordinator can drop anything arriving after the session was superseded.
#[derive(Clone)]
pub struct PlaybackSink {
    session_id: SessionId,
    handler: SignalHandler,
    live_session: Option<Arc<AtomicU64>>,
}

impl PlaybackSink {
    pub fn new(session_id: SessionId, handler: SignalHandler) -> Self {
        Self {
            session_id,
            handler,
            live_session: None,
        }
    }

    /// Track the owner's current session so adapters can skip work for a
    /// session that was superseded while they were busy.
    pub fn with_live_session(mut self, live_session: Arc<AtomicU64>) -> Self {
        self.live_session = Some(live_session);
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// False once the owner has moved on to another session.
    pub fn is_current(&self) -> bool {
        self.live_session
            .as_ref()
            .map_or(true, |live| live.load(Ordering::SeqCst) == self.session_id.0)
    }

    pub fn emit(&self, signal: PlaybackSignal) {
        (self.handler)(self.session_id, signal);
    }
}

impl std::fmt::Debug for PlaybackSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSink")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Result of a backend health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthStatus {
    pub available: bool,
}

impl HealthStatus {
    pub fn available() -> Self {
        Self { available: true }
    }

    pub fn unavailable() -> Self {
        Self { available: false }
    }
}

/// Port implemented by every speech-output backend adapter.
///
/// Adapters translate engine-specific behaviour and errors into
/// [`PlaybackSignal`]s and [`SpeechError`]s; nothing platform-specific leaks
/// past this trait.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Which backend family this adapter drives.
    fn backend(&self) -> Backend;

    /// Voices this backend currently offers.
    async fn list_voices(&self) -> Result<Vec<VoiceDescriptor>, SpeechError>;

    /// Start speaking. Returns once playback has been handed to the engine;
    /// progress arrives through `sink`.
    ///
    /// Backends that synthesize audio bytes return the clip so the caller can
    /// cache it for replay.
    async fn speak(
        &self,
        utterance: &Utterance,
        sink: PlaybackSink,
    ) -> Result<Option<AudioClip>, SpeechError>;

    /// Stop playback. Must be safe to call when nothing is playing.
    async fn stop(&self) -> Result<(), SpeechError>;

    async fn pause(&self) -> Result<(), SpeechError>;

    async fn resume(&self) -> Result<(), SpeechError>;

    /// Probe the backend. On-device backends are always available.
    async fn health_check(&self, _timeout: Duration) -> HealthStatus {
        HealthStatus::available()
    }
}
