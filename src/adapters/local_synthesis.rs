use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::domain::config::LocalEngineConfig;
use crate::domain::voice::clean_voice_name;
use crate::domain::{
    AudioClip, Backend, PlaybackSignal, QualityTier, SpeechError, Utterance, VoiceDescriptor,
};
use crate::ports::{
    EngineCallback, EngineNotification, LocalSpeechEngine, PlaybackSink, SpeechSynthesizer,
};

/// Progress of one submitted utterance.
///
/// Shared by the engine callback and the poll task; whichever observes a
/// transition first reports it, the other is a no-op.
struct Progress {
    generation: u64,
    current: Arc<AtomicU64>,
    sink: PlaybackSink,
    started: AtomicBool,
    done: AtomicBool,
}

impl Progress {
    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    fn mark_started(&self) {
        if self.is_current() && !self.started.swap(true, Ordering::SeqCst) {
            self.sink.emit(PlaybackSignal::Started);
        }
    }

    fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn finish(&self, signal: PlaybackSignal) {
        if self.is_current() && !self.done.swap(true, Ordering::SeqCst) {
            self.sink.emit(signal);
        }
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// Adapter for the on-device synthesis engine.
///
/// The engine's `speaking`/`pending` flags are polled at a constant interval
/// and are the source of truth; callbacks only report transitions the poll
/// has not seen yet.
pub struct LocalSynthesisAdapter {
    engine: Arc<dyn LocalSpeechEngine>,
    config: LocalEngineConfig,
    generation: Arc<AtomicU64>,
}

impl LocalSynthesisAdapter {
    pub fn new(engine: Arc<dyn LocalSpeechEngine>, config: LocalEngineConfig) -> Self {
        Self {
            engine,
            config,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn callback_for(progress: &Arc<Progress>) -> EngineCallback {
        let progress = Arc::clone(progress);
        Box::new(move |notification| match notification {
            EngineNotification::Start => progress.mark_started(),
            EngineNotification::End => {
                if progress.has_started() {
                    progress.finish(PlaybackSignal::Finished);
                }
            }
            // Raised by cancel(); the stop path already accounts for it.
            EngineNotification::Error(code) if code == "interrupted" || code == "canceled" => {}
            EngineNotification::Error(code) => {
                progress.finish(PlaybackSignal::Failed(SpeechError::BackendUnavailable(
                    format!("local engine error: {}", code),
                )));
            }
        })
    }

    async fn submit(&self, utterance: &Utterance, progress: &Arc<Progress>) -> Result<(), SpeechError> {
        self.engine
            .speak(utterance, Self::callback_for(progress))
            .await
            .map_err(|e| SpeechError::BackendUnavailable(format!("local engine: {}", e)))
    }

    /// Poll until the engine reports it is speaking, or the verification
    /// window closes.
    async fn wait_for_start(&self, progress: &Progress) -> bool {
        let deadline = Instant::now() + self.config.start_verify();
        loop {
            if self.engine.is_speaking() {
                progress.mark_started();
            }
            if progress.has_started() {
                return true;
            }
            if !progress.is_current() || Instant::now() >= deadline {
                return false;
            }
            sleep(self.config.poll_interval()).await;
        }
    }

    fn spawn_poll(&self, progress: Arc<Progress>) {
        let engine = Arc::clone(&self.engine);
        let interval = self.config.poll_interval();
        tokio::spawn(async move {
            loop {
                sleep(interval).await;
                if !progress.is_current() || progress.is_done() {
                    break;
                }
                if !engine.is_speaking() && !engine.is_pending() {
                    debug!(generation = progress.generation, "Local engine went quiet");
                    progress.finish(PlaybackSignal::Finished);
                    break;
                }
            }
        });
    }
}

#[async_trait]
impl SpeechSynthesizer for LocalSynthesisAdapter {
    fn backend(&self) -> Backend {
        Backend::Local
    }

    async fn list_voices(&self) -> Result<Vec<VoiceDescriptor>, SpeechError> {
        let voices = self
            .engine
            .list_voices()
            .await
            .map_err(|e| SpeechError::BackendUnavailable(format!("local voices: {}", e)))?;

        Ok(voices
            .into_iter()
            .map(|v| VoiceDescriptor {
                backend: Backend::Local,
                quality_tier: QualityTier::from_name(&v.name),
                display_name: clean_voice_name(&v.name),
                id: v.uri,
                language: v.language,
                gender: None,
                enabled: true,
            })
            .collect())
    }

    async fn speak(
        &self,
        utterance: &Utterance,
        sink: PlaybackSink,
    ) -> Result<Option<AudioClip>, SpeechError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let progress = Arc::new(Progress {
            generation,
            current: Arc::clone(&self.generation),
            sink,
            started: AtomicBool::new(false),
            done: AtomicBool::new(false),
        });

        // Anything still queued from an earlier session would play first.
        if self.engine.is_speaking() || self.engine.is_pending() {
            self.engine.cancel();
        }

        self.submit(utterance, &progress).await?;

        if !self.wait_for_start(&progress).await {
            if !progress.is_current() {
                return Ok(None);
            }
            warn!(
                voice = ?utterance.voice_id,
                "Local engine did not start, resuming and re-submitting"
            );
            self.engine.resume();
            self.engine.cancel();
            self.submit(utterance, &progress).await?;

            if !self.wait_for_start(&progress).await {
                if !progress.is_current() {
                    return Ok(None);
                }
                self.engine.cancel();
                return Err(SpeechError::BackendUnavailable(
                    "local engine did not start speaking".to_string(),
                ));
            }
        }

        info!(
            generation,
            voice = ?utterance.voice_id,
            rate = utterance.rate,
            "Local playback started"
        );
        self.spawn_poll(progress);
        Ok(None)
    }

    async fn stop(&self) -> Result<(), SpeechError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.engine.cancel();
        Ok(())
    }

    async fn pause(&self) -> Result<(), SpeechError> {
        self.engine.pause();
        Ok(())
    }

    async fn resume(&self) -> Result<(), SpeechError> {
        self.engine.resume();
        Ok(())
    }
}
