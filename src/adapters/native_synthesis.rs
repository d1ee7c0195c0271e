use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::domain::voice::clean_voice_name;
use crate::domain::{AudioClip, Backend, PlaybackSignal, SpeechError, Utterance, VoiceDescriptor};
use crate::ports::{
    NativeSpeakOptions, NativeSpeechBridge, NativeSpeechEvent, PlaybackSink, SpeechSynthesizer,
};

/// Adapter for the platform-embedded synthesizer.
///
/// The bridge's start/end events are reliable and are forwarded as-is. The
/// voice list is fetched once and cached until [`clear_voice_cache`] is called.
///
/// [`clear_voice_cache`]: NativeSynthesisAdapter::clear_voice_cache
pub struct NativeSynthesisAdapter {
    bridge: Arc<dyn NativeSpeechBridge>,
    voices: Mutex<Option<Vec<VoiceDescriptor>>>,
    generation: Arc<AtomicU64>,
}

impl NativeSynthesisAdapter {
    pub fn new(bridge: Arc<dyn NativeSpeechBridge>) -> Self {
        Self {
            bridge,
            voices: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Forget the cached voice list; the next listing asks the bridge again.
    pub fn clear_voice_cache(&self) {
        *self.voices.lock() = None;
        debug!("Native voice cache cleared");
    }

    fn forward_events(&self, generation: u64, sink: PlaybackSink) {
        let mut events = self.bridge.subscribe();
        let current = Arc::clone(&self.generation);
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Native speech events lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if current.load(Ordering::SeqCst) != generation {
                    break;
                }
                match event {
                    NativeSpeechEvent::SpeechStart => sink.emit(PlaybackSignal::Started),
                    NativeSpeechEvent::SpeechEnd => {
                        sink.emit(PlaybackSignal::Finished);
                        break;
                    }
                    NativeSpeechEvent::SpeechCancel => {
                        sink.emit(PlaybackSignal::Cancelled);
                        break;
                    }
                }
            }
        });
    }
}

#[async_trait]
impl SpeechSynthesizer for NativeSynthesisAdapter {
    fn backend(&self) -> Backend {
        Backend::Native
    }

    async fn list_voices(&self) -> Result<Vec<VoiceDescriptor>, SpeechError> {
        if let Some(voices) = self.voices.lock().clone() {
            return Ok(voices);
        }

        let voices: Vec<VoiceDescriptor> = self
            .bridge
            .list_voices()
            .await
            .map_err(|e| SpeechError::BackendUnavailable(format!("native voices: {}", e)))?
            .into_iter()
            .map(|v| VoiceDescriptor {
                backend: Backend::Native,
                id: v.identifier,
                display_name: clean_voice_name(&v.name),
                language: v.language,
                gender: None,
                quality_tier: v.quality,
                enabled: true,
            })
            .collect();

        info!(count = voices.len(), "Native voices loaded");
        *self.voices.lock() = Some(voices.clone());
        Ok(voices)
    }

    async fn speak(
        &self,
        utterance: &Utterance,
        sink: PlaybackSink,
    ) -> Result<Option<AudioClip>, SpeechError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        // Subscribe before speaking so the start event cannot be missed.
        self.forward_events(generation, sink);

        let options = NativeSpeakOptions {
            text: utterance.text.clone(),
            voice_identifier: utterance.voice_id.clone(),
            language: utterance.language.clone(),
            rate: utterance.rate,
            pitch: utterance.pitch,
        };

        if let Err(e) = self.bridge.speak(options).await {
            self.generation.fetch_add(1, Ordering::SeqCst);
            return Err(SpeechError::BackendUnavailable(format!("native synthesizer: {}", e)));
        }

        info!(generation, voice = ?utterance.voice_id, "Native playback requested");
        Ok(None)
    }

    async fn stop(&self) -> Result<(), SpeechError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.bridge
            .stop()
            .await
            .map_err(|e| SpeechError::BackendUnavailable(e.to_string()))
    }

    async fn pause(&self) -> Result<(), SpeechError> {
        self.bridge
            .pause()
            .await
            .map_err(|e| SpeechError::BackendUnavailable(e.to_string()))
    }

    async fn resume(&self) -> Result<(), SpeechError> {
        self.bridge
            .resume()
            .await
            .map_err(|e| SpeechError::BackendUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{QualityTier, SessionId};
    use crate::test_support::{native_voice, settle, FakeNativeBridge};

    fn utterance() -> Utterance {
        Utterance {
            text: "Hallo".to_string(),
            language: "de-DE".to_string(),
            persona_id: "chloe-cbt".to_string(),
            is_long_form_passage: false,
            voice_id: Some("com.apple.voice.premium.de-DE.Anna".to_string()),
            rate: 1.0,
            pitch: 1.0,
        }
    }

    fn recording_sink() -> (PlaybackSink, Arc<Mutex<Vec<PlaybackSignal>>>) {
        let signals = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&signals);
        let sink = PlaybackSink::new(
            SessionId(7),
            Arc::new(move |_, signal| recorded.lock().push(signal)),
        );
        (sink, signals)
    }

    #[tokio::test]
    async fn test_voice_list_is_cached_until_cleared() {
        let bridge = FakeNativeBridge::with_voices(vec![native_voice(
            "com.apple.voice.premium.de-DE.Anna",
            "Anna (Premium)",
            "de-DE",
            QualityTier::Premium,
        )]);
        let adapter = NativeSynthesisAdapter::new(bridge.clone());

        let voices = adapter.list_voices().await.unwrap();
        assert_eq!(voices[0].quality_tier, QualityTier::Premium);
        assert_eq!(voices[0].backend, Backend::Native);
        adapter.list_voices().await.unwrap();
        assert_eq!(bridge.list_calls.load(Ordering::SeqCst), 1);

        adapter.clear_voice_cache();
        adapter.list_voices().await.unwrap();
        assert_eq!(bridge.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_utterance_is_passed_to_the_bridge() {
        let bridge = FakeNativeBridge::with_voices(vec![]);
        let adapter = NativeSynthesisAdapter::new(bridge.clone());
        let (sink, _) = recording_sink();

        let long_form = Utterance {
            rate: 0.9,
            pitch: 1.1,
            ..utterance()
        };
        adapter.speak(&long_form, sink).await.unwrap();

        assert_eq!(
            *bridge.spoken.lock(),
            vec![NativeSpeakOptions {
                text: "Hallo".to_string(),
                voice_identifier: Some("com.apple.voice.premium.de-DE.Anna".to_string()),
                language: "de-DE".to_string(),
                rate: 0.9,
                pitch: 1.1,
            }]
        );
    }

    #[tokio::test]
    async fn test_events_are_forwarded() {
        let bridge = FakeNativeBridge::with_voices(vec![]);
        let adapter = NativeSynthesisAdapter::new(bridge.clone());
        let (sink, signals) = recording_sink();

        adapter.speak(&utterance(), sink).await.unwrap();
        settle().await;
        bridge.emit(NativeSpeechEvent::SpeechEnd);
        settle().await;

        assert_eq!(
            *signals.lock(),
            vec![PlaybackSignal::Started, PlaybackSignal::Finished]
        );
        assert_eq!(bridge.spoken.lock()[0].voice_identifier.as_deref(), Some("com.apple.voice.premium.de-DE.Anna"));
    }

    #[tokio::test]
    async fn test_cancel_after_stop_is_not_forwarded() {
        let bridge = FakeNativeBridge::with_voices(vec![]);
        let adapter = NativeSynthesisAdapter::new(bridge.clone());
        let (sink, signals) = recording_sink();

        adapter.speak(&utterance(), sink).await.unwrap();
        settle().await;
        adapter.stop().await.unwrap();
        settle().await;

        assert_eq!(*signals.lock(), vec![PlaybackSignal::Started]);
        assert_eq!(bridge.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bridge_failure_is_translated() {
        let bridge = FakeNativeBridge::with_voices(vec![]);
        bridge.fail_speak.store(true, Ordering::SeqCst);
        let adapter = NativeSynthesisAdapter::new(bridge);
        let (sink, _) = recording_sink();

        let result = adapter.speak(&utterance(), sink).await;
        assert!(matches!(result, Err(SpeechError::BackendUnavailable(_))));
    }
}
