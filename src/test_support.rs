//! In-memory fakes for every platform port.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::{
    AudioClip, DomainError, PlaybackSignal, PlatformError, PreferenceKey, QualityTier, Utterance,
    VoicePreference,
};
use crate::ports::{
    AudioOutput, EngineCallback, EngineNotification, EngineVoice, HttpClient, LocalSpeechEngine,
    NativeSpeakOptions, NativeSpeechBridge, NativeSpeechEvent, NativeVoice, PlaybackSink,
    PreferenceStore, RawRecognizerEvent, RecognizerBridge, RecognizerCallback, RecognizerOptions,
};

pub fn engine_voice(uri: &str, name: &str, language: &str) -> EngineVoice {
    EngineVoice {
        uri: uri.to_string(),
        name: name.to_string(),
        language: language.to_string(),
        local_service: true,
    }
}

pub fn native_voice(identifier: &str, name: &str, language: &str, quality: QualityTier) -> NativeVoice {
    NativeVoice {
        identifier: identifier.to_string(),
        name: name.to_string(),
        language: language.to_string(),
        quality,
    }
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// Local engine
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeLocalEngine {
    pub voices: Mutex<Vec<EngineVoice>>,
    pub spoken: Mutex<Vec<Utterance>>,
    speaking: AtomicBool,
    pending: AtomicBool,
    /// Number of upcoming `speak` calls that stay stuck in the queue.
    pub stalls: AtomicUsize,
    pub fail_speak: Mutex<Option<String>>,
    pub fire_callbacks: AtomicBool,
    callback: Mutex<Option<EngineCallback>>,
    pub cancels: AtomicUsize,
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
}

impl FakeLocalEngine {
    pub fn with_voices(voices: Vec<EngineVoice>) -> Arc<Self> {
        let engine = Self::default();
        *engine.voices.lock() = voices;
        Arc::new(engine)
    }

    /// End the current utterance the way a quiet engine does: flags drop,
    /// no callback.
    pub fn finish_silently(&self) {
        self.speaking.store(false, Ordering::SeqCst);
        self.pending.store(false, Ordering::SeqCst);
    }

    /// End the current utterance and fire the end callback.
    pub fn finish_with_callback(&self) {
        self.finish_silently();
        if let Some(callback) = self.callback.lock().as_ref() {
            callback(EngineNotification::End);
        }
    }

    pub fn is_idle(&self) -> bool {
        !self.speaking.load(Ordering::SeqCst) && !self.pending.load(Ordering::SeqCst)
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken.lock().iter().map(|u| u.text.clone()).collect()
    }
}

#[async_trait]
impl LocalSpeechEngine for FakeLocalEngine {
    async fn list_voices(&self) -> Result<Vec<EngineVoice>, PlatformError> {
        Ok(self.voices.lock().clone())
    }

    async fn speak(
        &self,
        utterance: &Utterance,
        callback: EngineCallback,
    ) -> Result<(), PlatformError> {
        if let Some(message) = self.fail_speak.lock().clone() {
            return Err(PlatformError::new(message));
        }
        self.spoken.lock().push(utterance.clone());

        let stalled = self
            .stalls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stalled {
            self.pending.store(true, Ordering::SeqCst);
            self.speaking.store(false, Ordering::SeqCst);
        } else {
            self.pending.store(false, Ordering::SeqCst);
            self.speaking.store(true, Ordering::SeqCst);
            if self.fire_callbacks.load(Ordering::SeqCst) {
                callback(EngineNotification::Start);
            }
        }
        *self.callback.lock() = Some(callback);
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.finish_silently();
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback(EngineNotification::Error("interrupted".to_string()));
        }
    }

    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Native bridge
// ---------------------------------------------------------------------------

pub struct FakeNativeBridge {
    pub voices: Mutex<Vec<NativeVoice>>,
    pub spoken: Mutex<Vec<NativeSpeakOptions>>,
    pub list_calls: AtomicUsize,
    pub stops: AtomicUsize,
    pub fail_speak: AtomicBool,
    pub auto_start: AtomicBool,
    events: broadcast::Sender<NativeSpeechEvent>,
}

impl FakeNativeBridge {
    pub fn with_voices(voices: Vec<NativeVoice>) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            voices: Mutex::new(voices),
            spoken: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            fail_speak: AtomicBool::new(false),
            auto_start: AtomicBool::new(true),
            events,
        })
    }

    pub fn emit(&self, event: NativeSpeechEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl NativeSpeechBridge for FakeNativeBridge {
    async fn list_voices(&self) -> Result<Vec<NativeVoice>, PlatformError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.voices.lock().clone())
    }

    async fn speak(&self, options: NativeSpeakOptions) -> Result<(), PlatformError> {
        if self.fail_speak.load(Ordering::SeqCst) {
            return Err(PlatformError::new("synthesizer busy"));
        }
        self.spoken.lock().push(options);
        if self.auto_start.load(Ordering::SeqCst) {
            self.emit(NativeSpeechEvent::SpeechStart);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), PlatformError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.emit(NativeSpeechEvent::SpeechCancel);
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn resume(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<NativeSpeechEvent> {
        self.events.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Recognizer bridge
// ---------------------------------------------------------------------------

pub struct FakeRecognizerBridge {
    pub available: AtomicBool,
    pub permission: Mutex<Result<bool, PlatformError>>,
    pub starts: Mutex<Vec<RecognizerOptions>>,
    pub stops: AtomicUsize,
    /// Events raised synchronously when `stop` is called.
    pub on_stop: Mutex<Vec<RawRecognizerEvent>>,
    /// How long `start` takes before the recognizer runs.
    pub start_delay: Mutex<Option<Duration>>,
    running: AtomicBool,
    callback: Mutex<Option<RecognizerCallback>>,
}

impl Default for FakeRecognizerBridge {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
            permission: Mutex::new(Ok(true)),
            starts: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            on_stop: Mutex::new(vec![
                RawRecognizerEvent::Error("aborted".to_string()),
                RawRecognizerEvent::End,
            ]),
            start_delay: Mutex::new(None),
            running: AtomicBool::new(false),
            callback: Mutex::new(None),
        }
    }
}

impl FakeRecognizerBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emit(&self, event: RawRecognizerEvent) {
        if let Some(callback) = self.callback.lock().as_ref() {
            callback(event);
        }
    }

    pub fn start_count(&self) -> usize {
        self.starts.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecognizerBridge for FakeRecognizerBridge {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn request_permission(&self) -> Result<bool, PlatformError> {
        self.permission.lock().clone()
    }

    async fn start(
        &self,
        options: RecognizerOptions,
        callback: RecognizerCallback,
    ) -> Result<(), PlatformError> {
        let delay = *self.start_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.starts.lock().push(options);
        self.running.store(true, Ordering::SeqCst);
        callback(RawRecognizerEvent::Start);
        *self.callback.lock() = Some(callback);
        Ok(())
    }

    async fn stop(&self) -> Result<(), PlatformError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        let events = self.on_stop.lock().clone();
        for event in events {
            self.emit(event);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Audio output
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeAudioOutput {
    /// Ordered record of calls: `play:<key>`, `silence:<ms>`, `stop`, ...
    pub log: Mutex<Vec<String>>,
    pub released: Mutex<Vec<String>>,
    pub fail_play: Mutex<Option<String>>,
    sink: Mutex<Option<PlaybackSink>>,
}

impl FakeAudioOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn play_count(&self) -> usize {
        self.log.lock().iter().filter(|c| c.starts_with("play:")).count()
    }

    /// Report the end of the current clip.
    pub fn finish(&self) {
        let sink = self.sink.lock().take();
        if let Some(sink) = sink {
            sink.emit(PlaybackSignal::Finished);
        }
    }
}

#[async_trait]
impl AudioOutput for FakeAudioOutput {
    async fn play(&self, clip: &AudioClip, sink: PlaybackSink) -> Result<(), PlatformError> {
        if let Some(message) = self.fail_play.lock().clone() {
            return Err(PlatformError::new(message));
        }
        self.log.lock().push(format!("play:{}", clip.key));
        sink.emit(PlaybackSignal::Started);
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    async fn stop(&self) -> Result<(), PlatformError> {
        self.log.lock().push("stop".to_string());
        self.sink.lock().take();
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlatformError> {
        self.log.lock().push("pause".to_string());
        Ok(())
    }

    async fn resume(&self) -> Result<(), PlatformError> {
        self.log.lock().push("resume".to_string());
        Ok(())
    }

    async fn play_silence(&self, duration: Duration) -> Result<(), PlatformError> {
        self.log
            .lock()
            .push(format!("silence:{}", duration.as_millis()));
        Ok(())
    }

    fn release(&self, key: &str) {
        self.released.lock().push(key.to_string());
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum HealthReply {
    Json(serde_json::Value),
    Hang,
    Fail,
}

pub struct FakeHttp {
    pub health: Mutex<HealthReply>,
    pub audio: Mutex<Result<Vec<u8>, String>>,
    pub posts: Mutex<Vec<(String, serde_json::Value)>>,
    pub health_calls: AtomicUsize,
    pub blocked: AtomicBool,
}

impl FakeHttp {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self {
            health: Mutex::new(HealthReply::Json(
                serde_json::json!({ "status": "ok", "engineAvailable": true }),
            )),
            audio: Mutex::new(Ok(b"RIFF....WAVEfmt ".to_vec())),
            posts: Mutex::new(Vec::new()),
            health_calls: AtomicUsize::new(0),
            blocked: AtomicBool::new(false),
        })
    }

    pub fn set_health(&self, reply: HealthReply) {
        *self.health.lock() = reply;
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().len()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn get_json<T: DeserializeOwned>(
        &self,
        _url: &str,
        _timeout: Duration,
    ) -> Result<T, DomainError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        if self.blocked.load(Ordering::SeqCst) {
            return Err(DomainError::NetworkBlocked {
                reason: "local only".to_string(),
            });
        }
        let reply = self.health.lock().clone();
        match reply {
            HealthReply::Json(value) => Ok(serde_json::from_value(value)?),
            HealthReply::Hang => std::future::pending().await,
            HealthReply::Fail => Err(DomainError::HttpRequest("connection refused".to_string())),
        }
    }

    async fn post_json_bytes<T: Serialize + Send + Sync>(
        &self,
        url: &str,
        body: &T,
        _timeout: Duration,
    ) -> Result<Vec<u8>, DomainError> {
        if self.blocked.load(Ordering::SeqCst) {
            return Err(DomainError::NetworkBlocked {
                reason: "local only".to_string(),
            });
        }
        self.posts
            .lock()
            .push((url.to_string(), serde_json::to_value(body)?));
        self.audio
            .lock()
            .clone()
            .map_err(DomainError::HttpRequest)
    }

    fn is_network_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    fn allowed_domains(&self) -> Vec<String> {
        vec!["localhost".to_string()]
    }
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryPreferenceStore {
    entries: Mutex<HashMap<PreferenceKey, VoicePreference>>,
    pub saves: AtomicUsize,
}

impl MemoryPreferenceStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, persona_id: &str, language: &str) -> Option<VoicePreference> {
        self.entries
            .lock()
            .get(&PreferenceKey::new(persona_id, language))
            .cloned()
    }

    pub fn put(&self, persona_id: &str, language: &str, preference: VoicePreference) {
        self.entries
            .lock()
            .insert(PreferenceKey::new(persona_id, language), preference);
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self, key: &PreferenceKey) -> Result<Option<VoicePreference>, DomainError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &PreferenceKey, preference: &VoicePreference) -> Result<(), DomainError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().insert(key.clone(), preference.clone());
        Ok(())
    }
}
