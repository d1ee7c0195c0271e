use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::app::audio_session::AudioSessionManager;
use crate::domain::text::clean_text_for_speech;
use crate::domain::voice_policy::{
    find_voice, resolve_voice, select_backend, KeywordGenderScorer, SelectionReason, VoiceScorer,
};
use crate::domain::{
    AppConfig, AudioClip, Backend, CallerContext, PersonaDirectory, PersonaVoiceProfile,
    PlaybackSession, PlaybackSignal, PlaybackStatus, PreferenceBackend, PreferenceKey,
    PreferenceMode, RemoteVoiceCatalog, SessionId, SpeechError, SpeechRequest, Utterance,
    VoiceDescriptor, VoicePreference,
};
use crate::ports::{AudioOutput, PlaybackSink, PreferenceStore, SpeechSynthesizer};

/// Collaborators of the output coordinator.
pub struct OutputPorts {
    pub local: Arc<dyn SpeechSynthesizer>,
    pub remote: Option<Arc<dyn SpeechSynthesizer>>,
    pub native: Option<Arc<dyn SpeechSynthesizer>>,
    pub output: Arc<dyn AudioOutput>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub audio_session: Arc<AudioSessionManager>,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub default_backend: PreferenceBackend,
    pub min_loading: Duration,
    pub health_check_timeout: Duration,
}

impl OutputSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_backend: config.speech.default_backend,
            min_loading: config.speech.min_loading(),
            health_check_timeout: config.speech.health_check_timeout(),
        }
    }
}

/// Session-tagged input of the dispatch loop.
#[derive(Debug)]
enum OutputEvent {
    Playback(PlaybackSignal),
    LoadingFloorReached,
}

/// What is currently producing sound for the session.
#[derive(Clone)]
enum ActivePlayback {
    Adapter(Arc<dyn SpeechSynthesizer>),
    CachedClip,
}

struct CoordinatorState {
    session: PlaybackSession,
    caller: CallerContext,
    /// Set by `stop()`; adapter failures while it is set are expected.
    stopping_intentionally: bool,
    backend_started: bool,
    floor_reached: bool,
    /// Playback ended before the loading floor elapsed.
    finish_pending: bool,
    active: Option<ActivePlayback>,
    cache: Option<AudioClip>,
    last_request: Option<SpeechRequest>,
}

impl CoordinatorState {
    fn begin(&mut self, session: PlaybackSession) {
        self.session = session;
        self.stopping_intentionally = false;
        self.backend_started = false;
        self.floor_reached = false;
        self.finish_pending = false;
        self.active = None;
    }
}

/// Everything needed to start one message.
struct PlaybackPlan {
    backend: Backend,
    utterance: Utterance,
    preference: VoicePreference,
    profile: PersonaVoiceProfile,
}

enum Attempt {
    Started,
    Superseded,
}

struct Inner {
    ports: OutputPorts,
    scorer: Arc<dyn VoiceScorer>,
    personas: PersonaDirectory,
    remote_catalog: RemoteVoiceCatalog,
    settings: OutputSettings,
    state: Mutex<CoordinatorState>,
    live_session: Arc<AtomicU64>,
    events: mpsc::UnboundedSender<(SessionId, OutputEvent)>,
    status: watch::Sender<PlaybackSession>,
}

/// Owns the single playback session.
///
/// Every `speak()` supersedes whatever was playing. Backend signals carry the
/// session id they were issued for and are applied by one dispatch task;
/// signals for any other session are dropped.
#[derive(Clone)]
pub struct SpeechOutputCoordinator {
    inner: Arc<Inner>,
}

impl SpeechOutputCoordinator {
    /// Must be called from within a Tokio runtime.
    pub fn new(ports: OutputPorts, config: &AppConfig, caller: CallerContext) -> Self {
        Self::with_scorer(ports, config, caller, Arc::new(KeywordGenderScorer::default()))
    }

    pub fn with_scorer(
        ports: OutputPorts,
        config: &AppConfig,
        caller: CallerContext,
        scorer: Arc<dyn VoiceScorer>,
    ) -> Self {
        let (events, mut receiver) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(PlaybackSession::default());

        let inner = Arc::new(Inner {
            ports,
            scorer,
            personas: config.personas.clone(),
            remote_catalog: config.speech.remote_voices.clone(),
            settings: OutputSettings::from_config(config),
            state: Mutex::new(CoordinatorState {
                session: PlaybackSession::default(),
                caller,
                stopping_intentionally: false,
                backend_started: false,
                floor_reached: false,
                finish_pending: false,
                active: None,
                cache: None,
                last_request: None,
            }),
            live_session: Arc::new(AtomicU64::new(0)),
            events,
            status,
        });

        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some((session_id, event)) = receiver.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.dispatch(session_id, event);
            }
            debug!("Output dispatch loop finished");
        });

        Self { inner }
    }

    pub fn status(&self) -> PlaybackSession {
        self.inner.state.lock().session.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSession> {
        self.inner.status.subscribe()
    }

    pub fn set_caller(&self, caller: CallerContext) {
        info!(platform = ?caller.platform, authenticated = caller.authenticated, "Caller context updated");
        let may_use_remote = caller.may_use_remote();
        self.inner.state.lock().caller = caller;
        if !may_use_remote {
            self.inner.invalidate_cache(|_| true);
        }
    }

    pub fn caller(&self) -> CallerContext {
        self.inner.state.lock().caller.clone()
    }

    /// Speak `request`, superseding any active playback.
    ///
    /// Returns once playback has been handed to a backend; the status stream
    /// reports the rest. Backend failures with a local fallback are absorbed.
    pub async fn speak(&self, request: SpeechRequest) -> Result<(), SpeechError> {
        let text = clean_text_for_speech(&request.text);
        if text.is_empty() {
            return Err(SpeechError::EmptyText);
        }

        let (session_id, superseded, cached) = {
            let mut state = self.inner.state.lock();
            let superseded = state.active.take();
            let session_id = state.session.session_id.next();
            let cached = state
                .cache
                .clone()
                .filter(|clip| clip.matches(&request.persona_id, &text));

            state.begin(PlaybackSession {
                session_id,
                status: if cached.is_some() {
                    PlaybackStatus::Speaking
                } else {
                    PlaybackStatus::Loading
                },
                backend: cached.as_ref().map(|_| Backend::Remote),
                cached_audio_key: cached.as_ref().map(|clip| clip.key.clone()),
                started_at: Some(Instant::now()),
            });
            if cached.is_some() {
                state.floor_reached = true;
                state.backend_started = true;
                state.active = Some(ActivePlayback::CachedClip);
            }
            state.last_request = Some(request.clone());
            self.inner.live_session.store(session_id.0, Ordering::SeqCst);
            self.inner.publish(&state);
            (session_id, superseded, cached)
        };

        info!(
            session = %session_id,
            persona = %request.persona_id,
            language = %request.language,
            request_id = %request.request_id,
            cached = cached.is_some(),
            "Speak requested"
        );

        if let Some(previous) = superseded {
            debug!(session = %session_id, "Superseding active playback");
            self.inner.halt(previous).await;
        }

        let result = match cached {
            Some(clip) => self.play_cached(session_id, clip).await,
            None => self.play_fresh(session_id, &request, text).await,
        };

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let mut state = self.inner.state.lock();
                if state.session.session_id != session_id || state.stopping_intentionally {
                    return Ok(());
                }
                warn!(session = %session_id, error = %e, "Playback failed");
                self.inner.go_idle(&mut state);
                Err(e)
            }
        }
    }

    /// Stop playback. Calling it again, or with nothing playing, does nothing.
    pub async fn stop(&self) -> Result<(), SpeechError> {
        let active = {
            let mut state = self.inner.state.lock();
            if !state.session.status.is_active() {
                return Ok(());
            }
            let active = state.active.take();
            let next = state.session.session_id.next();
            state.begin(PlaybackSession::idle(next));
            state.stopping_intentionally = true;
            self.inner.live_session.store(next.0, Ordering::SeqCst);
            self.inner.publish(&state);
            active
        };

        info!("Playback stopped");
        if let Some(active) = active {
            self.inner.halt(active).await;
        }
        Ok(())
    }

    pub async fn pause(&self) -> Result<(), SpeechError> {
        let (session_id, active) = {
            let state = self.inner.state.lock();
            if !state.session.status.can_pause() {
                return Ok(());
            }
            (state.session.session_id, state.active.clone())
        };
        let Some(active) = active else {
            return Ok(());
        };

        match active {
            ActivePlayback::Adapter(adapter) => adapter.pause().await?,
            ActivePlayback::CachedClip => self
                .inner
                .ports
                .output
                .pause()
                .await
                .map_err(|e| SpeechError::BackendUnavailable(e.to_string()))?,
        }

        let mut state = self.inner.state.lock();
        if state.session.session_id == session_id && state.session.status.can_pause() {
            self.inner.set_status(&mut state, PlaybackStatus::Paused);
        }
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), SpeechError> {
        let (session_id, active) = {
            let state = self.inner.state.lock();
            if !state.session.status.can_resume() {
                return Ok(());
            }
            (state.session.session_id, state.active.clone())
        };
        let Some(active) = active else {
            return Ok(());
        };

        match active {
            ActivePlayback::Adapter(adapter) => adapter.resume().await?,
            ActivePlayback::CachedClip => self
                .inner
                .ports
                .output
                .resume()
                .await
                .map_err(|e| SpeechError::BackendUnavailable(e.to_string()))?,
        }

        let mut state = self.inner.state.lock();
        if state.session.session_id == session_id && state.session.status.can_resume() {
            self.inner.set_status(&mut state, PlaybackStatus::Speaking);
        }
        Ok(())
    }

    /// Speak the most recent request again. Uses cached audio when it has any.
    pub async fn replay_last(&self) -> Result<(), SpeechError> {
        let last = self.inner.state.lock().last_request.clone();
        match last {
            Some(request) => self.speak(request).await,
            None => {
                debug!("Nothing to replay");
                Ok(())
            }
        }
    }

    /// Store an explicit voice choice for a persona and language.
    pub async fn select_voice(
        &self,
        persona_id: &str,
        language: &str,
        backend: Backend,
        voice_id: &str,
    ) -> Result<(), SpeechError> {
        let known = match backend {
            Backend::Remote => self.inner.remote_catalog.contains(voice_id),
            Backend::Local => {
                let voices = self.inner.ports.local.list_voices().await?;
                find_voice(&voices, voice_id).is_some()
            }
            Backend::Native => match &self.inner.ports.native {
                Some(native) => find_voice(&native.list_voices().await?, voice_id).is_some(),
                None => false,
            },
        };
        if !known {
            return Err(SpeechError::InvalidVoiceSelection {
                voice_id: voice_id.to_string(),
            });
        }

        let stored_backend = match backend {
            Backend::Remote => PreferenceBackend::Remote,
            Backend::Local | Backend::Native => PreferenceBackend::Local,
        };
        let preference = VoicePreference::explicit(stored_backend, Some(voice_id.to_string()));
        self.inner
            .ports
            .preferences
            .save(&PreferenceKey::new(persona_id, language), &preference)?;
        self.inner.invalidate_cache(|clip| clip.persona_id == persona_id);
        Ok(())
    }

    /// Forget an explicit choice; the voice is resolved automatically again.
    pub fn reset_to_auto(&self, persona_id: &str, language: &str) -> Result<(), SpeechError> {
        let preference = VoicePreference::auto(self.inner.settings.default_backend, None);
        self.inner
            .ports
            .preferences
            .save(&PreferenceKey::new(persona_id, language), &preference)?;
        self.inner.invalidate_cache(|clip| clip.persona_id == persona_id);
        Ok(())
    }

    /// The stored preference, or the default one if none exists yet.
    pub fn preference(&self, persona_id: &str, language: &str) -> VoicePreference {
        self.inner
            .load_preference(&PreferenceKey::new(persona_id, language))
            .unwrap_or_else(|| VoicePreference::auto(self.inner.settings.default_backend, None))
    }

    /// Voices the caller can pick from for `language`, best first.
    pub async fn voices_for(&self, language: &str) -> Vec<VoiceDescriptor> {
        let caller = self.caller();
        let mut voices = Vec::new();

        if caller.platform.has_native_synthesizer() {
            if let Some(native) = &self.inner.ports.native {
                voices.extend(native.list_voices().await.unwrap_or_else(|e| {
                    warn!(error = %e, "Native voices unavailable");
                    Vec::new()
                }));
            }
        }
        voices.extend(self.inner.ports.local.list_voices().await.unwrap_or_else(|e| {
            warn!(error = %e, "Local voices unavailable");
            Vec::new()
        }));
        if caller.may_use_remote() && self.inner.ports.remote.is_some() {
            voices.extend(self.inner.remote_catalog.descriptors());
        }

        voices.retain(|v| v.enabled && v.matches_language(language));
        voices.sort_by(|a, b| {
            b.quality_tier
                .cmp(&a.quality_tier)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        voices
    }

    async fn play_cached(&self, session_id: SessionId, clip: AudioClip) -> Result<Attempt, SpeechError> {
        self.inner.ports.audio_session.prepare_playback().await;
        if !self.inner.is_current(session_id) {
            return Ok(Attempt::Superseded);
        }
        self.inner
            .ports
            .output
            .play(&clip, self.inner.sink(session_id))
            .await
            .map_err(|e| SpeechError::PlaybackDecodeError(e.to_string()))?;
        info!(session = %session_id, key = %clip.key, "Replaying cached audio");
        Ok(Attempt::Started)
    }

    async fn play_fresh(
        &self,
        session_id: SessionId,
        request: &SpeechRequest,
        text: String,
    ) -> Result<Attempt, SpeechError> {
        self.inner.start_loading_floor(session_id);

        let plan = self.plan(request, text).await;
        self.inner.ports.audio_session.prepare_playback().await;
        if !self.inner.is_current(session_id) {
            return Ok(Attempt::Superseded);
        }

        match plan.backend {
            Backend::Remote => self.play_remote(session_id, &plan).await,
            Backend::Native => {
                let Some(native) = self.inner.ports.native.clone() else {
                    return self.play_local_fallback(session_id, &plan).await;
                };
                match self.inner.run_adapter(session_id, native, &plan.utterance).await {
                    Err(e) => {
                        warn!(session = %session_id, error = %e, "Native synthesis failed, using local voice");
                        self.play_local_fallback(session_id, &plan).await
                    }
                    other => other,
                }
            }
            Backend::Local => {
                let local = Arc::clone(&self.inner.ports.local);
                self.inner.run_adapter(session_id, local, &plan.utterance).await
            }
        }
    }

    async fn play_remote(&self, session_id: SessionId, plan: &PlaybackPlan) -> Result<Attempt, SpeechError> {
        let Some(remote) = self.inner.ports.remote.clone() else {
            return self.play_local_fallback(session_id, plan).await;
        };

        let health = remote
            .health_check(self.inner.settings.health_check_timeout)
            .await;
        if !self.inner.is_current(session_id) {
            return Ok(Attempt::Superseded);
        }
        if !health.available {
            warn!(session = %session_id, "Remote synthesis unavailable, using local voice for this message");
            return self.play_local_fallback(session_id, plan).await;
        }

        match self.inner.run_adapter(session_id, remote, &plan.utterance).await {
            Err(e) if e.allows_fallback() => {
                warn!(session = %session_id, error = %e, "Remote synthesis failed, using local voice for this message");
                self.play_local_fallback(session_id, plan).await
            }
            other => other,
        }
    }

    /// Same message through the local engine. The stored preference is left
    /// untouched.
    async fn play_local_fallback(&self, session_id: SessionId, plan: &PlaybackPlan) -> Result<Attempt, SpeechError> {
        let language = plan.utterance.language.clone();
        let voice_id = self
            .local_voice(&plan.preference, &language, &plan.profile)
            .await;
        let utterance = Utterance {
            voice_id,
            ..plan.utterance.clone()
        };
        let local = Arc::clone(&self.inner.ports.local);
        self.inner.run_adapter(session_id, local, &utterance).await
    }

    async fn plan(&self, request: &SpeechRequest, text: String) -> PlaybackPlan {
        let key = PreferenceKey::new(&request.persona_id, &request.language);
        let stored = self.inner.load_preference(&key);
        let preference = stored
            .clone()
            .unwrap_or_else(|| VoicePreference::auto(self.inner.settings.default_backend, None));
        let profile = self.inner.personas.profile(&request.persona_id);
        let caller = self.caller();

        let native_voice = if caller.platform.has_native_synthesizer()
            && preference.backend == PreferenceBackend::Local
        {
            self.native_voice(&preference, &request.language, &profile).await
        } else {
            None
        };

        let decision = select_backend(
            &caller,
            &preference,
            native_voice.is_some(),
            &self.inner.remote_catalog,
        );
        if let Some(warning) = &decision.warning {
            warn!(
                persona = %request.persona_id,
                warning = %warning,
                "Stored voice cannot be used, falling back to the default local voice"
            );
        }

        let (backend, voice_id) = match (decision.backend, native_voice) {
            (Backend::Native, Some(voice)) => (Backend::Native, Some(voice.id)),
            (Backend::Remote, _) if self.inner.ports.remote.is_some() => (
                Backend::Remote,
                self.remote_voice(&preference, &request.language, &profile),
            ),
            _ => (
                Backend::Local,
                self.local_voice(&preference, &request.language, &profile).await,
            ),
        };

        debug!(
            persona = %request.persona_id,
            backend = %backend,
            reason = ?decision.reason,
            voice_id = ?voice_id,
            "Backend selected"
        );

        let honoured = matches!(
            decision.reason,
            SelectionReason::Preference | SelectionReason::NativeVoice
        ) && (Backend::from(preference.backend) == backend
            || (backend == Backend::Native && preference.backend == PreferenceBackend::Local));
        let update = match &stored {
            None => Some(VoicePreference::auto(
                preference.backend,
                voice_id.clone().filter(|_| honoured),
            )),
            Some(existing)
                if existing.mode == PreferenceMode::Auto && honoured && existing.voice_id != voice_id =>
            {
                Some(VoicePreference::auto(existing.backend, voice_id.clone()))
            }
            Some(_) => None,
        };
        if let Some(update) = update {
            if let Err(e) = self.inner.ports.preferences.save(&key, &update) {
                warn!(error = %e, "Could not persist voice preference");
            }
        }

        PlaybackPlan {
            backend,
            utterance: Utterance {
                text,
                language: request.language.clone(),
                persona_id: request.persona_id.clone(),
                is_long_form_passage: request.is_long_form_passage,
                voice_id,
                rate: profile.rate_for(request.is_long_form_passage),
                pitch: profile.pitch,
            },
            preference,
            profile,
        }
    }

    /// The native voice selected by a local preference, if it is one.
    async fn native_voice(
        &self,
        preference: &VoicePreference,
        language: &str,
        profile: &PersonaVoiceProfile,
    ) -> Option<VoiceDescriptor> {
        let native = self.inner.ports.native.as_ref()?;
        let voices = match native.list_voices().await {
            Ok(voices) => voices,
            Err(e) => {
                warn!(error = %e, "Native voices unavailable");
                return None;
            }
        };

        if let Some(voice_id) = preference.voice_id.as_deref() {
            if let Some(voice) = find_voice(&voices, voice_id) {
                return Some(voice.clone());
            }
            let local_voices = self.inner.ports.local.list_voices().await.unwrap_or_default();
            if find_voice(&local_voices, voice_id).is_some() {
                return None;
            }
        }
        resolve_voice(&voices, language, profile, self.inner.scorer.as_ref())
    }

    async fn local_voice(
        &self,
        preference: &VoicePreference,
        language: &str,
        profile: &PersonaVoiceProfile,
    ) -> Option<String> {
        let voices = match self.inner.ports.local.list_voices().await {
            Ok(voices) => voices,
            Err(e) => {
                warn!(error = %e, "Local voices unavailable, using engine default");
                return None;
            }
        };

        if preference.backend == PreferenceBackend::Local {
            if let Some(voice_id) = preference.voice_id.as_deref() {
                if find_voice(&voices, voice_id).is_some() {
                    return Some(voice_id.to_string());
                }
                warn!(
                    error = %SpeechError::InvalidVoiceSelection { voice_id: voice_id.to_string() },
                    "Stored local voice is gone, resolving automatically"
                );
            }
        }
        resolve_voice(&voices, language, profile, self.inner.scorer.as_ref()).map(|v| v.id)
    }

    fn remote_voice(
        &self,
        preference: &VoicePreference,
        language: &str,
        profile: &PersonaVoiceProfile,
    ) -> Option<String> {
        if let Some(voice_id) = preference.voice_id.as_deref() {
            if self.inner.remote_catalog.contains(voice_id) {
                return Some(voice_id.to_string());
            }
        }
        resolve_voice(
            &self.inner.remote_catalog.descriptors(),
            language,
            profile,
            self.inner.scorer.as_ref(),
        )
        .map(|v| v.id)
    }
}

fn same_adapter(a: &Arc<dyn SpeechSynthesizer>, b: &Arc<dyn SpeechSynthesizer>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

impl Inner {
    fn publish(&self, state: &CoordinatorState) {
        self.status.send_replace(state.session.clone());
    }

    fn set_status(&self, state: &mut CoordinatorState, status: PlaybackStatus) {
        if state.session.status == status {
            return;
        }
        debug!(
            session = %state.session.session_id,
            from = ?state.session.status,
            to = ?status,
            "Playback status changed"
        );
        state.session.status = status;
        self.publish(state);
    }

    fn go_idle(&self, state: &mut CoordinatorState) {
        state.active = None;
        state.session.backend = None;
        state.session.started_at = None;
        state.session.cached_audio_key = None;
        state.session.status = PlaybackStatus::Idle;
        self.publish(state);
    }

    /// Empty the cache slot when `stale` holds for the clip in it.
    fn invalidate_cache(&self, stale: impl FnOnce(&AudioClip) -> bool) {
        let dropped = {
            let mut state = self.state.lock();
            if state.cache.as_ref().is_some_and(stale) {
                state.cache.take()
            } else {
                None
            }
        };
        if let Some(clip) = dropped {
            debug!(key = %clip.key, "Cached audio invalidated");
            self.ports.output.release(&clip.key);
        }
    }

    fn is_current(&self, session_id: SessionId) -> bool {
        self.state.lock().session.session_id == session_id
    }

    fn load_preference(&self, key: &PreferenceKey) -> Option<VoicePreference> {
        match self.ports.preferences.load(key) {
            Ok(preference) => preference,
            Err(e) => {
                warn!(error = %e, persona = %key.persona_id, "Could not read voice preference");
                None
            }
        }
    }

    fn sink(&self, session_id: SessionId) -> PlaybackSink {
        let events = self.events.clone();
        PlaybackSink::new(
            session_id,
            Arc::new(move |id, signal| {
                let _ = events.send((id, OutputEvent::Playback(signal)));
            }),
        )
        .with_live_session(Arc::clone(&self.live_session))
    }

    fn start_loading_floor(&self, session_id: SessionId) {
        let events = self.events.clone();
        let floor = self.settings.min_loading;
        tokio::spawn(async move {
            tokio::time::sleep(floor).await;
            let _ = events.send((session_id, OutputEvent::LoadingFloorReached));
        });
    }

    async fn halt(&self, active: ActivePlayback) {
        let result = match active {
            ActivePlayback::Adapter(adapter) => adapter.stop().await,
            ActivePlayback::CachedClip => self
                .ports
                .output
                .stop()
                .await
                .map_err(|e| SpeechError::BackendUnavailable(e.to_string())),
        };
        if let Err(e) = result {
            debug!(error = %e, "Stopping previous playback failed");
        }
    }

    /// Hand the utterance to `adapter` on behalf of `session_id`.
    async fn run_adapter(
        &self,
        session_id: SessionId,
        adapter: Arc<dyn SpeechSynthesizer>,
        utterance: &Utterance,
    ) -> Result<Attempt, SpeechError> {
        {
            let mut state = self.state.lock();
            if state.session.session_id != session_id {
                return Ok(Attempt::Superseded);
            }
            state.active = Some(ActivePlayback::Adapter(Arc::clone(&adapter)));
            state.session.backend = Some(adapter.backend());
            self.publish(&state);
        }

        let result = adapter.speak(utterance, self.sink(session_id)).await;

        let spoke = result.is_ok();

        // Ok((released clip, result)) for the live session, Err(adapter still
        // owned) when the session moved on while the adapter was working.
        let outcome = {
            let mut state = self.state.lock();
            if state.session.session_id != session_id {
                Err(matches!(
                    &state.active,
                    Some(ActivePlayback::Adapter(current)) if same_adapter(current, &adapter)
                ))
            } else {
                // A fresh synthesis always empties the slot; only its own
                // audio may take the place of the old clip.
                let previous = state.cache.take();
                let result = result.map(|clip| {
                    if let Some(clip) = clip {
                        state.session.cached_audio_key = Some(clip.key.clone());
                        self.publish(&state);
                        state.cache = Some(clip);
                    }
                });
                let kept = state.cache.as_ref().map(|clip| clip.key.clone());
                Ok((
                    previous.filter(|old| kept.as_deref() != Some(old.key.as_str())),
                    result,
                ))
            }
        };

        match outcome {
            Ok((released, result)) => {
                if let Some(old) = released {
                    debug!(session = %session_id, key = %old.key, "Cached audio released");
                    self.ports.output.release(&old.key);
                }
                result?;
                Ok(Attempt::Started)
            }
            Err(owned_by_current) => {
                // The adapter may have started after the session moved on.
                if spoke && !owned_by_current {
                    let _ = adapter.stop().await;
                }
                Ok(Attempt::Superseded)
            }
        }
    }

    /// Apply one session-tagged event. The only place backend signals change
    /// the playback status.
    fn dispatch(&self, session_id: SessionId, event: OutputEvent) {
        let mut state = self.state.lock();
        if state.session.session_id != session_id {
            debug!(event_session = %session_id, current = %state.session.session_id, ?event, "Dropping stale playback event");
            return;
        }
        let status = state.session.status;

        match event {
            OutputEvent::LoadingFloorReached => {
                state.floor_reached = true;
                if status == PlaybackStatus::Loading {
                    if state.finish_pending {
                        self.go_idle(&mut state);
                    } else if state.backend_started {
                        self.set_status(&mut state, PlaybackStatus::Speaking);
                    }
                }
            }
            OutputEvent::Playback(PlaybackSignal::Started) => {
                state.backend_started = true;
                if status == PlaybackStatus::Loading && state.floor_reached {
                    self.set_status(&mut state, PlaybackStatus::Speaking);
                }
            }
            OutputEvent::Playback(PlaybackSignal::Finished) => {
                if status == PlaybackStatus::Loading && !state.floor_reached {
                    state.finish_pending = true;
                } else if status.is_active() {
                    info!(session = %session_id, "Playback finished");
                    self.go_idle(&mut state);
                }
            }
            OutputEvent::Playback(PlaybackSignal::Cancelled) => {
                if !state.stopping_intentionally && status.is_active() {
                    debug!(session = %session_id, "Playback cancelled by the engine");
                    self.go_idle(&mut state);
                }
            }
            OutputEvent::Playback(PlaybackSignal::Failed(error)) => {
                if state.stopping_intentionally {
                    return;
                }
                if status.is_active() {
                    warn!(session = %session_id, error = %error, "Playback failed");
                    self.go_idle(&mut state);
                }
            }
        }
    }
}
