use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use crate::adapters::{
    GuardedHttpClient, LocalSynthesisAdapter, NativeSynthesisAdapter, PlatformRecognizer,
    RemoteSynthesisAdapter, TomlConfigStore, TomlPreferenceStore,
};
use crate::app::audio_session::AudioSessionManager;
use crate::app::speech_input::SpeechInputCoordinator;
use crate::app::speech_output::{OutputPorts, SpeechOutputCoordinator};
use crate::domain::{AppConfig, CallerContext, DomainError};
use crate::infrastructure::init_logging;
use crate::ports::{
    AudioOutput, ConfigStore, HttpClient, LocalSpeechEngine, NativeSpeechBridge,
    RecognizerBridge, SpeechSynthesizer,
};

/// Platform collaborators supplied by the host shell.
pub struct PlatformPorts {
    pub local_engine: Arc<dyn LocalSpeechEngine>,
    /// Only present on the embedded-native platform.
    pub native_bridge: Option<Arc<dyn NativeSpeechBridge>>,
    pub recognizer: Arc<dyn RecognizerBridge>,
    pub audio_output: Arc<dyn AudioOutput>,
}

/// Wires configuration, logging, adapters and both coordinators together.
pub struct AppController {
    config: RwLock<AppConfig>,
    config_store: Arc<TomlConfigStore>,
    http: Arc<GuardedHttpClient>,
    native: Option<Arc<NativeSynthesisAdapter>>,
    output: SpeechOutputCoordinator,
    input: SpeechInputCoordinator,
    _log_guard: Option<WorkerGuard>,
}

impl AppController {
    /// Initialize under the OS data directory. Must be called from within a
    /// Tokio runtime.
    pub fn new(ports: PlatformPorts) -> Result<Self, DomainError> {
        Self::with_store(Arc::new(TomlConfigStore::new()?), ports)
    }

    pub fn with_store(config_store: Arc<TomlConfigStore>, ports: PlatformPorts) -> Result<Self, DomainError> {
        let config = config_store.load()?;
        let log_guard = init_logging(&config_store.logs_dir(), &config.logging)?;

        info!(platform = ?config.platform.kind, "Speech orchestrator starting up");

        let http = Arc::new(GuardedHttpClient::new(&config.privacy)?);

        let local: Arc<dyn SpeechSynthesizer> = Arc::new(LocalSynthesisAdapter::new(
            ports.local_engine,
            config.local_engine.clone(),
        ));
        let remote: Option<Arc<dyn SpeechSynthesizer>> =
            (!config.speech.remote_base_url.trim().is_empty()).then(|| {
                Arc::new(RemoteSynthesisAdapter::new(
                    Arc::clone(&http),
                    Arc::clone(&ports.audio_output),
                    config.speech.remote_base_url.clone(),
                    config.speech.remote_voices.clone(),
                    config.speech.synthesis_timeout(),
                )) as Arc<dyn SpeechSynthesizer>
            });
        let native = ports
            .native_bridge
            .filter(|_| config.platform.kind.has_native_synthesizer())
            .map(|bridge| Arc::new(NativeSynthesisAdapter::new(bridge)));

        let audio_session = Arc::new(AudioSessionManager::new(
            Arc::clone(&ports.audio_output),
            config.needs_audio_mode_switch(),
            &config.audio_session,
        ));

        let output = SpeechOutputCoordinator::new(
            OutputPorts {
                local,
                remote,
                native: native
                    .clone()
                    .map(|adapter| adapter as Arc<dyn SpeechSynthesizer>),
                output: ports.audio_output,
                preferences: Arc::new(TomlPreferenceStore::new(&config_store.data_dir())),
                audio_session: Arc::clone(&audio_session),
            },
            &config,
            CallerContext::new(config.platform.kind, false),
        );
        let input = SpeechInputCoordinator::new(
            PlatformRecognizer::new(ports.recognizer),
            audio_session,
            config.recognition.clone(),
            config.restart_on_silence(),
        );

        info!(
            local_only = config.privacy.local_only,
            native = native.is_some(),
            restart_on_silence = config.restart_on_silence(),
            "AppController initialized"
        );

        Ok(Self {
            config: RwLock::new(config),
            config_store,
            http,
            native,
            output,
            input,
            _log_guard: log_guard,
        })
    }

    pub fn output(&self) -> &SpeechOutputCoordinator {
        &self.output
    }

    pub fn input(&self) -> &SpeechInputCoordinator {
        &self.input
    }

    /// Sign-in state changes which backends may be used.
    pub fn set_authenticated(&self, authenticated: bool) {
        let platform = self.config.read().platform.kind;
        self.output
            .set_caller(CallerContext::new(platform, authenticated));
    }

    pub fn config(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// Apply and persist a new configuration.
    ///
    /// Privacy settings take effect immediately; backend wiring is fixed
    /// until the next start.
    pub fn update_config(&self, config: AppConfig) -> Result<(), DomainError> {
        self.http.set_local_only(config.privacy.local_only);
        self.http
            .set_allowed_domains(config.privacy.allowed_domains.clone());

        self.config_store.save(&config)?;
        *self.config.write() = config;

        info!("Configuration updated");
        Ok(())
    }

    pub fn is_network_blocked(&self) -> bool {
        self.http.is_network_blocked()
    }

    /// Forget the cached native voice list, e.g. after the OS installed voices.
    pub fn clear_voice_cache(&self) {
        if let Some(native) = &self.native {
            native.clear_voice_cache();
        }
    }

    pub fn data_dir(&self) -> String {
        self.config_store.data_dir().to_string_lossy().to_string()
    }

    pub fn logs_dir(&self) -> String {
        self.config_store.logs_dir().to_string_lossy().to_string()
    }

    pub fn config_path(&self) -> String {
        self.config_store.config_path().to_string_lossy().to_string()
    }
}
