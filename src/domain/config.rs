use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::persona::PersonaDirectory;
use crate::domain::platform::PlatformKind;
use crate::domain::voice::{PreferenceBackend, RemoteVoiceCatalog};

/// Privacy-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    /// When true, all network requests are blocked and speech stays on-device.
    pub local_only: bool,
    /// Hosts the HTTP client may reach when local_only is false.
    pub allowed_domains: Vec<String>,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            local_only: false,
            allowed_domains: Self::default_allowed_domains(),
        }
    }
}

impl PrivacyConfig {
    /// Default allowed domains for the synthesis service.
    pub fn default_allowed_domains() -> Vec<String> {
        vec!["localhost".to_string(), "tts".to_string()]
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Enable file logging with rotation.
    pub file_logging: bool,
    /// Maximum number of log files to keep.
    pub max_files: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: true,
            max_files: 7,
        }
    }
}

/// Platform the layer runs on, and who is using it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlatformConfig {
    pub kind: PlatformKind,
}

/// Speech output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Base URL of the synthesis service (`/synthesize` and `/health` are appended).
    pub remote_base_url: String,
    /// Backend for personas without a stored preference.
    pub default_backend: PreferenceBackend,
    /// Minimum time the loading status stays visible, in ms.
    pub min_loading_ms: u64,
    /// Remote health check timeout, in ms.
    pub health_check_timeout_ms: u64,
    /// Remote synthesis request timeout, in ms.
    pub synthesis_timeout_ms: u64,
    /// Voices the remote service serves.
    pub remote_voices: RemoteVoiceCatalog,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            remote_base_url: "http://localhost:3001/api/tts".to_string(),
            default_backend: PreferenceBackend::Local,
            min_loading_ms: 300,
            health_check_timeout_ms: 3000,
            synthesis_timeout_ms: 15_000,
            remote_voices: RemoteVoiceCatalog::default(),
        }
    }
}

impl SpeechConfig {
    pub fn min_loading(&self) -> Duration {
        Duration::from_millis(self.min_loading_ms)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis_timeout_ms)
    }
}

/// On-device engine polling contract.
///
/// The engine's start/end callbacks are not reliable, so the adapter polls its
/// `speaking`/`pending` flags at a constant interval instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalEngineConfig {
    /// Interval between polls of the engine flags, in ms.
    pub poll_interval_ms: u64,
    /// Time allowed for the engine to start speaking after submission, in ms.
    pub start_verify_ms: u64,
}

impl Default for LocalEngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            start_verify_ms: 400,
        }
    }
}

impl LocalEngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn start_verify(&self) -> Duration {
        Duration::from_millis(self.start_verify_ms)
    }
}

/// Audio session switching after capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSessionConfig {
    /// Force the pulse-and-wait sequence regardless of platform.
    /// None means "only where the platform needs it".
    pub force_mode_switch: Option<bool>,
    /// Length of the near-silent pulse, in ms.
    pub pulse_ms: u64,
    /// Delay between the pulse and the real playback, in ms.
    pub switch_delay_ms: u64,
}

impl Default for AudioSessionConfig {
    fn default() -> Self {
        Self {
            force_mode_switch: None,
            pulse_ms: 50,
            switch_delay_ms: 150,
        }
    }
}

/// Speech recognition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub continuous: bool,
    pub interim_results: bool,
    /// Restart the recognizer when it ends on silence.
    /// None means "only on platforms that end on silence".
    pub restart_on_silence: Option<bool>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            continuous: true,
            interim_results: true,
            restart_on_silence: None,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub privacy: PrivacyConfig,
    pub logging: LoggingConfig,
    pub platform: PlatformConfig,
    pub speech: SpeechConfig,
    pub local_engine: LocalEngineConfig,
    pub audio_session: AudioSessionConfig,
    pub recognition: RecognitionConfig,
    pub personas: PersonaDirectory,
}

impl AppConfig {
    /// Create a new AppConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the recognizer should be restarted after a silence timeout.
    pub fn restart_on_silence(&self) -> bool {
        self.recognition
            .restart_on_silence
            .unwrap_or_else(|| self.platform.kind.ends_capture_on_silence())
    }

    /// Whether playback after capture needs the audio-session switch sequence.
    pub fn needs_audio_mode_switch(&self) -> bool {
        self.audio_session
            .force_mode_switch
            .unwrap_or_else(|| self.platform.kind.sticks_in_capture_mode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::new();
        assert_eq!(config.speech.min_loading_ms, 300);
        assert_eq!(config.speech.health_check_timeout_ms, 3000);
        assert_eq!(config.local_engine.poll_interval_ms, 50);
        assert_eq!(config.speech.default_backend, PreferenceBackend::Local);
        assert!(!config.privacy.local_only);
    }

    #[test]
    fn test_platform_derived_switches() {
        let mut config = AppConfig::new();
        assert!(!config.restart_on_silence());
        assert!(!config.needs_audio_mode_switch());

        config.platform.kind = PlatformKind::EmbeddedNative;
        assert!(config.restart_on_silence());
        assert!(config.needs_audio_mode_switch());

        config.recognition.restart_on_silence = Some(false);
        config.audio_session.force_mode_switch = Some(false);
        assert!(!config.restart_on_silence());
        assert!(!config.needs_audio_mode_switch());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let text = r#"
            [platform]
            kind = "mobile-browser"

            [speech]
            min_loading_ms = 500
        "#;
        let config: AppConfig = toml::from_str(text).unwrap();
        assert_eq!(config.platform.kind, PlatformKind::MobileBrowser);
        assert_eq!(config.speech.min_loading_ms, 500);
        assert_eq!(config.speech.health_check_timeout_ms, 3000);
        assert_eq!(config.local_engine.start_verify_ms, 400);
    }

    #[test]
    fn test_poll_interval_never_zero() {
        let config = LocalEngineConfig {
            poll_interval_ms: 0,
            start_verify_ms: 0,
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }
}
