use thiserror::Error;

use crate::domain::capture::CaptureState;

/// Infrastructure-level errors (configuration, storage, network plumbing).
///
/// These never cross a coordinator boundary directly; adapters translate them
/// into [`SpeechError`] before the orchestration layer sees them.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network request blocked: {reason}")]
    NetworkBlocked { reason: String },

    #[error("HTTP request failed: {0}")]
    HttpRequest(String),

    #[error("HTTP request timed out after {timeout_ms}ms")]
    HttpTimeout { timeout_ms: u64 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Preference store error: {0}")]
    PreferenceStore(String),
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for DomainError {
    fn from(err: toml::de::Error) -> Self {
        DomainError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DomainError {
    fn from(err: toml::ser::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

/// Raw failure reported by a platform collaborator (engine, bridge, player).
///
/// Adapters translate these into [`SpeechError`]; they never reach callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct PlatformError {
    pub message: String,
}

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the speech orchestration layer.
///
/// Every platform or network failure is mapped onto one of these variants at
/// the adapter boundary. Only [`SpeechError::PermissionDenied`] is meant to be
/// shown to the user; the rest degrade silently where a fallback exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpeechError {
    /// Remote health check failed, or a backend call errored.
    #[error("Speech backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A stored voice id is unknown to (or incompatible with) its backend.
    #[error("Invalid voice selection: {voice_id}")]
    InvalidVoiceSelection { voice_id: String },

    /// Microphone or recognition permission was refused.
    #[error("Microphone access was denied")]
    PermissionDenied,

    /// Recognizer heard nothing before its silence timeout.
    #[error("No speech detected")]
    NoSpeechDetected,

    /// Synthesized audio could not be decoded or played.
    #[error("Audio playback failed: {0}")]
    PlaybackDecodeError(String),

    /// Nothing left to speak after text cleaning.
    #[error("Nothing to speak")]
    EmptyText,

    /// No speech recognizer is available on this platform.
    #[error("Speech recognition is not available")]
    RecognizerUnavailable,

    #[error("Invalid capture state transition from {from:?} to {to:?}")]
    CaptureStateTransition { from: CaptureState, to: CaptureState },
}

impl SpeechError {
    /// Message suitable for display, for the errors that must reach the UI.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            SpeechError::PermissionDenied => Some(
                "Microphone access was denied. Please allow microphone access in your settings to use voice input.",
            ),
            SpeechError::RecognizerUnavailable => {
                Some("Voice input is not supported on this device.")
            }
            _ => None,
        }
    }

    /// Whether a local fallback should be attempted after this error.
    pub fn allows_fallback(&self) -> bool {
        matches!(
            self,
            SpeechError::BackendUnavailable(_) | SpeechError::InvalidVoiceSelection { .. }
        )
    }
}

impl From<DomainError> for SpeechError {
    fn from(err: DomainError) -> Self {
        SpeechError::BackendUnavailable(err.to_string())
    }
}
