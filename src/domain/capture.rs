use serde::{Deserialize, Serialize};

use crate::domain::playback::SessionId;
use crate::domain::SpeechError;

/// Speech capture state machine.
///
/// State transitions:
/// - Idle -> Listening (start_capture)
/// - Listening -> Stopped (stop_capture, or recognizer ended without restart)
/// - Listening -> Error (permission denied, recognizer failure)
/// - Stopped -> Idle, Error -> Idle (immediately after the terminal state is published)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    #[default]
    Idle,
    Listening,
    Stopped,
    Error,
}

impl CaptureState {
    #[must_use]
    pub fn can_start(&self) -> bool {
        !matches!(self, CaptureState::Listening)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureState::Stopped | CaptureState::Error)
    }
}

/// One alternative in a recognizer result batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionAlternative {
    pub transcript: String,
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl RecognitionAlternative {
    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: false,
            confidence: None,
        }
    }

    pub fn final_result(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: true,
            confidence: None,
        }
    }
}

/// Recognizer error codes, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerErrorCode {
    /// `not-allowed` / `service-not-allowed`
    NotAllowed,
    /// `no-speech`
    NoSpeech,
    /// `aborted`, raised when a stop is in flight
    Aborted,
    /// `audio-capture`
    AudioCapture,
    /// `network`
    Network,
    Other(String),
}

impl RecognizerErrorCode {
    pub fn parse(code: &str) -> Self {
        match code {
            "not-allowed" | "service-not-allowed" => RecognizerErrorCode::NotAllowed,
            "no-speech" => RecognizerErrorCode::NoSpeech,
            "aborted" => RecognizerErrorCode::Aborted,
            "audio-capture" => RecognizerErrorCode::AudioCapture,
            "network" => RecognizerErrorCode::Network,
            other => RecognizerErrorCode::Other(other.to_string()),
        }
    }

    /// Map onto the orchestration error taxonomy. `Aborted` has no mapping.
    pub fn to_speech_error(&self) -> Option<SpeechError> {
        match self {
            RecognizerErrorCode::NotAllowed => Some(SpeechError::PermissionDenied),
            RecognizerErrorCode::NoSpeech => Some(SpeechError::NoSpeechDetected),
            RecognizerErrorCode::Aborted => None,
            RecognizerErrorCode::AudioCapture => {
                Some(SpeechError::BackendUnavailable("no microphone available".to_string()))
            }
            RecognizerErrorCode::Network => Some(SpeechError::BackendUnavailable(
                "recognition service unreachable".to_string(),
            )),
            RecognizerErrorCode::Other(code) => {
                Some(SpeechError::BackendUnavailable(format!("recognizer error: {}", code)))
            }
        }
    }
}

/// Raw event from the recognizer bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    Started,
    Result(Vec<RecognitionAlternative>),
    Error(RecognizerErrorCode),
    Ended,
}

/// Events published by the speech input coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    StateChanged {
        session_id: SessionId,
        from: CaptureState,
        to: CaptureState,
    },
    /// The visible transcript changed.
    Transcript { session_id: SessionId, text: String },
    /// An error the UI has to show.
    Error {
        session_id: SessionId,
        message: String,
    },
    /// The recognizer was restarted after a silence timeout.
    Restarted { session_id: SessionId },
}

/// Transcript pieces for one capture.
///
/// The visible transcript is always `base_text + accumulated + current`; it is
/// recomputed from the parts, never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptState {
    /// Text already in the input before capture began, with a trailing
    /// separator when non-empty.
    pub base_text: String,
    /// Reconciled text from recognizer runs that ended on silence, each
    /// followed by a single space.
    pub accumulated_from_prior_sessions: String,
    /// Reconciled text of the running recognizer session.
    pub current_session_text: String,
}

impl TranscriptState {
    pub fn new(base_text: &str) -> Self {
        let trimmed = base_text.trim_end();
        let base_text = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{} ", trimmed)
        };
        Self {
            base_text,
            ..Default::default()
        }
    }

    pub fn visible(&self) -> String {
        format!(
            "{}{}{}",
            self.base_text, self.accumulated_from_prior_sessions, self.current_session_text
        )
    }

    /// Move the running session's text into the accumulated prefix.
    pub fn carry_over(&mut self) {
        let current = self.current_session_text.trim();
        if !current.is_empty() {
            self.accumulated_from_prior_sessions.push_str(current);
            self.accumulated_from_prior_sessions.push(' ');
        }
        self.current_session_text.clear();
    }

    /// Final transcript as handed back to the caller.
    pub fn finish(&self) -> String {
        self.visible().trim_end().to_string()
    }
}
