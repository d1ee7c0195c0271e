use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::voice::Backend;
use crate::domain::SpeechError;

/// Identity of a playback or capture session.
///
/// Monotonically increasing per coordinator; every backend event carries the
/// id of the session that triggered it so stale events can be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn next(self) -> Self {
        SessionId(self.0 + 1)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One call to `speak()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    pub text: String,
    pub language: String,
    pub persona_id: String,
    /// Long meditation-style passages are read at a slower rate.
    pub is_long_form_passage: bool,
    pub request_id: String,
}

impl SpeechRequest {
    pub fn new(
        text: impl Into<String>,
        language: impl Into<String>,
        persona_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            persona_id: persona_id.into(),
            is_long_form_passage: false,
            request_id: String::new(),
        }
    }

    pub fn long_form(mut self) -> Self {
        self.is_long_form_passage = true;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// Playback status state machine.
///
/// - Idle -> Loading (speak)
/// - Idle -> Speaking (speak, cached audio replay)
/// - Loading -> Speaking (backend started and minimum loading time elapsed)
/// - Speaking <-> Paused (pause / resume)
/// - any -> Idle (finished, stopped, superseded, failed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Speaking,
    Paused,
}

impl PlaybackStatus {
    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self, PlaybackStatus::Idle)
    }

    #[must_use]
    pub fn can_pause(&self) -> bool {
        matches!(self, PlaybackStatus::Speaking)
    }

    #[must_use]
    pub fn can_resume(&self) -> bool {
        matches!(self, PlaybackStatus::Paused)
    }
}

/// Externally observed playback state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSession {
    pub session_id: SessionId,
    pub status: PlaybackStatus,
    pub backend: Option<Backend>,
    pub cached_audio_key: Option<String>,
    pub started_at: Option<Instant>,
}

impl PlaybackSession {
    pub fn idle(session_id: SessionId) -> Self {
        Self {
            session_id,
            status: PlaybackStatus::Idle,
            backend: None,
            cached_audio_key: None,
            started_at: None,
        }
    }
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::idle(SessionId::default())
    }
}

/// What an adapter is asked to say.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    /// Cleaned text, ready for synthesis.
    pub text: String,
    pub language: String,
    pub persona_id: String,
    pub is_long_form_passage: bool,
    pub voice_id: Option<String>,
    /// Speaking rate, 1.0 = engine default.
    pub rate: f32,
    pub pitch: f32,
}

/// Synthesized audio held by the coordinator's one-slot cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    /// Content key, hex SHA-256 of persona, language and text.
    pub key: String,
    pub persona_id: String,
    /// Normalized text the audio was synthesized from.
    pub text: String,
    pub bytes: Arc<Vec<u8>>,
}

impl AudioClip {
    pub fn new(persona_id: &str, language: &str, text: &str, bytes: Vec<u8>) -> Self {
        Self {
            key: Self::cache_key(persona_id, language, text),
            persona_id: persona_id.to_string(),
            text: text.to_string(),
            bytes: Arc::new(bytes),
        }
    }

    pub fn cache_key(persona_id: &str, language: &str, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(persona_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(language.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Whether this clip can replay `text` for `persona_id`.
    pub fn matches(&self, persona_id: &str, text: &str) -> bool {
        self.persona_id == persona_id && self.text == text
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Raw playback notification from an adapter or the audio output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSignal {
    /// The engine audibly started.
    Started,
    /// Playback ran to completion.
    Finished,
    /// The engine cancelled playback (stop, interruption).
    Cancelled,
    /// Playback failed after it was accepted.
    Failed(SpeechError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_status_predicates() {
        assert!(!PlaybackStatus::Idle.is_active());
        assert!(PlaybackStatus::Loading.is_active());
        assert!(PlaybackStatus::Speaking.can_pause());
        assert!(!PlaybackStatus::Loading.can_pause());
        assert!(PlaybackStatus::Paused.can_resume());
        assert!(!PlaybackStatus::Speaking.can_resume());
    }

    #[test]
    fn test_cache_key_depends_on_persona_and_text() {
        let a = AudioClip::cache_key("ava-strategic", "en", "Hello there");
        let b = AudioClip::cache_key("max-ambitious", "en", "Hello there");
        let c = AudioClip::cache_key("ava-strategic", "en", "Hello there");
        assert_ne!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_clip_matches_persona_and_text() {
        let clip = AudioClip::new("ava-strategic", "en", "Hello there", vec![1, 2, 3]);
        assert!(clip.matches("ava-strategic", "Hello there"));
        assert!(!clip.matches("ava-strategic", "Hello"));
        assert!(!clip.matches("kenji-stoic", "Hello there"));
        assert_eq!(clip.len(), 3);
    }

    #[test]
    fn test_session_ids_increase() {
        let first = SessionId::default();
        assert!(first.next() > first);
        assert_eq!(first.next().to_string(), "#1");
    }
}
