use async_trait::async_trait;

use crate::domain::{PlatformError, Utterance};

/// A voice as reported by the on-device engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVoice {
    /// Engine-unique identifier (`voiceURI`-style).
    pub uri: String,
    pub name: String,
    pub language: String,
    pub local_service: bool,
}

/// Engine callback notification. Unreliable on some platforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineNotification {
    Start,
    End,
    Error(String),
}

pub type EngineCallback = Box<dyn Fn(EngineNotification) + Send + Sync>;

/// Port for the on-device speech synthesis engine.
///
/// The `speaking` and `pending` flags are the source of truth for playback
/// progress; callbacks may fire late, twice, or not at all.
#[async_trait]
pub trait LocalSpeechEngine: Send + Sync {
    async fn list_voices(&self) -> Result<Vec<EngineVoice>, PlatformError>;

    /// Queue an utterance. `voice_id` in the utterance is an [`EngineVoice::uri`].
    async fn speak(&self, utterance: &Utterance, callback: EngineCallback)
        -> Result<(), PlatformError>;

    /// Drop the current utterance and anything queued.
    fn cancel(&self);

    fn pause(&self);

    fn resume(&self);

    fn is_speaking(&self) -> bool;

    fn is_pending(&self) -> bool;
}
