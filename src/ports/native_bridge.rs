use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::{PlatformError, QualityTier};

/// A voice offered by the platform-embedded synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeVoice {
    pub identifier: String,
    pub name: String,
    pub language: String,
    pub quality: QualityTier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeSpeakOptions {
    pub text: String,
    pub voice_identifier: Option<String>,
    pub language: String,
    pub rate: f32,
    pub pitch: f32,
}

/// Lifecycle events from the native synthesizer. These are reliable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeSpeechEvent {
    SpeechStart,
    SpeechEnd,
    SpeechCancel,
}

/// Port for the platform-embedded synthesizer reached through a bridge.
#[async_trait]
pub trait NativeSpeechBridge: Send + Sync {
    async fn list_voices(&self) -> Result<Vec<NativeVoice>, PlatformError>;

    async fn speak(&self, options: NativeSpeakOptions) -> Result<(), PlatformError>;

    async fn stop(&self) -> Result<(), PlatformError>;

    async fn pause(&self) -> Result<(), PlatformError>;

    async fn resume(&self) -> Result<(), PlatformError>;

    /// Subscribe to lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<NativeSpeechEvent>;
}
