use async_trait::async_trait;

use crate::domain::{PlatformError, RecognitionAlternative};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizerOptions {
    pub language: String,
    pub continuous: bool,
    pub interim_results: bool,
}

/// Event as raised by the platform recognizer (`onstart`, `onresult`,
/// `onerror`, `onend`). Error codes are the platform's strings.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecognizerEvent {
    Start,
    Result(Vec<RecognitionAlternative>),
    Error(String),
    End,
}

pub type RecognizerCallback = Box<dyn Fn(RawRecognizerEvent) + Send + Sync>;

/// Port for the platform speech-capture bridge.
#[async_trait]
pub trait RecognizerBridge: Send + Sync {
    /// Whether a recognizer exists on this platform at all.
    fn is_available(&self) -> bool;

    /// Ask for microphone and recognition permission. `Ok(false)` means refused.
    async fn request_permission(&self) -> Result<bool, PlatformError>;

    /// Start a recognizer run. Events for this run go to `callback` until the
    /// run ends; a later `start` replaces the callback.
    async fn start(
        &self,
        options: RecognizerOptions,
        callback: RecognizerCallback,
    ) -> Result<(), PlatformError>;

    async fn stop(&self) -> Result<(), PlatformError>;
}
