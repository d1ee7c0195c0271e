use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{RecognizerErrorCode, RecognizerEvent, SessionId, SpeechError};
use crate::ports::{RawRecognizerEvent, RecognizerBridge, RecognizerOptions};

/// Callback receiving session-tagged recognizer events.
pub type RecognizerEventHandler = Arc<dyn Fn(SessionId, RecognizerEvent) + Send + Sync>;

/// Thin wrapper over the platform recognizer bridge.
///
/// Parses platform error codes, tags every event with the capture session
/// that started the run, and maps bridge failures onto [`SpeechError`].
pub struct PlatformRecognizer {
    bridge: Arc<dyn RecognizerBridge>,
}

impl PlatformRecognizer {
    pub fn new(bridge: Arc<dyn RecognizerBridge>) -> Self {
        Self { bridge }
    }

    pub fn is_available(&self) -> bool {
        self.bridge.is_available()
    }

    pub async fn request_permission(&self) -> Result<(), SpeechError> {
        if !self.bridge.is_available() {
            return Err(SpeechError::RecognizerUnavailable);
        }
        match self.bridge.request_permission().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SpeechError::PermissionDenied),
            Err(e) => {
                warn!(error = %e, "Permission request failed");
                Err(SpeechError::PermissionDenied)
            }
        }
    }

    pub async fn start(
        &self,
        session_id: SessionId,
        options: RecognizerOptions,
        handler: RecognizerEventHandler,
    ) -> Result<(), SpeechError> {
        if !self.bridge.is_available() {
            return Err(SpeechError::RecognizerUnavailable);
        }
        debug!(session = %session_id, language = %options.language, "Starting recognizer");

        let callback = Box::new(move |raw: RawRecognizerEvent| {
            let event = match raw {
                RawRecognizerEvent::Start => RecognizerEvent::Started,
                RawRecognizerEvent::Result(batch) => RecognizerEvent::Result(batch),
                RawRecognizerEvent::Error(code) => {
                    RecognizerEvent::Error(RecognizerErrorCode::parse(&code))
                }
                RawRecognizerEvent::End => RecognizerEvent::Ended,
            };
            handler(session_id, event);
        });

        self.bridge
            .start(options, callback)
            .await
            .map_err(|e| SpeechError::BackendUnavailable(format!("recognizer start: {}", e)))
    }

    pub async fn stop(&self) -> Result<(), SpeechError> {
        self.bridge
            .stop()
            .await
            .map_err(|e| SpeechError::BackendUnavailable(format!("recognizer stop: {}", e)))
    }
}
