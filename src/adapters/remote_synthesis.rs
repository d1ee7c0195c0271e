use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{
    AudioClip, Backend, DomainError, RemoteVoiceCatalog, SpeechError, Utterance, VoiceDescriptor,
};
use crate::ports::{AudioOutput, HealthStatus, HttpClient, PlaybackSink, SpeechSynthesizer};

/// Body of `POST {base}/synthesize`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    text: &'a str,
    persona_id: &'a str,
    language: &'a str,
    is_long_form_passage: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_id: Option<&'a str>,
}

/// Body of `GET {base}/health`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    #[serde(default)]
    engine_available: Option<bool>,
}

impl HealthResponse {
    fn is_available(&self) -> bool {
        self.status == "ok" && self.engine_available != Some(false)
    }
}

/// Adapter for the networked synthesis service.
///
/// Audio comes back as bytes and is played through the [`AudioOutput`] port;
/// the clip is handed back to the caller for replay caching.
pub struct RemoteSynthesisAdapter<H: HttpClient> {
    http: Arc<H>,
    output: Arc<dyn AudioOutput>,
    base_url: String,
    catalog: RemoteVoiceCatalog,
    synthesis_timeout: Duration,
}

impl<H: HttpClient> RemoteSynthesisAdapter<H> {
    pub fn new(
        http: Arc<H>,
        output: Arc<dyn AudioOutput>,
        base_url: impl Into<String>,
        catalog: RemoteVoiceCatalog,
        synthesis_timeout: Duration,
    ) -> Self {
        Self {
            http,
            output,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            catalog,
            synthesis_timeout,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Synthesize `utterance` and return the encoded audio.
    ///
    /// A voice id the service does not know is dropped rather than sent, so
    /// the service picks its own default.
    pub async fn synthesize(&self, utterance: &Utterance) -> Result<Vec<u8>, SpeechError> {
        let voice_id = match utterance.voice_id.as_deref() {
            Some(id) if self.catalog.contains(id) => Some(id),
            Some(id) => {
                warn!(voice_id = id, "Dropping voice id unknown to the synthesis service");
                None
            }
            None => None,
        };

        let body = SynthesizeRequest {
            text: &utterance.text,
            persona_id: &utterance.persona_id,
            language: &utterance.language,
            is_long_form_passage: utterance.is_long_form_passage,
            voice_id,
        };

        debug!(
            persona = %utterance.persona_id,
            language = %utterance.language,
            voice_id = ?voice_id,
            chars = utterance.text.chars().count(),
            "Requesting remote synthesis"
        );

        let bytes = self
            .http
            .post_json_bytes(&self.endpoint("synthesize"), &body, self.synthesis_timeout)
            .await
            .map_err(|e| match e {
                DomainError::NetworkBlocked { reason } => {
                    SpeechError::BackendUnavailable(format!("network blocked: {}", reason))
                }
                other => SpeechError::from(other),
            })?;

        if bytes.is_empty() {
            return Err(SpeechError::PlaybackDecodeError(
                "synthesis service returned no audio".to_string(),
            ));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl<H: HttpClient + 'static> SpeechSynthesizer for RemoteSynthesisAdapter<H> {
    fn backend(&self) -> Backend {
        Backend::Remote
    }

    async fn list_voices(&self) -> Result<Vec<VoiceDescriptor>, SpeechError> {
        Ok(self.catalog.descriptors())
    }

    async fn speak(
        &self,
        utterance: &Utterance,
        sink: PlaybackSink,
    ) -> Result<Option<AudioClip>, SpeechError> {
        let bytes = self.synthesize(utterance).await?;
        if !sink.is_current() {
            debug!(session = %sink.session_id(), "Session superseded during synthesis, not playing");
            return Ok(None);
        }
        let clip = AudioClip::new(
            &utterance.persona_id,
            &utterance.language,
            &utterance.text,
            bytes,
        );

        self.output
            .play(&clip, sink)
            .await
            .map_err(|e| SpeechError::PlaybackDecodeError(e.to_string()))?;

        info!(key = %clip.key, bytes = clip.len(), "Remote playback started");
        Ok(Some(clip))
    }

    async fn stop(&self) -> Result<(), SpeechError> {
        self.output
            .stop()
            .await
            .map_err(|e| SpeechError::BackendUnavailable(e.to_string()))
    }

    async fn pause(&self) -> Result<(), SpeechError> {
        self.output
            .pause()
            .await
            .map_err(|e| SpeechError::BackendUnavailable(e.to_string()))
    }

    async fn resume(&self) -> Result<(), SpeechError> {
        self.output
            .resume()
            .await
            .map_err(|e| SpeechError::BackendUnavailable(e.to_string()))
    }

    /// Available iff the service answers `status == "ok"` without
    /// `engineAvailable: false` inside `timeout`.
    async fn health_check(&self, timeout: Duration) -> HealthStatus {
        let url = self.endpoint("health");
        let probe = self.http.get_json::<HealthResponse>(&url, timeout);

        match tokio::time::timeout(timeout, probe).await {
            Ok(Ok(response)) if response.is_available() => HealthStatus::available(),
            Ok(Ok(response)) => {
                warn!(
                    status = %response.status,
                    engine_available = ?response.engine_available,
                    "Synthesis service reports unhealthy"
                );
                HealthStatus::unavailable()
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Synthesis service health check failed");
                HealthStatus::unavailable()
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Synthesis service health check timed out");
                HealthStatus::unavailable()
            }
        }
    }
}
