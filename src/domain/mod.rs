pub mod capture;
pub mod config;
pub mod error;
pub mod persona;
pub mod platform;
pub mod playback;
pub mod text;
pub mod voice;
pub mod voice_policy;

pub use capture::{
    CaptureEvent, CaptureState, RecognitionAlternative, RecognizerErrorCode, RecognizerEvent,
    TranscriptState,
};
pub use config::AppConfig;
pub use error::{DomainError, PlatformError, SpeechError};
pub use persona::{PersonaDirectory, PersonaVoiceProfile};
pub use platform::{CallerContext, PlatformKind};
pub use playback::{
    AudioClip, PlaybackSession, PlaybackSignal, PlaybackStatus, SessionId, SpeechRequest,
    Utterance,
};
pub use voice::{
    Backend, Gender, PreferenceBackend, PreferenceKey, PreferenceMode, QualityTier,
    RemoteVoiceCatalog, VoiceDescriptor, VoicePreference,
};
