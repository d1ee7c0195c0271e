pub mod audio_output;
pub mod config;
pub mod http;
pub mod local_engine;
pub mod native_bridge;
pub mod preferences;
pub mod recognizer;
pub mod synthesis;

pub use audio_output::AudioOutput;
pub use config::ConfigStore;
pub use http::HttpClient;
pub use local_engine::{EngineCallback, EngineNotification, EngineVoice, LocalSpeechEngine};
pub use native_bridge::{NativeSpeakOptions, NativeSpeechBridge, NativeSpeechEvent, NativeVoice};
pub use preferences::PreferenceStore;
pub use recognizer::{RawRecognizerEvent, RecognizerBridge, RecognizerCallback, RecognizerOptions};
pub use synthesis::{HealthStatus, PlaybackSink, SignalHandler, SpeechSynthesizer};
