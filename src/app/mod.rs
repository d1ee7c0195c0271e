pub mod audio_session;
pub mod controller;
pub mod speech_input;
pub mod speech_output;
pub mod transcript;

pub use audio_session::AudioSessionManager;
pub use controller::{AppController, PlatformPorts};
pub use speech_input::SpeechInputCoordinator;
pub use speech_output::{OutputPorts, OutputSettings, SpeechOutputCoordinator};
pub use transcript::{classify, reconcile, BatchShape};
