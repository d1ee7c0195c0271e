#![forbid(unsafe_code)]

//! Speech I/O orchestration: text-to-speech across local, remote and native
//! synthesis backends, and speech capture with transcript reconciliation.
//!
//! Hosts implement the platform ports in [`ports`] and hand them to
//! [`AppController`], which owns one [`SpeechOutputCoordinator`] and one
//! [`SpeechInputCoordinator`].

pub mod adapters;
pub mod app;
pub mod domain;
pub mod infrastructure;
pub mod ports;

#[cfg(test)]
mod test_support;

pub use app::{AppController, PlatformPorts, SpeechInputCoordinator, SpeechOutputCoordinator};
pub use domain::{
    AppConfig, Backend, CallerContext, CaptureEvent, CaptureState, DomainError, PlaybackSession,
    PlaybackStatus, SpeechError, SpeechRequest, TranscriptState, VoiceDescriptor, VoicePreference,
};
