use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{AudioClip, PlatformError};
use crate::ports::synthesis::PlaybackSink;

/// Port for playing synthesized audio bytes.
///
/// `play` returns once playback has started or failed to start; completion
/// and late failures are reported through the sink.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn play(&self, clip: &AudioClip, sink: PlaybackSink) -> Result<(), PlatformError>;

    async fn stop(&self) -> Result<(), PlatformError>;

    async fn pause(&self) -> Result<(), PlatformError>;

    async fn resume(&self) -> Result<(), PlatformError>;

    /// Play a near-silent tone. Used to nudge the audio session into
    /// playback mode.
    async fn play_silence(&self, duration: Duration) -> Result<(), PlatformError>;

    /// Free any platform resources held for the clip with this key.
    fn release(&self, key: &str);
}
