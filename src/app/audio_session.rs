use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::config::AudioSessionConfig;
use crate::ports::AudioOutput;

/// Sequences audio-session mode changes between capture and playback.
///
/// On platforms that stay in a recording-oriented session after capture,
/// the first playback afterwards comes out of the earpiece or not at all. A
/// short near-silent pulse followed by a fixed delay moves the session back
/// to playback before real audio starts.
pub struct AudioSessionManager {
    output: Arc<dyn AudioOutput>,
    enabled: bool,
    pulse: Duration,
    delay: Duration,
    capture_active: AtomicBool,
    needs_switch: AtomicBool,
}

impl AudioSessionManager {
    pub fn new(output: Arc<dyn AudioOutput>, enabled: bool, config: &AudioSessionConfig) -> Self {
        Self {
            output,
            enabled,
            pulse: Duration::from_millis(config.pulse_ms),
            delay: Duration::from_millis(config.switch_delay_ms),
            capture_active: AtomicBool::new(false),
            needs_switch: AtomicBool::new(false),
        }
    }

    pub fn mark_capture_started(&self) {
        self.capture_active.store(true, Ordering::SeqCst);
    }

    pub fn mark_capture_stopped(&self) {
        if self.capture_active.swap(false, Ordering::SeqCst) && self.enabled {
            debug!("Capture stopped, next playback switches the audio session");
            self.needs_switch.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_capture_active(&self) -> bool {
        self.capture_active.load(Ordering::SeqCst)
    }

    /// Run before any playback. Plays the pulse and waits only for the first
    /// playback after a capture ended.
    pub async fn prepare_playback(&self) {
        if !self.needs_switch.swap(false, Ordering::SeqCst) {
            return;
        }
        debug!(
            pulse_ms = self.pulse.as_millis() as u64,
            delay_ms = self.delay.as_millis() as u64,
            "Switching audio session to playback"
        );
        if let Err(e) = self.output.play_silence(self.pulse).await {
            warn!(error = %e, "Audio session pulse failed");
        }
        tokio::time::sleep(self.delay).await;
    }
}
