use serde::{Deserialize, Serialize};

/// Environment the orchestration layer runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformKind {
    /// Desktop browser or desktop shell.
    #[default]
    Desktop,
    /// Mobile browser; audio autoplay is restricted to user gestures.
    MobileBrowser,
    /// Native app shell with an embedded synthesizer bridge.
    EmbeddedNative,
}

impl PlatformKind {
    /// Network-audio playback outside a user gesture is blocked.
    pub fn restricts_autoplay(&self) -> bool {
        matches!(self, PlatformKind::MobileBrowser)
    }

    /// The audio session stays in a recording-oriented mode after capture
    /// until something is played through the playback path.
    pub fn sticks_in_capture_mode(&self) -> bool {
        matches!(self, PlatformKind::EmbeddedNative)
    }

    /// The recognizer ends on its own after a silence timeout even in
    /// continuous mode.
    pub fn ends_capture_on_silence(&self) -> bool {
        matches!(self, PlatformKind::MobileBrowser | PlatformKind::EmbeddedNative)
    }

    pub fn has_native_synthesizer(&self) -> bool {
        matches!(self, PlatformKind::EmbeddedNative)
    }
}

/// Who is speaking to whom, as far as backend selection cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallerContext {
    pub platform: PlatformKind,
    /// Guests never reach the remote service.
    pub authenticated: bool,
}

impl CallerContext {
    pub fn new(platform: PlatformKind, authenticated: bool) -> Self {
        Self {
            platform,
            authenticated,
        }
    }

    /// Signed in, and on a platform that lets remote audio play.
    pub fn may_use_remote(&self) -> bool {
        self.authenticated && !self.platform.restricts_autoplay()
    }
}
