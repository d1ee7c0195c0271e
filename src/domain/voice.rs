use serde::{Deserialize, Serialize};

/// Speech-output engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// On-device synthesis engine (browser-style `speechSynthesis`).
    Local,
    /// Networked neural synthesis service.
    Remote,
    /// Platform-embedded synthesizer reached through the native bridge.
    Native,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Backend::Local => "local",
            Backend::Remote => "remote",
            Backend::Native => "native",
        };
        write!(f, "{}", name)
    }
}

/// Backend recorded in a persisted [`VoicePreference`].
///
/// Native voices are stored under `Local`: on the embedded platform the native
/// catalog replaces the on-device engine's catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceBackend {
    #[default]
    Local,
    Remote,
}

impl From<PreferenceBackend> for Backend {
    fn from(value: PreferenceBackend) -> Self {
        match value {
            PreferenceBackend::Local => Backend::Local,
            PreferenceBackend::Remote => Backend::Remote,
        }
    }
}

/// Fidelity ranking of a synthesized voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    #[default]
    Default,
    Enhanced,
    Premium,
}

impl QualityTier {
    /// Infer a tier from a voice name such as `"Anna (Enhanced)"`.
    pub fn from_name(name: &str) -> Self {
        let name = name.to_lowercase();
        if name.contains("premium") {
            QualityTier::Premium
        } else if name.contains("enhanced") || name.contains("erweitert") {
            QualityTier::Enhanced
        } else {
            QualityTier::Default
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn opposite(self) -> Self {
        match self {
            Gender::Male => Gender::Female,
            Gender::Female => Gender::Male,
        }
    }
}

/// A voice offered by one of the backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceDescriptor {
    pub backend: Backend,
    pub id: String,
    pub display_name: String,
    /// BCP-47 tag as reported by the engine, e.g. `de-DE`.
    pub language: String,
    /// Gender when the engine reports it; otherwise inferred from the name.
    pub gender: Option<Gender>,
    pub quality_tier: QualityTier,
    pub enabled: bool,
}

impl VoiceDescriptor {
    /// Whether this voice speaks `language` (compared on the primary subtag).
    pub fn matches_language(&self, language: &str) -> bool {
        primary_language(&self.language) == primary_language(language)
    }
}

/// Lowercased primary subtag of a language tag (`"de-DE"` -> `"de"`).
pub fn primary_language(tag: &str) -> String {
    tag.split(|c: char| c == '-' || c == '_')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Shorten an engine voice name for display, keeping any quality suffix.
///
/// `"Anna (German (Germany)) (Enhanced)"` becomes `"Anna (Enhanced)"`.
pub fn clean_voice_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let suffix = ["(enhanced)", "(premium)", "(erweitert)"]
        .iter()
        .find_map(|marker| {
            lower
                .find(marker)
                .and_then(|pos| name.get(pos..pos + marker.len()))
        });

    let mut base = name.split('(').next().unwrap_or(name).trim();
    if base == name && base.contains(" - ") {
        base = base.split(" - ").next().unwrap_or(base).trim();
    }

    match suffix {
        Some(suffix) => format!("{} {}", base, suffix),
        None => base.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceMode {
    #[default]
    Auto,
    Explicit,
}

/// Persisted voice choice for one `(persona, language)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VoicePreference {
    pub mode: PreferenceMode,
    pub backend: PreferenceBackend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl VoicePreference {
    pub fn auto(backend: PreferenceBackend, voice_id: Option<String>) -> Self {
        Self {
            mode: PreferenceMode::Auto,
            backend,
            voice_id,
        }
    }

    pub fn explicit(backend: PreferenceBackend, voice_id: Option<String>) -> Self {
        Self {
            mode: PreferenceMode::Explicit,
            backend,
            voice_id,
        }
    }
}

/// Key of a persisted [`VoicePreference`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreferenceKey {
    pub persona_id: String,
    pub language: String,
}

impl PreferenceKey {
    pub fn new(persona_id: impl Into<String>, language: &str) -> Self {
        Self {
            persona_id: persona_id.into(),
            language: primary_language(language),
        }
    }
}

/// A voice served by the remote synthesis service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVoice {
    pub id: String,
    pub name: String,
    pub language: String,
    pub gender: Gender,
}

/// Voices the remote service is known to serve.
///
/// Preference voice ids for the remote backend are validated against this
/// catalog before anything is sent over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteVoiceCatalog {
    pub voices: Vec<RemoteVoice>,
}

impl Default for RemoteVoiceCatalog {
    fn default() -> Self {
        let voice = |id: &str, name: &str, language: &str, gender| RemoteVoice {
            id: id.to_string(),
            name: name.to_string(),
            language: language.to_string(),
            gender,
        };
        Self {
            voices: vec![
                voice("de-mls", "Eva (Deutsch, Weiblich)", "de", Gender::Female),
                voice("de-thorsten", "Thorsten (Deutsch, Männlich)", "de", Gender::Male),
                voice("en-amy", "Amy (English, Female)", "en", Gender::Female),
                voice("en-ryan", "Ryan (English, Male)", "en", Gender::Male),
            ],
        }
    }
}

impl RemoteVoiceCatalog {
    pub fn contains(&self, voice_id: &str) -> bool {
        self.voices.iter().any(|v| v.id == voice_id)
    }

    pub fn get(&self, voice_id: &str) -> Option<&RemoteVoice> {
        self.voices.iter().find(|v| v.id == voice_id)
    }

    /// The catalog as descriptors for voice listings.
    pub fn descriptors(&self) -> Vec<VoiceDescriptor> {
        self.voices
            .iter()
            .map(|v| VoiceDescriptor {
                backend: Backend::Remote,
                id: v.id.clone(),
                display_name: v.name.clone(),
                language: v.language.clone(),
                gender: Some(v.gender),
                quality_tier: QualityTier::Premium,
                enabled: true,
            })
            .collect()
    }
}
