use crate::domain::{DomainError, PreferenceKey, VoicePreference};

/// Port for persisted per-persona voice preferences.
pub trait PreferenceStore: Send + Sync {
    /// The stored preference, or `None` if this persona/language pair has
    /// never been used.
    fn load(&self, key: &PreferenceKey) -> Result<Option<VoicePreference>, DomainError>;

    fn save(&self, key: &PreferenceKey, preference: &VoicePreference) -> Result<(), DomainError>;
}
