use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::voice::Gender;

/// How a persona should sound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaVoiceProfile {
    pub gender: Gender,
    /// Speaking rate for regular replies (1.0 = engine default).
    pub rate: f32,
    /// Speaking rate for long-form passages such as guided meditations.
    pub long_form_rate: f32,
    pub pitch: f32,
}

impl Default for PersonaVoiceProfile {
    fn default() -> Self {
        Self {
            gender: Gender::Male,
            rate: 1.0,
            long_form_rate: 1.0,
            pitch: 1.0,
        }
    }
}

impl PersonaVoiceProfile {
    fn new(gender: Gender, rate: f32, long_form_rate: f32) -> Self {
        Self {
            gender,
            rate,
            long_form_rate,
            pitch: 1.0,
        }
    }

    pub fn rate_for(&self, is_long_form_passage: bool) -> f32 {
        if is_long_form_passage {
            self.long_form_rate
        } else {
            self.rate
        }
    }
}

/// Persona id -> voice profile lookup.
///
/// Unknown personas get the default profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonaDirectory {
    profiles: BTreeMap<String, PersonaVoiceProfile>,
}

impl Default for PersonaDirectory {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        for id in ["g-interviewer", "ava-strategic", "chloe-cbt"] {
            profiles.insert(id.to_string(), PersonaVoiceProfile::new(Gender::Female, 1.0, 1.0));
        }
        profiles.insert(
            "max-ambitious".to_string(),
            PersonaVoiceProfile::new(Gender::Male, 1.05, 1.05),
        );
        profiles.insert(
            "rob-pq".to_string(),
            PersonaVoiceProfile::new(Gender::Male, 1.05, 0.9),
        );
        profiles.insert(
            "kenji-stoic".to_string(),
            PersonaVoiceProfile::new(Gender::Male, 1.0, 0.9),
        );
        profiles.insert(
            "nexus-gps".to_string(),
            PersonaVoiceProfile::new(Gender::Male, 1.1, 1.1),
        );
        Self { profiles }
    }
}

impl PersonaDirectory {
    pub fn profile(&self, persona_id: &str) -> PersonaVoiceProfile {
        self.profiles.get(persona_id).cloned().unwrap_or_default()
    }

    pub fn insert(&mut self, persona_id: impl Into<String>, profile: PersonaVoiceProfile) {
        self.profiles.insert(persona_id.into(), profile);
    }
}
