//! Voice and backend selection.
//!
//! Everything here is pure: inputs are the caller context, the stored
//! preference and the voice catalogs; the output is a decision. The
//! coordinator does all I/O around it.

use std::cmp::Ordering;

use crate::domain::persona::PersonaVoiceProfile;
use crate::domain::platform::CallerContext;
use crate::domain::voice::{
    Backend, Gender, PreferenceBackend, RemoteVoiceCatalog, VoiceDescriptor, VoicePreference,
};
use crate::domain::SpeechError;

/// Name fragments used to guess a voice's gender.
///
/// Kept apart from the ranking so locales can ship their own lists.
#[derive(Debug, Clone)]
pub struct GenderKeywords {
    pub male_words: Vec<String>,
    pub female_words: Vec<String>,
    pub male_names: Vec<String>,
    pub female_names: Vec<String>,
    /// Names whose voices are mislabelled often enough to be treated as unknown.
    pub excluded_names: Vec<String>,
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for GenderKeywords {
    fn default() -> Self {
        Self {
            male_words: owned(&["male", "man", "boy", "männlich"]),
            female_words: owned(&["female", "woman", "girl", "weiblich"]),
            male_names: owned(&[
                "alex", "daniel", "david", "tom", "oliver", "jamie", "max", "rob", "lee",
                "ryan", "aaron", "nexus", "markus", "yannick", "stefan", "viktor", "kenji",
                "martin", "hans", "thorsten",
            ]),
            female_names: owned(&[
                "samantha", "zira", "fiona", "ava", "chloe", "susan", "allison", "cora",
                "kathy", "anna", "hedda", "serena", "petra", "helena", "katja", "amy", "eva",
            ]),
            excluded_names: owned(&["karen", "tessa", "tara", "katrin", "moira"]),
        }
    }
}

impl GenderKeywords {
    /// Guess the gender from a voice name. None means "unknown".
    pub fn classify(&self, name: &str) -> Option<Gender> {
        let lower = name.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphabetic())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |list: &[String]| words.iter().any(|w| list.iter().any(|k| k.as_str() == *w));

        if self.excluded_names.iter().any(|n| lower.contains(n.as_str())) {
            return None;
        }
        if has(&self.male_words) {
            return Some(Gender::Male);
        }
        if has(&self.female_words) {
            return Some(Gender::Female);
        }
        if has(&self.female_names) {
            return Some(Gender::Female);
        }
        if has(&self.male_names) {
            return Some(Gender::Male);
        }
        None
    }
}

/// Scores how well a voice fits a persona.
///
/// Positive: matches the persona's gender. Negative: matches the opposite
/// gender. Zero: no signal either way.
pub trait VoiceScorer: Send + Sync {
    fn score(&self, voice: &VoiceDescriptor, persona: &PersonaVoiceProfile) -> i32;
}

/// Default scorer: engine-reported gender, else name keyword lookup.
#[derive(Debug, Clone, Default)]
pub struct KeywordGenderScorer {
    pub keywords: GenderKeywords,
}

impl KeywordGenderScorer {
    pub fn new(keywords: GenderKeywords) -> Self {
        Self { keywords }
    }
}

impl VoiceScorer for KeywordGenderScorer {
    fn score(&self, voice: &VoiceDescriptor, persona: &PersonaVoiceProfile) -> i32 {
        let gender = voice
            .gender
            .or_else(|| self.keywords.classify(&voice.display_name));
        match gender {
            Some(g) if g == persona.gender => 1,
            Some(g) if g == persona.gender.opposite() => -1,
            _ => 0,
        }
    }
}

fn rank(a: &VoiceDescriptor, b: &VoiceDescriptor) -> Ordering {
    b.quality_tier
        .cmp(&a.quality_tier)
        .then_with(|| a.display_name.cmp(&b.display_name))
}

/// Auto-mode voice resolution.
///
/// Stages, first non-empty wins:
/// 1. language match and persona gender
/// 2. language match and not the opposite gender
/// 3. language match
/// 4. any voice
///
/// The winner is the highest quality tier, ties broken by display name.
pub fn resolve_voice(
    voices: &[VoiceDescriptor],
    language: &str,
    persona: &PersonaVoiceProfile,
    scorer: &dyn VoiceScorer,
) -> Option<VoiceDescriptor> {
    let enabled: Vec<&VoiceDescriptor> = voices.iter().filter(|v| v.enabled).collect();
    let in_language: Vec<&VoiceDescriptor> = enabled
        .iter()
        .copied()
        .filter(|v| v.matches_language(language))
        .collect();

    let stages: [Vec<&VoiceDescriptor>; 4] = [
        in_language
            .iter()
            .copied()
            .filter(|v| scorer.score(v, persona) > 0)
            .collect(),
        in_language
            .iter()
            .copied()
            .filter(|v| scorer.score(v, persona) >= 0)
            .collect(),
        in_language.clone(),
        enabled,
    ];

    stages
        .into_iter()
        .find(|candidates| !candidates.is_empty())
        .and_then(|candidates| candidates.into_iter().min_by(|a, b| rank(a, b)).cloned())
}

/// The voice a preference points at, if it is still offered.
pub fn find_voice<'a>(voices: &'a [VoiceDescriptor], voice_id: &str) -> Option<&'a VoiceDescriptor> {
    voices.iter().find(|v| v.id == voice_id && v.enabled)
}

/// Why a backend was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    NativeVoice,
    Guest,
    AutoplayRestricted,
    InvalidRemoteVoice,
    Preference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDecision {
    pub backend: Backend,
    pub reason: SelectionReason,
    /// Set when the stored preference could not be honoured.
    pub warning: Option<SpeechError>,
}

/// Backend selection precedence; the first matching rule wins.
///
/// 1. embedded-native platform and the selected voice is a native voice
/// 2. unauthenticated caller
/// 3. mobile browser with autoplay restrictions
/// 4. remote preference with a voice id the remote catalog does not know
/// 5. the stored preference
pub fn select_backend(
    caller: &CallerContext,
    preference: &VoicePreference,
    selected_voice_is_native: bool,
    remote_catalog: &RemoteVoiceCatalog,
) -> BackendDecision {
    let decide = |backend, reason| BackendDecision {
        backend,
        reason,
        warning: None,
    };

    if caller.platform.has_native_synthesizer() && selected_voice_is_native {
        return decide(Backend::Native, SelectionReason::NativeVoice);
    }
    if !caller.authenticated {
        return decide(Backend::Local, SelectionReason::Guest);
    }
    if caller.platform.restricts_autoplay() {
        return decide(Backend::Local, SelectionReason::AutoplayRestricted);
    }
    if preference.backend == PreferenceBackend::Remote {
        if let Some(voice_id) = preference.voice_id.as_deref() {
            if !remote_catalog.contains(voice_id) {
                return BackendDecision {
                    backend: Backend::Local,
                    reason: SelectionReason::InvalidRemoteVoice,
                    warning: Some(SpeechError::InvalidVoiceSelection {
                        voice_id: voice_id.to_string(),
                    }),
                };
            }
        }
    }
    decide(preference.backend.into(), SelectionReason::Preference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::platform::PlatformKind;
    use crate::domain::voice::QualityTier;

    fn voice(id: &str, name: &str, language: &str, tier: QualityTier) -> VoiceDescriptor {
        VoiceDescriptor {
            backend: Backend::Local,
            id: id.to_string(),
            display_name: name.to_string(),
            language: language.to_string(),
            gender: None,
            quality_tier: tier,
            enabled: true,
        }
    }

    fn persona(gender: Gender) -> PersonaVoiceProfile {
        PersonaVoiceProfile {
            gender,
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_gender() {
        let keywords = GenderKeywords::default();
        assert_eq!(keywords.classify("Google UK English Male"), Some(Gender::Male));
        assert_eq!(keywords.classify("Microsoft Zira Desktop"), Some(Gender::Female));
        assert_eq!(keywords.classify("Anna (Enhanced)"), Some(Gender::Female));
        assert_eq!(keywords.classify("Karen"), None);
        assert_eq!(keywords.classify("Google Deutsch"), None);
        // "man" must match as a word, not inside "Germany"
        assert_eq!(keywords.classify("Voice of Germany"), None);
    }

    #[test]
    fn test_prefers_gender_match_then_quality() {
        let voices = vec![
            voice("a", "Anna", "de-DE", QualityTier::Premium),
            voice("m1", "Markus", "de-DE", QualityTier::Default),
            voice("m2", "Viktor (Enhanced)", "de-DE", QualityTier::Enhanced),
            voice("d", "Daniel", "en-GB", QualityTier::Premium),
        ];
        let scorer = KeywordGenderScorer::default();
        let chosen = resolve_voice(&voices, "de", &persona(Gender::Male), &scorer).unwrap();
        assert_eq!(chosen.id, "m2");
    }

    #[test]
    fn test_falls_back_to_neutral_voices_before_opposite_gender() {
        let voices = vec![
            voice("f", "Anna", "de-DE", QualityTier::Premium),
            voice("n", "Google Deutsch", "de-DE", QualityTier::Default),
        ];
        let scorer = KeywordGenderScorer::default();
        let chosen = resolve_voice(&voices, "de", &persona(Gender::Male), &scorer).unwrap();
        assert_eq!(chosen.id, "n");
    }

    #[test]
    fn test_falls_back_to_any_language_voice_then_any_voice() {
        let scorer = KeywordGenderScorer::default();
        let only_female = vec![voice("f", "Anna", "de-DE", QualityTier::Default)];
        let chosen = resolve_voice(&only_female, "de", &persona(Gender::Male), &scorer).unwrap();
        assert_eq!(chosen.id, "f");

        let other_language = vec![
            voice("b", "Bruno", "fr-FR", QualityTier::Default),
            voice("a", "Amelie", "fr-FR", QualityTier::Default),
        ];
        let chosen = resolve_voice(&other_language, "de", &persona(Gender::Male), &scorer).unwrap();
        assert_eq!(chosen.id, "a", "ties break on display name");
    }

    #[test]
    fn test_disabled_voices_are_ignored() {
        let mut disabled = voice("x", "Markus", "de-DE", QualityTier::Premium);
        disabled.enabled = false;
        let scorer = KeywordGenderScorer::default();
        assert!(resolve_voice(&[disabled], "de", &persona(Gender::Male), &scorer).is_none());
    }

    #[test]
    fn test_reported_gender_beats_keywords() {
        let mut v = voice("r", "Anna", "de-DE", QualityTier::Default);
        v.gender = Some(Gender::Male);
        let scorer = KeywordGenderScorer::default();
        assert_eq!(scorer.score(&v, &persona(Gender::Male)), 1);
        assert_eq!(scorer.score(&v, &persona(Gender::Female)), -1);
    }

    #[test]
    fn test_backend_precedence() {
        let catalog = RemoteVoiceCatalog::default();
        let remote = VoicePreference::explicit(PreferenceBackend::Remote, Some("en-amy".into()));
        let signed_in = CallerContext::new(PlatformKind::Desktop, true);

        let native = CallerContext::new(PlatformKind::EmbeddedNative, false);
        assert_eq!(select_backend(&native, &remote, true, &catalog).backend, Backend::Native);

        let guest = CallerContext::new(PlatformKind::Desktop, false);
        let decision = select_backend(&guest, &remote, false, &catalog);
        assert_eq!(decision.reason, SelectionReason::Guest);
        assert_eq!(decision.backend, Backend::Local);

        let mobile = CallerContext::new(PlatformKind::MobileBrowser, true);
        assert_eq!(
            select_backend(&mobile, &remote, false, &catalog).reason,
            SelectionReason::AutoplayRestricted
        );

        let decision = select_backend(&signed_in, &remote, false, &catalog);
        assert_eq!(decision.backend, Backend::Remote);
        assert!(decision.warning.is_none());
    }

    #[test]
    fn test_unknown_remote_voice_degrades_to_local_with_warning() {
        let catalog = RemoteVoiceCatalog::default();
        let stored = VoicePreference::explicit(PreferenceBackend::Remote, Some("xx-unknown".into()));
        let caller = CallerContext::new(PlatformKind::Desktop, true);
        let decision = select_backend(&caller, &stored, false, &catalog);
        assert_eq!(decision.backend, Backend::Local);
        assert_eq!(decision.reason, SelectionReason::InvalidRemoteVoice);
        assert_eq!(
            decision.warning,
            Some(SpeechError::InvalidVoiceSelection {
                voice_id: "xx-unknown".into()
            })
        );
    }

    #[test]
    fn test_remote_without_voice_id_stays_remote() {
        let catalog = RemoteVoiceCatalog::default();
        let stored = VoicePreference::auto(PreferenceBackend::Remote, None);
        let caller = CallerContext::new(PlatformKind::Desktop, true);
        assert_eq!(select_backend(&caller, &stored, false, &catalog).backend, Backend::Remote);
    }
}
