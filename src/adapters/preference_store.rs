use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{DomainError, PreferenceKey, VoicePreference};
use crate::ports::PreferenceStore;

const PREFERENCES_FILE: &str = "voice_preferences.toml";

/// persona id -> language -> preference
type PreferenceTable = BTreeMap<String, BTreeMap<String, VoicePreference>>;

/// Voice preferences persisted as one TOML file, keyed by persona then language.
///
/// The file is read once on first access and rewritten on every save.
pub struct TomlPreferenceStore {
    path: PathBuf,
    table: Mutex<Option<PreferenceTable>>,
}

impl TomlPreferenceStore {
    /// Store preferences in `voice_preferences.toml` inside `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        Self::at_path(data_dir.join(PREFERENCES_FILE))
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_table(&self) -> Result<PreferenceTable, DomainError> {
        if !self.path.exists() {
            debug!(path = ?self.path, "No preference file yet");
            return Ok(PreferenceTable::new());
        }
        let content = fs::read_to_string(&self.path)?;
        toml::from_str(&content).map_err(|e| {
            warn!(path = ?self.path, error = %e, "Preference file is unreadable");
            DomainError::PreferenceStore(e.to_string())
        })
    }

    fn write_table(&self, table: &PreferenceTable) -> Result<(), DomainError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(table)?;
        let temp_path = self.path.with_extension("toml.tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl PreferenceStore for TomlPreferenceStore {
    fn load(&self, key: &PreferenceKey) -> Result<Option<VoicePreference>, DomainError> {
        let mut guard = self.table.lock();
        if guard.is_none() {
            *guard = Some(self.read_table()?);
        }
        Ok(guard
            .as_ref()
            .and_then(|table| table.get(&key.persona_id))
            .and_then(|languages| languages.get(&key.language))
            .cloned())
    }

    fn save(&self, key: &PreferenceKey, preference: &VoicePreference) -> Result<(), DomainError> {
        let mut guard = self.table.lock();
        let mut table = match guard.take() {
            Some(table) => table,
            None => self.read_table()?,
        };
        table
            .entry(key.persona_id.clone())
            .or_default()
            .insert(key.language.clone(), preference.clone());

        let result = self.write_table(&table);
        *guard = Some(table);
        result?;

        info!(
            persona = %key.persona_id,
            language = %key.language,
            mode = ?preference.mode,
            backend = ?preference.backend,
            voice_id = ?preference.voice_id,
            "Voice preference saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PreferenceBackend;

    #[test]
    fn test_unknown_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlPreferenceStore::new(dir.path());
        let key = PreferenceKey::new("kenji-stoic", "de-DE");
        assert_eq!(store.load(&key).unwrap(), None);
    }

    #[test]
    fn test_roundtrip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = PreferenceKey::new("rob-pq", "en-US");
        let preference = VoicePreference::explicit(PreferenceBackend::Remote, Some("en-ryan".into()));

        TomlPreferenceStore::new(dir.path())
            .save(&key, &preference)
            .unwrap();

        let reopened = TomlPreferenceStore::new(dir.path());
        assert_eq!(reopened.load(&key).unwrap(), Some(preference));
        // Same persona, other language, stays unset.
        assert_eq!(
            reopened.load(&PreferenceKey::new("rob-pq", "de")).unwrap(),
            None
        );
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlPreferenceStore::new(dir.path());
        store
            .save(
                &PreferenceKey::new("chloe-cbt", "de"),
                &VoicePreference::auto(PreferenceBackend::Local, Some("anna-uri".into())),
            )
            .unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        let parsed: toml::Value = toml::from_str(&text).unwrap();
        let record = &parsed["chloe-cbt"]["de"];
        assert_eq!(record["mode"].as_str(), Some("auto"));
        assert_eq!(record["backend"].as_str(), Some("local"));
        assert_eq!(record["voiceId"].as_str(), Some("anna-uri"));
    }

    #[test]
    fn test_overwrite_keeps_other_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlPreferenceStore::new(dir.path());
        let de = PreferenceKey::new("max-ambitious", "de");
        let en = PreferenceKey::new("max-ambitious", "en");

        store.save(&de, &VoicePreference::auto(PreferenceBackend::Local, None)).unwrap();
        store.save(&en, &VoicePreference::auto(PreferenceBackend::Local, None)).unwrap();
        let remote = VoicePreference::explicit(PreferenceBackend::Remote, Some("de-mls".into()));
        store.save(&de, &remote).unwrap();

        assert_eq!(store.load(&de).unwrap(), Some(remote));
        assert!(store.load(&en).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlPreferenceStore::new(dir.path());
        fs::write(store.path(), "[[[").unwrap();
        assert!(matches!(
            store.load(&PreferenceKey::new("x", "en")),
            Err(DomainError::PreferenceStore(_))
        ));
    }
}
