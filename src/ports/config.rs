use std::path::PathBuf;

use crate::domain::{AppConfig, DomainError};

/// Configuration store port for persisting and loading the orchestrator configuration.
pub trait ConfigStore: Send + Sync {
    /// Load configuration from persistent storage.
    /// Creates default config if none exists.
    fn load(&self) -> Result<AppConfig, DomainError>;

    /// Save configuration to persistent storage.
    fn save(&self, config: &AppConfig) -> Result<(), DomainError>;

    /// Get the path to the configuration file.
    fn config_path(&self) -> PathBuf;

    /// Directory holding preferences and other persisted state.
    fn data_dir(&self) -> PathBuf;

    /// Get the path to the logs directory.
    fn logs_dir(&self) -> PathBuf;
}
