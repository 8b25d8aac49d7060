//! Preferences persistence for annotation sessions.

use directories::ProjectDirs;
use doc_model::Preferences;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const PREFS_SCHEMA_VERSION: u32 = 1;
const PREFS_FILE_NAME: &str = "preferences.json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("preferences schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PreferencesEnvelope {
    version: u32,
    preferences: Preferences,
}

/// Stored files are either the versioned envelope or hand-written bare preferences.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredPreferences {
    Envelope(PreferencesEnvelope),
    Bare(Preferences),
}

impl Storage {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs =
            ProjectDirs::from("dev", "Markup", "Markup").ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.root.join(PREFS_FILE_NAME)
    }

    /// Defaults when nothing has been saved yet.
    pub fn load_preferences(&self) -> Result<Preferences, StorageError> {
        let path = self.preferences_path();
        if !path.exists() {
            return Ok(Preferences::default());
        }
        load_from_file(&path)
    }

    pub fn save_preferences(&self, preferences: &Preferences) -> Result<(), StorageError> {
        save_to_file(&self.preferences_path(), preferences)
    }
}

/// Writes `preferences` as the current envelope, creating parent directories.
pub fn save_to_file(path: &Path, preferences: &Preferences) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let envelope =
        PreferencesEnvelope { version: PREFS_SCHEMA_VERSION, preferences: preferences.clone() };

    let bytes = serde_json::to_vec_pretty(&envelope)?;
    fs::write(path, bytes)?;
    Ok(())
}

/// Reads an explicit preferences file; the file must exist.
pub fn load_from_file(path: &Path) -> Result<Preferences, StorageError> {
    let bytes = fs::read(path)?;
    let preferences = match serde_json::from_slice::<StoredPreferences>(&bytes)? {
        StoredPreferences::Envelope(envelope) if envelope.version > PREFS_SCHEMA_VERSION => {
            return Err(StorageError::UnsupportedVersion {
                found: envelope.version,
                supported: PREFS_SCHEMA_VERSION,
            });
        }
        StoredPreferences::Envelope(envelope) => envelope.preferences,
        StoredPreferences::Bare(preferences) => preferences,
    };
    Ok(preferences.sanitized())
}
