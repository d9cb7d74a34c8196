//! Persisted export defaults.
//!
//! The last-used `EncodeSettings` are kept in a small versioned JSON file so
//! the next export dialog starts from them. A file written by a different
//! format version is ignored.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EncodeSettings, DEFAULT_QUALITY, NUM_QUALITY_LAYERS};

/// Format version of the defaults file.
pub const DEFAULTS_VERSION: u32 = 2;

/// Errors that can occur loading or saving defaults.
#[derive(Debug, Error)]
pub enum DefaultsError {
    #[error("Defaults file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed defaults: {0}")]
    Format(#[from] serde_json::Error),
}

/// On-disk record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredDefaults {
    version: u32,
    preview_enabled: bool,
    quality: Vec<f32>,
}

impl From<&EncodeSettings> for StoredDefaults {
    fn from(settings: &EncodeSettings) -> Self {
        Self {
            version: DEFAULTS_VERSION,
            preview_enabled: settings.preview_enabled,
            quality: settings.quality.clone(),
        }
    }
}

/// Export defaults bound to a file.
#[derive(Debug, Clone)]
pub struct DefaultsStore {
    path: PathBuf,
    settings: EncodeSettings,
}

impl DefaultsStore {
    /// Load defaults from `path`.
    ///
    /// A missing file or a record of another version yields the built-in
    /// defaults. Stored quality values beyond the layer count are dropped;
    /// missing ones take `DEFAULT_QUALITY`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, DefaultsError> {
        let path = path.into();
        let settings = match read_record(&path)? {
            Some(record) if record.version == DEFAULTS_VERSION => {
                let mut quality = record.quality;
                quality.resize(NUM_QUALITY_LAYERS, DEFAULT_QUALITY);
                EncodeSettings {
                    quality,
                    preview_enabled: record.preview_enabled,
                }
            }
            Some(record) => {
                log::warn!(
                    "Ignoring defaults in {} (version {}, expected {})",
                    path.display(),
                    record.version,
                    DEFAULTS_VERSION
                );
                EncodeSettings::default()
            }
            None => EncodeSettings::default(),
        };

        Ok(Self { path, settings })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &EncodeSettings {
        &self.settings
    }

    /// Replace the stored settings (not written until `save`).
    pub fn set(&mut self, settings: EncodeSettings) {
        self.settings = settings;
    }

    /// Write the settings, creating parent directories as needed.
    pub fn save(&self) -> Result<(), DefaultsError> {
        let io_error = |source| DefaultsError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let content = serde_json::to_string_pretty(&StoredDefaults::from(&self.settings))?;
        fs::write(&self.path, content).map_err(io_error)
    }
}

fn read_record(path: &Path) -> Result<Option<StoredDefaults>, DefaultsError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|source| DefaultsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(serde_json::from_str(&content)?))
}
