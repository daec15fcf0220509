//! Persistence of the hidden set and the few user settings next to it.
//!
//! The document is a small JSON object stored as a dot-file in the managed
//! directory:
//!
//! ```json
//! {
//!   "hidden": ["/photos/a.jpg"],
//!   "output_directory": "/photos/out",
//!   "preferred_player": "auto"
//! }
//! ```
//!
//! Only `hidden` is required for the catalog to work; the other keys are
//! optional and unknown keys are ignored so older and newer builds can share
//! the same file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the config document inside a workspace.
pub const CONFIG_FILE: &str = ".slideshow_config.json";

/// Player preference meaning "pick the best installed player".
pub const AUTO_PLAYER: &str = "auto";

/// Absolute paths excluded from slideshow generation.
pub type HiddenSet = BTreeSet<PathBuf>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file {path} is corrupted: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Could not read configuration file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Could not write configuration file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub hidden: HiddenSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<PathBuf>,
    pub preferred_player: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hidden: HiddenSet::new(),
            output_directory: None,
            preferred_player: AUTO_PLAYER.to_string(),
        }
    }
}

/// Reads and writes the config document at a fixed location.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document. A missing file is an empty configuration.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("No configuration at {}, using defaults", self.path.display());
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let settings: Settings =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        log::info!(
            "Loaded {} hidden images from {}",
            settings.hidden.len(),
            self.path.display()
        );
        Ok(settings)
    }

    /// Load the document, falling back to defaults when it cannot be used.
    ///
    /// The error, if any, is handed back so the caller can show it as a warning.
    pub fn load_or_default(&self) -> (Settings, Option<ConfigError>) {
        match self.load() {
            Ok(settings) => (settings, None),
            Err(e) => {
                log::warn!("{}; continuing with an empty configuration", e);
                (Settings::default(), Some(e))
            }
        }
    }

    /// Replace the document atomically: write a sibling temp file, then rename
    /// it over the target.
    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: self.path.clone(),
            source,
        };

        let mut json = serde_json::to_string_pretty(settings)
            .map_err(|e| write_error(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        json.push('\n');

        let temp = self.temp_path();
        let result = write_synced(&temp, json.as_bytes()).and_then(|_| fs::rename(&temp, &self.path));
        if let Err(source) = result {
            let _ = fs::remove_file(&temp);
            return Err(write_error(source));
        }

        log::debug!(
            "Saved configuration with {} hidden images to {}",
            settings.hidden.len(),
            self.path.display()
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from(CONFIG_FILE));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
