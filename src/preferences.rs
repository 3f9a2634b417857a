//! Remembered input and output directories.
//!
//! Front ends load [`Preferences`] at startup to pre-fill directory choices
//! and save them after a run. Nothing in the library reads them implicitly.
//!
//! # Example
//!
//! ```no_run
//! use sisr::Preferences;
//!
//! let path = Preferences::default_path().expect("no home directory");
//! let mut preferences = Preferences::load(&path)?;
//! preferences.input_dir = Some("shots/sunset".into());
//! preferences.save(&path)?;
//! # Ok::<(), sisr::RenderError>(())
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// File name of the preferences file in the home directory.
pub const PREFERENCES_FILE: &str = ".sisr_prefs.json";

/// Last-used directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Directory the last sequence was read from.
    pub input_dir: Option<PathBuf>,
    /// Directory the last output was written to.
    pub output_dir: Option<PathBuf>,
}

impl Preferences {
    /// `~/.sisr_prefs.json`, or `None` if the home directory is unknown.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(PREFERENCES_FILE))
    }

    /// Read preferences from `path`. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Preferences`] if the file exists but cannot
    /// be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(error) => return Err(preferences_error(path, error)),
        };
        serde_json::from_str(&text).map_err(|error| preferences_error(path, error))
    }

    /// Like [`load`](Self::load), but logs and falls back to defaults on
    /// any error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load(path).unwrap_or_else(|error| {
            log::warn!("{error}; using defaults");
            Self::default()
        })
    }

    /// Write preferences to `path` as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RenderError> {
        let path = path.as_ref();
        let text =
            serde_json::to_string_pretty(self).map_err(|error| preferences_error(path, error))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|error| preferences_error(path, error))?;
        }
        fs::write(path, text).map_err(|error| preferences_error(path, error))?;
        log::debug!("Saved preferences to {:?}", path);
        Ok(())
    }

    /// The remembered input directory, if it still exists.
    pub fn existing_input_dir(&self) -> Option<&Path> {
        self.input_dir.as_deref().filter(|dir| dir.is_dir())
    }

    /// The remembered output directory, if it still exists.
    pub fn existing_output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref().filter(|dir| dir.is_dir())
    }
}

fn preferences_error(path: &Path, error: impl ToString) -> RenderError {
    RenderError::Preferences {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let preferences = Preferences::load(dir.path().join(PREFERENCES_FILE)).unwrap();
        assert_eq!(preferences, Preferences::default());
    }

    #[test]
    fn save_then_load_keeps_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(PREFERENCES_FILE);
        let preferences = Preferences {
            input_dir: Some(dir.path().to_path_buf()),
            output_dir: Some(dir.path().join("gone")),
        };
        preferences.save(&path).unwrap();

        let loaded = Preferences::load(&path).unwrap();
        assert_eq!(loaded, preferences);
        assert_eq!(loaded.existing_input_dir(), Some(dir.path()));
        assert_eq!(loaded.existing_output_dir(), None);
    }

    #[test]
    fn reads_files_with_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PREFERENCES_FILE);
        fs::write(&path, r#"{"input_dir": "/photos"}"#).unwrap();

        let loaded = Preferences::load(&path).unwrap();
        assert_eq!(loaded.input_dir, Some(PathBuf::from("/photos")));
        assert_eq!(loaded.output_dir, None);
    }

    #[test]
    fn malformed_file_is_an_error_unless_defaulted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PREFERENCES_FILE);
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            Preferences::load(&path),
            Err(RenderError::Preferences { .. })
        ));
        assert_eq!(Preferences::load_or_default(&path), Preferences::default());
    }
}
