//! Persisted user preferences.
//!
//! Anything missing or malformed on disk falls back to the defaults; loading
//! never fails.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const APP_DIR: &str = "rstlive";
const FILE_NAME: &str = "prefs.json";

/// Narrowest a pane may be resized to, in percent of the body width.
pub const MIN_PANE_PERCENT: f32 = 15.0;

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("failed to create {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode preferences")]
    Encode(#[from] serde_json::Error),
}

/// Relative widths of the editor and preview panes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaneWidths {
    pub editor_width: f32,
    pub preview_width: f32,
}

impl Default for PaneWidths {
    fn default() -> Self {
        Self {
            editor_width: 50.0,
            preview_width: 50.0,
        }
    }
}

impl PaneWidths {
    fn is_valid(&self) -> bool {
        self.editor_width.is_finite()
            && self.preview_width.is_finite()
            && self.editor_width > 0.0
            && self.preview_width > 0.0
    }

    /// Editor share of the body, in percent.
    pub fn editor_percent(&self) -> f32 {
        let total = self.editor_width + self.preview_width;
        if total <= 0.0 {
            return 50.0;
        }
        self.editor_width / total * 100.0
    }

    /// Moves the split by `delta` percentage points, keeping both panes usable.
    pub fn shift(&mut self, delta: f32) {
        let editor = (self.editor_percent() + delta)
            .clamp(MIN_PANE_PERCENT, 100.0 - MIN_PANE_PERCENT);
        self.editor_width = editor;
        self.preview_width = 100.0 - editor;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefs {
    pub dark_mode: bool,
    pub panes: PaneWidths,
}

impl Prefs {
    /// Parses stored preferences, substituting defaults for anything unusable.
    pub fn parse(raw: &str) -> Self {
        let mut prefs: Prefs = match serde_json::from_str(raw) {
            Ok(prefs) => prefs,
            Err(err) => {
                tracing::debug!(error = %err, "ignoring malformed preferences");
                return Self::default();
            }
        };
        if !prefs.panes.is_valid() {
            tracing::debug!(panes = ?prefs.panes, "ignoring invalid pane widths");
            prefs.panes = PaneWidths::default();
        }
        prefs
    }

    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "no stored preferences");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), PrefsError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| PrefsError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| PrefsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `$XDG_CONFIG_HOME/rstlive/prefs.json`, else `$HOME/.config/rstlive/prefs.json`.
pub fn default_path() -> Option<PathBuf> {
    let base = env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join(APP_DIR).join(FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_values_fall_back_silently() {
        assert_eq!(Prefs::parse("not json"), Prefs::default());
        assert_eq!(Prefs::parse("{\"dark_mode\": \"yes\"}"), Prefs::default());
        let prefs = Prefs::parse(
            r#"{"dark_mode": true, "panes": {"editor_width": -3, "preview_width": 10}}"#,
        );
        assert!(prefs.dark_mode);
        assert_eq!(prefs.panes, PaneWidths::default());
    }

    #[test]
    fn missing_fields_use_defaults() {
        let prefs = Prefs::parse(r#"{"dark_mode": true}"#);
        assert!(prefs.dark_mode);
        assert_eq!(prefs.panes, PaneWidths::default());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(FILE_NAME);
        let prefs = Prefs {
            dark_mode: true,
            panes: PaneWidths {
                editor_width: 62.5,
                preview_width: 37.5,
            },
        };
        prefs.save(&path).expect("save prefs");
        assert_eq!(Prefs::load(&path), prefs);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(Prefs::load(&dir.path().join(FILE_NAME)), Prefs::default());
    }

    #[test]
    fn shifting_panes_is_clamped() {
        let mut panes = PaneWidths::default();
        panes.shift(10.0);
        assert!((panes.editor_percent() - 60.0).abs() < 1e-3);
        panes.shift(100.0);
        assert_eq!(panes.editor_width, 100.0 - MIN_PANE_PERCENT);
        assert_eq!(panes.preview_width, MIN_PANE_PERCENT);
    }
}
