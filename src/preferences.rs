//! Persistent key/value preferences (last-used paths, tool locations).
//!
//! Stored as pretty JSON under the platform config directory so that the
//! fields of every tab survive a restart.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const APP_DIR: &str = "rom-workbench";
pub const FILE_NAME: &str = "preferences.json";

/// Well-known preference keys.
pub mod keys {
    pub const EXPORT_ROM: &str = "export_rom";
    pub const EXPORT_PROJ: &str = "export_proj";
    pub const IMPORT_PROJ: &str = "import_proj";
    pub const IMPORT_BASEROM: &str = "import_baserom";
    pub const IMPORT_ROM: &str = "import_rom";
    pub const UPGRADE_ROM: &str = "upgrade_rom";
    pub const UPGRADE_PROJ: &str = "upgrade_proj";
    pub const SCRIPT_ROM: &str = "script_rom";
    pub const SCRIPT_PROJ: &str = "script_proj";
    pub const TOOLS_ROM: &str = "tools_rom";
    pub const EMULATOR: &str = "emulator";
    pub const EDITOR: &str = "editor";
    pub const ENGINE: &str = "engine";
    pub const EXTRACTOR: &str = "extractor";
    pub const TITLE: &str = "title";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

/// Default preferences location: `<config_dir>/rom-workbench/preferences.json`.
pub fn default_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("could not determine config directory")?;
    Ok(base.join(APP_DIR).join(FILE_NAME))
}

impl Preferences {
    /// An empty record that will be saved to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            values: BTreeMap::new(),
        }
    }

    /// Load from `path`. A missing file yields an empty record.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<BTreeMap<String, String>>(&bytes)
                .with_context(|| format!("parse preferences {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("read preferences {}", path.display()))
            }
        };
        Ok(Self { path, values })
    }

    /// Write the record, replacing the previous file atomically.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let data = serde_json::to_vec_pretty(&self.values)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data).with_context(|| format!("write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace {}", self.path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Value for `key`, or `None` when unset or blank.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some("true") | Some("1"))
    }

    pub fn set_flag(&mut self, key: &str, on: bool) {
        self.set(key, if on { "true" } else { "false" });
    }

    /// Flip a boolean preference and return its new value.
    pub fn toggle(&mut self, key: &str) -> bool {
        let on = !self.flag(key);
        self.set_flag(key, on);
        on
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
