use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::validation::ValidationOptions;
use crate::infra::export::sidecar::UTF8_CODE_PAGE;

pub const DEFAULT_PAGE_SIZE: usize = 200;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot resolve the application data directory")]
    NoProjectDirs,

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaUnit {
    #[default]
    SquareMeters,
    SquareKilometers,
    Hectares,
    Acres,
    SquareFeet,
    SquareMiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogSize {
    pub width: u32,
    pub height: u32,
}

/// Per-session preferences. Everything the editor remembers between dialogs
/// lives here rather than in globals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub dialog_sizes: BTreeMap<String, DialogSize>,
    pub default_area_unit: AreaUnit,
    pub page_size: usize,
    pub validation: ValidationOptions,
    pub export_code_page: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            dialog_sizes: BTreeMap::new(),
            default_area_unit: AreaUnit::default(),
            page_size: DEFAULT_PAGE_SIZE,
            validation: ValidationOptions::default(),
            export_code_page: UTF8_CODE_PAGE,
        }
    }
}

impl SessionSettings {
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn dialog_size(&self, dialog: &str) -> Option<DialogSize> {
        self.dialog_sizes.get(dialog).copied()
    }

    pub fn remember_dialog_size(&mut self, dialog: &str, size: DialogSize) {
        self.dialog_sizes.insert(dialog.to_string(), size);
    }
}

fn project_dirs() -> Result<ProjectDirs, SettingsError> {
    ProjectDirs::from("org", "gisedit", "attribute-editor").ok_or(SettingsError::NoProjectDirs)
}

pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    Ok(project_dirs()?.config_dir().join("settings.json"))
}

pub fn default_db_path() -> Result<PathBuf, SettingsError> {
    Ok(project_dirs()?.data_dir().join("attributes.sqlite"))
}
