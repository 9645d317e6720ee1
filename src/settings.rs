//! TOML configuration for the utility layer.
//!
//! Every key is optional:
//!
//! ```toml
//! copy_buffer_size = 1048576
//! reserved_bytes = -1
//! tmp_file_infix = ".envtmp"
//!
//! [write_options]
//! sync_on_close = true
//! mode = "create_new"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories_next::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::env::{Env, WritableFileOptions};
use crate::env_util;
use crate::error::{EnvUtilError, Result};

pub const CONFIG_FILE_NAME: &str = "storage_env.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from `{}`: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write settings to `{}`: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("invalid settings TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Invalid(#[from] EnvUtilError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bytes moved per read by `copy_file`.
    pub copy_buffer_size: usize,
    /// Reservation for disk-space checks; `-1` keeps 1% free.
    pub reserved_bytes: i64,
    /// Marker identifying temporary files left for cleanup.
    pub tmp_file_infix: String,
    pub write_options: WritableFileOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            copy_buffer_size: env_util::DEFAULT_COPY_BUFFER_SIZE,
            reserved_bytes: env_util::RESERVE_ONE_PERCENT,
            tmp_file_infix: ".envtmp".to_string(),
            write_options: WritableFileOptions::default(),
        }
    }
}

impl Settings {
    /// Parse and validate settings from a TOML document.
    pub fn from_toml_str(s: &str) -> std::result::Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> std::result::Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.copy_buffer_size == 0 {
            return Err(EnvUtilError::InvalidArgument(
                "copy_buffer_size must be > 0".to_string(),
            ));
        }
        if self.reserved_bytes < env_util::RESERVE_ONE_PERCENT {
            return Err(EnvUtilError::InvalidArgument(format!(
                "reserved_bytes must be >= -1, got {}",
                self.reserved_bytes
            )));
        }
        if self.tmp_file_infix.is_empty() {
            return Err(EnvUtilError::InvalidArgument(
                "tmp_file_infix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// [`env_util::verify_sufficient_disk_space`] with the configured
    /// reservation.
    pub fn verify_disk_space(&self, env: &dyn Env, path: impl AsRef<Path>, requested_bytes: i64) -> Result<()> {
        env_util::verify_sufficient_disk_space(env, path, requested_bytes, self.reserved_bytes)
    }

    /// [`env_util::copy_file`] with the configured chunk size and write
    /// options.
    pub fn copy_file(&self, env: &dyn Env, source: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<u64> {
        env_util::copy_file_with_buffer_size(env, source, dest, &self.write_options, self.copy_buffer_size)
    }

    /// [`env_util::delete_tmp_files_recursively`] with the configured infix.
    pub fn delete_tmp_files(&self, env: &dyn Env, root: impl AsRef<Path>) -> Result<usize> {
        env_util::delete_tmp_files_recursively(env, root, &self.tmp_file_infix)
    }
}

/// Per-user location of the settings file, if a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "storage_env").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

pub fn load_settings(path: impl AsRef<Path>) -> std::result::Result<Settings, SettingsError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Settings::from_toml_str(&text)
}

/// Write `settings` to `path`, creating parent directories as needed.
pub fn save_settings(path: impl AsRef<Path>, settings: &Settings) -> std::result::Result<(), SettingsError> {
    let path = path.as_ref();
    let write_err = |source: io::Error| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, settings.to_toml_string()?).map_err(write_err)
}
