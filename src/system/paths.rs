//! Filesystem layout for a bootstrap run, rooted at the home directory.
//!
//! The home directory is resolved once (explicit override or platform default)
//! and every other path in the run is derived from it, so two layouts built
//! from the same home always agree.

use std::path::{Path, PathBuf};

use crate::config::BootstrapConfig;
use crate::error::ConfigError;

/// Resolved home directory and the paths derived from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathLayout {
    home: PathBuf,
    source_dir_name: String,
    target_os: String,
}

impl PathLayout {
    /// Build a layout from an explicit home directory.
    pub fn new(home: impl Into<PathBuf>, config: &BootstrapConfig) -> Self {
        PathLayout {
            home: home.into(),
            source_dir_name: config.source.dir_name.clone(),
            target_os: config.target_os.clone(),
        }
    }

    /// Resolve the home directory: the override if given, else the platform default.
    pub fn resolve(
        home_override: Option<&Path>,
        config: &BootstrapConfig,
    ) -> Result<Self, ConfigError> {
        let home = choose_home(home_override, default_home)?;
        Ok(Self::new(home, config))
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Directory artifacts are downloaded into.
    pub fn desktop(&self) -> PathBuf {
        self.home.join("Desktop")
    }

    /// Checkout root of the source tree.
    pub fn source_root(&self) -> PathBuf {
        self.home.join(&self.source_dir_name)
    }

    /// Directory holding the per-architecture tool binaries.
    pub fn tool_dir(&self, arch: &str) -> PathBuf {
        self.source_root()
            .join("pkg")
            .join("tool")
            .join(format!("{}_{}", self.target_os, arch))
    }

    /// Marker file whose presence means `arch` was built.
    pub fn marker_path(&self, arch: &str, marker_file: &str) -> PathBuf {
        self.tool_dir(arch).join(marker_file)
    }

    /// Run log directory.
    pub fn logs_dir(&self) -> PathBuf {
        self.home.join(".winstrap").join("logs")
    }
}

fn choose_home<F>(home_override: Option<&Path>, fallback: F) -> Result<PathBuf, ConfigError>
where
    F: FnOnce() -> Option<PathBuf>,
{
    match home_override {
        Some(path) => Ok(path.to_path_buf()),
        None => fallback().ok_or(ConfigError::HomeDirUnavailable),
    }
}

/// Platform default home: `%HOMEDRIVE%%HOMEPATH%` on Windows, else the user's home.
pub fn default_home() -> Option<PathBuf> {
    if cfg!(windows) {
        if let (Ok(drive), Ok(path)) = (std::env::var("HOMEDRIVE"), std::env::var("HOMEPATH")) {
            return Some(PathBuf::from(format!("{}{}", drive, path)));
        }
    }
    dirs::home_dir()
}
