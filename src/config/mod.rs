//! Configuration module for bootstrap runs.
//!
//! The configuration is an explicit value passed to the orchestrator; nothing
//! here is process-wide state.
//!
//! # Module Structure
//!
//! - `loader`: Loads and saves the TOML configuration file
//!
//! # Configuration Flow
//!
//! 1. `loader` reads `--config`, the per-user config file, or falls back to defaults
//! 2. `BootstrapConfig::validate` rejects tables that would break invariants
//!    (duplicate artifact names, names with path separators, duplicate archs)
//! 3. CLI flags become a `RunOptions` alongside the config

pub mod loader;

use crate::error::ConfigError;
use crate::models::{Artifact, BuildTarget, PrerequisiteSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Everything a provisioning or self-build run needs that is not a CLI flag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Operating system the provisioning pipeline runs on
    pub target_os: String,
    /// Token the operator types at each confirmation checkpoint
    pub confirm_token: String,
    /// Artifacts downloaded to the desktop
    pub artifacts: Vec<Artifact>,
    pub source: SourceConfig,
    /// C compiler toolchain gate
    pub compiler: PrerequisiteSpec,
    /// Architectures built in order
    pub targets: Vec<BuildTarget>,
    pub startup_script: Option<StartupScript>,
    /// Packaging command run after all targets when `--release` is given
    pub post_build: Option<CommandConfig>,
    pub publish: PublishConfig,
}

/// Source checkout and build script layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub repo_url: String,
    /// Checkout directory name under the home directory
    pub dir_name: String,
    /// Build script, relative to the checkout root
    pub build_script: PathBuf,
    /// Working directory for the build script, relative to the checkout root
    pub build_dir: PathBuf,
    /// File under `pkg/tool/<os>_<arch>/` proving an arch was built
    pub marker_file: String,
    /// Environment variable selecting the architecture
    pub arch_var: String,
    /// Version control client gate
    pub vcs: PrerequisiteSpec,
}

/// A script written to the desktop once, if absent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartupScript {
    pub name: String,
    pub contents: String,
    /// Write with CRLF line endings
    #[serde(default = "default_true")]
    pub crlf: bool,
}

/// An external command described in configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory relative to the checkout root
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

/// Self-build and publish settings (non-target hosts only).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Base URL uploads are PUT to
    pub upload_url: String,
    /// Base URL the uploaded helper is fetched from on the target machine
    pub download_base_url: String,
    /// Helper binary produced by the build command
    pub helper_name: String,
    pub build_program: String,
    pub build_args: Vec<String>,
    /// Cross-compiler bootstrap script, relative to the toolchain root
    pub toolchain_script: PathBuf,
    /// Architecture used when `--arch` is not given
    pub default_arch: String,
    /// Where the fetched helper lands on the target machine
    pub target_download_path: String,
}

/// Per-invocation flags. Kept apart from the file configuration so a single
/// config can be reused across runs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunOptions {
    /// Auto-confirm every confirmation checkpoint and skip the exit wait
    pub assume_yes: bool,
    /// Run the post-build packaging step
    pub release: bool,
}

fn default_true() -> bool {
    true
}

const RUN_BUILDER_BAT: &str = r"echo Running the Go builder:
mkdir \Users\wingopher\gopath

RMDIR /S /Q c:\gobuilder
SET GOROOT_BOOTSTRAP=c:\Go1.4
SET GOPATH=\Users\wingopher\gopath
SET PATH=\Users\wingopher\goroot\bin;%PATH%
go get -u -v golang.org/x/tools/dashboard/builder
%GOPATH%\bin\builder -v -parallel windows-amd64 windows-386
";

const GCC_DIR: &str = r"C:\TDM-GCC-64\bin";

impl Default for BootstrapConfig {
    fn default() -> Self {
        BootstrapConfig {
            target_os: "windows".to_string(),
            confirm_token: "go".to_string(),
            artifacts: vec![
                Artifact::new(
                    "tdm-gcc-4.9.2.exe",
                    "https://sourceforge.net/projects/tdm-gcc/files/TDM-GCC%20Installer/Previous/1.1309.0/tdm-gcc-4.9.2.exe",
                ),
                Artifact::new("Wix35.msi", "http://storage.googleapis.com/winstrap/Wix35.msi"),
                Artifact::new(
                    "Install Git.exe",
                    "https://github.com/msysgit/msysgit/releases/download/Git-1.9.5-preview20141217/Git-1.9.5-preview20141217.exe",
                ),
                Artifact::new(
                    "Start Buildlet.exe",
                    "https://storage.googleapis.com/go-builder-data/buildlet-stage0.windows-amd64",
                ),
            ],
            source: SourceConfig::default(),
            compiler: PrerequisiteSpec {
                tool: "gcc".to_string(),
                fallback: PathBuf::from(GCC_DIR),
                instructions: format!("{} doesn't exist. Install gcc and then press enter...", GCC_DIR),
            },
            targets: vec![
                BuildTarget {
                    arch: "386".to_string(),
                    toolchain_dir: PathBuf::from(GCC_DIR),
                },
                BuildTarget {
                    arch: "amd64".to_string(),
                    toolchain_dir: PathBuf::from(GCC_DIR),
                },
            ],
            startup_script: Some(StartupScript {
                name: "run-builder.bat".to_string(),
                contents: RUN_BUILDER_BAT.to_string(),
                crlf: true,
            }),
            post_build: None,
            publish: PublishConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            repo_url: "https://go.googlesource.com/go".to_string(),
            dir_name: "goroot".to_string(),
            build_script: PathBuf::from("src").join("make.bat"),
            build_dir: PathBuf::from("src"),
            marker_file: "api.exe".to_string(),
            arch_var: "GOARCH".to_string(),
            vcs: PrerequisiteSpec {
                tool: "git".to_string(),
                fallback: PathBuf::from(r"C:\Program Files (x86)\Git\cmd\git.exe"),
                instructions: "Can't find git binary. Install Git and then press enter... \
                               (use middle option: make git available to cmd.exe)"
                    .to_string(),
            },
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        PublishConfig {
            upload_url: "https://storage.googleapis.com/winstrap".to_string(),
            download_base_url: "https://storage.googleapis.com/winstrap".to_string(),
            helper_name: "winstrap.exe".to_string(),
            build_program: "go".to_string(),
            build_args: vec!["build".to_string(), "-o".to_string(), "winstrap.exe".to_string()],
            toolchain_script: PathBuf::from("src").join("make.bash"),
            default_arch: "amd64".to_string(),
            target_download_path: r"c:\users\wingopher\Desktop\winstrap.exe".to_string(),
        }
    }
}

impl BootstrapConfig {
    /// Reject configurations that would break destination uniqueness or
    /// leave the pipeline with nothing to do.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_os.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("target_os cannot be empty".to_string()));
        }
        if self.confirm_token.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "confirm_token cannot be empty".to_string(),
            ));
        }
        if self.artifacts.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one artifact is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for artifact in &self.artifacts {
            validate_artifact_name(&artifact.name)?;
            if !names.insert(artifact.name.as_str()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "duplicate artifact name: {}",
                    artifact.name
                )));
            }
            if !(artifact.url.starts_with("http://") || artifact.url.starts_with("https://")) {
                return Err(ConfigError::ValidationFailed(format!(
                    "artifact {} has a non-http(s) URL: {}",
                    artifact.name, artifact.url
                )));
            }
        }

        if self.targets.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one build target is required".to_string(),
            ));
        }
        let mut archs = HashSet::new();
        for target in &self.targets {
            if target.arch.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "target arch cannot be empty".to_string(),
                ));
            }
            if !archs.insert(target.arch.as_str()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "duplicate target arch: {}",
                    target.arch
                )));
            }
        }

        if self.source.dir_name.trim().is_empty() || self.source.arch_var.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "source.dir_name and source.arch_var are required".to_string(),
            ));
        }

        Ok(())
    }

    /// Look up a configured target by architecture.
    pub fn target(&self, arch: &str) -> Option<&BuildTarget> {
        self.targets.iter().find(|t| t.arch == arch)
    }
}

/// Artifact names become file names on the desktop.
fn validate_artifact_name(name: &str) -> Result<(), ConfigError> {
    let bad = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.ends_with(".tmp");
    if bad {
        return Err(ConfigError::ValidationFailed(format!(
            "artifact name must be a plain file name: {:?}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BootstrapConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.artifacts.len(), 4);
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.target("amd64").map(|t| t.arch.as_str()), Some("amd64"));
    }

    #[test]
    fn test_duplicate_artifact_rejected() {
        let mut config = BootstrapConfig::default();
        config
            .artifacts
            .push(Artifact::new("Wix35.msi", "https://example.com/other"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate artifact name"));
    }

    #[test]
    fn test_artifact_name_with_separator_rejected() {
        let mut config = BootstrapConfig::default();
        config.artifacts = vec![Artifact::new("../evil.exe", "https://example.com/e")];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_http_url_rejected() {
        let mut config = BootstrapConfig::default();
        config.artifacts = vec![Artifact::new("a.exe", "ftp://example.com/a.exe")];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_arch_rejected() {
        let mut config = BootstrapConfig::default();
        let first = config.targets[0].clone();
        config.targets.push(first);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_confirm_token_rejected() {
        let mut config = BootstrapConfig::default();
        config.confirm_token = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
