//! Self-build pipeline, used when the host is not the target OS.
//!
//! Cross-compiles the helper for the target OS, optionally uploads it under a
//! date-and-digest name, and prints the command that fetches it on the target
//! machine.

pub mod upload;

pub use upload::{load_token, HttpUploader, Uploader};

use crate::config::BootstrapConfig;
use crate::error::PublishError;
use crate::orchestrator::executor::{strip_vars, CommandRunner, CommandSpec};
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable naming the toolchain root.
pub const TOOLCHAIN_ROOT_VAR: &str = "GOROOT";
const TARGET_OS_VAR: &str = "GOOS";
const CGO_VAR: &str = "CGO_ENABLED";

/// Hex digest characters kept in a published name.
const DIGEST_PREFIX_LEN: usize = 7;

/// Flags for a self-build run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishOptions {
    pub build: bool,
    /// Upload after building; implies `build`
    pub upload: bool,
    pub arch: Option<String>,
    pub rebuild_toolchain: bool,
}

impl PublishOptions {
    pub fn wants_build(&self) -> bool {
        self.build || self.upload
    }
}

/// What a self-build run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfBuildOutcome {
    /// No build flag given; the caller prints usage.
    NothingToDo,
    Built { path: PathBuf, digest: String },
    Published { name: String, fetch_command: String },
}

pub struct SelfBuilder {
    config: BootstrapConfig,
    runner: Arc<dyn CommandRunner>,
    toolchain_root: Option<PathBuf>,
    workdir: PathBuf,
}

impl SelfBuilder {
    pub fn new(
        config: BootstrapConfig,
        runner: Arc<dyn CommandRunner>,
        toolchain_root: Option<PathBuf>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        SelfBuilder {
            config,
            runner,
            toolchain_root,
            workdir: workdir.into(),
        }
    }

    /// Toolchain root from the environment, helper built in the current directory.
    pub fn from_env(config: BootstrapConfig, runner: Arc<dyn CommandRunner>) -> Result<Self, PublishError> {
        let root = std::env::var_os(TOOLCHAIN_ROOT_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let workdir = std::env::current_dir()?;
        Ok(Self::new(config, runner, root, workdir))
    }

    fn arch<'a>(&'a self, options: &'a PublishOptions) -> &'a str {
        options
            .arch
            .as_deref()
            .unwrap_or(self.config.publish.default_arch.as_str())
    }

    /// Cross-compilation environment for `arch`, derived from `base`.
    pub fn cross_env<I>(&self, arch: &str, base: I) -> Vec<(OsString, OsString)>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let arch_var = self.config.source.arch_var.as_str();
        let mut env = strip_vars(base, &[CGO_VAR, TARGET_OS_VAR, arch_var]);
        env.push((OsString::from(CGO_VAR), OsString::from("0")));
        env.push((
            OsString::from(TARGET_OS_VAR),
            OsString::from(&self.config.target_os),
        ));
        env.push((OsString::from(arch_var), OsString::from(arch)));
        env
    }

    /// Build the cross-compiler if it is missing or `force` is set.
    ///
    /// Returns true if the bootstrap script ran.
    pub async fn ensure_toolchain(&self, arch: &str, force: bool) -> Result<bool, PublishError> {
        let root = self
            .toolchain_root
            .as_ref()
            .ok_or(PublishError::ToolchainRootMissing)?;
        let pkg_dir = root
            .join("pkg")
            .join(format!("{}_{}", self.config.target_os, arch));
        if !force && pkg_dir.exists() {
            log::debug!("[Publish] {} exists; cross-compiler ready", pkg_dir.display());
            return Ok(false);
        }
        if !force {
            log::info!(
                "[Publish] No {} directory, need to build the cross-compiler",
                pkg_dir.display()
            );
        }

        let script = root.join(&self.config.publish.toolchain_script);
        let workdir = script
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.clone());
        let spec = CommandSpec::new(script)
            .env(self.cross_env(arch, std::env::vars_os()))
            .current_dir(workdir);
        self.runner
            .run(spec)
            .await
            .map_err(PublishError::ToolchainBuild)?;
        Ok(true)
    }

    /// Cross-compile the helper; returns its path.
    pub async fn build_helper(&self, arch: &str) -> Result<PathBuf, PublishError> {
        let publish = &self.config.publish;
        let spec = CommandSpec::new(&publish.build_program)
            .args(&publish.build_args)
            .env(self.cross_env(arch, std::env::vars_os()))
            .current_dir(&self.workdir);
        self.runner
            .run(spec)
            .await
            .map_err(|source| PublishError::HelperBuild {
                helper: publish.helper_name.clone(),
                source,
            })?;
        Ok(self.workdir.join(&publish.helper_name))
    }

    /// Run the self-build pipeline according to `options`.
    pub async fn run(
        &self,
        options: &PublishOptions,
        uploader: Option<&dyn Uploader>,
    ) -> Result<SelfBuildOutcome, PublishError> {
        if !options.wants_build() {
            log::info!(
                "[Publish] Not running on {} and no flags specified.",
                self.config.target_os
            );
            return Ok(SelfBuildOutcome::NothingToDo);
        }

        let arch = self.arch(options);
        self.ensure_toolchain(arch, options.rebuild_toolchain).await?;
        let helper = self.build_helper(arch).await?;
        let content = tokio::fs::read(&helper).await?;
        let digest = sha256_hex(&content);
        log::info!("[Publish] Built {} (sha256 {})", helper.display(), digest);

        if !options.upload {
            return Ok(SelfBuildOutcome::Built {
                path: helper,
                digest,
            });
        }

        let uploader =
            uploader.ok_or_else(|| PublishError::Upload("no uploader configured".to_string()))?;
        let today = chrono::Local::now().date_naive();
        let name = publish_name(&self.config.publish.helper_name, today, &digest);
        uploader.upload(&name, content).await?;
        crate::log_parsed!("Uploaded {}", name);

        let fetch_command = fetch_command(
            &self.config.publish.download_base_url,
            &name,
            &self.config.publish.target_download_path,
        );
        println!("{}", fetch_command);
        Ok(SelfBuildOutcome::Published {
            name,
            fetch_command,
        })
    }
}

pub fn sha256_hex(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// `<stem>-<YYYY-MM-DD>-<digest prefix>.<ext>`
pub fn publish_name(helper_name: &str, date: NaiveDate, digest: &str) -> String {
    let helper = Path::new(helper_name);
    let stem = helper
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| helper_name.to_string());
    let short = &digest[..digest.len().min(DIGEST_PREFIX_LEN)];
    match helper.extension() {
        Some(ext) => format!(
            "{}-{}-{}.{}",
            stem,
            date.format("%Y-%m-%d"),
            short,
            ext.to_string_lossy()
        ),
        None => format!("{}-{}-{}", stem, date.format("%Y-%m-%d"), short),
    }
}

/// One-line command that downloads the published helper on the target machine.
pub fn fetch_command(download_base_url: &str, name: &str, target_path: &str) -> String {
    format!(
        "bitsadmin /transfer mydownloadjob /download /priority normal {}/{} {}",
        download_base_url.trim_end_matches('/'),
        name,
        target_path
    )
}
