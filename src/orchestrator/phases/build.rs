//! Per-architecture toolchain builds.
//!
//! Architectures are built one after another, never in parallel. Each build
//! gets its own environment, composed from the parent's: the arch selector
//! is replaced, PATH is rebuilt with the target's toolchain directory first,
//! and other targets' toolchain directories are removed from it. Nothing is
//! written back to the process environment.

use crate::config::{CommandConfig, SourceConfig};
use crate::error::BuildError;
use crate::models::{BuildStatus, BuildTarget};
use crate::orchestrator::executor::{strip_vars, CommandRunner, CommandSpec};
use crate::system::{scoped_path, PathLayout};
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

pub struct ArchBuilder {
    runner: Arc<dyn CommandRunner>,
    layout: PathLayout,
    source: SourceConfig,
    targets: Vec<BuildTarget>,
}

impl ArchBuilder {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        layout: PathLayout,
        source: SourceConfig,
        targets: Vec<BuildTarget>,
    ) -> Self {
        ArchBuilder {
            runner,
            layout,
            source,
            targets,
        }
    }

    fn target(&self, arch: &str) -> Result<&BuildTarget, BuildError> {
        self.targets
            .iter()
            .find(|t| t.arch == arch)
            .ok_or_else(|| BuildError::UnknownArch(arch.to_string()))
    }

    /// Child environment for `target`, derived from `base`.
    pub fn build_environment<I>(
        &self,
        target: &BuildTarget,
        base: I,
    ) -> Result<Vec<(OsString, OsString)>, BuildError>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let base: Vec<(OsString, OsString)> = base.into_iter().collect();
        let inherited_path = base
            .iter()
            .find(|(k, _)| k.to_string_lossy().eq_ignore_ascii_case("PATH"))
            .map(|(_, v)| v.clone());

        let excluded: Vec<&Path> = self
            .targets
            .iter()
            .filter(|t| t.toolchain_dir != target.toolchain_dir)
            .map(|t| t.toolchain_dir.as_path())
            .collect();

        let path = scoped_path(&target.toolchain_dir, inherited_path.as_ref(), &excluded)
            .map_err(|e| BuildError::Environment {
                arch: target.arch.clone(),
                reason: e.to_string(),
            })?;

        let mut env = strip_vars(base, &["PATH", self.source.arch_var.as_str()]);
        env.push((OsString::from("PATH"), path));
        env.push((
            OsString::from(&self.source.arch_var),
            OsString::from(&target.arch),
        ));
        Ok(env)
    }

    /// Build command for `arch` with an environment derived from `base`.
    pub fn command_for<I>(&self, arch: &str, base: I) -> Result<CommandSpec, BuildError>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let target = self.target(arch)?;
        let env = self.build_environment(target, base)?;
        let root = self.layout.source_root();
        Ok(CommandSpec::new(root.join(&self.source.build_script))
            .env(env)
            .current_dir(root.join(&self.source.build_dir)))
    }

    /// Build one architecture unless its marker file already exists.
    pub async fn build(&self, arch: &str) -> Result<BuildStatus, BuildError> {
        self.target(arch)?;
        let marker = self.layout.marker_path(arch, &self.source.marker_file);
        if marker.exists() {
            log::info!(
                "[Build] {} already built ({} exists); skipping",
                arch,
                marker.display()
            );
            return Ok(BuildStatus::Skipped);
        }

        let spec = self.command_for(arch, std::env::vars_os())?;
        log::info!("[Build] Building toolchain for {}", arch);
        self.runner
            .run(spec)
            .await
            .map_err(|source| BuildError::ScriptFailed {
                arch: arch.to_string(),
                source,
            })?;
        Ok(BuildStatus::Built)
    }

    /// Build every configured target in order, stopping at the first failure.
    pub async fn build_all(&self) -> Result<Vec<(String, BuildStatus)>, BuildError> {
        let mut results = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let status = self.build(&target.arch).await?;
            results.push((target.arch.clone(), status));
        }
        Ok(results)
    }

    /// Run the packaging command from the checkout root (or its configured subdirectory).
    pub async fn post_build(&self, command: &CommandConfig) -> Result<(), BuildError> {
        let root = self.layout.source_root();
        let workdir = match command.workdir {
            Some(ref dir) => root.join(dir),
            None => root,
        };
        let spec = CommandSpec::new(&command.program)
            .args(&command.args)
            .current_dir(workdir);
        self.runner
            .run(spec)
            .await
            .map_err(BuildError::PostBuildFailed)
    }
}
