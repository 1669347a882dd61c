//! Provisioning orchestration: Init -> Downloading -> PrerequisiteChecks ->
//! Checkout -> Building -> (PostBuild) -> Done, with operator checkpoints
//! before every side-effecting stage.

pub mod executor;
pub mod phases;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

pub use executor::{CommandRunner, CommandSpec, SystemRunner};
pub use phases::{ArchBuilder, ArtifactFetcher, PrerequisiteGate, SourceCheckout};
pub use state::{BootstrapPhase, Checkpoint, OrchestrationState};

use crate::config::{BootstrapConfig, RunOptions};
use crate::error::{BootstrapError, Result};
use crate::log_parsed;
use crate::models::{BuildStatus, CheckoutStatus, DownloadOutcome, RunOutcome};
use crate::system::{acknowledge_blocking, confirm_blocking, Operator, PathLayout};

/// Which pipeline a host runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    /// Provision this machine (host is the target OS)
    Provision,
    /// Build and optionally publish the helper for the target OS
    SelfBuild,
}

impl Pipeline {
    pub fn select(target_os: &str, host_os: &str) -> Self {
        if target_os.eq_ignore_ascii_case(host_os) {
            Pipeline::Provision
        } else {
            Pipeline::SelfBuild
        }
    }
}

/// Drives one provisioning run through its phases.
#[derive(Clone)]
pub struct Orchestrator {
    /// Shared mutable state protected by RwLock for thread safety
    state: Arc<RwLock<OrchestrationState>>,
    config: BootstrapConfig,
    options: RunOptions,
    layout: PathLayout,
    operator: Arc<dyn Operator>,
    runner: Arc<dyn CommandRunner>,
    fetcher: ArtifactFetcher,
}

impl Orchestrator {
    pub fn new(
        config: BootstrapConfig,
        options: RunOptions,
        layout: PathLayout,
        operator: Arc<dyn Operator>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let fetcher = ArtifactFetcher::new(layout.desktop());
        Orchestrator {
            state: Arc::new(RwLock::new(OrchestrationState::new())),
            config,
            options,
            layout,
            operator,
            runner,
            fetcher,
        }
    }

    /// Get the current run phase.
    pub async fn current_phase(&self) -> BootstrapPhase {
        self.state.read().await.phase
    }

    /// Get a snapshot of the current orchestration state.
    pub async fn state_snapshot(&self) -> OrchestrationState {
        self.state.read().await.clone()
    }

    /// Transition to the next phase, validating it first.
    pub async fn transition_phase(&self, next_phase: BootstrapPhase) -> Result<()> {
        let mut state = self.state.write().await;
        let from = state.phase;
        state
            .transition_to(next_phase)
            .map_err(|_| BootstrapError::InvalidTransition {
                from: from.to_string(),
                to: next_phase.to_string(),
            })?;
        log_parsed!("PHASE TRANSITION: {}", next_phase);
        Ok(())
    }

    /// Record an error and transition to the Failed phase.
    pub async fn record_error(&self, error: String) {
        self.state.write().await.record_error(error);
    }

    /// Confirmation checkpoint. Auto-confirmed with `assume_yes`.
    async fn checkpoint(&self, prompt: String) -> Result<bool> {
        if self.options.assume_yes {
            log::info!("[Orchestrator] {} (auto-confirmed)", prompt);
            return Ok(true);
        }
        confirm_blocking(&self.operator, prompt).await
    }

    fn token_hint(&self) -> String {
        format!("Type '{}' to proceed.", self.config.confirm_token)
    }

    async fn cancel(&self) -> Result<RunOutcome> {
        self.transition_phase(BootstrapPhase::Cancelled).await?;
        log::info!("[Orchestrator] Canceled.");
        if !self.options.assume_yes {
            acknowledge_blocking(&self.operator, "Canceled. Press enter to exit.".to_string())
                .await?;
        }
        Ok(RunOutcome::Cancelled)
    }

    /// Run every stage. Errors are recorded in the state before being returned.
    pub async fn run(&self) -> Result<RunOutcome> {
        let outcome = self.run_stages().await;
        if let Err(ref e) = outcome {
            log::error!("[Orchestrator] Run failed: {}", e);
            self.record_error(e.to_string()).await;
        }
        outcome
    }

    async fn run_stages(&self) -> Result<RunOutcome> {
        let opening = format!(
            "This program will download the build prerequisites to {} and then \
             build the toolchain from {} in {}. {}",
            self.layout.desktop().display(),
            self.config.source.repo_url,
            self.layout.source_root().display(),
            self.token_hint()
        );
        if !self.checkpoint(opening).await? {
            return self.cancel().await;
        }
        self.write_startup_script().await?;

        self.transition_phase(BootstrapPhase::Downloading).await?;
        if !self.download().await? {
            return self.cancel().await;
        }

        self.transition_phase(BootstrapPhase::PrerequisiteChecks).await?;
        let gate = PrerequisiteGate::new(Arc::clone(&self.operator));
        let vcs = gate.ensure(&self.config.source.vcs).await?;
        gate.ensure(&self.config.compiler).await?;

        self.transition_phase(BootstrapPhase::AwaitConfirm(Checkpoint::Checkout))
            .await?;
        let prompt = format!(
            "This program will now check out {} into {}. {}",
            self.config.source.repo_url,
            self.layout.source_root().display(),
            self.token_hint()
        );
        if !self.checkpoint(prompt).await? {
            return self.cancel().await;
        }

        self.transition_phase(BootstrapPhase::Checkout).await?;
        self.checkout(vcs).await?;

        self.transition_phase(BootstrapPhase::AwaitConfirm(Checkpoint::Build))
            .await?;
        let archs: Vec<&str> = self.config.targets.iter().map(|t| t.arch.as_str()).collect();
        let prompt = format!(
            "This program will now compile the toolchain for {}. {}",
            archs.join(" and "),
            self.token_hint()
        );
        if !self.checkpoint(prompt).await? {
            return self.cancel().await;
        }

        self.transition_phase(BootstrapPhase::Building).await?;
        self.build().await?;

        if self.options.release {
            if let Some(ref command) = self.config.post_build {
                self.transition_phase(BootstrapPhase::PostBuild).await?;
                log::info!("[Orchestrator] Running post-build step: {}", command.program);
                self.builder().post_build(command).await?;
            }
        }

        self.transition_phase(BootstrapPhase::Done).await?;
        let root = self.layout.source_root();
        let message = format!(
            "Installed {} to {}, please add {} to your PATH.",
            self.config.source.repo_url,
            root.display(),
            root.join("bin").display()
        );
        log_parsed!("{}", message);
        if !self.options.assume_yes {
            acknowledge_blocking(&self.operator, format!("{}\nPress enter to exit.", message))
                .await?;
        }
        Ok(RunOutcome::Completed)
    }

    /// Write the configured startup script to the desktop, unless it exists.
    pub async fn write_startup_script(&self) -> Result<Option<PathBuf>> {
        let script = match self.config.startup_script {
            Some(ref script) => script,
            None => return Ok(None),
        };
        let path = self.layout.desktop().join(&script.name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            log::debug!("[Orchestrator] {} already exists", path.display());
            return Ok(None);
        }
        let contents = if script.crlf {
            to_crlf(&script.contents)
        } else {
            script.contents.clone()
        };
        tokio::fs::create_dir_all(self.layout.desktop()).await?;
        tokio::fs::write(&path, contents).await?;
        log::info!("[Orchestrator] Wrote {}", path.display());
        Ok(Some(path))
    }

    /// Download every artifact and wait for all of them.
    ///
    /// Returns false if some downloads failed and the operator declined to continue.
    pub async fn download(&self) -> Result<bool> {
        let outcomes = self.fetcher.fetch_all(&self.config.artifacts).await;
        let failures = report_downloads(&outcomes);
        if failures.is_empty() {
            return Ok(true);
        }
        self.state.write().await.download_failures = failures.clone();
        let prompt = format!(
            "There were errors downloading {}. Continue anyway? {}",
            failures.join(", "),
            self.token_hint()
        );
        self.checkpoint(prompt).await
    }

    /// Clone the source tree with the resolved version control client.
    pub async fn checkout(&self, vcs: PathBuf) -> Result<CheckoutStatus> {
        let status = SourceCheckout::new(Arc::clone(&self.runner))
            .checkout(&vcs, &self.config.source.repo_url, &self.layout.source_root())
            .await?;
        Ok(status)
    }

    /// Build every configured architecture in order.
    pub async fn build(&self) -> Result<()> {
        let results = self.builder().build_all().await?;
        let mut state = self.state.write().await;
        for (arch, status) in results {
            match status {
                BuildStatus::Built => state.built.push(arch),
                BuildStatus::Skipped => state.skipped.push(arch),
            }
        }
        Ok(())
    }

    fn builder(&self) -> ArchBuilder {
        ArchBuilder::new(
            Arc::clone(&self.runner),
            self.layout.clone(),
            self.config.source.clone(),
            self.config.targets.clone(),
        )
    }
}

/// Log every download outcome; return the names of the failed artifacts.
fn report_downloads(outcomes: &[DownloadOutcome]) -> Vec<String> {
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(_) => log::debug!("[Orchestrator] {} ready", outcome.name),
            Err(ref e) => {
                log::error!("[Orchestrator] Download of {} failed: {}", outcome.name, e);
                failures.push(outcome.name.clone());
            }
        }
    }
    failures
}

/// Normalize line endings to CRLF.
fn to_crlf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}
