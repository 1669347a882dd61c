//! Source checkout: clone once, keep whatever is already there.

use crate::error::CheckoutError;
use crate::models::CheckoutStatus;
use crate::orchestrator::executor::{CommandRunner, CommandSpec};
use std::path::Path;
use std::sync::Arc;

pub struct SourceCheckout {
    runner: Arc<dyn CommandRunner>,
}

impl SourceCheckout {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        SourceCheckout { runner }
    }

    /// Clone `repo_url` into `dest` with `vcs`, unless `dest` already exists.
    ///
    /// An existing directory is never inspected or updated, even if it is
    /// empty or holds a different repository.
    pub async fn checkout(
        &self,
        vcs: &Path,
        repo_url: &str,
        dest: &Path,
    ) -> Result<CheckoutStatus, CheckoutError> {
        if dest.exists() {
            log::info!("[Checkout] {} already exists; skipping clone", dest.display());
            return Ok(CheckoutStatus::AlreadyPresent);
        }

        let parent = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| CheckoutError::InvalidDestination(dest.to_path_buf()))?;
        tokio::fs::create_dir_all(parent).await?;

        let spec = CommandSpec::new(vcs)
            .arg("clone")
            .arg(repo_url)
            .arg(dest)
            .current_dir(parent);

        log::info!("[Checkout] Cloning {} into {}", repo_url, dest.display());
        self.runner
            .run(spec)
            .await
            .map_err(|source| CheckoutError::CloneFailed {
                repo: repo_url.to_string(),
                dest: dest.to_path_buf(),
                source,
            })?;
        Ok(CheckoutStatus::Cloned)
    }
}
