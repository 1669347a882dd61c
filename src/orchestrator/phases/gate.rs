//! Prerequisite gate: blocks the run until an external tool is installed.
//!
//! The gate never fails on a missing tool. It shows the install instructions,
//! waits for the operator, and looks again, for as long as it takes. The
//! only error it can return is a broken operator channel.

use crate::error::Result;
use crate::log_collector::FILE_ONLY_TARGET;
use crate::models::PrerequisiteSpec;
use crate::system::{acknowledge_blocking, resolve_tool, Operator};
use std::path::PathBuf;
use std::sync::Arc;

pub struct PrerequisiteGate {
    operator: Arc<dyn Operator>,
}

impl PrerequisiteGate {
    pub fn new(operator: Arc<dyn Operator>) -> Self {
        PrerequisiteGate { operator }
    }

    /// Return the resolved location of `spec.tool`, prompting until it exists.
    pub async fn ensure(&self, spec: &PrerequisiteSpec) -> Result<PathBuf> {
        let mut attempts: u32 = 0;
        loop {
            if let Some(path) = resolve_tool(spec) {
                log::info!("[Gate] {} found at {}", spec.tool, path.display());
                return Ok(path);
            }
            attempts += 1;
            log::warn!(
                target: FILE_ONLY_TARGET,
                "[Gate] {} not found (check {})",
                spec.tool,
                attempts
            );
            acknowledge_blocking(&self.operator, spec.instructions.clone()).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BootstrapError;
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Creates the fallback file after `install_after` acknowledgements.
    struct InstallingOperator {
        fallback: PathBuf,
        install_after: usize,
        acks: AtomicUsize,
    }

    impl Operator for InstallingOperator {
        fn confirm(&self, _prompt: &str) -> io::Result<bool> {
            Ok(true)
        }

        fn acknowledge(&self, _message: &str) -> io::Result<()> {
            let seen = self.acks.fetch_add(1, Ordering::SeqCst) + 1;
            if seen >= self.install_after {
                std::fs::write(&self.fallback, b"").unwrap();
            }
            Ok(())
        }
    }

    /// Stdin already at end of input.
    struct ClosedOperator {
        acks: AtomicUsize,
    }

    impl Operator for ClosedOperator {
        fn confirm(&self, _prompt: &str) -> io::Result<bool> {
            Err(io::ErrorKind::UnexpectedEof.into())
        }

        fn acknowledge(&self, _message: &str) -> io::Result<()> {
            self.acks.fetch_add(1, Ordering::SeqCst);
            Err(io::ErrorKind::UnexpectedEof.into())
        }
    }

    fn spec(fallback: &Path) -> PrerequisiteSpec {
        PrerequisiteSpec {
            tool: "definitely_not_a_real_tool_xyz".to_string(),
            fallback: fallback.to_path_buf(),
            instructions: "install it, then press enter".to_string(),
        }
    }

    #[tokio::test]
    async fn test_gate_blocks_until_tool_appears() {
        let temp = tempfile::tempdir().unwrap();
        let fallback = temp.path().join("git.exe");
        let operator = Arc::new(InstallingOperator {
            fallback: fallback.clone(),
            install_after: 3,
            acks: AtomicUsize::new(0),
        });
        let gate = PrerequisiteGate::new(operator.clone());

        let found = gate.ensure(&spec(&fallback)).await.unwrap();

        assert_eq!(found, fallback);
        assert_eq!(operator.acks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gate_passes_without_prompt_when_present() {
        let temp = tempfile::tempdir().unwrap();
        let fallback = temp.path().join("gcc");
        std::fs::write(&fallback, b"").unwrap();
        let operator = Arc::new(InstallingOperator {
            fallback: fallback.clone(),
            install_after: 1,
            acks: AtomicUsize::new(0),
        });
        let gate = PrerequisiteGate::new(operator.clone());

        gate.ensure(&spec(&fallback)).await.unwrap();
        assert_eq!(operator.acks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_gate_stops_when_operator_input_closes() {
        let temp = tempfile::tempdir().unwrap();
        let operator = Arc::new(ClosedOperator {
            acks: AtomicUsize::new(0),
        });
        let gate = PrerequisiteGate::new(operator.clone());

        let err = gate
            .ensure(&spec(&temp.path().join("git.exe")))
            .await
            .unwrap_err();

        assert!(matches!(err, BootstrapError::Operator(_)));
        assert_eq!(operator.acks.load(Ordering::SeqCst), 1);
    }
}
