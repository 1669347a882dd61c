//! winstrap: builder machine bootstrap
//!
//! Turns a fresh machine into a toolchain build host: downloads installers,
//! waits for the operator to install the external tools, checks out the
//! toolchain sources, and builds them for each target architecture. On any
//! other OS the same binary cross-builds and publishes itself.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Core data structures and types
//! - **config**: Configuration file and run options
//! - **system**: Operator interaction, tool lookup, filesystem layout
//! - **orchestrator**: Provisioning stages and the state machine driving them
//! - **publish**: Self-build and upload pipeline
//! - **log_collector**: Console and on-disk run logs

// Core foundational modules
pub mod error;
pub mod models;

// OS abstraction: operator, PATH handling, layout
pub mod system;

pub mod config;

// Robust, decoupled logging system
pub mod log_collector;

// Provisioning pipeline and state management
pub mod orchestrator;

// Non-target hosts: cross-build and publish
pub mod publish;

// Re-export the log crate for macro usage
pub use log;

// Re-export log collector for use throughout the system
pub use log_collector::{LogCollector, LogLine};

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{
    BootstrapError, BuildError, CheckoutError, ConfigError, ExecError, FetchError, PublishError,
    Result,
};

pub use models::{
    Artifact, BuildStatus, BuildTarget, CheckoutStatus, DownloadOutcome, FetchStatus,
    PrerequisiteSpec, RunOutcome,
};

pub use config::{BootstrapConfig, RunOptions};

pub use system::{ConsoleOperator, Operator, PathLayout};

pub use orchestrator::{
    BootstrapPhase, CommandRunner, CommandSpec, OrchestrationState, Orchestrator, Pipeline,
    SystemRunner,
};

pub use publish::{PublishOptions, SelfBuildOutcome, SelfBuilder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert_eq!(VERSION, "0.1.0");
    }

    #[test]
    fn test_error_reexport() {
        let _: Result<i32> = Ok(42);
    }

    #[test]
    fn test_enum_variants_accessible() {
        assert_eq!(BootstrapPhase::Init, BootstrapPhase::Init);
        assert_eq!(RunOutcome::Cancelled, RunOutcome::Cancelled);
    }
}
