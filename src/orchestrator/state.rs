//! Run State Management and Phase Tracking
//!
//! This module provides the state tracking structures used by the orchestrator
//! to drive a provisioning run across its stages.
//!
//! **Architecture**:
//! - `BootstrapPhase`: Enum representing discrete run phases
//! - `OrchestrationState`: Struct tracking current phase, per-stage results, and errors
//! - State transitions are validated here and performed by the orchestrator
//!
//! Transitions are strictly forward. Any non-terminal phase may end in
//! `Cancelled` (operator declined a checkpoint) or `Failed` (unrecoverable
//! error). Terminal phases have no successors: a new run starts from `Init`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Which confirmation checkpoint the run is waiting at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Checkpoint {
    /// Before cloning the source tree
    Checkout,
    /// Before compiling the toolchain
    Build,
}

/// Run phase enumeration - discrete states in the provisioning lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BootstrapPhase {
    /// Opening confirmation and startup script
    Init,

    /// Concurrent artifact downloads (ends at the join barrier)
    Downloading,

    /// Blocking gates for the version control client and C compiler
    PrerequisiteChecks,

    /// Waiting for the operator before the next side-effecting stage
    AwaitConfirm(Checkpoint),

    /// Idempotent source clone
    Checkout,

    /// Sequential per-architecture builds
    Building,

    /// Optional packaging step (`--release`)
    PostBuild,

    /// Run completed successfully
    Done,

    /// Operator declined a checkpoint
    Cancelled,

    /// Unrecoverable error
    Failed,
}

impl BootstrapPhase {
    /// Get the human-readable name for this phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapPhase::Init => "init",
            BootstrapPhase::Downloading => "downloading",
            BootstrapPhase::PrerequisiteChecks => "prerequisite-checks",
            BootstrapPhase::AwaitConfirm(Checkpoint::Checkout) => "await-confirm(checkout)",
            BootstrapPhase::AwaitConfirm(Checkpoint::Build) => "await-confirm(build)",
            BootstrapPhase::Checkout => "checkout",
            BootstrapPhase::Building => "building",
            BootstrapPhase::PostBuild => "post-build",
            BootstrapPhase::Done => "done",
            BootstrapPhase::Cancelled => "cancelled",
            BootstrapPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BootstrapPhase::Done | BootstrapPhase::Cancelled | BootstrapPhase::Failed
        )
    }

    /// Get all valid phase transitions FROM this phase.
    pub fn valid_next_phases(&self) -> Vec<BootstrapPhase> {
        let forward = match self {
            BootstrapPhase::Init => vec![BootstrapPhase::Downloading],
            BootstrapPhase::Downloading => vec![BootstrapPhase::PrerequisiteChecks],
            BootstrapPhase::PrerequisiteChecks => {
                vec![BootstrapPhase::AwaitConfirm(Checkpoint::Checkout)]
            }
            BootstrapPhase::AwaitConfirm(Checkpoint::Checkout) => vec![BootstrapPhase::Checkout],
            BootstrapPhase::Checkout => vec![BootstrapPhase::AwaitConfirm(Checkpoint::Build)],
            BootstrapPhase::AwaitConfirm(Checkpoint::Build) => vec![BootstrapPhase::Building],
            BootstrapPhase::Building => vec![BootstrapPhase::PostBuild, BootstrapPhase::Done],
            BootstrapPhase::PostBuild => vec![BootstrapPhase::Done],
            BootstrapPhase::Done | BootstrapPhase::Cancelled | BootstrapPhase::Failed => {
                return vec![]
            }
        };
        let mut next = forward;
        next.push(BootstrapPhase::Cancelled);
        next.push(BootstrapPhase::Failed);
        next
    }

    /// Check if a transition to the given phase is valid.
    pub fn can_transition_to(&self, next: BootstrapPhase) -> bool {
        self.valid_next_phases().contains(&next)
    }
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run state snapshot for tracking progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationState {
    /// Current run phase
    pub phase: BootstrapPhase,

    /// Artifacts whose download failed in this run
    pub download_failures: Vec<String>,

    /// Architectures compiled in this run
    pub built: Vec<String>,

    /// Architectures skipped because their marker file existed
    pub skipped: Vec<String>,

    /// Run start timestamp
    pub start_time: SystemTime,

    /// Last phase update timestamp
    pub last_update_time: SystemTime,

    /// Error message if the run failed
    pub error: Option<String>,
}

impl Default for OrchestrationState {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestrationState {
    pub fn new() -> Self {
        let now = SystemTime::now();
        OrchestrationState {
            phase: BootstrapPhase::Init,
            download_failures: Vec::new(),
            built: Vec::new(),
            skipped: Vec::new(),
            start_time: now,
            last_update_time: now,
            error: None,
        }
    }

    /// Attempt to transition to the next phase.
    pub fn transition_to(&mut self, next_phase: BootstrapPhase) -> Result<(), String> {
        if !self.phase.can_transition_to(next_phase) {
            return Err(format!(
                "Invalid phase transition: {} -> {}",
                self.phase.as_str(),
                next_phase.as_str()
            ));
        }
        self.phase = next_phase;
        self.last_update_time = SystemTime::now();
        Ok(())
    }

    /// Record an error and mark the run as failed.
    ///
    /// A run that already reached a terminal phase keeps it.
    pub fn record_error(&mut self, error: String) {
        self.error = Some(error);
        if !self.phase.is_terminal() {
            self.phase = BootstrapPhase::Failed;
        }
        self.last_update_time = SystemTime::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HAPPY_PATH: [BootstrapPhase; 9] = [
        BootstrapPhase::Init,
        BootstrapPhase::Downloading,
        BootstrapPhase::PrerequisiteChecks,
        BootstrapPhase::AwaitConfirm(Checkpoint::Checkout),
        BootstrapPhase::Checkout,
        BootstrapPhase::AwaitConfirm(Checkpoint::Build),
        BootstrapPhase::Building,
        BootstrapPhase::PostBuild,
        BootstrapPhase::Done,
    ];

    #[test]
    fn test_happy_path_transitions() {
        let mut state = OrchestrationState::new();
        for next in &HAPPY_PATH[1..] {
            assert!(state.transition_to(*next).is_ok(), "to {}", next);
        }
        assert_eq!(state.phase, BootstrapPhase::Done);
    }

    #[test]
    fn test_post_build_is_optional() {
        assert!(BootstrapPhase::Building.can_transition_to(BootstrapPhase::Done));
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert!(!BootstrapPhase::Init.can_transition_to(BootstrapPhase::Checkout));
        assert!(!BootstrapPhase::Downloading.can_transition_to(BootstrapPhase::Building));
        assert!(!BootstrapPhase::Building.can_transition_to(BootstrapPhase::Downloading));
        assert!(!BootstrapPhase::AwaitConfirm(Checkpoint::Checkout)
            .can_transition_to(BootstrapPhase::Building));
    }

    #[test]
    fn test_cancel_and_fail_from_every_non_terminal() {
        for phase in &HAPPY_PATH[..8] {
            assert!(phase.can_transition_to(BootstrapPhase::Cancelled), "{}", phase);
            assert!(phase.can_transition_to(BootstrapPhase::Failed), "{}", phase);
        }
    }

    #[test]
    fn test_terminal_phases_are_final() {
        for phase in [
            BootstrapPhase::Done,
            BootstrapPhase::Cancelled,
            BootstrapPhase::Failed,
        ] {
            assert!(phase.is_terminal());
            assert!(phase.valid_next_phases().is_empty());
        }
    }

    #[test]
    fn test_invalid_transition_message() {
        let mut state = OrchestrationState::new();
        let err = state.transition_to(BootstrapPhase::Building).unwrap_err();
        assert_eq!(err, "Invalid phase transition: init -> building");
    }

    #[test]
    fn test_record_error_marks_failed() {
        let mut state = OrchestrationState::new();
        state.transition_to(BootstrapPhase::Downloading).unwrap();
        state.record_error("boom".to_string());
        assert_eq!(state.phase, BootstrapPhase::Failed);
        assert_eq!(state.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_record_error_keeps_cancelled() {
        let mut state = OrchestrationState::new();
        state.transition_to(BootstrapPhase::Cancelled).unwrap();
        state.record_error("late".to_string());
        assert_eq!(state.phase, BootstrapPhase::Cancelled);
    }
}
