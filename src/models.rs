//! Core data structures shared across the provisioning pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::FetchError;

/// A named, URL-addressed file the operator needs on the desktop.
///
/// The name doubles as the destination file name, so names are unique
/// within a table and never contain path separators (see config validation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Display name and destination file name (e.g. "Install Git.exe")
    pub name: String,
    /// Source URL
    pub url: String,
}

impl Artifact {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Artifact {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Destination path under the given download directory.
    pub fn destination(&self, download_dir: &Path) -> PathBuf {
        download_dir.join(&self.name)
    }
}

/// What a successful fetch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// The destination already existed; no request was made.
    AlreadyPresent,
    /// The body was streamed to disk and renamed into place.
    Downloaded { bytes: u64, path: PathBuf },
}

/// Result of one download task, observed by the orchestrator after the join.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub name: String,
    pub result: Result<FetchStatus, FetchError>,
}

impl DownloadOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// An external tool the operator must install by hand.
///
/// Carries no mutable state: the gate re-resolves it on every poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrerequisiteSpec {
    /// Executable name searched on PATH (e.g. "git")
    pub tool: String,
    /// Well-known install location checked when PATH lookup fails
    pub fallback: PathBuf,
    /// Shown to the operator while the tool is missing
    pub instructions: String,
}

/// One architecture the toolchain is built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTarget {
    /// Architecture identifier passed through the arch selector variable
    pub arch: String,
    /// Directory prepended to PATH for this architecture's build
    pub toolchain_dir: PathBuf,
}

/// Outcome of the source checkout stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutStatus {
    AlreadyPresent,
    Cloned,
}

/// Outcome of one architecture build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// Marker file found; the build command was not invoked.
    Skipped,
    Built,
}

/// How a provisioning run ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The operator declined a confirmation checkpoint.
    Cancelled,
}
