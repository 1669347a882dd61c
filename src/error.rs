//! Unified error type hierarchy for winstrap
//!
//! Provides structured error handling with FetchError, CheckoutError, BuildError,
//! ExecError, ConfigError, PublishError, and the umbrella BootstrapError.
//!
//! Only `FetchError` is recoverable: download failures are collected after the
//! download barrier and escalated to a confirmation checkpoint. Everything else
//! ends the run.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A single artifact download failed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Error fetching {url}: {reason}")]
    Request { url: String, reason: String },

    #[error("Error fetching {url}: server returned {status}")]
    Status { url: String, status: u16 },

    #[error("Error reading {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("Error storing {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Download task for {name} did not complete: {reason}")]
    TaskAborted { name: String, reason: String },
}

/// External command spawn or exit failures.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to start '{cmd}': {reason}")]
    Spawn { cmd: String, reason: String },

    #[error("Command '{cmd}' exited with {status}")]
    Exit { cmd: String, status: String },

    #[error("Command '{cmd}' could not be awaited: {reason}")]
    Wait { cmd: String, reason: String },
}

/// Source checkout failures. Fatal for the run.
#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("clone of {repo} into {dest} failed (is the version control client installed? re-run later): {source}")]
    CloneFailed {
        repo: String,
        dest: PathBuf,
        #[source]
        source: ExecError,
    },

    #[error("Checkout destination {0} has no parent directory")]
    InvalidDestination(PathBuf),

    #[error("Could not prepare checkout directory: {0}")]
    Io(#[from] io::Error),
}

/// Per-architecture build failures. Fatal for the run.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Unknown target architecture: {0}")]
    UnknownArch(String),

    #[error("Could not compose build environment for {arch}: {reason}")]
    Environment { arch: String, reason: String },

    #[error("build script for arch {arch}: {source}")]
    ScriptFailed {
        arch: String,
        #[source]
        source: ExecError,
    },

    #[error("post-build step failed: {0}")]
    PostBuildFailed(#[source] ExecError),
}

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid TOML in config: {0}")]
    InvalidToml(#[from] toml::de::Error),

    #[error("Could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Cannot determine home directory; pass --home")]
    HomeDirUnavailable,

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Self-build and publish failures.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("no GOROOT set")]
    ToolchainRootMissing,

    #[error("Error building {helper}: {source}")]
    HelperBuild {
        helper: String,
        #[source]
        source: ExecError,
    },

    #[error("cross-compiler build failed: {0}")]
    ToolchainBuild(#[source] ExecError),

    #[error("Credential file {path} unusable: {reason}")]
    Credentials { path: PathBuf, reason: String },

    #[error("upload: {0}")]
    Upload(String),

    #[error("IO error during publish: {0}")]
    Io(#[from] io::Error),
}

/// Top-level error for a provisioning or self-build run.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Operator interaction failed: {0}")]
    Operator(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Top-level result type for pipeline operations.
pub type Result<T> = std::result::Result<T, BootstrapError>;
