//! System module: operator interaction, tool lookup, PATH composition

pub mod paths;

use std::ffi::OsString;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::BootstrapError;
use crate::log_collector::FILE_ONLY_TARGET;
use crate::models::PrerequisiteSpec;

pub use paths::PathLayout;

/// Trait for the human at the console.
///
/// Both operations block the calling thread; async callers go through
/// `tokio::task::spawn_blocking`. An error means the operator can no longer
/// be reached (closed stdin, broken terminal).
pub trait Operator: Send + Sync {
    /// Show `prompt` and return true iff the operator typed the confirmation token.
    fn confirm(&self, prompt: &str) -> io::Result<bool>;

    /// Show `message` and block until the operator acknowledges it (enter).
    fn acknowledge(&self, message: &str) -> io::Result<()>;
}

/// Default production implementation of Operator backed by stdin/stdout.
pub struct ConsoleOperator {
    token: String,
}

impl ConsoleOperator {
    pub fn new(token: impl Into<String>) -> Self {
        ConsoleOperator {
            token: token.into(),
        }
    }

    fn show(&self, text: &str) -> io::Result<()> {
        log::info!(target: FILE_ONLY_TARGET, "{}", text);
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", text)?;
        stdout.flush()
    }
}

impl Operator for ConsoleOperator {
    fn confirm(&self, prompt: &str) -> io::Result<bool> {
        self.show(prompt)?;
        let answer = read_answer(&mut io::stdin().lock())?;
        Ok(answer.trim() == self.token)
    }

    fn acknowledge(&self, message: &str) -> io::Result<()> {
        self.show(message)?;
        read_answer(&mut io::stdin().lock()).map(|_| ())
    }
}

/// Read one line of operator input. End of input is an error: nobody is
/// left to answer.
pub fn read_answer<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "operator input closed",
        ));
    }
    Ok(line)
}

/// Ask the operator for confirmation without blocking the runtime.
pub async fn confirm_blocking(
    operator: &Arc<dyn Operator>,
    prompt: String,
) -> Result<bool, BootstrapError> {
    let operator = Arc::clone(operator);
    tokio::task::spawn_blocking(move || operator.confirm(&prompt))
        .await
        .map_err(|e| BootstrapError::Operator(e.to_string()))?
        .map_err(|e| BootstrapError::Operator(e.to_string()))
}

/// Show a message and wait for the operator without blocking the runtime.
pub async fn acknowledge_blocking(
    operator: &Arc<dyn Operator>,
    message: String,
) -> Result<(), BootstrapError> {
    let operator = Arc::clone(operator);
    tokio::task::spawn_blocking(move || operator.acknowledge(&message))
        .await
        .map_err(|e| BootstrapError::Operator(e.to_string()))?
        .map_err(|e| BootstrapError::Operator(e.to_string()))
}

/// Resolve a prerequisite: PATH search first, then the well-known install location.
pub fn resolve_tool(spec: &PrerequisiteSpec) -> Option<PathBuf> {
    if let Ok(path) = which::which(&spec.tool) {
        return Some(path);
    }
    if spec.fallback.exists() {
        return Some(spec.fallback.clone());
    }
    None
}

/// Name of the running operating system, in `std::env::consts::OS` form.
pub fn host_os() -> &'static str {
    std::env::consts::OS
}

/// Compose a PATH value with `first` in front of `inherited`, dropping every
/// entry listed in `excluded` and any empty entries.
///
/// Used to keep one architecture's toolchain directory out of another
/// architecture's build environment.
pub fn scoped_path(
    first: &Path,
    inherited: Option<&OsString>,
    excluded: &[&Path],
) -> Result<OsString, std::env::JoinPathsError> {
    let mut entries = vec![first.to_path_buf()];
    if let Some(current) = inherited {
        entries.extend(std::env::split_paths(current).filter(|entry| {
            !entry.as_os_str().is_empty() && !excluded.iter().any(|x| entry == x)
        }));
    }
    std::env::join_paths(entries)
}

/// Logging macros for convenient access
#[macro_export]
macro_rules! log_parsed {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        // Use target="parsed" for high-level events
        log::info!(target: "parsed", "{}", msg);
    }}
}
