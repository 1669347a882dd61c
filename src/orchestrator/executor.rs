//! External command execution: spawning, output streaming, exit handling.
//!
//! Every stage that shells out goes through [`CommandRunner`], so tests can
//! substitute a recording fake for real toolchains. The production
//! [`SystemRunner`] streams child stdout/stderr to the console line by line
//! and mirrors each line into the run log.

use crate::error::ExecError;
use crate::log_collector::FILE_ONLY_TARGET;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Lines of output kept for the error message of a failed command.
const OUTPUT_TAIL_LINES: usize = 20;

/// An external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Complete child environment. `None` inherits the parent environment.
    pub env: Option<Vec<(OsString, OsString)>>,
    pub workdir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            env: None,
            workdir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Replace the whole child environment.
    pub fn env(mut self, env: Vec<(OsString, OsString)>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Value of `key` in the explicit environment, if one is set.
    pub fn env_value(&self, key: &str) -> Option<&OsStr> {
        self.env.as_ref().and_then(|env| {
            env.iter()
                .find(|(k, _)| k.to_string_lossy().eq_ignore_ascii_case(key))
                .map(|(_, v)| v.as_os_str())
        })
    }

    /// Human-readable command line for logs and errors.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Trait for running external commands to completion.
pub trait CommandRunner: Send + Sync {
    /// Run `spec`, streaming its output to the operator.
    ///
    /// A non-zero exit is an `ExecError::Exit` carrying the tail of the output.
    fn run(&self, spec: CommandSpec) -> BoxFuture<'static, Result<(), ExecError>>;
}

/// Production runner backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: CommandSpec) -> BoxFuture<'static, Result<(), ExecError>> {
        Box::pin(run_streaming(spec))
    }
}

async fn run_streaming(spec: CommandSpec) -> Result<(), ExecError> {
    let cmd_line = spec.display();
    log::info!("[Exec] Running: {}", cmd_line);

    let mut command = Command::new(&spec.program);
    command.args(&spec.args);
    if let Some(ref env) = spec.env {
        command.env_clear();
        command.envs(env.iter().map(|(k, v)| (k, v)));
    }
    if let Some(ref dir) = spec.workdir {
        command.current_dir(dir);
    }
    command.stdin(Stdio::inherit());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|e| ExecError::Spawn {
        cmd: cmd_line.clone(),
        reason: e.to_string(),
    })?;

    let stdout = child.stdout.take().ok_or_else(|| ExecError::Spawn {
        cmd: cmd_line.clone(),
        reason: "Failed to capture stdout".to_string(),
    })?;
    let stderr = child.stderr.take().ok_or_else(|| ExecError::Spawn {
        cmd: cmd_line.clone(),
        reason: "Failed to capture stderr".to_string(),
    })?;

    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();
    let mut stdout_closed = false;
    let mut stderr_closed = false;
    let mut tail: VecDeque<String> = VecDeque::with_capacity(OUTPUT_TAIL_LINES);

    while !(stdout_closed && stderr_closed) {
        tokio::select! {
            line = stdout_lines.next_line(), if !stdout_closed => match line {
                Ok(Some(line)) => {
                    println!("{}", line);
                    log::debug!(target: FILE_ONLY_TARGET, "[Exec] {}", line);
                    push_tail(&mut tail, line);
                }
                Ok(None) => stdout_closed = true,
                Err(e) => {
                    log::warn!("[Exec] stdout read error: {}", e);
                    stdout_closed = true;
                }
            },
            line = stderr_lines.next_line(), if !stderr_closed => match line {
                Ok(Some(line)) => {
                    eprintln!("{}", line);
                    log::debug!(target: FILE_ONLY_TARGET, "[Exec] [STDERR] {}", line);
                    push_tail(&mut tail, line);
                }
                Ok(None) => stderr_closed = true,
                Err(e) => {
                    log::warn!("[Exec] stderr read error: {}", e);
                    stderr_closed = true;
                }
            },
        }
    }

    let status = child.wait().await.map_err(|e| ExecError::Wait {
        cmd: cmd_line.clone(),
        reason: e.to_string(),
    })?;

    if status.success() {
        log::debug!("[Exec] {} exited successfully", cmd_line);
        return Ok(());
    }

    let status_msg = match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    };
    let output = Vec::from(tail).join("\n");
    Err(ExecError::Exit {
        cmd: cmd_line,
        status: if output.is_empty() {
            status_msg
        } else {
            format!("{}; last output:\n{}", status_msg, output)
        },
    })
}

fn push_tail(tail: &mut VecDeque<String>, line: String) {
    if tail.len() == OUTPUT_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line);
}

/// Copy `base`, dropping every variable named in `remove` (ASCII
/// case-insensitive, as Windows treats `Path` and `PATH` alike).
pub fn strip_vars<I>(base: I, remove: &[&str]) -> Vec<(OsString, OsString)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    base.into_iter()
        .filter(|(key, _)| {
            let key = key.to_string_lossy();
            !remove.iter().any(|r| key.eq_ignore_ascii_case(r))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(k: &str, v: &str) -> (OsString, OsString) {
        (OsString::from(k), OsString::from(v))
    }

    #[test]
    fn test_command_spec_display() {
        let spec = CommandSpec::new("git")
            .args(["clone", "https://example.com/repo"])
            .arg("goroot");
        assert_eq!(spec.display(), "git clone https://example.com/repo goroot");
    }

    #[test]
    fn test_env_value_lookup() {
        let spec = CommandSpec::new("make.bat").env(vec![pair("GOARCH", "386")]);
        assert_eq!(spec.env_value("GOARCH"), Some(OsStr::new("386")));
        assert_eq!(spec.env_value("PATH"), None);
        assert_eq!(CommandSpec::new("x").env_value("GOARCH"), None);
    }

    #[test]
    fn test_strip_vars_case_insensitive() {
        let env = vec![pair("Path", "/a"), pair("GOARCH", "amd64"), pair("HOME", "/h")];
        let stripped = strip_vars(env, &["PATH", "GOARCH"]);
        assert_eq!(stripped, vec![pair("HOME", "/h")]);
    }

    #[test]
    fn test_push_tail_bounded() {
        let mut tail = VecDeque::new();
        for i in 0..(OUTPUT_TAIL_LINES + 5) {
            push_tail(&mut tail, i.to_string());
        }
        assert_eq!(tail.len(), OUTPUT_TAIL_LINES);
        assert_eq!(tail.front().map(String::as_str), Some("5"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_reports_exit_status() {
        let ok = SystemRunner.run(CommandSpec::new("sh").args(["-c", "echo hello"])).await;
        assert!(ok.is_ok());

        let failed = SystemRunner
            .run(CommandSpec::new("sh").args(["-c", "echo broken >&2; exit 3"]))
            .await;
        match failed {
            Err(ExecError::Exit { status, .. }) => {
                assert!(status.contains("exit code 3"));
                assert!(status.contains("broken"));
            }
            other => panic!("expected exit error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_system_runner_spawn_failure() {
        let result = SystemRunner
            .run(CommandSpec::new("definitely_not_a_real_command_12345"))
            .await;
        assert!(matches!(result, Err(ExecError::Spawn { .. })));
    }
}
