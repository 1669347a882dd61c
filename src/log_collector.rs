//! Decoupled logging pipeline for bootstrap runs.
//!
//! # Architecture
//!
//! ```text
//! log::info!() / log_parsed!()
//!     |
//! [LogCollector] (non-blocking, implements log::Log)
//!     |                 \
//!     | (crossbeam)      stderr echo (console level)
//!     v
//! [DiskPersister thread]
//!     |
//! logs/full/<ts>.log     every line
//! logs/parsed/<ts>.log   milestones only (target "parsed")
//! ```
//!
//! Records with target [`FILE_ONLY_TARGET`] are written to disk but never
//! echoed. Use it for text the caller already printed to the console.
//!
//! Disk writes happen on a plain OS thread so the collector works from any
//! tokio runtime flavour, including the current-thread runtime used in tests.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Target for records that go to the session log without a console echo.
pub const FILE_ONLY_TARGET: &str = "file";

/// Internal log line or special marker
enum LogMessage {
    Line(LogLine),
    /// Flush marker with channel sender to signal completion
    Flush(std::sync::mpsc::Sender<()>),
}

/// A log line with metadata
#[derive(Clone, Debug)]
pub struct LogLine {
    pub message: String,
    /// Milestone lines are also written to the parsed log
    pub parsed: bool,
    /// Timestamp of when the log was created
    pub timestamp: String,
}

impl LogLine {
    pub fn new(message: String) -> Self {
        LogLine {
            message,
            parsed: false,
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    pub fn parsed(message: String) -> Self {
        LogLine {
            parsed: true,
            ..LogLine::new(message)
        }
    }
}

/// Unified logger that echoes to the console and persists to disk
pub struct LogCollector {
    tx: Sender<LogMessage>,
    full_log_path: PathBuf,
    console_level: LevelFilter,
}

impl LogCollector {
    /// Create a new LogCollector writing a fresh session file under `log_dir`.
    pub fn new(log_dir: &Path, console_level: LevelFilter) -> Result<Self, String> {
        let full_log_dir = log_dir.join("full");
        let parsed_log_dir = log_dir.join("parsed");
        std::fs::create_dir_all(&full_log_dir)
            .map_err(|e| format!("Failed to create full log dir: {}", e))?;
        std::fs::create_dir_all(&parsed_log_dir)
            .map_err(|e| format!("Failed to create parsed log dir: {}", e))?;

        let session = Local::now().format("%Y%m%d_%H%M%S%.3f").to_string();
        let full_log_path = full_log_dir.join(format!("{}.log", session));
        let parsed_log_path = parsed_log_dir.join(format!("{}.log", session));

        let mut full_file = open_append(&full_log_path)?;
        let mut parsed_file = open_append(&parsed_log_path)?;

        let (tx, rx) = unbounded::<LogMessage>();

        std::thread::spawn(move || {
            while let Ok(msg) = rx.recv() {
                match msg {
                    LogMessage::Line(line) => {
                        let formatted = format!("[{}] {}\n", line.timestamp, line.message);
                        let _ = full_file.write_all(formatted.as_bytes());
                        if line.parsed {
                            let _ = parsed_file.write_all(formatted.as_bytes());
                        }
                    }
                    LogMessage::Flush(done) => {
                        let _ = full_file.flush();
                        let _ = parsed_file.flush();
                        let _ = done.send(());
                    }
                }
            }
        });

        Ok(LogCollector {
            tx,
            full_log_path,
            console_level,
        })
    }

    /// Path of this session's full log.
    pub fn session_log_path(&self) -> &Path {
        &self.full_log_path
    }

    /// Send a log line (non-blocking)
    pub fn log_line(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    /// Send a simple string log
    pub fn log_str(&self, message: impl Into<String>) {
        self.log_line(LogLine::new(message.into()));
    }

    /// Send a parsed (milestone) log
    pub fn log_parsed(&self, message: impl Into<String>) {
        self.log_line(LogLine::parsed(message.into()));
    }

    /// Whether `record` is echoed to stderr in addition to the session log.
    fn echoes(&self, record: &Record) -> bool {
        record.target() != FILE_ONLY_TARGET && record.level() <= self.console_level
    }

    /// Wait until every line sent before this call is on disk.
    pub async fn wait_for_empty(&self) -> Result<(), String> {
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        self.tx
            .send(LogMessage::Flush(done_tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;

        tokio::task::spawn_blocking(move || done_rx.recv())
            .await
            .map_err(|e| format!("Flush task failed: {}", e))?
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }
}

impl Clone for LogCollector {
    fn clone(&self) -> Self {
        LogCollector {
            tx: self.tx.clone(),
            full_log_path: self.full_log_path.clone(),
            console_level: self.console_level,
        }
    }
}

/// Wires all log::info!(), log::warn!(), log::error!() calls into LogCollector
impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = format!("[{}] {}", record.level(), record.args());

        if self.echoes(record) {
            eprintln!("{}", message);
        }

        if record.target() == "parsed" {
            self.log_parsed(message);
        } else {
            self.log_str(message);
        }
    }

    fn flush(&self) {}
}

fn open_append(path: &Path) -> Result<File, String> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_log_collector_creates_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let collector = LogCollector::new(temp_dir.path(), LevelFilter::Off);

        assert!(collector.is_ok());
        assert!(temp_dir.path().join("full").exists());
        assert!(temp_dir.path().join("parsed").exists());
    }

    #[tokio::test]
    async fn test_parsed_lines_reach_both_logs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let collector = LogCollector::new(temp_dir.path(), LevelFilter::Off).unwrap();

        for i in 0..100 {
            collector.log_str(format!("detail {}", i));
        }
        collector.log_parsed("PHASE TRANSITION: Downloading");
        collector.wait_for_empty().await.unwrap();

        let full = fs::read_to_string(collector.session_log_path()).unwrap();
        assert!(full.contains("detail 99"));
        assert!(full.contains("PHASE TRANSITION: Downloading"));

        let parsed_dir = temp_dir.path().join("parsed");
        let parsed_file = fs::read_dir(&parsed_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .next()
            .unwrap()
            .path();
        let parsed = fs::read_to_string(parsed_file).unwrap();
        assert!(parsed.contains("PHASE TRANSITION: Downloading"));
        assert!(!parsed.contains("detail"));
    }

    #[tokio::test]
    async fn test_file_only_records_are_not_echoed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let collector = LogCollector::new(temp_dir.path(), LevelFilter::Debug).unwrap();

        let prompt = Record::builder()
            .args(format_args!("Type 'yes' to proceed."))
            .level(Level::Info)
            .target(FILE_ONLY_TARGET)
            .build();
        let progress = Record::builder()
            .args(format_args!("[Build] Building toolchain for 386"))
            .level(Level::Info)
            .target("winstrap::orchestrator::phases::build")
            .build();
        assert!(!collector.echoes(&prompt));
        assert!(collector.echoes(&progress));

        collector.log(&prompt);
        collector.wait_for_empty().await.unwrap();
        let full = fs::read_to_string(collector.session_log_path()).unwrap();
        assert!(full.contains("[INFO] Type 'yes' to proceed."));
    }
}
