//! JSONL activity log: append-only line-delimited JSON, one object per harness event.
//!
//! Lines are assembled in memory and written with a single `write_all` so a tailing
//! process never sees a partial record.
//!
//! Four-level fallback chain:
//! 1. Primary file path
//! 2. Fallback path (defaults to the system temp dir)
//! 3. stderr with `[STC-JSONL]` prefix
//! 4. Silent discard (a broken log must never fail a test run)

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::errors::{HarnessError, Result};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Events emitted over the life of one harness invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStart,
    ImageBuilt,
    ImageLoaded,
    TestcasePass,
    TestcaseFail,
    RunComplete,
    RunAborted,
}

/// One activity-log line. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Suite location, `lifecycle/action/pipeline/container`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testcase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Stage a testcase failed in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Freeform details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            suite: None,
            testcase: None,
            image: None,
            workspace: None,
            stage: None,
            duration_ms: None,
            passed: None,
            failed: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }

    /// Attach the error code and message of a failure.
    #[must_use]
    pub fn with_error(mut self, err: &HarnessError) -> Self {
        self.error_code = Some(err.code().to_string());
        self.error_message = Some(err.to_string());
        self
    }
}

/// Configuration for the JSONL writer.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Primary log file path.
    pub path: PathBuf,
    /// Optional fallback path (e.g. on a different filesystem).
    pub fallback_path: Option<PathBuf>,
    /// Maximum file size before rotation (bytes). Default: 10 MiB.
    pub max_size_bytes: u64,
    /// Number of rotated files to keep. Default: 3.
    pub max_rotated_files: u32,
    /// Seconds between forced fsync calls. Default: 10.
    pub fsync_interval_secs: u64,
}

impl JsonlConfig {
    /// Defaults rooted at `path`, with a temp-dir fallback.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fallback_path: Some(std::env::temp_dir().join("stagecheck-activity.jsonl")),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
            fsync_interval_secs: 10,
        }
    }
}

/// Append-only JSONL log writer with rotation and multi-level fallback.
pub struct JsonlWriter {
    config: JsonlConfig,
    sink: Sink,
    last_sync: Instant,
}

/// Where lines currently go. Only ever moves down the chain.
enum Sink {
    File {
        out: BufWriter<File>,
        path: PathBuf,
        fallback: bool,
        bytes: u64,
    },
    Stderr,
    Discard,
}

impl JsonlWriter {
    /// Open the activity log, stepping down the fallback chain if needed.
    pub fn open(config: JsonlConfig) -> Self {
        let sink = match open_sink(&config.path, false) {
            Ok(sink) => sink,
            Err(_) => fallback_sink(&config),
        };
        Self {
            config,
            sink,
            last_sync: Instant::now(),
        }
    }

    /// Append one entry as a single line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => self.append(&format!("{json}\n")),
            Err(e) => notice(&format!("serialize error: {e}")),
        }
    }

    pub fn flush(&mut self) {
        if let Sink::File { out, .. } = &mut self.sink {
            let _ = out.flush();
        }
    }

    /// `normal`, `fallback`, `stderr` or `discard`.
    pub fn state(&self) -> &'static str {
        match self.sink {
            Sink::File {
                fallback: false, ..
            } => "normal",
            Sink::File { fallback: true, .. } => "fallback",
            Sink::Stderr => "stderr",
            Sink::Discard => "discard",
        }
    }

    fn append(&mut self, line: &str) {
        let len = line.len() as u64;
        if matches!(&self.sink, Sink::File { bytes, .. } if bytes + len > self.config.max_size_bytes)
        {
            self.rotate();
        }

        // File, fallback file, stderr: at most three attempts.
        for _ in 0..3 {
            let written = match &mut self.sink {
                Sink::File { out, bytes, .. } => {
                    let ok = out.write_all(line.as_bytes()).is_ok();
                    if ok {
                        *bytes += len;
                    }
                    ok
                }
                Sink::Stderr => {
                    let _ = write!(io::stderr(), "[STC-JSONL] {line}");
                    true
                }
                Sink::Discard => true,
            };
            if written {
                self.sync_if_due();
                return;
            }
            self.step_down();
        }
    }

    fn step_down(&mut self) {
        self.sink = match self.sink {
            Sink::File {
                fallback: false, ..
            } => fallback_sink(&self.config),
            Sink::File { fallback: true, .. } => {
                notice("fallback write failed, using stderr");
                Sink::Stderr
            }
            Sink::Stderr | Sink::Discard => Sink::Discard,
        };
    }

    fn sync_if_due(&mut self) {
        if self.last_sync.elapsed() < Duration::from_secs(self.config.fsync_interval_secs) {
            return;
        }
        if let Sink::File { out, .. } = &mut self.sink {
            let _ = out.flush();
            let _ = out.get_ref().sync_data();
        }
        self.last_sync = Instant::now();
    }

    fn rotate(&mut self) {
        let Sink::File {
            out,
            path,
            fallback,
            ..
        } = &mut self.sink
        else {
            return;
        };
        let _ = out.flush();
        let base = path.clone();
        let fallback = *fallback;

        // base.N-1 -> base.N, ..., base -> base.1
        for index in (1..self.config.max_rotated_files).rev() {
            let _ = rename(rotated_name(&base, index), rotated_name(&base, index + 1));
        }
        let _ = rename(&base, rotated_name(&base, 1));

        match open_sink(&base, fallback) {
            Ok(sink) => self.sink = sink,
            Err(_) => self.step_down(),
        }
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

// ──────────────────────── helpers ────────────────────────

fn open_sink(path: &Path, fallback: bool) -> Result<Sink> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| HarnessError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| HarnessError::io(path, source))?;
    let bytes = file.metadata().map_or(0, |m| m.len());
    Ok(Sink::File {
        out: BufWriter::with_capacity(16 * 1024, file),
        path: path.to_path_buf(),
        fallback,
        bytes,
    })
}

fn fallback_sink(config: &JsonlConfig) -> Sink {
    let Some(path) = &config.fallback_path else {
        notice("primary path failed and no fallback configured, using stderr");
        return Sink::Stderr;
    };
    match open_sink(path, true) {
        Ok(sink) => {
            notice(&format!("primary path failed, using fallback: {}", path.display()));
            sink
        }
        Err(_) => {
            notice("both primary and fallback paths failed, using stderr");
            Sink::Stderr
        }
    }
}

fn notice(message: &str) {
    let _ = writeln!(io::stderr(), "[STC-JSONL] {message}");
}

/// `activity.jsonl` -> `activity.jsonl.3`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ──────────────────────── tests ────────────────────────
