//! Blocking child-process runner with optional deadline and output capture.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lines of stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How the child's output is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Inherit the harness's stdout/stderr.
    Stream,
    /// Capture, keeping only the stderr tail. Stdout is drained and dropped.
    Capture,
}

/// What happened to a finished (or killed) child.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// `None` when the process was killed at the deadline.
    pub status: Option<ExitStatus>,
    pub timed_out: bool,
    pub stderr_tail: String,
    pub duration: Duration,
}

impl ProcessOutcome {
    #[must_use]
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.is_some_and(|s| s.success())
    }

    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    /// One-line description for error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        let head = if self.timed_out {
            format!("timed out after {:?}", self.duration)
        } else {
            match self.exit_code() {
                Some(code) => format!("exited with code {code}"),
                None => "terminated by signal".to_string(),
            }
        };
        let tail = self.stderr_tail.trim();
        if tail.is_empty() {
            head
        } else {
            format!("{head}: {tail}")
        }
    }
}

/// Spawn `cmd` and block until it exits or `timeout` passes.
///
/// On expiry the child is killed and reaped; `timed_out` is set.
pub fn run(
    cmd: &mut Command,
    mode: OutputMode,
    timeout: Option<Duration>,
) -> std::io::Result<ProcessOutcome> {
    match mode {
        OutputMode::Stream => {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }
        OutputMode::Capture => {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
    }
    cmd.stdin(Stdio::null());

    let start = Instant::now();
    let mut child = cmd.spawn()?;
    // Drained so a chatty child never blocks on a full pipe.
    if let Some(mut out) = child.stdout.take() {
        thread::spawn(move || io::copy(&mut out, &mut io::sink()));
    }
    let stderr_handle = child
        .stderr
        .take()
        .map(|err| thread::spawn(move || tail_lines(err, STDERR_TAIL_LINES)));

    let mut timed_out = false;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if let Some(limit) = timeout
            && start.elapsed() >= limit
        {
            timed_out = true;
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        thread::sleep(POLL_INTERVAL);
    };

    // Grandchildren of a killed process can hold the pipes open; leave the
    // readers detached rather than wait on them.
    let stderr_tail = if timed_out {
        String::new()
    } else {
        join_output(stderr_handle)
    };

    Ok(ProcessOutcome {
        status,
        timed_out,
        stderr_tail,
        duration: start.elapsed(),
    })
}

fn tail_lines(reader: impl Read, keep: usize) -> String {
    let mut tail: VecDeque<String> = VecDeque::with_capacity(keep);
    for line in BufReader::new(reader).lines() {
        let Ok(line) = line else { break };
        if tail.len() == keep {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

fn join_output(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn zero_exit_is_success() {
        let outcome = run(&mut sh("echo hello"), OutputMode::Capture, None).unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.exit_code(), Some(0));
        assert!(outcome.stderr_tail.is_empty());
    }

    #[test]
    fn large_stdout_is_drained_without_blocking() {
        let outcome = run(
            &mut sh("head -c 4000000 /dev/zero; echo done >&2"),
            OutputMode::Capture,
            Some(Duration::from_secs(20)),
        )
        .unwrap();
        assert!(!outcome.timed_out);
        assert!(outcome.success());
        assert_eq!(outcome.stderr_tail, "done");
    }

    #[test]
    fn keeps_only_the_stderr_tail() {
        let outcome = run(
            &mut sh("i=0; while [ $i -lt 50 ]; do echo line$i >&2; i=$((i+1)); done; exit 3"),
            OutputMode::Capture,
            None,
        )
        .unwrap();
        assert!(!outcome.success());
        assert_eq!(outcome.exit_code(), Some(3));
        let lines: Vec<&str> = outcome.stderr_tail.lines().collect();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines.last(), Some(&"line49"));
        assert!(outcome.describe().starts_with("exited with code 3: line30"));
    }

    #[test]
    fn deadline_kills_the_child() {
        let outcome = run(
            &mut sh("sleep 5"),
            OutputMode::Capture,
            Some(Duration::from_millis(150)),
        )
        .unwrap();
        assert!(outcome.timed_out);
        assert!(!outcome.success());
        assert!(outcome.duration < Duration::from_secs(4));
        assert!(outcome.describe().starts_with("timed out"));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let mut cmd = Command::new("/nonexistent/stagecheck-tool");
        assert!(run(&mut cmd, OutputMode::Capture, None).is_err());
    }
}
