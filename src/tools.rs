// SPDX-License-Identifier: Apache-2.0

//! Helpers for running the external tools the pipeline drives.
//!
//! Every child gets its environment overrides passed directly on its
//! `Command`; nothing here touches the environment of the harness process.

use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

/// Number of trailing stderr lines kept in failure diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// A tool invocation that did not succeed.
#[derive(Debug, Clone)]
pub struct ToolFailure {
    pub command: String,
    pub detail: String,
}

/// How a time-boxed invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedOutcome {
    Exited(ExitStatus),
    /// The child outlived its time box and was killed.
    TimedOut,
}

/// Human-readable snapshot of a command line, for logs and diagnostics.
pub fn command_line(cmd: &Command) -> String {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let args = cmd
        .get_args()
        .map(|s| s.to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    if args.is_empty() {
        program
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Runs `cmd` to completion, capturing its output; any non-zero exit (or
/// failure to spawn) is a `ToolFailure`.
pub fn run_checked(mut cmd: Command) -> Result<(), ToolFailure> {
    let cmdline = command_line(&cmd);
    log::info!("running: {}", cmdline);
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| ToolFailure {
            command: cmdline.clone(),
            detail: format!("could not spawn: {e}"),
        })?;
    if output.status.success() {
        return Ok(());
    }
    let tail = stderr_tail(&output.stderr);
    log::debug!("{} failed; stderr tail:\n{}", cmdline, tail);
    let detail = if tail.is_empty() {
        output.status.to_string()
    } else {
        format!("{}; stderr: {}", output.status, tail)
    };
    Err(ToolFailure {
        command: cmdline,
        detail,
    })
}

/// Longest time box `run_with_timeout` honours; longer ones are clamped.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Runs `cmd` with stdin closed and the given stdout/stderr sinks, killing
/// it if it runs longer than `timeout`.
pub fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    stdout: Stdio,
    stderr: Stdio,
) -> std::io::Result<TimedOutcome> {
    let timeout = timeout.min(MAX_TIMEOUT);
    log::debug!("running with timeout {:?}: {}", timeout, command_line(&cmd));
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .spawn()?;
    match child.wait_timeout(timeout)? {
        Some(status) => Ok(TimedOutcome::Exited(status)),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Ok(TimedOutcome::TimedOut)
        }
    }
}
