// SPDX-License-Identifier: Apache-2.0

//! Coverage-replay stage: feeds every generated test case to the
//! instrumented binary.
//!
//! Each replay is time-boxed on its own, and the whole stage stops issuing
//! replays once its overall budget is spent. A replay that runs over only
//! loses the coverage it would have added; what earlier replays recorded is
//! untouched.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::bench_error::{BenchError, BenchResult};
use crate::instance::Instance;
use crate::tools::{run_with_timeout, TimedOutcome};
use crate::workspace::Workspace;

/// Suffix identifying test-case files in engine output.
pub const TEST_CASE_SUFFIX: &str = ".ktestjson";

/// Variable the replay runtime reads to pick its test case.
pub const TEST_CASE_VAR: &str = "KTEST_FILE";

pub const DEFAULT_REPLAY_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_REPLAY_BUDGET: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub per_test_timeout: Duration,
    pub overall_budget: Duration,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        ReplayOptions {
            per_test_timeout: DEFAULT_REPLAY_TIMEOUT,
            overall_budget: DEFAULT_REPLAY_BUDGET,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub test_cases: usize,
    /// Replays started, including those that timed out.
    pub executed: usize,
    pub timed_out: usize,
    /// Replays whose program exited unsuccessfully (e.g. a reached error
    /// call). Not a harness failure.
    pub nonzero_exits: usize,
    /// Test cases never replayed because the overall budget ran out.
    pub skipped: usize,
}

/// Test cases under `dir`, sorted by file name. A missing directory (the
/// engine never got far enough to create it) yields none.
pub fn list_test_cases(dir: &Path) -> BenchResult<Vec<PathBuf>> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(BenchError::io(dir, e)),
    };
    let mut cases = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| BenchError::io(dir, e))?;
        let is_test_case = entry
            .file_name()
            .to_str()
            .map_or(false, |n| n.ends_with(TEST_CASE_SUFFIX));
        if is_test_case {
            cases.push(entry.path());
        }
    }
    cases.sort();
    Ok(cases)
}

/// Replays each test case of `instance` in sorted order until done or
/// until `opts.overall_budget` has elapsed.
///
/// No replay starts after the deadline, so the stage takes at most the
/// budget plus one in-flight replay's timeout.
pub fn replay(ws: &Workspace, instance: &Instance, opts: &ReplayOptions) -> BenchResult<ReplayStats> {
    log::info!("replay: {}", instance.source_name);
    let test_cases = list_test_cases(&instance.engine_output_dir)?;
    let (ld_var, ld_value) = ws.library_path_override();
    // `None` when the budget is too large to represent: no deadline.
    let deadline = Instant::now().checked_add(opts.overall_budget);

    let mut stats = ReplayStats {
        test_cases: test_cases.len(),
        ..Default::default()
    };
    for (i, test_case) in test_cases.iter().enumerate() {
        if deadline.map_or(false, |d| Instant::now() >= d) {
            stats.skipped = test_cases.len() - i;
            log::warn!(
                "replay: {}: budget of {:?} spent; {} test cases not run",
                instance.source_name,
                opts.overall_budget,
                stats.skipped
            );
            break;
        }

        let mut command = Command::new(&instance.coverage_object);
        command
            .current_dir(&instance.instance_dir)
            .env(TEST_CASE_VAR, test_case)
            .env(ld_var, &ld_value);
        let outcome = run_with_timeout(
            command,
            opts.per_test_timeout,
            Stdio::null(),
            Stdio::null(),
        )
        .map_err(|e| BenchError::io(&instance.coverage_object, e))?;
        stats.executed += 1;
        match outcome {
            TimedOutcome::Exited(status) => {
                if !status.success() {
                    stats.nonzero_exits += 1;
                }
            }
            TimedOutcome::TimedOut => {
                stats.timed_out += 1;
                let timeout = BenchError::ReplayTimeout {
                    test_case: test_case.clone(),
                    timeout: opts.per_test_timeout,
                };
                log::debug!("{}", timeout);
            }
        }
    }
    Ok(stats)
}
