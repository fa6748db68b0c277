// SPDX-License-Identifier: Apache-2.0

//! Symbolic-execution stage: runs the engine on an instance's bitcode.

use std::ffi::OsString;
use std::fs::File;
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::bench_error::{BenchError, BenchResult};
use crate::instance::Instance;
use crate::tools::{command_line, run_with_timeout, TimedOutcome};
use crate::workspace::Workspace;

pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_secs(30);

/// Extra time past the budget before a still-running engine is killed.
pub const DEFAULT_ENGINE_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ExploreOptions {
    /// Used for both the engine's wall-clock and solver-time limits.
    pub time_budget: Duration,
    pub grace: Duration,
    /// Appended after the budget flags, e.g. `--libc=uclibc`.
    pub extra_args: Vec<String>,
}

impl Default for ExploreOptions {
    fn default() -> Self {
        ExploreOptions {
            time_budget: DEFAULT_TIME_BUDGET,
            grace: DEFAULT_ENGINE_GRACE,
            extra_args: Vec::new(),
        }
    }
}

fn budget_flag(name: &str, budget: Duration) -> String {
    // A zero limit means "unlimited" to the engine.
    format!("--{}={}s", name, budget.as_secs().max(1))
}

fn engine_command(ws: &Workspace, instance: &Instance, opts: &ExploreOptions) -> Command {
    let mut output_dir_flag = OsString::from("--output-dir=");
    output_dir_flag.push(&instance.engine_output_dir);

    let mut command = Command::new(&ws.klee_path);
    command
        .arg(output_dir_flag)
        .arg(budget_flag("max-time", opts.time_budget))
        .arg(budget_flag("max-solver-time", opts.time_budget))
        .args(&opts.extra_args)
        .arg(&instance.bitcode_artifact);
    command
}

/// Runs the engine, writing test cases into `instance.engine_output_dir`
/// and its console output into `instance.engine_log`.
///
/// A non-zero exit, a crash, or outliving `time_budget + grace` is a
/// `BenchError::Exploration`; callers isolate it to the instance and carry
/// on with whatever test cases were written.
pub fn explore(ws: &Workspace, instance: &Instance, opts: &ExploreOptions) -> BenchResult<()> {
    log::info!("explore: {}", instance.source_name);
    let command = engine_command(ws, instance, opts);
    log::info!("running: {}", command_line(&command));

    let log_file =
        File::create(&instance.engine_log).map_err(|e| BenchError::io(&instance.engine_log, e))?;
    let log_file_err = log_file
        .try_clone()
        .map_err(|e| BenchError::io(&instance.engine_log, e))?;

    let hard_limit = opts.time_budget.saturating_add(opts.grace);
    let outcome = run_with_timeout(
        command,
        hard_limit,
        Stdio::from(log_file),
        Stdio::from(log_file_err),
    )
    .map_err(|e| BenchError::Exploration {
        instance: instance.source_name.clone(),
        detail: format!("could not spawn {}: {}", ws.klee_path.display(), e),
    })?;

    match outcome {
        TimedOutcome::Exited(status) if status.success() => Ok(()),
        TimedOutcome::Exited(status) => Err(BenchError::Exploration {
            instance: instance.source_name.clone(),
            detail: format!(
                "klee exited with {}; see {}",
                status,
                instance.engine_log.display()
            ),
        }),
        TimedOutcome::TimedOut => Err(BenchError::Exploration {
            instance: instance.source_name.clone(),
            detail: format!("klee still running after {:?}; killed", hard_limit),
        }),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::corpus::CorpusEntry;
    use crate::toolchain::ToolOverrides;
    use klee_bench_test_helpers::{FakeToolchain, ENGINE_ARGS_FILE};
    use std::path::Path;

    fn compiled_instance(root: &Path, body: &str) -> (Workspace, Instance) {
        let tc = FakeToolchain::install(root);
        tc.add_source("prog.c", body);
        let overrides = ToolOverrides {
            cc: Some(tc.cc.clone()),
            gcovr: Some(tc.gcovr.clone()),
            ..Default::default()
        };
        let ws = Workspace::initialize(
            &tc.sources,
            &tc.build,
            &root.join("out"),
            Some(tc.llvm.as_path()),
            &overrides,
        )
        .unwrap();
        let instance = Instance::new(
            &ws,
            &CorpusEntry {
                file_name: "prog.c".to_string(),
                stem: "prog".to_string(),
            },
        );
        compile(&ws, &instance).unwrap();
        (ws, instance)
    }

    #[test]
    fn test_budget_flags_and_extra_args() {
        let tmp = tempfile::tempdir().unwrap();
        let (ws, instance) = compiled_instance(tmp.path(), "int main() {}\n");
        let opts = ExploreOptions {
            time_budget: Duration::from_secs(5),
            extra_args: vec!["--libc=uclibc".to_string(), "--posix-runtime".to_string()],
            ..Default::default()
        };
        explore(&ws, &instance, &opts).unwrap();
        let args = std::fs::read_to_string(instance.engine_output_dir.join(ENGINE_ARGS_FILE))
            .unwrap();
        assert!(args.contains("--max-time=5s"), "{args}");
        assert!(args.contains("--max-solver-time=5s"), "{args}");
        assert!(args.contains("--libc=uclibc --posix-runtime"), "{args}");
        assert!(args.trim_end().ends_with("prog.c.bc"), "{args}");
        let log = std::fs::read_to_string(&instance.engine_log).unwrap();
        assert!(log.contains("output directory is"));
    }

    #[test]
    fn test_engine_crash_is_exploration_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let (ws, instance) = compiled_instance(tmp.path(), "FAKE_ENGINE_CRASH\n");
        let err = explore(&ws, &instance, &ExploreOptions::default()).unwrap_err();
        assert!(matches!(err, BenchError::Exploration { .. }), "{err}");
        assert!(!instance.engine_output_dir.exists());
    }

    #[test]
    fn test_hung_engine_is_killed() {
        let tmp = tempfile::tempdir().unwrap();
        let (ws, instance) = compiled_instance(tmp.path(), "FAKE_ENGINE_HANG\n");
        let opts = ExploreOptions {
            time_budget: Duration::from_millis(100),
            grace: Duration::from_millis(100),
            extra_args: vec![],
        };
        let start = std::time::Instant::now();
        let err = explore(&ws, &instance, &opts).unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(20));
        assert!(err.to_string().contains("killed"), "{err}");
    }

    #[test]
    fn test_zero_budget_is_not_unlimited() {
        assert_eq!(budget_flag("max-time", Duration::ZERO), "--max-time=1s");
        assert_eq!(
            budget_flag("max-solver-time", Duration::from_secs(30)),
            "--max-solver-time=30s"
        );
    }

    #[test]
    fn test_unbounded_budget_does_not_overflow() {
        let tmp = tempfile::tempdir().unwrap();
        let (ws, instance) = compiled_instance(tmp.path(), "int main() {}\n");
        let opts = ExploreOptions {
            time_budget: Duration::from_secs(u64::MAX),
            grace: Duration::from_secs(u64::MAX),
            extra_args: vec![],
        };
        explore(&ws, &instance, &opts).unwrap();
        let args = std::fs::read_to_string(instance.engine_output_dir.join(ENGINE_ARGS_FILE))
            .unwrap();
        assert!(args.contains(&format!("--max-time={}s", u64::MAX)), "{args}");
    }
}
