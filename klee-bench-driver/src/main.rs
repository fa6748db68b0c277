// SPDX-License-Identifier: Apache-2.0

//! Command line driver that runs the KLEE benchmark over a corpus directory.
//!
//! Every source in the corpus is compiled to bitcode, explored by the engine
//! under a time budget, rebuilt with gcov instrumentation, and replayed
//! against the generated test cases; one gcovr report covers the whole run.
//!
//! Sample usage:
//!
//! ```shell
//! $ cargo run -- sv-benchmarks/c/loops \
//!     --output coverage-out --build $HOME/klee/build \
//!     --llvm /usr/lib/llvm-13 --t 60 --jobs 4
//! $ cargo run -- sv-benchmarks/c/loops \
//!     --output bitcode-only --build $HOME/klee/build --just-compile true
//! ```
//!
//! Exit codes: 0 when the run completed (instance-level failures are
//! reported, not fatal), 1 when every instance failed to build or a build
//! failure stopped the run, 2 for configuration and environment errors, 3
//! when the coverage report could not be generated. `--summary-json` is
//! written on exit codes 1 and 3 too, with whatever instances finished.

mod progress;
mod report_cli_error;
mod toolchain_config;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches};
use klee_bench::corpus::enumerate_corpus;
use klee_bench::explore::{DEFAULT_ENGINE_GRACE, DEFAULT_TIME_BUDGET};
use klee_bench::replay::{DEFAULT_REPLAY_BUDGET, DEFAULT_REPLAY_TIMEOUT};
use klee_bench::{BenchmarkRunner, RunnerOptions, Workspace};

use crate::progress::ConsoleObserver;
use crate::report_cli_error::{report_bench_error_and_exit, report_cli_error_and_exit};
use crate::toolchain_config::{
    find_toolchain_file, get_duration_secs, get_klee_args, load_toolchain_config, ToolchainConfig,
};

trait AppExt {
    fn add_bool_arg(self, long: &'static str, id: &'static str, help: &'static str) -> Self;
    fn add_secs_arg(self, long: &'static str, id: &'static str, help: &'static str) -> Self;
}

impl AppExt for clap::Command {
    fn add_bool_arg(self, long: &'static str, id: &'static str, help: &'static str) -> Self {
        (self as clap::Command).arg(
            Arg::new(id)
                .long(long)
                .value_name("BOOL")
                .action(ArgAction::Set)
                .value_parser(["true", "false"])
                .num_args(1)
                .help(help),
        )
    }

    fn add_secs_arg(self, long: &'static str, id: &'static str, help: &'static str) -> Self {
        (self as clap::Command).arg(
            Arg::new(id)
                .long(long)
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64))
                .action(ArgAction::Set)
                .help(help),
        )
    }
}

fn build_cli() -> clap::Command {
    clap::Command::new("klee-bench-driver")
        .about("Generates tests with KLEE for a corpus of C sources and measures their coverage")
        .subcommand_negates_reqs(true)
        .args_conflicts_with_subcommands(true)
        .arg(
            Arg::new("toolchain")
                .long("toolchain")
                .value_name("TOOLCHAIN")
                .help("Path to a klee-bench-toolchain.toml file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("source")
                .value_name("SOURCE_DIR")
                .help("Directory holding the corpus of C sources")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .value_name("OUTPUT_DIR")
                .help("Coverage output directory; must not exist yet")
                .required(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("build")
                .long("build")
                .value_name("KLEE_BUILD_DIR")
                .help("KLEE build directory (holds bin/klee and lib/)")
                .required(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("llvm")
                .long("llvm")
                .value_name("LLVM_DIR")
                .help("LLVM install root providing bin/clang and bin/llvm-link")
                .action(ArgAction::Set),
        )
        .add_secs_arg("t", "time_budget", "Engine time budget per source (default 30)")
        .add_bool_arg(
            "just-compile",
            "just_compile",
            "Only compile each source to bitcode, then write the (empty) coverage report",
        )
        .add_bool_arg(
            "stop-on-build-failure",
            "stop_on_build_failure",
            "Abort the run on the first compile or coverage-build failure",
        )
        .arg(
            Arg::new("jobs")
                .long("jobs")
                .value_name("N")
                .help("Sources processed in parallel; 0 means one per core")
                .value_parser(clap::value_parser!(usize))
                .default_value("1")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("max_files")
                .long("max-files")
                .value_name("N")
                .help("Only process the first N sources in sorted order; 0 means all")
                .value_parser(clap::value_parser!(usize))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("summary_json")
                .long("summary-json")
                .value_name("PATH")
                .help("Write the per-source run summary as JSON to this path")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("klee_arg")
                .long("klee-arg")
                .value_name("FLAG")
                .help("Extra flag passed to the engine; may be repeated")
                .allow_hyphen_values(true)
                .action(ArgAction::Append),
        )
        .add_secs_arg(
            "replay-timeout",
            "replay_timeout",
            "Time box for a single test-case replay (default 3)",
        )
        .add_secs_arg(
            "replay-budget",
            "replay_budget",
            "Total replay time per source (default 60)",
        )
        .subcommand(clap::Command::new("version").about("Prints the version of the driver"))
}

fn bool_flag(matches: &ArgMatches, id: &str) -> bool {
    matches.get_one::<String>(id).map(|s| s == "true").unwrap_or(false)
}

fn load_config(matches: &ArgMatches, cwd: &Path) -> Option<ToolchainConfig> {
    let path = find_toolchain_file(matches.get_one::<String>("toolchain"), cwd)?;
    let path_str = path.display().to_string();
    if !path.exists() {
        let cwd_str = cwd.display().to_string();
        report_cli_error_and_exit(
            "toolchain toml file does not exist",
            None,
            vec![
                ("path", path_str.as_str()),
                ("working directory", cwd_str.as_str()),
            ],
        );
    }
    match load_toolchain_config(&path) {
        Ok(config) => Some(config),
        Err(e) => {
            let error = format!("{:#}", e);
            report_cli_error_and_exit(
                "could not load toolchain toml file",
                None,
                vec![("path", path_str.as_str()), ("error", error.as_str())],
            )
        }
    }
}

fn runner_options(matches: &ArgMatches, config: &Option<ToolchainConfig>) -> RunnerOptions {
    let mut options = RunnerOptions::default();
    if let Some(jobs) = matches.get_one::<usize>("jobs") {
        options.jobs = *jobs;
    }
    options.just_compile = bool_flag(matches, "just_compile");
    options.stop_on_build_failure = bool_flag(matches, "stop_on_build_failure");
    options.max_files = matches.get_one::<usize>("max_files").copied().filter(|n| *n > 0);

    let from_config = |f: fn(&ToolchainConfig) -> Option<u64>| config.as_ref().and_then(f);
    options.explore.time_budget =
        get_duration_secs(matches, "time_budget", None, DEFAULT_TIME_BUDGET);
    options.explore.grace = from_config(|c| c.engine_grace_secs)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_ENGINE_GRACE);
    options.explore.extra_args = get_klee_args(matches, config);
    options.replay.per_test_timeout = get_duration_secs(
        matches,
        "replay_timeout",
        from_config(|c| c.replay_timeout_secs),
        DEFAULT_REPLAY_TIMEOUT,
    );
    options.replay.overall_budget = get_duration_secs(
        matches,
        "replay_budget",
        from_config(|c| c.replay_budget_secs),
        DEFAULT_REPLAY_BUDGET,
    );
    options
}

fn handle_run(matches: &ArgMatches, config: &Option<ToolchainConfig>) -> i32 {
    let source = PathBuf::from(matches.get_one::<String>("source").map_or("", |s| s.as_str()));
    let output = PathBuf::from(matches.get_one::<String>("output").map_or("", |s| s.as_str()));
    let build = PathBuf::from(matches.get_one::<String>("build").map_or("", |s| s.as_str()));
    let llvm = matches.get_one::<String>("llvm").map(PathBuf::from);
    let overrides = config
        .as_ref()
        .map(ToolchainConfig::tool_overrides)
        .unwrap_or_default();
    let options = runner_options(matches, config);
    log::info!("klee-bench-driver options: {:?}", options);

    // Plan the corpus first so a bad corpus leaves no output directory behind.
    if !source.is_dir() {
        let source_str = source.display().to_string();
        report_cli_error_and_exit(
            "source directory is malformed or does not exist",
            None,
            vec![("path", source_str.as_str())],
        );
    }
    let entries = match enumerate_corpus(&source, options.max_files) {
        Ok(entries) => entries,
        Err(e) => report_bench_error_and_exit(&e),
    };

    let ws = match Workspace::initialize(&source, &build, &output, llvm.as_deref(), &overrides) {
        Ok(ws) => ws,
        Err(e) => report_bench_error_and_exit(&e),
    };
    let summary_json = matches.get_one::<String>("summary_json").map(Path::new);
    let summary = match BenchmarkRunner::new(&ws, options).run_planned(&entries, &ConsoleObserver)
    {
        Ok(summary) => summary,
        Err(failure) => {
            // Keep the per-instance results even though the run failed.
            if let Some(path) = summary_json {
                if let Err(e) = failure.summary.write_json(path) {
                    log::warn!("could not write summary: {}", e);
                }
            }
            report_bench_error_and_exit(&failure.error)
        }
    };

    if let Some(path) = summary_json {
        if let Err(e) = summary.write_json(path) {
            report_bench_error_and_exit(&e);
        }
    }
    if let Some(report) = &summary.report {
        println!("Coverage report: {}", report.display());
    }
    println!("{}", summary.describe());
    summary.exit_code()
}

fn main() {
    let _ = env_logger::try_init();

    log::info!(
        "klee-bench-driver starting; version: {}",
        env!("CARGO_PKG_VERSION")
    );

    let matches = build_cli().get_matches();

    if matches.subcommand_matches("version").is_some() {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            let error = e.to_string();
            report_cli_error_and_exit(
                "cannot determine working directory",
                None,
                vec![("error", error.as_str())],
            )
        }
    };
    let config = load_config(&matches, &cwd);
    let code = handle_run(&matches, &config);
    std::process::exit(code);
}
