// SPDX-License-Identifier: Apache-2.0

//! End-to-end runs of the harness against the fake toolchain.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use klee_bench::corpus::enumerate_corpus;
use klee_bench::{
    BenchError, BenchmarkRunner, InstanceReport, InstanceStatus, ReplayStats, RunObserver,
    RunnerOptions, Stage, ToolOverrides, Workspace,
};
use klee_bench_test_helpers::{FakeToolchain, BUILD_FAIL_MARKER, ENGINE_CRASH_MARKER};
use pretty_assertions::assert_eq;

const TRIVIAL: &str = "int main() { return 0; }\n";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Corpus(usize),
    Start(usize, String),
    Failed(String, Stage),
    Truncated(String),
    Done(String),
    Aggregate,
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    fn push(&self, e: Event) {
        self.events.lock().unwrap().push(e);
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl RunObserver for RecordingObserver {
    fn on_corpus(&self, total: usize) {
        self.push(Event::Corpus(total));
    }
    fn on_instance_start(&self, index: usize, _total: usize, source: &str) {
        self.push(Event::Start(index, source.to_string()));
    }
    fn on_instance_failed(&self, source: &str, stage: Stage, _error: &BenchError) {
        self.push(Event::Failed(source.to_string(), stage));
    }
    fn on_replay_truncated(&self, source: &str, _stats: &ReplayStats, _budget: Duration) {
        self.push(Event::Truncated(source.to_string()));
    }
    fn on_instance_done(&self, report: &InstanceReport) {
        self.push(Event::Done(report.source.clone()));
    }
    fn on_aggregate(&self, _output_root: &Path) {
        self.push(Event::Aggregate);
    }
}

fn workspace(tc: &FakeToolchain, out: &Path) -> Result<Workspace, BenchError> {
    let _ = env_logger::builder().is_test(true).try_init();
    let overrides = ToolOverrides {
        cc: Some(tc.cc.clone()),
        gcovr: Some(tc.gcovr.clone()),
        ..Default::default()
    };
    Workspace::initialize(&tc.sources, &tc.build, out, Some(tc.llvm.as_path()), &overrides)
}

fn options() -> RunnerOptions {
    let mut options = RunnerOptions::default();
    options.explore.time_budget = Duration::from_secs(5);
    options
}

/// Relative paths of every file and directory under `root`, sorted.
fn tree(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut worklist = vec![root.to_path_buf()];
    while let Some(dir) = worklist.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            out.push(path.strip_prefix(root).unwrap().to_path_buf());
            if path.is_dir() {
                worklist.push(path);
            }
        }
    }
    out.sort();
    out
}

#[test]
fn test_single_trivial_source() {
    let tmp = tempfile::tempdir().unwrap();
    let tc = FakeToolchain::install(tmp.path());
    tc.add_source("trivial.c", TRIVIAL);
    let out = tmp.path().join("out");
    let ws = workspace(&tc, &out).unwrap();

    let observer = RecordingObserver::default();
    let summary = BenchmarkRunner::new(&ws, options()).run(&observer).unwrap();

    assert_eq!(summary.instances.len(), 1);
    let r = &summary.instances[0];
    assert_eq!(r.status, InstanceStatus::Completed);
    assert_eq!(r.test_cases, 2);
    assert!(out.join("trivial").join("trivial.c.o").is_file());
    assert!(out.join("__klee_output").join("trivial").is_dir());

    let report = summary.report.clone().unwrap();
    assert_eq!(report, out.join("results"));
    let text = std::fs::read_to_string(report).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(text.contains("/trivial/"));
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(
        observer.events(),
        vec![
            Event::Corpus(1),
            Event::Start(1, "trivial".to_string()),
            Event::Done("trivial".to_string()),
            Event::Aggregate,
        ]
    );
}

#[test]
fn test_engine_crash_is_isolated() {
    let tmp = tempfile::tempdir().unwrap();
    let tc = FakeToolchain::install(tmp.path());
    tc.add_source("a_first.c", TRIVIAL);
    tc.add_source("b_crash.c", &format!("// {}\n", ENGINE_CRASH_MARKER));
    tc.add_source("c_third.c", TRIVIAL);
    let out = tmp.path().join("out");
    let ws = workspace(&tc, &out).unwrap();

    let observer = RecordingObserver::default();
    let summary = BenchmarkRunner::new(&ws, options()).run(&observer).unwrap();

    let statuses: Vec<(String, InstanceStatus, usize)> = summary
        .instances
        .iter()
        .map(|r| (r.source.clone(), r.status, r.test_cases))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("a_first".to_string(), InstanceStatus::Completed, 2),
            ("b_crash".to_string(), InstanceStatus::Completed, 0),
            ("c_third".to_string(), InstanceStatus::Completed, 2),
        ]
    );
    assert!(summary.instances[1].exploration_error.is_some());
    assert_eq!(summary.exploration_failures(), 1);
    assert!(observer
        .events()
        .contains(&Event::Failed("b_crash".to_string(), Stage::Explore)));

    let text = std::fs::read_to_string(summary.report.unwrap()).unwrap();
    assert!(text.contains("/a_first/"));
    assert!(text.contains("/c_third/"));
    assert!(!text.contains("/b_crash/"));
    assert_eq!(tc.gcovr_call_count(), 1);
}

#[test]
fn test_existing_output_aborts_before_any_work() {
    let tmp = tempfile::tempdir().unwrap();
    let tc = FakeToolchain::install(tmp.path());
    tc.add_source("trivial.c", TRIVIAL);
    let out = tmp.path().join("out");
    std::fs::create_dir(&out).unwrap();

    let err = workspace(&tc, &out).unwrap_err();
    assert!(matches!(err, BenchError::Configuration { .. }));
    assert_eq!(err.exit_code(), 2);
    assert!(tree(&out).is_empty());
}

#[test]
fn test_build_failure_is_isolated_by_default() {
    let tmp = tempfile::tempdir().unwrap();
    let tc = FakeToolchain::install(tmp.path());
    tc.add_source("broken.c", &format!("// {}\n", BUILD_FAIL_MARKER));
    tc.add_source("fine.c", TRIVIAL);
    let out = tmp.path().join("out");
    let ws = workspace(&tc, &out).unwrap();

    let observer = RecordingObserver::default();
    let summary = BenchmarkRunner::new(&ws, options()).run(&observer).unwrap();
    let broken = &summary.instances[0];
    assert_eq!(broken.status, InstanceStatus::Failed);
    assert_eq!(broken.failed_stage, Some(Stage::Compile));
    // No downstream stage ran for the broken instance.
    assert!(!out.join("__klee_output").join("broken").exists());
    assert!(!out.join("broken").join("broken.c.o").exists());
    assert_eq!(summary.instances[1].status, InstanceStatus::Completed);
    assert_eq!(summary.exit_code(), 0);
    assert!(summary.report.is_some());
}

#[test]
fn test_stop_on_build_failure_skips_rest_and_aggregation() {
    let tmp = tempfile::tempdir().unwrap();
    let tc = FakeToolchain::install(tmp.path());
    tc.add_source("a_broken.c", &format!("// {}\n", BUILD_FAIL_MARKER));
    tc.add_source("b_fine.c", TRIVIAL);
    let out = tmp.path().join("out");
    let ws = workspace(&tc, &out).unwrap();

    let mut opts = options();
    opts.stop_on_build_failure = true;
    let observer = RecordingObserver::default();
    let err = BenchmarkRunner::new(&ws, opts).run(&observer).unwrap_err();
    assert!(matches!(err.error, BenchError::Build { .. }), "{err}");
    assert_eq!(err.exit_code(), 1);
    let sources: Vec<&str> = err.summary.instances.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(sources, vec!["a_broken"]);
    assert!(err.summary.report.is_none());
    assert!(!out.join("b_fine").exists());
    assert!(!observer.events().contains(&Event::Aggregate));
    assert_eq!(tc.gcovr_call_count(), 0);
}

#[test]
fn test_every_build_failing_gives_nonzero_exit() {
    let tmp = tempfile::tempdir().unwrap();
    let tc = FakeToolchain::install(tmp.path());
    tc.add_source("x.c", &format!("// {}\n", BUILD_FAIL_MARKER));
    tc.add_source("y.c", &format!("// {}\n", BUILD_FAIL_MARKER));
    let ws = workspace(&tc, &tmp.path().join("out")).unwrap();
    let summary = BenchmarkRunner::new(&ws, options())
        .run(&RecordingObserver::default())
        .unwrap();
    assert_eq!(summary.build_failures(), 2);
    assert_eq!(summary.exit_code(), 1);
}

#[test]
fn test_just_compile_runs_only_compile_stage_then_aggregates() {
    let tmp = tempfile::tempdir().unwrap();
    let tc = FakeToolchain::install(tmp.path());
    tc.add_source("one.c", TRIVIAL);
    tc.add_source("two.c", TRIVIAL);
    let out = tmp.path().join("out");
    let ws = workspace(&tc, &out).unwrap();

    let mut opts = options();
    opts.just_compile = true;
    let observer = RecordingObserver::default();
    let summary = BenchmarkRunner::new(&ws, opts).run(&observer).unwrap();
    assert!(summary
        .instances
        .iter()
        .all(|r| r.status == InstanceStatus::Compiled));
    assert!(out.join("one").join("one.c.bc").is_file());
    assert!(!out.join("one").join("one.c.o").exists());
    assert_eq!(std::fs::read_dir(out.join("__klee_output")).unwrap().count(), 0);
    assert_eq!(summary.report, Some(out.join("results")));
    assert!(out.join("results").is_file());
    assert_eq!(tc.gcovr_call_count(), 1);
    assert_eq!(observer.events().last(), Some(&Event::Aggregate));
}

#[test]
fn test_aggregation_failure_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let tc = FakeToolchain::install(tmp.path());
    tc.add_source("trivial.c", TRIVIAL);
    tc.break_gcovr();
    let ws = workspace(&tc, &tmp.path().join("out")).unwrap();
    let err = BenchmarkRunner::new(&ws, options())
        .run(&RecordingObserver::default())
        .unwrap_err();
    assert!(matches!(err.error, BenchError::Aggregation { .. }));
    assert_eq!(err.exit_code(), 3);
    assert_eq!(err.summary.instances.len(), 1);
    assert_eq!(err.summary.instances[0].status, InstanceStatus::Completed);
    assert!(err.summary.report.is_none());
}

#[test]
fn test_parallel_run_aggregates_once_after_all_instances() {
    let tmp = tempfile::tempdir().unwrap();
    let tc = FakeToolchain::install(tmp.path());
    for i in 0..6 {
        tc.add_source(&format!("prog{i}.c"), "// FAKE_TESTS=3\n");
    }
    let ws = workspace(&tc, &tmp.path().join("out")).unwrap();
    let mut opts = options();
    opts.jobs = 3;
    let observer = RecordingObserver::default();
    let summary = BenchmarkRunner::new(&ws, opts).run(&observer).unwrap();

    let sources: Vec<&str> = summary.instances.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(
        sources,
        vec!["prog0", "prog1", "prog2", "prog3", "prog4", "prog5"]
    );
    assert_eq!(summary.replayed(), 18);

    let events = observer.events();
    let aggregate_at: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| **e == Event::Aggregate)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(aggregate_at.len(), 1);
    let last_done = events
        .iter()
        .rposition(|e| matches!(e, Event::Done(_)))
        .unwrap();
    assert!(last_done < aggregate_at[0]);
    assert_eq!(
        events.iter().filter(|e| matches!(e, Event::Done(_))).count(),
        6
    );
    assert_eq!(tc.gcovr_call_count(), 1);
}

#[test]
fn test_replay_budget_truncation_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let tc = FakeToolchain::install(tmp.path());
    tc.add_source("many.c", "// FAKE_TESTS=5\n");
    let ws = workspace(&tc, &tmp.path().join("out")).unwrap();
    let mut opts = options();
    opts.replay.overall_budget = Duration::ZERO;
    let observer = RecordingObserver::default();
    let summary = BenchmarkRunner::new(&ws, opts).run(&observer).unwrap();
    assert_eq!(summary.skipped_replays(), 5);
    assert!(observer
        .events()
        .contains(&Event::Truncated("many".to_string())));
}

#[test]
fn test_two_runs_produce_identical_trees() {
    let tmp = tempfile::tempdir().unwrap();
    let tc = FakeToolchain::install(tmp.path());
    tc.add_source("alpha.c", TRIVIAL);
    tc.add_source("beta.c", &format!("// {}\n", ENGINE_CRASH_MARKER));
    tc.add_source("gamma.c", "// FAKE_TESTS=4\n");

    let out1 = tmp.path().join("out1");
    let out2 = tmp.path().join("out2");
    for out in [&out1, &out2] {
        let ws = workspace(&tc, out).unwrap();
        BenchmarkRunner::new(&ws, options())
            .run(&RecordingObserver::default())
            .unwrap();
    }
    assert_eq!(tree(&out1), tree(&out2));
    let report1 = std::fs::read_to_string(out1.join("results")).unwrap();
    let report2 = std::fs::read_to_string(out2.join("results")).unwrap();
    assert_eq!(
        report1.replace(out1.to_str().unwrap(), ""),
        report2.replace(out2.to_str().unwrap(), "")
    );
}

#[test]
fn test_stem_collision_rejected_before_workspace_exists() {
    let tmp = tempfile::tempdir().unwrap();
    let tc = FakeToolchain::install(tmp.path());
    tc.add_source("dup.c", TRIVIAL);
    tc.add_source("dup.i", TRIVIAL);
    let err = enumerate_corpus(&tc.sources, None).unwrap_err();
    assert!(matches!(err, BenchError::Configuration { .. }));
    assert!(!tmp.path().join("out").exists());
}

#[test]
fn test_run_planned_uses_given_corpus() {
    let tmp = tempfile::tempdir().unwrap();
    let tc = FakeToolchain::install(tmp.path());
    tc.add_source("a.c", TRIVIAL);
    tc.add_source("b.c", TRIVIAL);
    tc.add_source("c.c", TRIVIAL);
    let entries = enumerate_corpus(&tc.sources, Some(2)).unwrap();
    let ws = workspace(&tc, &tmp.path().join("out")).unwrap();
    let mut opts = options();
    opts.just_compile = true;
    let summary = BenchmarkRunner::new(&ws, opts)
        .run_planned(&entries, &RecordingObserver::default())
        .unwrap();
    let sources: Vec<&str> = summary.instances.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(sources, vec!["a", "b"]);
}
