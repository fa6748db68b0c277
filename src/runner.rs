// SPDX-License-Identifier: Apache-2.0

//! Drives every corpus source through the four stages, then aggregates.
//!
//! - Instances run on a bounded pool of worker threads (one by default,
//!   which is the strictly sequential model).
//! - Each instance lives in its own directories, so workers share nothing
//!   mutable beyond the job queue.
//! - Aggregation happens after the pool is joined, i.e. after every
//!   instance has reached a terminal state.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::aggregate::aggregate;
use crate::bench_error::BenchError;
use crate::compile::compile;
use crate::corpus::{enumerate_corpus, CorpusEntry};
use crate::coverage_build::build_for_coverage;
use crate::explore::{explore, ExploreOptions};
use crate::instance::{Instance, Stage};
use crate::replay::{list_test_cases, replay, ReplayOptions, ReplayStats};
use crate::summary::{InstanceReport, InstanceStatus, RunFailure, RunSummary};
use crate::workspace::Workspace;

/// Receives progress notifications; called from worker threads.
pub trait RunObserver: Sync {
    fn on_corpus(&self, _total: usize) {}
    /// `index` is 1-based.
    fn on_instance_start(&self, _index: usize, _total: usize, _source: &str) {}
    fn on_instance_failed(&self, _source: &str, _stage: Stage, _error: &BenchError) {}
    fn on_replay_truncated(&self, _source: &str, _stats: &ReplayStats, _budget: Duration) {}
    fn on_instance_done(&self, _report: &InstanceReport) {}
    fn on_aggregate(&self, _output_root: &Path) {}
}

/// Observer that ignores everything.
pub struct SilentObserver;

impl RunObserver for SilentObserver {}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Worker threads; 0 means one per available core.
    pub jobs: usize,
    /// Treat a build failure as fatal for the whole run instead of
    /// isolating it to its instance.
    pub stop_on_build_failure: bool,
    /// Run only the compile stage before aggregating.
    pub just_compile: bool,
    pub max_files: Option<usize>,
    pub explore: ExploreOptions,
    pub replay: ReplayOptions,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        RunnerOptions {
            jobs: 1,
            stop_on_build_failure: false,
            just_compile: false,
            max_files: None,
            explore: ExploreOptions::default(),
            replay: ReplayOptions::default(),
        }
    }
}

fn worker_count(jobs: usize, job_count: usize) -> usize {
    let wanted = if jobs == 0 {
        thread::available_parallelism().map_or(1, |n| n.get())
    } else {
        jobs
    };
    std::cmp::max(1, std::cmp::min(wanted, job_count))
}

struct WorkResult {
    index: usize,
    report: InstanceReport,
    /// A build failure under the fail-fast policy.
    fatal: Option<BenchError>,
}

pub struct BenchmarkRunner<'a> {
    ws: &'a Workspace,
    options: RunnerOptions,
}

impl<'a> BenchmarkRunner<'a> {
    pub fn new(ws: &'a Workspace, options: RunnerOptions) -> Self {
        BenchmarkRunner { ws, options }
    }

    /// Processes the whole corpus and renders the combined report.
    ///
    /// Returns `Err` only for run-level failures: corpus problems, a build
    /// failure under `stop_on_build_failure`, or aggregation. The failure
    /// carries the instances that finished before it.
    pub fn run(&self, observer: &dyn RunObserver) -> Result<RunSummary, RunFailure> {
        let entries = enumerate_corpus(&self.ws.source_root, self.options.max_files)
            .map_err(|e| RunFailure::new(e, Vec::new()))?;
        self.run_planned(&entries, observer)
    }

    /// As `run`, over a corpus the caller already enumerated (e.g. to
    /// reject stem collisions before the workspace is created).
    pub fn run_planned(
        &self,
        entries: &[CorpusEntry],
        observer: &dyn RunObserver,
    ) -> Result<RunSummary, RunFailure> {
        observer.on_corpus(entries.len());

        let (instances, fatal) = self.run_instances(entries, observer);
        if let Some(e) = fatal {
            return Err(RunFailure::new(e, instances));
        }

        // Just-compile runs aggregate too; the report is then empty of
        // execution data.
        observer.on_aggregate(&self.ws.output_root);
        match aggregate(&self.ws.toolchain.gcovr, &self.ws.output_root) {
            Ok(report) => Ok(RunSummary {
                instances,
                report: Some(report),
            }),
            Err(e) => Err(RunFailure::new(e, instances)),
        }
    }

    /// Runs all entries on the worker pool; reports come back in corpus
    /// order regardless of completion order.
    fn run_instances(
        &self,
        entries: &[CorpusEntry],
        observer: &dyn RunObserver,
    ) -> (Vec<InstanceReport>, Option<BenchError>) {
        let total = entries.len();
        if total == 0 {
            return (Vec::new(), None);
        }
        let workers = worker_count(self.options.jobs, total);
        log::info!("runner: {} sources on {} workers", total, workers);

        let queue: VecDeque<(usize, &CorpusEntry)> = entries.iter().enumerate().collect();
        let queue = Mutex::new(queue);
        let stop = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel::<WorkResult>();

        let mut pending = BTreeMap::<usize, InstanceReport>::new();
        let mut fatal: Option<BenchError> = None;

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                let stop = &stop;
                scope.spawn(move || loop {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some((index, entry)) = next else {
                        break;
                    };
                    let (report, build_error) =
                        self.run_instance(index, total, entry, observer);
                    if build_error.is_some() {
                        stop.store(true, Ordering::Relaxed);
                    }
                    if tx
                        .send(WorkResult {
                            index,
                            report,
                            fatal: build_error,
                        })
                        .is_err()
                    {
                        break;
                    }
                });
            }
            drop(tx);

            for work in rx {
                if fatal.is_none() {
                    fatal = work.fatal;
                }
                pending.insert(work.index, work.report);
            }
        });

        (pending.into_values().collect(), fatal)
    }

    fn run_instance(
        &self,
        index: usize,
        total: usize,
        entry: &CorpusEntry,
        observer: &dyn RunObserver,
    ) -> (InstanceReport, Option<BenchError>) {
        let instance = Instance::new(self.ws, entry);
        observer.on_instance_start(index + 1, total, &instance.source_name);
        let mut report = InstanceReport::new(&instance);

        let outcome = self.run_stages(&instance, &mut report, observer);
        let fatal = match outcome {
            Ok(()) => None,
            Err((stage, e)) => {
                log::warn!("{}: {} stage failed: {}", instance.source_name, stage, e);
                report.fail(stage, &e);
                observer.on_instance_failed(&instance.source_name, stage, &e);
                if self.options.stop_on_build_failure && report.is_build_failure() {
                    Some(e)
                } else {
                    None
                }
            }
        };
        observer.on_instance_done(&report);
        (report, fatal)
    }

    /// Stage order: compile, explore, coverage-build, replay. A compile or
    /// coverage-build failure ends the instance; an exploration failure is
    /// recorded and the remaining stages still run.
    fn run_stages(
        &self,
        instance: &Instance,
        report: &mut InstanceReport,
        observer: &dyn RunObserver,
    ) -> Result<(), (Stage, BenchError)> {
        compile(self.ws, instance).map_err(|e| (Stage::Compile, e))?;
        if self.options.just_compile {
            report.status = InstanceStatus::Compiled;
            return Ok(());
        }

        if let Err(e) = explore(self.ws, instance, &self.options.explore) {
            log::warn!("{}: {}", instance.source_name, e);
            observer.on_instance_failed(&instance.source_name, Stage::Explore, &e);
            report.exploration_error = Some(e.to_string());
        }
        report.test_cases = list_test_cases(&instance.engine_output_dir)
            .map_err(|e| (Stage::Explore, e))?
            .len();

        build_for_coverage(self.ws, instance).map_err(|e| (Stage::CoverageBuild, e))?;

        let stats =
            replay(self.ws, instance, &self.options.replay).map_err(|e| (Stage::Replay, e))?;
        if stats.skipped > 0 {
            observer.on_replay_truncated(
                &instance.source_name,
                &stats,
                self.options.replay.overall_budget,
            );
        }
        report.replay = Some(stats);
        report.status = InstanceStatus::Completed;
        Ok(())
    }
}
