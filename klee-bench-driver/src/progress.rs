// SPDX-License-Identifier: Apache-2.0

//! Human-readable progress on stdout/stderr.

use std::path::Path;
use std::time::Duration;

use colored::Colorize;
use klee_bench::{BenchError, InstanceReport, ReplayStats, RunObserver, Stage};

pub struct ConsoleObserver;

impl RunObserver for ConsoleObserver {
    fn on_corpus(&self, total: usize) {
        println!("{} total.", total);
    }

    fn on_instance_start(&self, index: usize, total: usize, source: &str) {
        println!("Source {}/{}: {}", index, total, source);
    }

    fn on_instance_failed(&self, source: &str, stage: Stage, error: &BenchError) {
        let what = match stage {
            Stage::Explore => "exploration failed".yellow(),
            _ => format!("{} failed", stage).as_str().red(),
        };
        eprintln!("{}: {}: {}", source, what, error);
    }

    fn on_replay_truncated(&self, source: &str, stats: &ReplayStats, budget: Duration) {
        eprintln!(
            "{}: replay budget of {}s exhausted; {} of {} test cases not replayed",
            source,
            budget.as_secs(),
            stats.skipped,
            stats.test_cases
        );
    }

    fn on_instance_done(&self, report: &InstanceReport) {
        log::debug!("{}: {:?}", report.source, report.status);
    }

    fn on_aggregate(&self, output_root: &Path) {
        println!("Generating coverage report in {}", output_root.display());
    }
}
