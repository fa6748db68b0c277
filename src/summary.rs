// SPDX-License-Identifier: Apache-2.0

//! Per-instance results and the run-level summary built from them.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::bench_error::{BenchError, EXIT_BUILD};
use crate::instance::{Instance, Stage};
use crate::replay::ReplayStats;

/// Terminal state of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceStatus {
    /// All four stages ran (exploration may still have failed).
    Completed,
    /// Just-compile mode: bitcode built, nothing further requested.
    Compiled,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceReport {
    pub source: String,
    pub instance_dir: PathBuf,
    pub status: InstanceStatus,
    /// Set when `status` is `Failed`.
    pub failed_stage: Option<Stage>,
    pub error: Option<String>,
    /// Engine failures never fail the instance; they are recorded here.
    pub exploration_error: Option<String>,
    pub test_cases: usize,
    pub replay: Option<ReplayStats>,
}

impl InstanceReport {
    pub(crate) fn new(instance: &Instance) -> Self {
        InstanceReport {
            source: instance.source_name.clone(),
            instance_dir: instance.instance_dir.clone(),
            status: InstanceStatus::Failed,
            failed_stage: None,
            error: None,
            exploration_error: None,
            test_cases: 0,
            replay: None,
        }
    }

    pub(crate) fn fail(&mut self, stage: Stage, error: &BenchError) {
        self.status = InstanceStatus::Failed;
        self.failed_stage = Some(stage);
        self.error = Some(error.to_string());
    }

    /// Failed in the compile or coverage-build stage.
    pub fn is_build_failure(&self) -> bool {
        matches!(
            self.failed_stage,
            Some(Stage::Compile) | Some(Stage::CoverageBuild)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub instances: Vec<InstanceReport>,
    /// `None` only when the run failed before or during aggregation.
    pub report: Option<PathBuf>,
}

/// A run-level failure together with what the run produced before it.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunFailure {
    pub error: BenchError,
    pub summary: RunSummary,
}

impl RunFailure {
    pub(crate) fn new(error: BenchError, instances: Vec<InstanceReport>) -> Self {
        RunFailure {
            error,
            summary: RunSummary {
                instances,
                report: None,
            },
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.instances
            .iter()
            .filter(|r| r.status != InstanceStatus::Failed)
            .count()
    }

    pub fn build_failures(&self) -> usize {
        self.instances.iter().filter(|r| r.is_build_failure()).count()
    }

    pub fn exploration_failures(&self) -> usize {
        self.instances
            .iter()
            .filter(|r| r.exploration_error.is_some())
            .count()
    }

    pub fn replayed(&self) -> usize {
        self.instances
            .iter()
            .filter_map(|r| r.replay.as_ref())
            .map(|s| s.executed)
            .sum()
    }

    pub fn skipped_replays(&self) -> usize {
        self.instances
            .iter()
            .filter_map(|r| r.replay.as_ref())
            .map(|s| s.skipped)
            .sum()
    }

    /// 0 unless the corpus was non-empty and every instance failed to
    /// build.
    pub fn exit_code(&self) -> i32 {
        if !self.instances.is_empty() && self.build_failures() == self.instances.len() {
            EXIT_BUILD
        } else {
            0
        }
    }

    /// One-line human summary.
    pub fn describe(&self) -> String {
        format!(
            "{} sources: {} completed, {} build failures, {} exploration failures; {} test cases replayed, {} skipped",
            self.instances.len(),
            self.completed(),
            self.build_failures(),
            self.exploration_failures(),
            self.replayed(),
            self.skipped_replays()
        )
    }

    pub fn write_json(&self, path: &Path) -> Result<(), BenchError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            BenchError::io(path, std::io::Error::new(std::io::ErrorKind::Other, e))
        })?;
        std::fs::write(path, json).map_err(|e| BenchError::io(path, e))
    }
}
