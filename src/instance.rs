// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use serde::Serialize;

use crate::bench_error::BenchError;
use crate::corpus::CorpusEntry;
use crate::tools::ToolFailure;
use crate::workspace::Workspace;

/// Log file for the engine's stdout/stderr inside the instance directory.
pub const ENGINE_LOG_NAME: &str = "klee.log";

/// Bitcode of the test-harness stub inside the instance directory.
pub const HARNESS_BITCODE_NAME: &str = "klee-test-comp.bc";

/// The pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Compile,
    Explore,
    CoverageBuild,
    Replay,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Compile => "compile",
            Stage::Explore => "explore",
            Stage::CoverageBuild => "coverage-build",
            Stage::Replay => "replay",
        };
        write!(f, "{}", s)
    }
}

/// All paths belonging to one corpus source.
///
/// `instance_dir` sits directly under the output root and
/// `engine_output_dir` under the engine-output root, both named by the
/// source stem, so the two trees stay in 1:1 correspondence.
#[derive(Debug, Clone)]
pub struct Instance {
    pub source_name: String,
    pub original_source: PathBuf,
    pub instance_dir: PathBuf,
    pub copied_source: PathBuf,
    /// `<file>.bc`, the linked bitcode the engine consumes.
    pub bitcode_artifact: PathBuf,
    pub harness_bitcode: PathBuf,
    /// `<file>.o`, the instrumented native executable.
    pub coverage_object: PathBuf,
    pub engine_output_dir: PathBuf,
    pub engine_log: PathBuf,
}

impl Instance {
    pub fn new(ws: &Workspace, entry: &CorpusEntry) -> Self {
        let instance_dir = ws.output_root.join(&entry.stem);
        Instance {
            source_name: entry.stem.clone(),
            original_source: ws.source_root.join(&entry.file_name),
            copied_source: instance_dir.join(&entry.file_name),
            bitcode_artifact: instance_dir.join(format!("{}.bc", entry.file_name)),
            harness_bitcode: instance_dir.join(HARNESS_BITCODE_NAME),
            coverage_object: instance_dir.join(format!("{}.o", entry.file_name)),
            engine_output_dir: ws.engine_output_root.join(&entry.stem),
            engine_log: instance_dir.join(ENGINE_LOG_NAME),
            instance_dir,
        }
    }

    pub(crate) fn build_error(&self, failure: ToolFailure) -> BenchError {
        BenchError::Build {
            instance: self.source_name.clone(),
            command: failure.command,
            detail: failure.detail,
        }
    }
}
