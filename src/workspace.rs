// SPDX-License-Identifier: Apache-2.0

//! On-disk layout of a benchmark run.
//!
//! ```text
//! <output>/
//!   <stem>/                 one per source: copied source, bitcode, coverage object
//!   __klee_output/<stem>/   engine output (test cases) for the same source
//!   results*                combined coverage report
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::bench_error::{BenchError, BenchResult};
use crate::toolchain::{ToolOverrides, Toolchain};

/// Name of the engine-output root nested inside the output root.
pub const ENGINE_OUTPUT_DIR_NAME: &str = "__klee_output";

/// Test-harness stub compiled into every instance.
pub const HARNESS_STUB_NAME: &str = "klee-test-comp.c";

/// Runtime library the coverage build links against.
pub const REPLAY_RUNTIME_LIB: &str = "kleeRuntest";

const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";

/// Validated, created layout shared read-only by every instance.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    pub engine_output_root: PathBuf,
    /// `<build>/bin/klee` unless overridden.
    pub klee_path: PathBuf,
    /// `<build>/../include`; holds the harness stub and engine headers.
    pub include_path: PathBuf,
    /// `<build>/lib`; holds the replay runtime.
    pub lib_path: PathBuf,
    pub toolchain: Toolchain,
    /// `LD_LIBRARY_PATH` of the invoking process, captured once.
    inherited_library_path: Option<OsString>,
}

/// Makes `path` absolute relative to `cwd`.
fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

fn require_dir(path: PathBuf, what: &str) -> BenchResult<PathBuf> {
    if path.is_dir() {
        Ok(path)
    } else {
        Err(BenchError::configuration(
            format!("{what} directory is malformed or does not exist"),
            path,
        ))
    }
}

impl Workspace {
    /// Validates the inputs and creates the output root plus the nested
    /// engine-output root.
    ///
    /// Nothing is created unless every check passes; a pre-existing output
    /// directory is refused so earlier runs are never clobbered.
    pub fn initialize(
        source_dir: &Path,
        build_dir: &Path,
        output_dir: &Path,
        llvm_dir: Option<&Path>,
        overrides: &ToolOverrides,
    ) -> BenchResult<Self> {
        let cwd = std::env::current_dir().map_err(|e| BenchError::io(".", e))?;
        Self::initialize_in(&cwd, source_dir, build_dir, output_dir, llvm_dir, overrides)
    }

    /// As `initialize`, resolving relative paths against `cwd`.
    pub fn initialize_in(
        cwd: &Path,
        source_dir: &Path,
        build_dir: &Path,
        output_dir: &Path,
        llvm_dir: Option<&Path>,
        overrides: &ToolOverrides,
    ) -> BenchResult<Self> {
        let source_root = require_dir(absolutize(cwd, source_dir), "source")?;
        let build_root = require_dir(absolutize(cwd, build_dir), "klee build")?;
        let toolchain_root = match llvm_dir {
            Some(dir) => Some(require_dir(absolutize(cwd, dir), "llvm toolchain")?),
            None => None,
        };

        let output_root = absolutize(cwd, output_dir);
        if output_root.exists() {
            return Err(BenchError::configuration(
                "coverage output directory already exists; move or remove it to continue",
                output_root,
            ));
        }

        let klee_path = overrides
            .klee
            .clone()
            .unwrap_or_else(|| build_root.join("bin").join("klee"));
        // The build directory sits directly inside the engine's source tree.
        let include_path = build_root.join("..").join("include");
        let lib_path = build_root.join("lib");
        let toolchain = Toolchain::resolve(toolchain_root.as_deref(), overrides);

        std::fs::create_dir(&output_root).map_err(|source| BenchError::Environment {
            message: "cannot create coverage output directory".to_string(),
            path: output_root.clone(),
            source,
        })?;
        let engine_output_root = output_root.join(ENGINE_OUTPUT_DIR_NAME);
        std::fs::create_dir(&engine_output_root).map_err(|source| BenchError::Environment {
            message: "cannot create klee output directory".to_string(),
            path: engine_output_root.clone(),
            source,
        })?;

        log::info!(
            "workspace: source_root={} output_root={} klee={} include={} lib={}",
            source_root.display(),
            output_root.display(),
            klee_path.display(),
            include_path.display(),
            lib_path.display()
        );

        Ok(Workspace {
            source_root,
            output_root,
            engine_output_root,
            klee_path,
            include_path,
            lib_path,
            toolchain,
            inherited_library_path: std::env::var_os(LIBRARY_PATH_VAR),
        })
    }

    pub fn harness_stub(&self) -> PathBuf {
        self.include_path.join(HARNESS_STUB_NAME)
    }

    /// The `LD_LIBRARY_PATH` value handed to coverage builds and replays:
    /// the runtime library directory followed by whatever the invoking
    /// process had. Passed per invocation, never set on this process.
    pub fn library_path_override(&self) -> (&'static str, OsString) {
        let mut value = OsString::from(self.lib_path.as_os_str());
        if let Some(inherited) = &self.inherited_library_path {
            if !inherited.is_empty() {
                value.push(":");
                value.push(inherited);
            }
        }
        (LIBRARY_PATH_VAR, value)
    }
}
