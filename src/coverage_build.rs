// SPDX-License-Identifier: Apache-2.0

//! Coverage-build stage: recompiles the copied source as an instrumented
//! native executable linked against the replay runtime.

use std::process::Command;

use crate::bench_error::BenchResult;
use crate::instance::Instance;
use crate::tools::run_checked;
use crate::workspace::{Workspace, REPLAY_RUNTIME_LIB};

const COVERAGE_FLAGS: [&str; 4] = ["-DEXTERNAL", "-fPIE", "-coverage", "-fprofile-abs-path"];

/// Builds `instance.coverage_object` from the copied source and the
/// harness stub. Runs inside the instance directory so the gcov notes land
/// next to the object. Failure is a `BenchError::Build`.
pub fn build_for_coverage(ws: &Workspace, instance: &Instance) -> BenchResult<()> {
    log::info!("coverage-build: {}", instance.source_name);
    let (ld_var, ld_value) = ws.library_path_override();

    let mut command = Command::new(&ws.toolchain.cc);
    command
        .arg("-O0")
        .arg("-I")
        .arg(&ws.include_path)
        .arg("-L")
        .arg(&ws.lib_path)
        .args(COVERAGE_FLAGS)
        .arg("-o")
        .arg(&instance.coverage_object)
        .arg(&instance.copied_source)
        .arg(ws.harness_stub())
        // Libraries after the objects that need them.
        .arg(format!("-l{}", REPLAY_RUNTIME_LIB))
        .current_dir(&instance.instance_dir)
        .env(ld_var, ld_value);
    run_checked(command).map_err(|f| instance.build_error(f))
}
