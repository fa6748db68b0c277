// SPDX-License-Identifier: Apache-2.0

//! Compile stage: source + harness stub -> one linked bitcode artifact.

use std::process::Command;

use crate::bench_error::{BenchError, BenchResult};
use crate::instance::Instance;
use crate::tools::run_checked;
use crate::workspace::Workspace;

/// No optimization, but keep functions optimizable so the engine sees the
/// program's real control flow.
const BITCODE_FLAGS: [&str; 3] = ["-O0", "-Xclang", "-disable-O0-optnone"];

/// Creates the instance directory, copies the source into it, and builds
/// `instance.bitcode_artifact`.
///
/// Any compiler or linker failure is a `BenchError::Build`. On success the
/// bitcode artifact exists and is non-empty.
pub fn compile(ws: &Workspace, instance: &Instance) -> BenchResult<()> {
    log::info!("compile: {}", instance.source_name);
    std::fs::create_dir(&instance.instance_dir)
        .map_err(|e| BenchError::io(&instance.instance_dir, e))?;
    std::fs::copy(&instance.original_source, &instance.copied_source)
        .map_err(|e| BenchError::io(&instance.copied_source, e))?;

    let mut command = Command::new(&ws.toolchain.clang);
    command
        .arg("-I")
        .arg(&ws.include_path)
        .args(["-c", "-Wno-everything", "-g", "-emit-llvm", "-o"])
        .arg(&instance.bitcode_artifact)
        .arg(&instance.copied_source)
        .args(BITCODE_FLAGS);
    run_checked(command).map_err(|f| instance.build_error(f))?;

    let mut command = Command::new(&ws.toolchain.clang);
    command
        .args(["-c", "-g", "-emit-llvm", "-o"])
        .arg(&instance.harness_bitcode)
        .arg(ws.harness_stub())
        .args(BITCODE_FLAGS);
    run_checked(command).map_err(|f| instance.build_error(f))?;

    // Links in place: the source bitcode is replaced by the linked module.
    let mut command = Command::new(&ws.toolchain.llvm_link);
    command
        .arg("-o")
        .arg(&instance.bitcode_artifact)
        .arg(&instance.harness_bitcode)
        .arg(&instance.bitcode_artifact);
    run_checked(command).map_err(|f| instance.build_error(f))?;

    let len = std::fs::metadata(&instance.bitcode_artifact)
        .map(|m| m.len())
        .unwrap_or(0);
    if len == 0 {
        return Err(BenchError::Build {
            instance: instance.source_name.clone(),
            command: "llvm-link".to_string(),
            detail: format!(
                "bitcode artifact {} is missing or empty",
                instance.bitcode_artifact.display()
            ),
        });
    }
    Ok(())
}
