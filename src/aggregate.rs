// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::bench_error::{BenchError, BenchResult};
use crate::tools::run_checked;

/// Basename of the combined report (and the prefix of its detail pages).
pub const REPORT_BASENAME: &str = "results";

/// Renders one combined coverage report over every instance's
/// instrumentation data under `output_root`.
///
/// Must only run once all instances are terminal; any failure is a
/// `BenchError::Aggregation` and there is no partial report.
pub fn aggregate(gcovr: &Path, output_root: &Path) -> BenchResult<PathBuf> {
    log::info!("aggregate: {}", output_root.display());
    let mut command = Command::new(gcovr);
    command
        .arg("-r")
        .arg(output_root)
        .arg("--html-details")
        .arg(REPORT_BASENAME)
        .current_dir(output_root);
    run_checked(command).map_err(|f| BenchError::Aggregation {
        command: f.command,
        detail: f.detail,
    })?;

    let report = output_root.join(REPORT_BASENAME);
    if !report.is_file() {
        return Err(BenchError::Aggregation {
            command: gcovr.display().to_string(),
            detail: format!("no report written at {}", report.display()),
        });
    }
    Ok(report)
}
