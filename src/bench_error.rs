// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Process exit status for configuration and environment failures.
pub const EXIT_CONFIGURATION: i32 = 2;
/// Process exit status when the report generator fails.
pub const EXIT_AGGREGATION: i32 = 3;
/// Process exit status for build failures that end the run.
pub const EXIT_BUILD: i32 = 1;

/// Everything that can go wrong while driving a benchmark run.
///
/// Which of these are fatal depends on the caller: the runner isolates
/// `Build` (by default) and `Exploration` to the offending instance, absorbs
/// `ReplayTimeout` entirely, and surfaces the rest.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Bad input paths or a pre-existing output directory.
    #[error("configuration error: {message}: {}", path.display())]
    Configuration { message: String, path: PathBuf },

    /// A directory the run needs could not be created.
    #[error("environment error: {message}: {}: {source}", path.display())]
    Environment {
        message: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The compiler or linker exited unsuccessfully.
    #[error("build error for {instance}: `{command}` failed: {detail}")]
    Build {
        instance: String,
        command: String,
        detail: String,
    },

    /// The engine crashed, exited non-zero, or had to be killed.
    #[error("exploration failure for {instance}: {detail}")]
    Exploration { instance: String, detail: String },

    /// A single replay ran past its time box.
    #[error("replay of {} timed out after {timeout:?}", test_case.display())]
    ReplayTimeout { test_case: PathBuf, timeout: Duration },

    /// The report generator failed; there is no partial report.
    #[error("aggregation error: `{command}` failed: {detail}")]
    Aggregation { command: String, detail: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BenchError {
    pub fn configuration(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        BenchError::Configuration {
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BenchError::Io {
            path: path.into(),
            source,
        }
    }

    /// Maps the error to the process exit status the driver reports.
    pub fn exit_code(&self) -> i32 {
        match self {
            BenchError::Configuration { .. } | BenchError::Environment { .. } => {
                EXIT_CONFIGURATION
            }
            BenchError::Aggregation { .. } => EXIT_AGGREGATION,
            _ => EXIT_BUILD,
        }
    }
}

pub type BenchResult<T> = Result<T, BenchError>;
