// SPDX-License-Identifier: Apache-2.0

//! Batch test generation and coverage measurement with KLEE.
//!
//! For every source in a corpus directory the harness compiles bitcode
//! linked against the test-harness stub, lets the engine generate test
//! cases under a time budget, rebuilds the source with gcov
//! instrumentation, and replays the test cases against it. A single gcovr
//! report over all instances closes the run.
//!
//! ```no_run
//! use std::path::Path;
//! use klee_bench::{BenchmarkRunner, RunnerOptions, SilentObserver, ToolOverrides, Workspace};
//!
//! let ws = Workspace::initialize(
//!     Path::new("sv-benchmarks/c/loops"),
//!     Path::new("klee/build"),
//!     Path::new("coverage-out"),
//!     None,
//!     &ToolOverrides::default(),
//! )
//! .unwrap();
//! let summary = BenchmarkRunner::new(&ws, RunnerOptions::default())
//!     .run(&SilentObserver)
//!     .unwrap();
//! println!("{}", summary.describe());
//! ```

pub mod aggregate;
pub mod bench_error;
pub mod compile;
pub mod corpus;
pub mod coverage_build;
pub mod explore;
pub mod instance;
pub mod replay;
pub mod runner;
pub mod summary;
pub mod toolchain;
pub mod tools;
pub mod workspace;

pub use bench_error::{BenchError, BenchResult};
pub use explore::ExploreOptions;
pub use instance::{Instance, Stage};
pub use replay::{ReplayOptions, ReplayStats};
pub use runner::{BenchmarkRunner, RunObserver, RunnerOptions, SilentObserver};
pub use summary::{InstanceReport, InstanceStatus, RunFailure, RunSummary};
pub use toolchain::{ToolOverrides, Toolchain};
pub use workspace::Workspace;
