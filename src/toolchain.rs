// SPDX-License-Identifier: Apache-2.0

//! Locations of the external programs the pipeline drives.

use std::path::{Path, PathBuf};

/// Explicit tool locations; any field left as `None` is resolved from the
/// LLVM root (for clang / llvm-link) or from `PATH`.
#[derive(Debug, Clone, Default)]
pub struct ToolOverrides {
    pub clang: Option<PathBuf>,
    pub llvm_link: Option<PathBuf>,
    pub cc: Option<PathBuf>,
    pub gcovr: Option<PathBuf>,
    pub klee: Option<PathBuf>,
}

/// Resolved tool paths, computed once per workspace and shared by every
/// instance.
#[derive(Debug, Clone)]
pub struct Toolchain {
    /// Compiler used to emit bitcode.
    pub clang: PathBuf,
    /// Bitcode linker.
    pub llvm_link: PathBuf,
    /// Native compiler used for the coverage build.
    pub cc: PathBuf,
    /// Coverage report generator.
    pub gcovr: PathBuf,
}

impl Toolchain {
    pub fn resolve(llvm_root: Option<&Path>, overrides: &ToolOverrides) -> Self {
        let from_llvm = |name: &str| match llvm_root {
            Some(root) => root.join("bin").join(name),
            None => resolve_on_path(name),
        };
        Toolchain {
            clang: overrides
                .clang
                .clone()
                .unwrap_or_else(|| from_llvm("clang")),
            llvm_link: overrides
                .llvm_link
                .clone()
                .unwrap_or_else(|| from_llvm("llvm-link")),
            cc: overrides
                .cc
                .clone()
                .unwrap_or_else(|| resolve_on_path("gcc")),
            gcovr: overrides
                .gcovr
                .clone()
                .unwrap_or_else(|| resolve_on_path("gcovr")),
        }
    }
}

/// Looks `name` up on `PATH`; falls back to the bare name so that the
/// failure surfaces when the tool is actually invoked.
fn resolve_on_path(name: &str) -> PathBuf {
    match which::which(name) {
        Ok(path) => path,
        Err(e) => {
            log::warn!("{} not found on PATH ({}); using bare name", name, e);
            PathBuf::from(name)
        }
    }
}
