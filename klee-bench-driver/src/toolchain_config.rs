// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::ArgMatches;
use klee_bench::ToolOverrides;
use serde::Deserialize;

/// Name of the toolchain file picked up from the working directory when no
/// `--toolchain` flag is given.
pub const DEFAULT_TOOLCHAIN_FILE: &str = "klee-bench-toolchain.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainConfig {
    /// Compiler used to emit bitcode; defaults to `<llvm>/bin/clang`.
    pub clang: Option<String>,
    pub llvm_link: Option<String>,

    /// Native compiler for the coverage build, e.g. `gcc`.
    pub cc: Option<String>,
    pub gcovr: Option<String>,

    /// Engine binary; defaults to `<build>/bin/klee`.
    pub klee: Option<String>,

    /// Extra engine flags, e.g. `--libc=uclibc` or `--posix-runtime`.
    ///
    /// Flags given with `--klee-arg` are appended after these.
    pub klee_args: Option<Vec<String>>,

    pub replay_timeout_secs: Option<u64>,
    pub replay_budget_secs: Option<u64>,

    /// Extra time the engine gets past its budget before it is killed.
    pub engine_grace_secs: Option<u64>,
}

#[derive(Deserialize)]
struct KleeBenchToolchain {
    toolchain: ToolchainConfig,
}

impl ToolchainConfig {
    pub fn tool_overrides(&self) -> ToolOverrides {
        let path = |s: &Option<String>| s.as_ref().map(PathBuf::from);
        ToolOverrides {
            clang: path(&self.clang),
            llvm_link: path(&self.llvm_link),
            cc: path(&self.cc),
            gcovr: path(&self.gcovr),
            klee: path(&self.klee),
        }
    }
}

/// Parses the `[toolchain]` table of a toolchain file.
pub fn parse_toolchain_config(text: &str) -> anyhow::Result<ToolchainConfig> {
    let parsed: KleeBenchToolchain =
        toml::from_str(text).context("parse toolchain toml; expected a [toolchain] table")?;
    Ok(parsed.toolchain)
}

pub fn load_toolchain_config(path: &Path) -> anyhow::Result<ToolchainConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read toolchain file {}", path.display()))?;
    parse_toolchain_config(&text).with_context(|| format!("in {}", path.display()))
}

/// Picks the toolchain file: the flag if given, else
/// `klee-bench-toolchain.toml` in `cwd` if present.
pub fn find_toolchain_file(flag: Option<&String>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = flag {
        return Some(PathBuf::from(path));
    }
    let cwd_toml_path = cwd.join(DEFAULT_TOOLCHAIN_FILE);
    if cwd_toml_path.exists() {
        log::info!(
            "Using {} in current directory: {}",
            DEFAULT_TOOLCHAIN_FILE,
            cwd_toml_path.display()
        );
        Some(cwd_toml_path)
    } else {
        None
    }
}

/// Seconds from the command line flag if given, else the config value,
/// else `default`.
pub fn get_duration_secs(
    matches: &ArgMatches,
    flag: &str,
    config_value: Option<u64>,
    default: Duration,
) -> Duration {
    if let Some(secs) = matches.get_one::<u64>(flag) {
        Duration::from_secs(*secs)
    } else if let Some(secs) = config_value {
        Duration::from_secs(secs)
    } else {
        default
    }
}

/// Engine flags from the config file followed by repeated `--klee-arg`s.
pub fn get_klee_args(matches: &ArgMatches, config: &Option<ToolchainConfig>) -> Vec<String> {
    let mut args: Vec<String> = config
        .as_ref()
        .and_then(|c| c.klee_args.clone())
        .unwrap_or_default();
    if let Some(extra) = matches.get_many::<String>("klee_arg") {
        args.extend(extra.cloned());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_table() {
        let config = parse_toolchain_config(
            r#"
[toolchain]
clang = "/opt/llvm-13/bin/clang"
cc = "gcc-12"
gcovr = "/usr/local/bin/gcovr"
klee_args = ["--libc=uclibc", "--posix-runtime"]
replay_timeout_secs = 5
engine_grace_secs = 10
"#,
        )
        .unwrap();
        let overrides = config.tool_overrides();
        assert_eq!(
            overrides.clang,
            Some(PathBuf::from("/opt/llvm-13/bin/clang"))
        );
        assert_eq!(overrides.cc, Some(PathBuf::from("gcc-12")));
        assert_eq!(overrides.llvm_link, None);
        assert_eq!(overrides.klee, None);
        assert_eq!(
            config.klee_args,
            Some(vec!["--libc=uclibc".to_string(), "--posix-runtime".to_string()])
        );
        assert_eq!(config.replay_timeout_secs, Some(5));
        assert_eq!(config.replay_budget_secs, None);
        assert_eq!(config.engine_grace_secs, Some(10));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = parse_toolchain_config("[toolchain]\nclnag = \"clang\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("clnag"), "{err:#}");
    }

    #[test]
    fn test_missing_table_is_rejected() {
        assert!(parse_toolchain_config("cc = \"gcc\"\n").is_err());
    }

    #[test]
    fn test_find_toolchain_file_prefers_flag() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(DEFAULT_TOOLCHAIN_FILE), "[toolchain]\n").unwrap();
        let flag = "/elsewhere/tc.toml".to_string();
        assert_eq!(
            find_toolchain_file(Some(&flag), tmp.path()),
            Some(PathBuf::from("/elsewhere/tc.toml"))
        );
        assert_eq!(
            find_toolchain_file(None, tmp.path()),
            Some(tmp.path().join(DEFAULT_TOOLCHAIN_FILE))
        );
        let empty = tempfile::tempdir().unwrap();
        assert_eq!(find_toolchain_file(None, empty.path()), None);
    }
}
