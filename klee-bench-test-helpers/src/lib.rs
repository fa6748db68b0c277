// SPDX-License-Identifier: Apache-2.0

//! A fake KLEE/LLVM/gcov toolchain made of POSIX shell scripts.
//!
//! Each fake tool honours the same command-line contract as the real one
//! closely enough for the harness to drive it. Behaviour is steered by
//! marker strings placed in the corpus sources; the fake compilers copy
//! source text into their "bitcode", so markers reach the engine too.

use std::path::{Path, PathBuf};

/// The fake clang fails on sources containing this.
pub const BUILD_FAIL_MARKER: &str = "FAKE_BUILD_FAIL";
/// The fake gcc fails on sources containing this.
pub const COVERAGE_BUILD_FAIL_MARKER: &str = "FAKE_COVERAGE_BUILD_FAIL";
/// The fake engine aborts without writing any output.
pub const ENGINE_CRASH_MARKER: &str = "FAKE_ENGINE_CRASH";
/// The fake engine sleeps instead of terminating at its budget.
pub const ENGINE_HANG_MARKER: &str = "FAKE_ENGINE_HANG";
/// Every generated test case makes the coverage binary sleep.
pub const SLOW_REPLAY_MARKER: &str = "FAKE_SLOW_REPLAY";
/// `FAKE_TESTS=<n>` sets the number of generated test cases (default 2).
pub const TEST_COUNT_PREFIX: &str = "FAKE_TESTS=";

/// Written by the coverage binary in its cwd: one line per replay started.
pub const REPLAY_LOG: &str = "replayed.log";
/// Written by the coverage binary: the `LD_LIBRARY_PATH` it saw.
pub const REPLAY_LD_PATH_FILE: &str = "replay_ld_library_path.txt";
/// Written by the fake gcc in its cwd: the `LD_LIBRARY_PATH` it saw.
pub const BUILD_LD_PATH_FILE: &str = "build_ld_library_path.txt";
/// Written by the fake engine into its output dir: its argv.
pub const ENGINE_ARGS_FILE: &str = "info";

const CLANG: &str = r#"#!/bin/sh
out=""
src=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) shift; out="$1" ;;
    -I|-Xclang) shift ;;
    -*) ;;
    *) src="$1" ;;
  esac
  shift
done
if grep -q FAKE_BUILD_FAIL "$src"; then
  echo "error: fake compile failure in $src" >&2
  exit 1
fi
cat "$src" > "$out"
"#;

const LLVM_LINK: &str = r#"#!/bin/sh
out=""
inputs=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) shift; out="$1" ;;
    *) inputs="$inputs $1" ;;
  esac
  shift
done
cat $inputs > "$out.tmp" && mv "$out.tmp" "$out"
"#;

const KLEE: &str = r#"#!/bin/sh
outdir=""
bc=""
for a in "$@"; do
  case "$a" in
    --output-dir=*) outdir="${a#--output-dir=}" ;;
    -*) ;;
    *) bc="$a" ;;
  esac
done
echo "KLEE: output directory is \"$outdir\""
if grep -q FAKE_ENGINE_CRASH "$bc"; then
  echo "KLEE: ERROR: fake engine crash" >&2
  exit 134
fi
if grep -q FAKE_ENGINE_HANG "$bc"; then
  exec sleep 30
fi
mkdir "$outdir" || exit 1
echo "$@" > "$outdir/info"
n=$(sed -n 's/.*FAKE_TESTS=\([0-9][0-9]*\).*/\1/p' "$bc" | head -n 1)
if [ -z "$n" ]; then n=2; fi
slow=""
if grep -q FAKE_SLOW_REPLAY "$bc"; then slow="SLOW"; fi
i=1
while [ "$i" -le "$n" ]; do
  f=$(printf '%s/test%06d.ktestjson' "$outdir" "$i")
  echo "{\"case\": $i} $slow" > "$f"
  i=$((i + 1))
done
"#;

const GCC: &str = r#"#!/bin/sh
out=""
srcs=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) shift; out="$1" ;;
    -I|-L) shift ;;
    -*) ;;
    *) srcs="$srcs $1" ;;
  esac
  shift
done
for s in $srcs; do
  if grep -q FAKE_COVERAGE_BUILD_FAIL "$s"; then
    echo "error: fake coverage build failure in $s" >&2
    exit 1
  fi
done
echo "$LD_LIBRARY_PATH" > build_ld_library_path.txt
cat > "$out" <<'EOF'
#!/bin/sh
echo "$KTEST_FILE" >> replayed.log
echo "$LD_LIBRARY_PATH" > replay_ld_library_path.txt
if grep -q SLOW "$KTEST_FILE"; then
  exec sleep 30
fi
touch "$(basename "$0").gcda"
EOF
chmod +x "$out"
"#;

/// Paths of an installed fake toolchain.
#[derive(Debug, Clone)]
pub struct FakeToolchain {
    /// Directory the corpus sources go into.
    pub sources: PathBuf,
    /// Engine build directory: `bin/klee` and `lib/`.
    pub build: PathBuf,
    /// Sibling of `build`; holds the harness stub.
    pub include: PathBuf,
    /// LLVM root: `bin/clang` and `bin/llvm-link`.
    pub llvm: PathBuf,
    pub cc: PathBuf,
    pub gcovr: PathBuf,
    /// The fake gcovr appends its `-r` argument here on every call.
    pub gcovr_calls: PathBuf,
}

pub fn write_executable(path: &Path, contents: &str) {
    use std::os::unix::fs::PermissionsExt;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create tool dir");
    }
    std::fs::write(path, contents).expect("write fake tool");
    let mut perms = std::fs::metadata(path).expect("stat fake tool").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).expect("chmod fake tool");
}

impl FakeToolchain {
    /// Lays the fake toolchain out under `root`.
    pub fn install(root: &Path) -> Self {
        let sources = root.join("sources");
        let build = root.join("klee").join("build");
        let include = root.join("klee").join("include");
        let llvm = root.join("llvm");
        let tools = root.join("tools");
        std::fs::create_dir_all(&sources).expect("create sources dir");
        std::fs::create_dir_all(build.join("lib")).expect("create lib dir");
        std::fs::create_dir_all(&include).expect("create include dir");
        std::fs::write(
            include.join("klee-test-comp.c"),
            "void __VERIFIER_assume(int c) {}\n",
        )
        .expect("write harness stub");

        write_executable(&llvm.join("bin").join("clang"), CLANG);
        write_executable(&llvm.join("bin").join("llvm-link"), LLVM_LINK);
        write_executable(&build.join("bin").join("klee"), KLEE);
        let cc = tools.join("gcc");
        write_executable(&cc, GCC);

        let gcovr_calls = root.join("gcovr.calls");
        let toolchain = FakeToolchain {
            sources,
            build,
            include,
            llvm,
            cc,
            gcovr: tools.join("gcovr"),
            gcovr_calls,
        };
        toolchain.write_gcovr(false);
        log::info!("installed fake toolchain under {}", root.display());
        toolchain
    }

    fn write_gcovr(&self, fail: bool) {
        let fail_line = if fail { "exit 1\n" } else { "" };
        let script = format!(
            r#"#!/bin/sh
root=""
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -r) shift; root="$1" ;;
    --html-details) shift; out="$1" ;;
  esac
  shift
done
echo "$root" >> "{calls}"
{fail_line}find "$root" -name '*.gcda' | sort > "$out"
"#,
            calls = self.gcovr_calls.display(),
            fail_line = fail_line,
        );
        write_executable(&self.gcovr, &script);
    }

    /// Makes the fake report generator exit non-zero.
    pub fn break_gcovr(&self) {
        self.write_gcovr(true);
    }

    /// Adds a corpus source with the given body.
    pub fn add_source(&self, file_name: &str, body: &str) -> PathBuf {
        let path = self.sources.join(file_name);
        std::fs::write(&path, body).expect("write corpus source");
        path
    }

    /// Number of times the fake report generator ran.
    pub fn gcovr_call_count(&self) -> usize {
        std::fs::read_to_string(&self.gcovr_calls)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    /// A `klee-bench-toolchain.toml` pointing at the fake native tools.
    pub fn toolchain_toml(&self) -> String {
        format!(
            "[toolchain]\ncc = \"{}\"\ngcovr = \"{}\"\n",
            self.cc.display(),
            self.gcovr.display()
        )
    }
}
