// SPDX-License-Identifier: Apache-2.0

//! Deterministic enumeration of the source corpus.

use std::collections::BTreeMap;
use std::path::Path;

use crate::aggregate::REPORT_BASENAME;
use crate::bench_error::{BenchError, BenchResult};
use crate::instance::{ENGINE_LOG_NAME, HARNESS_BITCODE_NAME};
use crate::workspace::ENGINE_OUTPUT_DIR_NAME;

/// Files every instance directory gets besides the copied source.
const INSTANCE_ARTIFACT_NAMES: [&str; 2] = [ENGINE_LOG_NAME, HARNESS_BITCODE_NAME];

/// One source file of the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    /// File name inside the source root, e.g. `array_sum.c`.
    pub file_name: String,
    /// File name without its final extension; names the instance.
    pub stem: String,
}

impl CorpusEntry {
    fn from_file_name(file_name: &str) -> Self {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name)
            .to_string();
        CorpusEntry {
            file_name: file_name.to_string(),
            stem,
        }
    }
}

/// Lists the regular files directly inside `source_root`, sorted by name,
/// skipping hidden files. `max_files` truncates the sorted list.
///
/// Fails if two sources would share an instance directory, if a stem
/// collides with a name the output root reserves, or if a file name
/// collides with an artifact written next to the copied source.
pub fn enumerate_corpus(
    source_root: &Path,
    max_files: Option<usize>,
) -> BenchResult<Vec<CorpusEntry>> {
    let mut names = Vec::new();
    let read_dir = std::fs::read_dir(source_root).map_err(|e| BenchError::io(source_root, e))?;
    for entry in read_dir {
        let entry = entry.map_err(|e| BenchError::io(source_root, e))?;
        let path = entry.path();
        // Follows symlinks so linked-in sources count.
        if !path.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            return Err(BenchError::configuration(
                "source file name is not valid UTF-8",
                path,
            ));
        };
        if name.starts_with('.') {
            continue;
        }
        names.push(name);
    }
    names.sort();
    if let Some(limit) = max_files {
        names.truncate(limit);
    }

    let entries: Vec<CorpusEntry> = names
        .iter()
        .map(|n| CorpusEntry::from_file_name(n))
        .collect();

    let mut by_stem: BTreeMap<&str, &str> = BTreeMap::new();
    for e in &entries {
        let report_like = e.stem == REPORT_BASENAME
            || e.stem.starts_with(&format!("{REPORT_BASENAME}."));
        if e.stem == ENGINE_OUTPUT_DIR_NAME || report_like {
            return Err(BenchError::configuration(
                format!("source stem `{}` collides with a reserved output name", e.stem),
                source_root.join(&e.file_name),
            ));
        }
        if INSTANCE_ARTIFACT_NAMES.contains(&e.file_name.as_str()) {
            return Err(BenchError::configuration(
                format!(
                    "source `{}` collides with an artifact of its instance directory",
                    e.file_name
                ),
                source_root.join(&e.file_name),
            ));
        }
        if let Some(previous) = by_stem.insert(&e.stem, &e.file_name) {
            return Err(BenchError::configuration(
                format!(
                    "sources `{}` and `{}` would share instance directory `{}`",
                    previous, e.file_name, e.stem
                ),
                source_root.join(&e.file_name),
            ));
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), "int main() { return 0; }\n").unwrap();
    }

    #[test]
    fn test_sorted_files_only() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["zeta.c", "alpha.c", "mid.i", ".hidden.c"] {
            touch(tmp.path(), name);
        }
        std::fs::create_dir(tmp.path().join("subdir")).unwrap();
        let got = enumerate_corpus(tmp.path(), None).unwrap();
        let stems: Vec<&str> = got.iter().map(|e| e.stem.as_str()).collect();
        assert_eq!(stems, vec!["alpha", "mid", "zeta"]);
        assert_eq!(got[1].file_name, "mid.i");
    }

    #[test]
    fn test_max_files_truncates_after_sort() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["c.c", "a.c", "b.c"] {
            touch(tmp.path(), name);
        }
        let got = enumerate_corpus(tmp.path(), Some(2)).unwrap();
        assert_eq!(
            got,
            vec![
                CorpusEntry {
                    file_name: "a.c".to_string(),
                    stem: "a".to_string()
                },
                CorpusEntry {
                    file_name: "b.c".to_string(),
                    stem: "b".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_stem_collision_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "loop.c");
        touch(tmp.path(), "loop.i");
        let err = enumerate_corpus(tmp.path(), None).unwrap_err();
        assert!(matches!(err, BenchError::Configuration { .. }));
        assert!(err.to_string().contains("loop.c"), "{err}");
    }

    #[test]
    fn test_reserved_stem_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "__klee_output.c");
        assert!(enumerate_corpus(tmp.path(), None).is_err());
    }

    #[test]
    fn test_instance_artifact_names_are_rejected() {
        for name in ["klee.log", "klee-test-comp.bc"] {
            let tmp = tempfile::tempdir().unwrap();
            touch(tmp.path(), "ok.c");
            touch(tmp.path(), name);
            let err = enumerate_corpus(tmp.path(), None).unwrap_err();
            assert!(matches!(err, BenchError::Configuration { .. }), "{err}");
            assert!(err.to_string().contains(name), "{err}");
        }
        // Only exact matches are reserved.
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "klee.c");
        touch(tmp.path(), "klee-test-comp.c");
        assert_eq!(enumerate_corpus(tmp.path(), None).unwrap().len(), 2);
    }

    #[test]
    fn test_multi_dot_name_keeps_inner_dots() {
        assert_eq!(
            CorpusEntry::from_file_name("sum.unrolled.c").stem,
            "sum.unrolled"
        );
    }
}
