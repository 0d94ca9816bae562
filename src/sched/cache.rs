use crate::testcase::TestCase;
use anyhow::Result;
use log::warn;
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

/// Incremental-run bookkeeping: one file per test under the suite's exec
/// root, whose mtime records the last time the test was started. The entry
/// is removed when the test fails, so failing tests look "never run" and
/// sort first on the next incremental run.
const CACHE_DIR: &str = ".litrun_cache";

fn entry_path(test: &TestCase) -> PathBuf {
    let flat = test
        .path_in_suite
        .to_string_lossy()
        .replace(['/', '\\'], "_");
    test.suite.exec_root.join(CACHE_DIR).join(flat)
}

/// Record that a test is starting. Failures here are warnings: cache
/// trouble must never fail a test.
pub fn record_start(test: &TestCase) {
    if let Err(e) = try_record_start(test) {
        warn!("could not update incremental cache for {}: {}", test.full_name(), e);
    }
}

fn try_record_start(test: &TestCase) -> Result<()> {
    let path = entry_path(test);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, b"")?;
    Ok(())
}

/// Forget a test's entry after a failing result.
pub fn clear_entry(test: &TestCase) {
    let _ = fs::remove_file(entry_path(test));
}

/// Whether the test should sort to the front under incremental ordering:
/// no cache entry (never run, or failed last time), or the test source was
/// modified after the recorded start.
pub fn needs_rerun(test: &TestCase) -> bool {
    let Ok(entry) = fs::metadata(entry_path(test)) else {
        return true;
    };
    let Ok(entry_mtime) = entry.modified() else {
        return true;
    };
    let source_mtime = fs::metadata(test.source_path())
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    source_mtime > entry_mtime
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcase::TestSuite;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn scratch_test(name: &str) -> TestCase {
        let root = std::env::temp_dir().join(format!("litrun_cache_{}", name));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.test"), "; RUN: true\n").unwrap();
        let suite = Arc::new(TestSuite {
            name: "cache".to_string(),
            source_root: root.clone(),
            exec_root: root,
            available_features: HashSet::new(),
            pipefail: false,
            is_early: false,
            suffixes: vec!["test".to_string()],
        });
        TestCase::new(suite, PathBuf::from("a.test"))
    }

    #[test]
    fn test_unknown_test_needs_rerun() {
        let test = scratch_test("unknown");
        assert!(needs_rerun(&test));
    }

    #[test]
    fn test_recorded_start_clears_rerun_flag() {
        let test = scratch_test("recorded");
        record_start(&test);
        assert!(!needs_rerun(&test));
        clear_entry(&test);
        assert!(needs_rerun(&test));
    }
}
