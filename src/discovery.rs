use crate::config::{SUITE_CONFIG_FILE, load_suite_config};
use crate::testcase::{TestCase, TestSuite};
use anyhow::{Context, Result, bail};
use log::warn;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolve the input paths to test cases. Each input must live under a
/// directory (or ancestor) holding a `litrun.toml`; that directory becomes
/// the suite root. Deliberately thin: one file is one test.
pub fn find_tests(inputs: &[PathBuf]) -> Result<Vec<TestCase>> {
    let mut suites: HashMap<PathBuf, Arc<TestSuite>> = HashMap::new();
    let mut tests = Vec::new();
    for input in inputs {
        let input = input
            .canonicalize()
            .with_context(|| format!("no such file or directory: {}", input.display()))?;
        let suite_root = find_suite_root(&input)
            .with_context(|| format!("could not find a test suite for {}", input.display()))?;
        let suite = match suites.get(&suite_root) {
            Some(suite) => suite.clone(),
            None => {
                let suite = Arc::new(load_suite(&suite_root)?);
                suites.insert(suite_root.clone(), suite.clone());
                suite
            }
        };
        if input.is_dir() {
            let before = tests.len();
            collect_dir(&input, &suite, &mut tests)?;
            if tests.len() == before {
                warn!("no tests discovered under {}", input.display());
            }
        } else {
            tests.push(make_test(&suite, &input)?);
        }
    }
    Ok(tests)
}

fn find_suite_root(start: &Path) -> Result<PathBuf> {
    let mut dir = if start.is_dir() {
        start
    } else {
        start.parent().context("input path has no parent")?
    };
    loop {
        if dir.join(SUITE_CONFIG_FILE).is_file() {
            return Ok(dir.to_path_buf());
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => bail!("no {} in any ancestor directory", SUITE_CONFIG_FILE),
        }
    }
}

fn load_suite(root: &Path) -> Result<TestSuite> {
    let config = load_suite_config(root)?;
    let exec_root = match &config.exec_root {
        Some(path) => {
            let path = Path::new(path);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                root.join(path)
            }
        }
        None => root.to_path_buf(),
    };
    Ok(TestSuite {
        name: config.name,
        source_root: root.to_path_buf(),
        exec_root,
        available_features: config.available_features.into_iter().collect(),
        pipefail: config.pipefail,
        is_early: config.is_early,
        suffixes: config.suffixes,
    })
}

fn collect_dir(dir: &Path, suite: &Arc<TestSuite>, tests: &mut Vec<TestCase>) -> Result<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_dir(&path, suite, tests)?;
        } else if has_test_suffix(&path, &suite.suffixes) {
            tests.push(make_test(suite, &path)?);
        }
    }
    Ok(())
}

fn has_test_suffix(path: &Path, suffixes: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| suffixes.iter().any(|s| s == ext))
}

fn make_test(suite: &Arc<TestSuite>, path: &Path) -> Result<TestCase> {
    let path_in_suite = path
        .strip_prefix(&suite.source_root)
        .with_context(|| {
            format!(
                "test {} lies outside its suite root {}",
                path.display(),
                suite.source_root.display()
            )
        })?
        .to_path_buf();
    Ok(TestCase::new(suite.clone(), path_in_suite))
}
