use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A discovered test suite. Read-only after discovery and shared by
/// reference across every test found under it.
#[derive(Debug)]
pub struct TestSuite {
    pub name: String,
    pub source_root: PathBuf,
    pub exec_root: PathBuf,
    pub available_features: HashSet<String>,
    pub pipefail: bool,
    pub is_early: bool,
    pub suffixes: Vec<String>,
}

/// One test file within a suite.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub suite: Arc<TestSuite>,
    /// Path components below the suite's source root.
    pub path_in_suite: PathBuf,
    pub early: bool,
}

impl TestCase {
    pub fn new(suite: Arc<TestSuite>, path_in_suite: PathBuf) -> Self {
        let early = suite.is_early;
        Self {
            suite,
            path_in_suite,
            early,
        }
    }

    pub fn full_name(&self) -> String {
        format!(
            "{} :: {}",
            self.suite.name,
            self.path_in_suite.display()
        )
    }

    pub fn source_path(&self) -> PathBuf {
        self.suite.source_root.join(&self.path_in_suite)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResultCode {
    Pass,
    FlakyPass,
    Xfail,
    Unsupported,
    Fail,
    Xpass,
    Unresolved,
    Timeout,
}

impl ResultCode {
    /// Whether this code counts against the run. A pure function of the
    /// code itself, never of an individual test.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ResultCode::Fail | ResultCode::Xpass | ResultCode::Unresolved | ResultCode::Timeout
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResultCode::Pass => "PASS",
            ResultCode::FlakyPass => "FLAKYPASS",
            ResultCode::Xfail => "XFAIL",
            ResultCode::Unsupported => "UNSUPPORTED",
            ResultCode::Fail => "FAIL",
            ResultCode::Xpass => "XPASS",
            ResultCode::Unresolved => "UNRESOLVED",
            ResultCode::Timeout => "TIMEOUT",
        }
    }
}

/// Outcome of running one test.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub code: ResultCode,
    pub output: String,
    pub elapsed: Duration,
}

impl TestResult {
    pub fn new(code: ResultCode, output: impl Into<String>) -> Self {
        Self {
            code,
            output: output.into(),
            elapsed: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_codes() {
        assert!(ResultCode::Fail.is_failure());
        assert!(ResultCode::Xpass.is_failure());
        assert!(ResultCode::Timeout.is_failure());
        assert!(ResultCode::Unresolved.is_failure());
        assert!(!ResultCode::Pass.is_failure());
        assert!(!ResultCode::FlakyPass.is_failure());
        assert!(!ResultCode::Xfail.is_failure());
        assert!(!ResultCode::Unsupported.is_failure());
    }

    #[test]
    fn test_full_name_format() {
        let suite = Arc::new(TestSuite {
            name: "demo".to_string(),
            source_root: PathBuf::from("/src"),
            exec_root: PathBuf::from("/src"),
            available_features: HashSet::new(),
            pipefail: false,
            is_early: false,
            suffixes: vec!["test".to_string()],
        });
        let test = TestCase::new(suite, PathBuf::from("sub/a.test"));
        assert_eq!(test.full_name(), "demo :: sub/a.test");
    }
}
