pub mod cache;

use crate::config::{RunConfig, ShardPlan, TestOrder};
use crate::runtest::execute_test;
use crate::testcase::{ResultCode, TestCase, TestResult};
use anyhow::{Context, Result};
use colored::*;
use log::{info, warn};
use rand::seq::SliceRandom;
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Aggregated outcome of one run. Carried as an explicit value so exit-code
/// decisions never depend on ambient logger state.
#[derive(Debug)]
pub struct RunReport {
    pub results: Vec<(TestCase, TestResult)>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn by_code(&self) -> BTreeMap<ResultCode, Vec<&TestCase>> {
        let mut buckets: BTreeMap<ResultCode, Vec<&TestCase>> = BTreeMap::new();
        for (test, result) in &self.results {
            buckets.entry(result.code).or_default().push(test);
        }
        buckets
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|(_, r)| r.code.is_failure())
    }

    /// Process exit code for a completed run: 0 clean, 1 test failures.
    /// Operational errors never produce a report; they surface as `Err` and
    /// exit with code 2 at the top level.
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() { 1 } else { 0 }
    }
}

/// Keep tests whose full name matches the filter. The expression was
/// validated at configuration time; an invalid one never reaches here.
pub fn filter_tests(tests: Vec<TestCase>, filter: Option<&Regex>) -> Vec<TestCase> {
    match filter {
        Some(re) => tests
            .into_iter()
            .filter(|t| re.is_match(&t.full_name()))
            .collect(),
        None => tests,
    }
}

/// Apply the selected ordering in place.
pub fn order_tests(tests: &mut [TestCase], order: TestOrder) {
    match order {
        TestOrder::Shuffle => {
            tests.shuffle(&mut rand::rng());
        }
        TestOrder::Incremental => {
            tests.sort_by_cached_key(|t| (!cache::needs_rerun(t), t.full_name()));
        }
        TestOrder::Default => {
            tests.sort_by_cached_key(|t| (!t.early, t.full_name()));
        }
    }
}

/// Select this process's shard: 1-indexed positions `run_shard,
/// run_shard + num_shards, ...` of the ordered list. Over the full
/// `1..=num_shards` range every test lands in exactly one shard and shard
/// sizes differ by at most one.
pub fn select_shard(tests: Vec<TestCase>, plan: &ShardPlan) -> Vec<TestCase> {
    let selected: Vec<TestCase> = tests
        .into_iter()
        .enumerate()
        .filter(|(i, _)| i % plan.num_shards == plan.run_shard - 1)
        .map(|(_, t)| t)
        .collect();
    info!(
        "selecting shard {}/{} = {} test(s) at positions #({}*k)+{}",
        plan.run_shard,
        plan.num_shards,
        selected.len(),
        plan.num_shards,
        plan.run_shard
    );
    selected
}

/// Run the final ordered test list on a bounded worker pool, enforcing the
/// max-failures budget, and aggregate results in list order.
pub fn run_tests(tests: Vec<TestCase>, config: &RunConfig) -> Result<RunReport> {
    let worker_count = config.threads.min(tests.len()).max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .build()
        .context("failed to build worker pool")?;

    let started = Instant::now();
    let failure_count = AtomicUsize::new(0);
    let done_count = AtomicUsize::new(0);
    let total = tests.len();
    let incremental = config.order == TestOrder::Incremental;

    let results: Vec<TestResult> = pool.install(|| {
        tests
            .par_iter()
            .map(|test| {
                // Budget check happens before dispatch: a reached budget
                // stops new work but never cancels in-flight tests.
                if let Some(max) = config.max_failures {
                    if failure_count.load(Ordering::SeqCst) >= max {
                        return TestResult::new(
                            ResultCode::Unresolved,
                            "not run: --max-failures budget reached",
                        );
                    }
                }
                if incremental {
                    cache::record_start(test);
                }
                let result = execute_test(test, config);
                if result.code.is_failure() {
                    failure_count.fetch_add(1, Ordering::SeqCst);
                    cache::clear_entry(test);
                }
                let done = done_count.fetch_add(1, Ordering::SeqCst) + 1;
                announce(test, &result, done, total, config);
                result
            })
            .collect()
    });

    if let Some(max) = config.max_failures {
        if failure_count.load(Ordering::SeqCst) >= max {
            warn!("reached {} failures, stopped scheduling new tests", max);
        }
    }

    Ok(RunReport {
        results: tests.into_iter().zip(results).collect(),
        elapsed: started.elapsed(),
    })
}

fn announce(test: &TestCase, result: &TestResult, done: usize, total: usize, config: &RunConfig) {
    if config.quiet && !result.code.is_failure() {
        return;
    }
    let label = result.code.name();
    let label = if result.code.is_failure() {
        label.red().bold()
    } else {
        label.green()
    };
    println!("{}: {} ({} of {})", label, test.full_name(), done, total);
    if result.code.is_failure() && !result.output.is_empty() {
        println!("{}", "*".repeat(20));
        println!("{}", result.output.trim_end());
        println!("{}", "*".repeat(20));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcase::TestSuite;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn suite() -> Arc<TestSuite> {
        Arc::new(TestSuite {
            name: "sched".to_string(),
            source_root: PathBuf::from("/nowhere"),
            exec_root: PathBuf::from("/nowhere"),
            available_features: HashSet::new(),
            pipefail: false,
            is_early: false,
            suffixes: vec!["test".to_string()],
        })
    }

    fn named_tests(names: &[&str]) -> Vec<TestCase> {
        let suite = suite();
        names
            .iter()
            .map(|n| TestCase::new(suite.clone(), PathBuf::from(n)))
            .collect()
    }

    #[test]
    fn test_filter_by_full_name() {
        let tests = named_tests(&["sub/a.test", "sub/b.test", "other/c.test"]);
        let re = Regex::new("sub/").unwrap();
        let kept = filter_tests(tests, Some(&re));
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_default_order_early_first_then_name() {
        let mut tests = named_tests(&["c.test", "a.test", "b.test"]);
        tests[2].early = true;
        order_tests(&mut tests, TestOrder::Default);
        let names: Vec<_> = tests.iter().map(|t| t.path_in_suite.clone()).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("b.test"),
                PathBuf::from("a.test"),
                PathBuf::from("c.test")
            ]
        );
    }

    #[test]
    fn test_default_order_is_idempotent() {
        let mut tests = named_tests(&["b.test", "a.test", "c.test"]);
        order_tests(&mut tests, TestOrder::Default);
        let first: Vec<_> = tests.iter().map(|t| t.full_name()).collect();
        order_tests(&mut tests, TestOrder::Default);
        let second: Vec<_> = tests.iter().map(|t| t.full_name()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_shuffle_is_a_permutation() {
        let mut tests = named_tests(&["a.test", "b.test", "c.test", "d.test"]);
        let mut before: Vec<_> = tests.iter().map(|t| t.full_name()).collect();
        order_tests(&mut tests, TestOrder::Shuffle);
        let mut after: Vec<_> = tests.iter().map(|t| t.full_name()).collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn test_shards_partition_exactly() {
        for (count, shards) in [(1usize, 1usize), (7, 3), (10, 4), (3, 5)] {
            let names: Vec<String> = (0..count).map(|i| format!("t{:02}.test", i)).collect();
            let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let mut seen = Vec::new();
            for shard in 1..=shards {
                let tests = named_tests(&name_refs);
                let plan = ShardPlan {
                    run_shard: shard,
                    num_shards: shards,
                };
                let selected = select_shard(tests, &plan);
                // Shard sizes differ by at most one.
                assert!(selected.len() >= count / shards);
                assert!(selected.len() <= count / shards + 1);
                seen.extend(selected.iter().map(|t| t.full_name()));
            }
            seen.sort();
            let mut expected: Vec<String> =
                named_tests(&name_refs).iter().map(|t| t.full_name()).collect();
            expected.sort();
            assert_eq!(seen, expected, "count={} shards={}", count, shards);
        }
    }

    #[test]
    fn test_shard_selection_is_one_indexed() {
        let tests = named_tests(&["a.test", "b.test", "c.test", "d.test", "e.test"]);
        let plan = ShardPlan {
            run_shard: 2,
            num_shards: 2,
        };
        let selected = select_shard(tests, &plan);
        let names: Vec<_> = selected.iter().map(|t| t.path_in_suite.clone()).collect();
        // Shard 2 of 2 takes positions 2 and 4 of the 1-indexed list.
        assert_eq!(names, vec![PathBuf::from("b.test"), PathBuf::from("d.test")]);
    }
}
