use crate::cli::Cli;
use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Name of the per-suite configuration file discovery looks for.
pub const SUITE_CONFIG_FILE: &str = "litrun.toml";

/// Suite-level configuration, read from `litrun.toml` at the suite root.
#[derive(Debug, Deserialize)]
pub struct SuiteConfig {
    pub name: String,
    /// File extensions (without the dot) that count as test files.
    #[serde(default = "default_suffixes")]
    pub suffixes: Vec<String>,
    #[serde(default)]
    pub available_features: Vec<String>,
    /// Run pipelines with pipefail semantics (any failing stage fails the
    /// pipeline, not just the last).
    #[serde(default)]
    pub pipefail: bool,
    /// Schedule this suite's tests before non-early tests.
    #[serde(default)]
    pub is_early: bool,
    /// Where test artifacts go; defaults to the source root.
    pub exec_root: Option<String>,
}

fn default_suffixes() -> Vec<String> {
    vec!["test".to_string()]
}

pub fn load_suite_config(dir: &Path) -> Result<SuiteConfig> {
    let config_path = dir.join(SUITE_CONFIG_FILE);
    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let config: SuiteConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(config)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOrder {
    /// Early tests first, then lexicographic by full name. A stable total
    /// order: re-applying it is a no-op.
    Default,
    /// Uniform random permutation.
    Shuffle,
    /// Previously-failed or recently-modified tests first.
    Incremental,
}

/// 1-indexed shard selection. User-facing contract: shard `k` of `n` takes
/// positions `k, k+n, k+2n, ...` of the ordered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardPlan {
    pub run_shard: usize,
    pub num_shards: usize,
}

/// Validated run-level configuration. Construction is the single place
/// configuration errors become fatal, before any test executes.
#[derive(Debug)]
pub struct RunConfig {
    pub threads: usize,
    pub timeout: Option<Duration>,
    pub max_failures: Option<usize>,
    pub max_tests: Option<usize>,
    pub order: TestOrder,
    pub filter: Option<Regex>,
    pub shard: Option<ShardPlan>,
    pub extra_features: HashSet<String>,
    pub no_execute: bool,
    pub quiet: bool,
    pub show_output: bool,
}

impl RunConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let threads = match cli.threads {
            Some(n) if n <= 0 => bail!("option '--threads' / '-j' requires a positive integer"),
            Some(n) => n as usize,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        };
        let timeout = match cli.timeout {
            Some(secs) if secs <= 0 => bail!("option '--timeout' requires a positive integer"),
            Some(secs) => Some(Duration::from_secs(secs as u64)),
            None => None,
        };
        let max_failures = match cli.max_failures {
            Some(n) if n <= 0 => bail!("option '--max-failures' requires a positive integer"),
            Some(n) => Some(n as usize),
            None => None,
        };
        let max_tests = match cli.max_tests {
            Some(n) if n <= 0 => bail!("option '--max-tests' requires a positive integer"),
            Some(n) => Some(n as usize),
            None => None,
        };
        let order = if cli.shuffle {
            TestOrder::Shuffle
        } else if cli.incremental {
            TestOrder::Incremental
        } else {
            TestOrder::Default
        };
        let filter = match &cli.filter {
            Some(pattern) => Some(Regex::new(pattern).with_context(|| {
                format!("invalid regular expression for --filter: {}", pattern)
            })?),
            None => None,
        };
        let shard = Self::shard_plan(cli.run_shard, cli.num_shards)?;
        Ok(Self {
            threads,
            timeout,
            max_failures,
            max_tests,
            order,
            filter,
            shard,
            extra_features: cli
                .features
                .iter()
                .chain(cli.params.iter())
                .cloned()
                .collect(),
            no_execute: cli.no_execute,
            quiet: cli.quiet,
            show_output: cli.verbose,
        })
    }

    fn shard_plan(run_shard: Option<i64>, num_shards: Option<i64>) -> Result<Option<ShardPlan>> {
        match (run_shard, num_shards) {
            (None, None) => Ok(None),
            (Some(_), None) | (None, Some(_)) => {
                bail!("--num-shards and --run-shard must be used together")
            }
            (Some(run), Some(num)) => {
                if num <= 0 {
                    bail!("--num-shards must be positive");
                }
                if run < 1 || run > num {
                    bail!("--run-shard must be between 1 and --num-shards (inclusive)");
                }
                Ok(Some(ShardPlan {
                    run_shard: run as usize,
                    num_shards: num as usize,
                }))
            }
        }
    }
}
