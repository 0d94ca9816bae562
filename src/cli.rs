use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "litrun", version, about = "Litrun: integrated regression test runner")]
pub struct Cli {
    /// Files or directories to include in the test run
    #[arg(required = true)]
    pub test_paths: Vec<PathBuf>,

    /// Number of testing threads
    #[arg(short = 'j', long, allow_negative_numbers = true)]
    pub threads: Option<i64>,

    /// Maximum time to spend running a single test, in seconds
    #[arg(long, allow_negative_numbers = true)]
    pub timeout: Option<i64>,

    /// Stop scheduling new tests after the given number of failures
    #[arg(long, allow_negative_numbers = true)]
    pub max_failures: Option<i64>,

    /// Maximum number of tests to run
    #[arg(long, allow_negative_numbers = true)]
    pub max_tests: Option<i64>,

    /// Run tests in random order
    #[arg(long)]
    pub shuffle: bool,

    /// Run modified and previously-failing tests first
    #[arg(short = 'i', long)]
    pub incremental: bool,

    /// Only run tests whose full name matches the given regular expression
    #[arg(long)]
    pub filter: Option<String>,

    /// Split the test list into M shards and only run one
    #[arg(long)]
    pub num_shards: Option<i64>,

    /// Run shard #N of the test list (1-indexed)
    #[arg(long)]
    pub run_shard: Option<i64>,

    /// Add a feature to the available-features set
    #[arg(long = "feature")]
    pub features: Vec<String>,

    /// Add a feature to the available-features set (synonym of --feature)
    #[arg(short = 'D', long = "param")]
    pub params: Vec<String>,

    /// Reduce the amount of output
    #[arg(short, long)]
    pub quiet: bool,

    /// Show command output while tests run
    #[arg(short, long)]
    pub verbose: bool,

    /// Don't execute any tests (assume PASS)
    #[arg(long)]
    pub no_execute: bool,

    /// Show all discovered tests and exit
    #[arg(long)]
    pub show_tests: bool,

    /// Show discovered test suites and exit
    #[arg(long)]
    pub show_suites: bool,

    /// Show tests that were expected to fail in the grouped report
    #[arg(long)]
    pub show_xfail: bool,

    /// Show unsupported tests in the grouped report
    #[arg(long)]
    pub show_unsupported: bool,
}
