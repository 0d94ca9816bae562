use anyhow::{Result, bail};
use clap::Parser;
use litrun::cli::Cli;
use litrun::config::RunConfig;
use litrun::{discovery, report, sched};
use log::error;
use std::collections::BTreeMap;

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    // Single point of process termination: fatal (operational) errors land
    // here as Err and exit with code 2.
    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            2
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<i32> {
    let config = RunConfig::from_cli(cli)?;
    let mut tests = discovery::find_tests(&cli.test_paths)?;
    if tests.is_empty() {
        bail!("no tests discovered");
    }

    if cli.show_suites || cli.show_tests {
        show_inventory(&tests, cli.show_suites, cli.show_tests);
        return Ok(0);
    }

    let total_discovered = tests.len();
    tests = sched::filter_tests(tests, config.filter.as_ref());
    sched::order_tests(&mut tests, config.order);
    if let Some(plan) = &config.shard {
        tests = sched::select_shard(tests, plan);
    }
    if let Some(max) = config.max_tests {
        tests.truncate(max);
    }

    if !config.quiet {
        let extra = if tests.len() != total_discovered {
            format!(" of {}", total_discovered)
        } else {
            String::new()
        };
        let workers = config.threads.min(tests.len()).max(1);
        let threads = if workers == 1 {
            "single process".to_string()
        } else {
            format!("{} threads", workers)
        };
        println!("-- Testing: {}{} tests, {} --", tests.len(), extra, threads);
    }

    let report = sched::run_tests(tests, &config)?;
    report::print_results(&report, cli);
    Ok(report.exit_code())
}

fn show_inventory(tests: &[litrun::testcase::TestCase], suites: bool, list_tests: bool) {
    let mut by_suite: BTreeMap<String, Vec<&litrun::testcase::TestCase>> = BTreeMap::new();
    for test in tests {
        by_suite.entry(test.suite.name.clone()).or_default().push(test);
    }
    if suites {
        println!("-- Test Suites --");
        for (_, suite_tests) in &by_suite {
            let suite = &suite_tests[0].suite;
            println!("  {} - {} tests", suite.name, suite_tests.len());
            println!("    Source Root: {}", suite.source_root.display());
            println!("    Exec Root  : {}", suite.exec_root.display());
        }
    }
    if list_tests {
        println!("-- Available Tests --");
        for (_, suite_tests) in &by_suite {
            for test in suite_tests {
                println!("  {}", test.full_name());
            }
        }
    }
}
