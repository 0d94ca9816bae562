use crate::cli::Cli;
use crate::sched::RunReport;
use crate::testcase::ResultCode;
use colored::*;

/// Print the grouped failing tests and the per-code summary, in the
/// classic integrated-tester layout.
pub fn print_results(report: &RunReport, cli: &Cli) {
    let by_code = report.by_code();

    let groups: &[(&str, ResultCode)] = &[
        ("Unexpected Passing Tests", ResultCode::Xpass),
        ("Failing Tests", ResultCode::Fail),
        ("Unresolved Tests", ResultCode::Unresolved),
        ("Unsupported Tests", ResultCode::Unsupported),
        ("Expected Failing Tests", ResultCode::Xfail),
        ("Timed Out Tests", ResultCode::Timeout),
    ];
    for (title, code) in groups {
        if (*code == ResultCode::Xfail && !cli.show_xfail)
            || (*code == ResultCode::Unsupported && !cli.show_unsupported)
            || (*code == ResultCode::Unresolved && cli.max_failures.is_some())
        {
            continue;
        }
        let Some(tests) = by_code.get(code) else {
            continue;
        };
        if tests.is_empty() {
            continue;
        }
        println!("{}", "*".repeat(20));
        println!("{} ({}):", title, tests.len());
        for test in tests {
            println!("    {}", test.full_name());
        }
        println!();
    }

    let counts: &[(&str, ResultCode)] = &[
        ("Expected Passes    ", ResultCode::Pass),
        ("Passes With Retry  ", ResultCode::FlakyPass),
        ("Expected Failures  ", ResultCode::Xfail),
        ("Unsupported Tests  ", ResultCode::Unsupported),
        ("Unresolved Tests   ", ResultCode::Unresolved),
        ("Unexpected Passes  ", ResultCode::Xpass),
        ("Unexpected Failures", ResultCode::Fail),
        ("Individual Timeouts", ResultCode::Timeout),
    ];
    for (name, code) in counts {
        if cli.quiet && !code.is_failure() {
            continue;
        }
        let num = by_code.get(code).map(Vec::len).unwrap_or(0);
        if num > 0 {
            let line = format!("  {}: {}", name, num);
            if code.is_failure() {
                println!("{}", line.red());
            } else {
                println!("{}", line);
            }
        }
    }

    if !cli.quiet {
        println!("Testing Time: {:.2}s", report.elapsed.as_secs_f64());
    }
}
