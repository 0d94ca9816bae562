use crate::boolexpr;
use crate::config::RunConfig;
use crate::directive::{TestScript, parse_script};
use crate::shell::exec::{ExecContext, ExecOutcome, run_line};
use crate::testcase::{ResultCode, TestCase, TestResult};
use regex::Regex;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::sync::LazyLock;
use std::time::Instant;

/// The `%dbg(...)` tag COMMAND accumulation prepends to each logical RUN
/// entry. Stripped before execution, kept for display.
static PDBG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^%dbg\(([^)'\x22]*)\) ").expect("static regex"));

/// Run one test to completion and produce its result. All per-test errors
/// (unreadable file, malformed directive, bad RUN syntax) are local: they
/// become UNRESOLVED, never a run-level abort.
pub fn execute_test(test: &TestCase, config: &RunConfig) -> TestResult {
    let started = Instant::now();
    let mut result = run_with_retries(test, config);
    result.elapsed = started.elapsed();
    result
}

fn run_with_retries(test: &TestCase, config: &RunConfig) -> TestResult {
    let content = match fs::read_to_string(test.source_path()) {
        Ok(content) => content,
        Err(e) => {
            return TestResult::new(
                ResultCode::Unresolved,
                format!("could not read test file: {}", e),
            );
        }
    };
    let script = match parse_script(&content) {
        Ok(script) => script,
        Err(e) => return TestResult::new(ResultCode::Unresolved, format!("{:#}", e)),
    };

    let first = run_once(test, &script, config);
    if !first.code.is_failure() {
        return first;
    }
    // Retries apply to real execution failures only, not directive errors.
    let retries = script.allow_retries.unwrap_or(0);
    if retries == 0 || first.code == ResultCode::Unresolved {
        return first;
    }
    for attempt in 1..=retries {
        let rerun = run_once(test, &script, config);
        if !rerun.code.is_failure() {
            let mut flaky = rerun;
            flaky.code = ResultCode::FlakyPass;
            let _ = write!(
                &mut flaky.output,
                "\npassed on retry {} of {}",
                attempt, retries
            );
            return flaky;
        }
    }
    first
}

fn run_once(test: &TestCase, script: &TestScript, config: &RunConfig) -> TestResult {
    let features: HashSet<String> = test
        .suite
        .available_features
        .union(&config.extra_features)
        .cloned()
        .collect();

    match applicability(script, &features) {
        Ok(Some(reason)) => return TestResult::new(ResultCode::Unsupported, reason),
        Ok(None) => {}
        Err(e) => return TestResult::new(ResultCode::Unresolved, format!("{:#}", e)),
    }

    if script.run_lines.is_empty() {
        return TestResult::new(ResultCode::Unresolved, "test has no RUN lines");
    }
    if config.no_execute {
        return TestResult::new(ResultCode::Pass, "not executed (--no-execute)");
    }

    let expected_to_fail = expression_list_true(&script.xfail, &features).unwrap_or(false);
    let outcome = run_script(test, script, config);
    match outcome {
        ScriptOutcome::TimedOut(transcript) => TestResult::new(ResultCode::Timeout, transcript),
        ScriptOutcome::SyntaxError(message) => TestResult::new(ResultCode::Unresolved, message),
        ScriptOutcome::Exited { code, transcript } => {
            let result_code = match (code == 0, expected_to_fail) {
                (true, false) => ResultCode::Pass,
                (true, true) => ResultCode::Xpass,
                (false, false) => ResultCode::Fail,
                (false, true) => ResultCode::Xfail,
            };
            TestResult::new(result_code, transcript)
        }
    }
}

/// Returns `Some(reason)` when the test must be skipped as UNSUPPORTED:
/// either an UNSUPPORTED expression holds, or a REQUIRES expression does
/// not.
fn applicability(
    script: &TestScript,
    features: &HashSet<String>,
) -> anyhow::Result<Option<String>> {
    for entry in &script.unsupported {
        if entry == "*" || boolexpr::evaluate(entry, features)? {
            return Ok(Some(format!("unsupported configuration: {}", entry)));
        }
    }
    for entry in &script.requires {
        if entry != "*" && !boolexpr::evaluate(entry, features)? {
            return Ok(Some(format!("missing required feature: {}", entry)));
        }
    }
    Ok(None)
}

fn expression_list_true(entries: &[String], features: &HashSet<String>) -> anyhow::Result<bool> {
    for entry in entries {
        if entry == "*" || boolexpr::evaluate(entry, features)? {
            return Ok(true);
        }
    }
    Ok(false)
}

enum ScriptOutcome {
    Exited { code: i32, transcript: String },
    TimedOut(String),
    SyntaxError(String),
}

/// Execute the accumulated RUN lines in file order, stopping at the first
/// failing line. The whole script shares one wall-clock deadline.
fn run_script(test: &TestCase, script: &TestScript, config: &RunConfig) -> ScriptOutcome {
    let source = test.source_path();
    let cwd = source
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| test.suite.source_root.clone());
    let mut ctx = ExecContext::new(cwd, std::env::vars().collect()).with_timeout(config.timeout);
    ctx.show_output = config.show_output;

    let mut transcript = String::new();
    for entry in &script.run_lines {
        let command = PDBG_RE.replace(entry, "").into_owned();
        let command = substitute_paths(&command, test);
        let _ = writeln!(&mut transcript, "$ {}", command);
        match run_line(&command, test.suite.pipefail, &ctx) {
            Ok(ExecOutcome::Exited(0)) => {}
            Ok(ExecOutcome::Exited(code)) => {
                let _ = writeln!(&mut transcript, "command failed with exit status {}", code);
                return ScriptOutcome::Exited { code, transcript };
            }
            Ok(ExecOutcome::TimedOut) => {
                let _ = writeln!(&mut transcript, "reached timeout, killed process tree");
                return ScriptOutcome::TimedOut(transcript);
            }
            Err(e) => {
                return ScriptOutcome::SyntaxError(format!("{:#}\nwhile running: {}", e, entry));
            }
        }
    }
    ScriptOutcome::Exited {
        code: 0,
        transcript,
    }
}

/// Minimal path substitutions inside RUN lines: `%s` is the test source
/// file, `%t` a per-test temporary output path, `%%` a literal percent.
fn substitute_paths(command: &str, test: &TestCase) -> String {
    let source = test.source_path();
    let tmp = test
        .suite
        .exec_root
        .join(".litrun_tmp")
        .join(format!("{}.tmp", test.path_in_suite.display()).replace('/', "_"));
    if command.contains("%t") {
        if let Some(parent) = tmp.parent() {
            let _ = fs::create_dir_all(parent);
        }
    }
    command
        .replace("%%", "\u{1}")
        .replace("%s", &source.to_string_lossy())
        .replace("%t", &tmp.to_string_lossy())
        .replace('\u{1}', "%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcase::TestSuite;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn scratch(name: &str, content: &str, features: &[&str]) -> TestCase {
        let root = std::env::temp_dir().join(format!("litrun_runtest_{}", name));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("t.test"), content).unwrap();
        let suite = Arc::new(TestSuite {
            name: "unit".to_string(),
            source_root: root.clone(),
            exec_root: root,
            available_features: features.iter().map(|s| s.to_string()).collect(),
            pipefail: false,
            is_early: false,
            suffixes: vec!["test".to_string()],
        });
        TestCase::new(suite, PathBuf::from("t.test"))
    }

    fn config() -> RunConfig {
        use crate::cli::Cli;
        use clap::Parser;
        RunConfig::from_cli(&Cli::parse_from(["litrun", "x"])).unwrap()
    }

    #[test]
    fn test_requires_met_passes() {
        let test = scratch("req_met", "; REQUIRES: has_foo\n; RUN: true\n", &["has_foo"]);
        let result = execute_test(&test, &config());
        assert_eq!(result.code, ResultCode::Pass);
    }

    #[test]
    fn test_requires_unmet_is_unsupported_without_running() {
        let out = std::env::temp_dir().join("litrun_runtest_should_not_exist.txt");
        let _ = fs::remove_file(&out);
        let content = format!("; REQUIRES: has_foo\n; RUN: touch {}\n", out.display());
        let test = scratch("req_unmet", &content, &[]);
        let result = execute_test(&test, &config());
        assert_eq!(result.code, ResultCode::Unsupported);
        assert!(!out.exists());
    }

    #[test]
    fn test_unsupported_expression_skips() {
        let test = scratch("unsup", "; UNSUPPORTED: linux\n; RUN: true\n", &["linux"]);
        let result = execute_test(&test, &config());
        assert_eq!(result.code, ResultCode::Unsupported);
    }

    #[test]
    fn test_xfail_inverts_mapping() {
        let test = scratch("xfail", "; XFAIL: *\n; RUN: false\n", &[]);
        let result = execute_test(&test, &config());
        assert_eq!(result.code, ResultCode::Xfail);

        let test = scratch("xpass", "; XFAIL: *\n; RUN: true\n", &[]);
        let result = execute_test(&test, &config());
        assert_eq!(result.code, ResultCode::Xpass);
    }

    #[test]
    fn test_no_run_lines_is_unresolved() {
        let test = scratch("norun", "just a comment\n", &[]);
        let result = execute_test(&test, &config());
        assert_eq!(result.code, ResultCode::Unresolved);
    }

    #[test]
    fn test_shell_syntax_error_is_unresolved() {
        let test = scratch("synerr", "; RUN: echo 'unterminated\n", &[]);
        let result = execute_test(&test, &config());
        assert_eq!(result.code, ResultCode::Unresolved);
    }

    #[test]
    fn test_first_failing_line_stops_script() {
        let marker = std::env::temp_dir().join("litrun_runtest_stop_marker.txt");
        let _ = fs::remove_file(&marker);
        let content = format!("; RUN: false\n; RUN: touch {}\n", marker.display());
        let test = scratch("stop", &content, &[]);
        let result = execute_test(&test, &config());
        assert_eq!(result.code, ResultCode::Fail);
        assert!(!marker.exists());
    }

    #[test]
    fn test_percent_s_substitution() {
        if cfg!(unix) {
            let test = scratch("subst", "; RUN: grep -q REQUIRES-NOTHING %s\n", &[]);
            // The pattern above appears in the file itself, so grep finds it.
            let result = execute_test(&test, &config());
            assert_eq!(result.code, ResultCode::Pass);
        }
    }

    #[test]
    fn test_timeout_yields_timeout_code() {
        if cfg!(unix) {
            use crate::cli::Cli;
            use clap::Parser;
            let config =
                RunConfig::from_cli(&Cli::parse_from(["litrun", "--timeout", "1", "x"])).unwrap();
            let test = scratch("timeout", "; RUN: sleep 10\n", &[]);
            let result = execute_test(&test, &config);
            assert_eq!(result.code, ResultCode::Timeout);
        }
    }
}
