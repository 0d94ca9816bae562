use crate::directive::keyword::{DirectiveKind, KeywordParser, handle_requires_any};
use anyhow::{Result, bail};

/// The structured action list extracted from one test file: ordered RUN
/// commands plus the applicability and expectation directives.
#[derive(Debug, Default, Clone)]
pub struct TestScript {
    pub run_lines: Vec<String>,
    pub requires: Vec<String>,
    pub unsupported: Vec<String>,
    pub xfail: Vec<String>,
    pub allow_retries: Option<u32>,
}

fn standard_parsers() -> Result<Vec<KeywordParser>> {
    Ok(vec![
        KeywordParser::new("RUN:", DirectiveKind::Command, None)?,
        KeywordParser::new("REQUIRES:", DirectiveKind::BooleanExpr, None)?,
        KeywordParser::new("REQUIRES-ANY:", DirectiveKind::Custom, Some(handle_requires_any))?,
        KeywordParser::new("UNSUPPORTED:", DirectiveKind::BooleanExpr, None)?,
        KeywordParser::new("XFAIL:", DirectiveKind::BooleanExpr, None)?,
        KeywordParser::new("ALLOW_RETRIES:", DirectiveKind::List, None)?,
        KeywordParser::new("END.", DirectiveKind::Tag, None)?,
    ])
}

/// Scan a test file's text for directive lines and fold them through the
/// keyword parsers, in file line order. `END.` stops the scan.
pub fn parse_script(content: &str) -> Result<TestScript> {
    let mut parsers = standard_parsers()?;
    'lines: for (idx, line) in content.lines().enumerate() {
        let line_number = idx + 1;
        for parser in parsers.iter_mut() {
            let Some(pos) = line.find(parser.keyword()) else {
                continue;
            };
            let payload = line[pos + parser.keyword().len()..].trim_start();
            let stop = parser.kind() == DirectiveKind::Tag;
            parser.consume_line(line_number, payload)?;
            if stop {
                break 'lines;
            }
            break;
        }
    }
    collect(parsers)
}

fn collect(parsers: Vec<KeywordParser>) -> Result<TestScript> {
    let mut script = TestScript::default();
    for parser in parsers {
        match parser.keyword() {
            "RUN:" => script.run_lines = parser.lines().to_vec(),
            // REQUIRES-ANY entries land in the same requirement list as
            // plain REQUIRES expressions.
            "REQUIRES:" | "REQUIRES-ANY:" => {
                script.requires.extend(parser.lines().iter().cloned())
            }
            "UNSUPPORTED:" => script.unsupported = parser.lines().to_vec(),
            "XFAIL:" => script.xfail = parser.lines().to_vec(),
            "ALLOW_RETRIES:" => {
                if let Some(first) = parser.lines().first() {
                    let count: u32 = first.parse().map_err(|_| {
                        anyhow::anyhow!("ALLOW_RETRIES: expects a non-negative integer, got '{}'", first)
                    })?;
                    script.allow_retries = Some(count);
                }
            }
            _ => {}
        }
    }
    if let Some(last) = script.run_lines.last() {
        if last.ends_with('\\') {
            bail!("test has unterminated RUN line (trailing '\\')");
        }
    }
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_scan() {
        let content = "\
; A test file.
; RUN: echo one
; REQUIRES: has_foo, has_bar || has_baz
; RUN: echo at line %(line)
; UNSUPPORTED: windows
; XFAIL: *
";
        let script = parse_script(content).unwrap();
        assert_eq!(
            script.run_lines,
            vec![
                "%dbg(RUN at line 2) echo one".to_string(),
                "%dbg(RUN at line 4) echo at line 4".to_string(),
            ]
        );
        assert_eq!(script.requires, vec!["has_foo", "has_bar || has_baz"]);
        assert_eq!(script.unsupported, vec!["windows"]);
        assert_eq!(script.xfail, vec!["*"]);
    }

    #[test]
    fn test_continuation_across_run_lines() {
        let content = "; RUN: foo \\\n; RUN: bar\n";
        let script = parse_script(content).unwrap();
        assert_eq!(script.run_lines, vec!["%dbg(RUN at line 1) foo bar"]);
    }

    #[test]
    fn test_end_stops_scanning() {
        let content = "; RUN: before\n; END.\n; RUN: after\n";
        let script = parse_script(content).unwrap();
        assert_eq!(script.run_lines.len(), 1);
        assert!(script.run_lines[0].contains("before"));
    }

    #[test]
    fn test_requires_any_merges_into_requires() {
        let content = "; REQUIRES: base\n; REQUIRES-ANY: x, y\n";
        let script = parse_script(content).unwrap();
        assert_eq!(script.requires, vec!["base", "x || y"]);
    }

    #[test]
    fn test_allow_retries() {
        let script = parse_script("; ALLOW_RETRIES: 3\n; RUN: true\n").unwrap();
        assert_eq!(script.allow_retries, Some(3));

        assert!(parse_script("; ALLOW_RETRIES: lots\n").is_err());
    }

    #[test]
    fn test_unterminated_run_line_is_error() {
        let err = parse_script("; RUN: foo \\\n").unwrap_err();
        assert!(err.to_string().contains("unterminated RUN line"));
    }

    #[test]
    fn test_malformed_boolean_directive_is_error() {
        let err = parse_script("; REQUIRES: a &&\n").unwrap_err();
        assert!(err.to_string().contains("REQUIRES:"));
    }

    #[test]
    fn test_no_directives_yields_empty_script() {
        let script = parse_script("just some text\n").unwrap();
        assert!(script.run_lines.is_empty());
        assert!(script.requires.is_empty());
    }
}
