use crate::boolexpr;
use anyhow::{Result, anyhow, bail};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// How successive matching lines of one keyword combine into a value, and
/// which suffix characters the keyword may end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    /// Ordered command lines with `\` continuation and `%(line)` arithmetic.
    Command,
    /// Comma-separated flat list.
    List,
    /// Comma-separated feature expressions, syntax-checked on accumulation.
    BooleanExpr,
    /// Presence marker; takes no payload.
    Tag,
    /// Delegates to a supplied handler.
    Custom,
}

impl DirectiveKind {
    pub fn allowed_suffixes(&self) -> &'static [char] {
        match self {
            DirectiveKind::Command | DirectiveKind::List | DirectiveKind::BooleanExpr => &[':'],
            DirectiveKind::Tag | DirectiveKind::Custom => &[':', '.'],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DirectiveKind::Command => "COMMAND",
            DirectiveKind::List => "LIST",
            DirectiveKind::BooleanExpr => "BOOLEAN_EXPR",
            DirectiveKind::Tag => "TAG",
            DirectiveKind::Custom => "CUSTOM",
        }
    }
}

/// A handler receives the line number, payload text and the accumulated
/// value so far, and returns the new value.
pub type CustomHandler = fn(usize, &str, Vec<String>) -> Result<Vec<String>>;

/// Parser for one recognized keyword. Scans matching lines of a test file
/// in order and folds them into a single directive value.
pub struct KeywordParser {
    keyword: String,
    kind: DirectiveKind,
    custom: Option<CustomHandler>,
    parsed_lines: Vec<(usize, String)>,
    lines: Vec<String>,
    seen: bool,
}

impl KeywordParser {
    pub fn new(keyword: &str, kind: DirectiveKind, custom: Option<CustomHandler>) -> Result<Self> {
        let allowed = kind.allowed_suffixes();
        let suffix_ok = keyword
            .chars()
            .last()
            .is_some_and(|c| allowed.contains(&c));
        if !suffix_ok {
            let shown: Vec<String> = allowed.iter().map(|c| format!("'{}'", c)).collect();
            bail!(
                "keyword '{}' of kind '{}' must end in one of {}",
                keyword,
                kind.as_str(),
                shown.join(" ")
            );
        }
        if custom.is_some() && kind != DirectiveKind::Custom {
            bail!("custom handlers can only be specified with DirectiveKind::Custom");
        }
        if custom.is_none() && kind == DirectiveKind::Custom {
            bail!("keyword '{}' of kind CUSTOM requires a handler", keyword);
        }
        Ok(Self {
            keyword: keyword.to_string(),
            kind,
            custom,
            parsed_lines: Vec::new(),
            lines: Vec::new(),
            seen: false,
        })
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn kind(&self) -> DirectiveKind {
        self.kind
    }

    pub fn parsed_lines(&self) -> &[(usize, String)] {
        &self.parsed_lines
    }

    /// Accumulated value for every kind except TAG.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// TAG value: true once any matching line (even a blank one) was seen.
    pub fn seen(&self) -> bool {
        self.seen
    }

    /// Fold one matching line into the accumulated value. Errors carry the
    /// keyword and line number so a malformed directive points back at its
    /// source.
    pub fn consume_line(&mut self, line_number: usize, text: &str) -> Result<()> {
        self.parsed_lines.push((line_number, text.to_string()));
        let acc = std::mem::take(&mut self.lines);
        let folded = match self.kind {
            DirectiveKind::Command => Ok(accumulate_command(&self.keyword, line_number, text, acc)),
            DirectiveKind::List => Ok(accumulate_list(text, acc)),
            DirectiveKind::BooleanExpr => accumulate_boolean_expr(text, acc),
            DirectiveKind::Tag => {
                self.seen = true;
                Ok(acc)
            }
            DirectiveKind::Custom => {
                let handler = self.custom.expect("CUSTOM kind always has a handler");
                handler(line_number, text, acc)
            }
        };
        match folded {
            Ok(lines) => {
                self.lines = lines;
                Ok(())
            }
            Err(e) => Err(anyhow!(
                "{}\nin {} directive on test line {}",
                e,
                self.keyword,
                line_number
            )),
        }
    }
}

static LINE_OFFSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%\(line *([+-]) *(\d+)\)").expect("static regex"));

/// Substitute `%(line)`, `%(line+N)` and `%(line-N)` with absolute line
/// number arithmetic.
pub fn substitute_line_number(line_number: usize, line: &str) -> String {
    let line = line.replace("%(line)", &line_number.to_string());
    LINE_OFFSET_RE
        .replace_all(&line, |caps: &regex::Captures| {
            let offset: i64 = caps[2].parse().unwrap_or(0);
            let base = line_number as i64;
            match &caps[1] {
                "+" => (base + offset).to_string(),
                _ => (base - offset).to_string(),
            }
        })
        .into_owned()
}

/// COMMAND accumulation: trailing-whitespace trim, line-number substitution,
/// backslash continuation, and a `%dbg(...)` tag on each new logical entry.
pub fn accumulate_command(
    keyword: &str,
    line_number: usize,
    line: &str,
    mut acc: Vec<String>,
) -> Vec<String> {
    let line = substitute_line_number(line_number, line.trim_end());
    if let Some(prev) = acc.last_mut() {
        if prev.ends_with('\\') {
            prev.pop();
            prev.push_str(&line);
            return acc;
        }
    }
    let name = keyword.trim_end_matches([':', '.']);
    acc.push(format!("%dbg({} at line {}) {}", name, line_number, line));
    acc
}

/// LIST accumulation: split on commas, trim, append.
pub fn accumulate_list(line: &str, mut acc: Vec<String>) -> Vec<String> {
    for part in line.split(',') {
        acc.push(part.trim().to_string());
    }
    acc
}

/// BOOLEAN_EXPR accumulation. A trailing backslash on the previous entry
/// merges the first new part into it by string concatenation. Every
/// complete entry other than the `*` wildcard is run through the evaluator
/// with no features as a pure syntax check.
pub fn accumulate_boolean_expr(line: &str, mut acc: Vec<String>) -> Result<Vec<String>> {
    let mut parts: Vec<String> = line
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect();
    if let Some(prev) = acc.last_mut() {
        if prev.ends_with('\\') && !parts.is_empty() {
            prev.pop();
            prev.push_str(&parts.remove(0));
        }
    }
    acc.extend(parts);
    let no_features = HashSet::new();
    for entry in &acc {
        if entry != "*" && !entry.ends_with('\\') {
            boolexpr::evaluate(entry, &no_features)?;
        }
    }
    Ok(acc)
}

/// Handler for REQUIRES-ANY: rewrite the comma list into one OR'd REQUIRES
/// expression, then feed it through the boolean accumulation path.
pub fn handle_requires_any(_line_number: usize, line: &str, acc: Vec<String>) -> Result<Vec<String>> {
    let conditions = accumulate_list(line, Vec::new());
    let expression = conditions.join(" || ");
    accumulate_boolean_expr(&expression, acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_validation() {
        assert!(KeywordParser::new("RUN:", DirectiveKind::Command, None).is_ok());
        assert!(KeywordParser::new("RUN", DirectiveKind::Command, None).is_err());
        assert!(KeywordParser::new("RUN.", DirectiveKind::Command, None).is_err());
        assert!(KeywordParser::new("END.", DirectiveKind::Tag, None).is_ok());
        assert!(KeywordParser::new("", DirectiveKind::List, None).is_err());
    }

    #[test]
    fn test_custom_handler_validation() {
        assert!(KeywordParser::new("X:", DirectiveKind::List, Some(handle_requires_any)).is_err());
        assert!(KeywordParser::new("X:", DirectiveKind::Custom, None).is_err());
        assert!(KeywordParser::new("X:", DirectiveKind::Custom, Some(handle_requires_any)).is_ok());
    }

    #[test]
    fn test_line_number_substitution() {
        assert_eq!(substitute_line_number(10, "check %(line)"), "check 10");
        assert_eq!(substitute_line_number(10, "at %(line+2)"), "at 12");
        assert_eq!(substitute_line_number(10, "at %(line-3)"), "at 7");
        assert_eq!(
            substitute_line_number(5, "%(line) %(line + 1) %(line - 1)"),
            "5 6 4"
        );
    }

    #[test]
    fn test_command_entries_carry_debug_tag() {
        let acc = accumulate_command("RUN:", 3, "echo hi  ", Vec::new());
        assert_eq!(acc, vec!["%dbg(RUN at line 3) echo hi".to_string()]);
    }

    #[test]
    fn test_command_continuation_merges() {
        let acc = accumulate_command("RUN:", 1, "foo \\", Vec::new());
        let acc = accumulate_command("RUN:", 2, "bar", acc);
        assert_eq!(acc, vec!["%dbg(RUN at line 1) foo bar".to_string()]);
    }

    #[test]
    fn test_list_accumulation() {
        let acc = accumulate_list(" a, b ,c ", Vec::new());
        let acc = accumulate_list("d", acc);
        assert_eq!(acc, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_boolean_expr_accumulation() {
        let acc = accumulate_boolean_expr("a, b && c, ", Vec::new()).unwrap();
        assert_eq!(acc, vec!["a", "b && c"]);
    }

    #[test]
    fn test_boolean_expr_continuation_is_string_concat() {
        let acc = accumulate_boolean_expr("a &&\\", Vec::new()).unwrap();
        let acc = accumulate_boolean_expr("b", acc).unwrap();
        assert_eq!(acc, vec!["a &&b"]);
    }

    #[test]
    fn test_boolean_expr_wildcard_skips_validation() {
        let acc = accumulate_boolean_expr("*", Vec::new()).unwrap();
        assert_eq!(acc, vec!["*"]);
    }

    #[test]
    fn test_boolean_expr_syntax_error_propagates() {
        assert!(accumulate_boolean_expr("a &&", Vec::new()).is_err());
    }

    #[test]
    fn test_tag_presence() {
        let mut parser = KeywordParser::new("END.", DirectiveKind::Tag, None).unwrap();
        assert!(!parser.seen());
        parser.consume_line(4, "").unwrap();
        assert!(parser.seen());
        assert_eq!(parser.parsed_lines(), &[(4, String::new())]);
    }

    #[test]
    fn test_requires_any_rewrites_to_or_expression() {
        let acc = handle_requires_any(1, "foo, bar, baz", Vec::new()).unwrap();
        assert_eq!(acc, vec!["foo || bar || baz"]);
    }

    #[test]
    fn test_consume_line_error_names_keyword_and_line() {
        let mut parser =
            KeywordParser::new("REQUIRES:", DirectiveKind::BooleanExpr, None).unwrap();
        let err = parser.consume_line(7, "a ||").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("REQUIRES:"));
        assert!(msg.contains("line 7"));
    }
}
