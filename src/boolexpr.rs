use anyhow::{Result, bail};
use std::collections::HashSet;

/// Evaluate a feature expression against the set of available features.
///
/// Grammar:
/// ```text
/// expr := term (('&&' | '||') term)*
/// term := ['!'] ( identifier | 'true' | 'false' | '(' expr ')' )
/// ```
///
/// An identifier is true iff it names an available feature. Pure; also used
/// at directive-parse time as a syntax check with an empty feature set, the
/// boolean result discarded.
pub fn evaluate(expression: &str, features: &HashSet<String>) -> Result<bool> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        bail!("empty boolean expression");
    }
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        features,
    };
    let value = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        bail!(
            "unexpected token '{}' in expression '{}'",
            parser.tokens[parser.pos],
            expression
        );
    }
    Ok(value)
}

fn tokenize(expression: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | '!' => {
                chars.next();
                tokens.push(c.to_string());
            }
            '&' | '|' => {
                chars.next();
                if chars.peek() == Some(&c) {
                    chars.next();
                    tokens.push(format!("{}{}", c, c));
                } else {
                    bail!("invalid operator '{}' in expression '{}'", c, expression);
                }
            }
            c if is_ident_char(c) => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if is_ident_char(c) {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(ident);
            }
            _ => bail!("invalid character '{}' in expression '{}'", c, expression),
        }
    }
    Ok(tokens)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '+' | '=')
}

struct ExprParser<'a> {
    tokens: Vec<String>,
    pos: usize,
    features: &'a HashSet<String>,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn parse_expr(&mut self) -> Result<bool> {
        let mut value = self.parse_term()?;
        while let Some(op) = self.peek() {
            match op {
                "&&" => {
                    self.pos += 1;
                    let rhs = self.parse_term()?;
                    value = value && rhs;
                }
                "||" => {
                    self.pos += 1;
                    let rhs = self.parse_term()?;
                    value = value || rhs;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> Result<bool> {
        match self.peek() {
            Some("!") => {
                self.pos += 1;
                Ok(!self.parse_term()?)
            }
            Some("(") => {
                self.pos += 1;
                let value = self.parse_expr()?;
                if self.peek() != Some(")") {
                    bail!("unbalanced parentheses in boolean expression");
                }
                self.pos += 1;
                Ok(value)
            }
            Some(")") => bail!("unbalanced parentheses in boolean expression"),
            Some("&&") | Some("||") => {
                bail!("expected identifier, got operator '{}'", self.peek().unwrap())
            }
            Some("true") => {
                self.pos += 1;
                Ok(true)
            }
            Some("false") => {
                self.pos += 1;
                Ok(false)
            }
            Some(ident) => {
                let present = self.features.contains(ident);
                self.pos += 1;
                Ok(present)
            }
            None => bail!("unexpected end of boolean expression"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_literals() {
        let empty = features(&[]);
        assert!(evaluate("true", &empty).unwrap());
        assert!(!evaluate("false", &empty).unwrap());
    }

    #[test]
    fn test_identifier_is_membership() {
        let avail = features(&["has_foo", "linux"]);
        assert!(evaluate("has_foo", &avail).unwrap());
        assert!(!evaluate("has_bar", &avail).unwrap());
    }

    #[test]
    fn test_conjunction_disjunction_negation() {
        let avail = features(&["a"]);
        assert!(evaluate("a && true", &avail).unwrap());
        assert!(!evaluate("a && b", &avail).unwrap());
        assert!(evaluate("a || b", &avail).unwrap());
        assert!(evaluate("!b", &avail).unwrap());
        assert!(evaluate("!(b && c)", &avail).unwrap());
    }

    #[test]
    fn test_de_morgan_equivalence() {
        // !(a && b) == !a || !b and !(a || b) == !a && !b over all subsets.
        for mask in 0..4u8 {
            let mut avail = HashSet::new();
            if mask & 1 != 0 {
                avail.insert("a".to_string());
            }
            if mask & 2 != 0 {
                avail.insert("b".to_string());
            }
            assert_eq!(
                evaluate("!(a && b)", &avail).unwrap(),
                evaluate("!a || !b", &avail).unwrap()
            );
            assert_eq!(
                evaluate("!(a || b)", &avail).unwrap(),
                evaluate("!a && !b", &avail).unwrap()
            );
        }
    }

    #[test]
    fn test_flat_chain_is_left_associative() {
        let avail = features(&["a", "c"]);
        // (((a && b) || c)) under left association: false || true.
        assert!(evaluate("a && b || c", &avail).unwrap());
    }

    #[test]
    fn test_feature_names_with_punctuation() {
        let avail = features(&["target-x86_64", "rt.v2"]);
        assert!(evaluate("target-x86_64 && rt.v2", &avail).unwrap());
    }

    #[test]
    fn test_errors() {
        let empty = features(&[]);
        assert!(evaluate("", &empty).is_err());
        assert!(evaluate("(a", &empty).is_err());
        assert!(evaluate("a)", &empty).is_err());
        assert!(evaluate("a &", &empty).is_err());
        assert!(evaluate("a && ", &empty).is_err());
        assert!(evaluate("&& a", &empty).is_err());
        assert!(evaluate("a # b", &empty).is_err());
    }
}
