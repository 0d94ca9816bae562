use crate::shell::ast::{RedirectOp, SeqOp, Word};
use anyhow::{Result, anyhow, bail};
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(Word),
    Op(SeqOp),
    Pipe,
    /// A redirection operator paired with its target word. The pairing
    /// happens here so a dangling operator is caught as a lex error.
    Redirect(RedirectOp, String),
}

/// Tokenizer for one RUN command line. Lazy and single-pass: tokens are
/// produced on demand through the `Iterator` impl and consumed at most once.
pub struct ShLexer<'a> {
    chars: Peekable<Chars<'a>>,
    failed: bool,
}

impl<'a> ShLexer<'a> {
    pub fn new(data: &'a str) -> Self {
        Self {
            chars: data.chars().peekable(),
            failed: false,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn lex_token(&mut self) -> Result<Option<Token>> {
        self.skip_whitespace();
        let Some(&c) = self.chars.peek() else {
            return Ok(None);
        };
        match c {
            ';' => {
                self.chars.next();
                Ok(Some(Token::Op(SeqOp::Semi)))
            }
            '&' => {
                self.chars.next();
                if self.chars.peek() == Some(&'&') {
                    self.chars.next();
                    Ok(Some(Token::Op(SeqOp::AndIf)))
                } else {
                    Ok(Some(Token::Op(SeqOp::Background)))
                }
            }
            '|' => {
                self.chars.next();
                if self.chars.peek() == Some(&'|') {
                    self.chars.next();
                    Ok(Some(Token::Op(SeqOp::OrIf)))
                } else {
                    Ok(Some(Token::Pipe))
                }
            }
            '>' | '<' => {
                let op = self.lex_redirect_op()?;
                self.lex_redirect_target(op)
            }
            '2' => {
                // "2>" and "2>>" only count as redirections at token start.
                let mut ahead = self.chars.clone();
                ahead.next();
                if ahead.peek() == Some(&'>') {
                    self.chars.next(); // consume '2'
                    let op = self.lex_redirect_op()?;
                    let op = match op {
                        RedirectOp::Out => RedirectOp::Err,
                        RedirectOp::OutAppend => RedirectOp::ErrAppend,
                        other => other,
                    };
                    self.lex_redirect_target(op)
                } else {
                    Ok(Some(Token::Word(self.lex_word()?)))
                }
            }
            _ => Ok(Some(Token::Word(self.lex_word()?))),
        }
    }

    fn lex_redirect_op(&mut self) -> Result<RedirectOp> {
        match self.chars.next() {
            Some('<') => Ok(RedirectOp::In),
            Some('>') => {
                if self.chars.peek() == Some(&'>') {
                    self.chars.next();
                    Ok(RedirectOp::OutAppend)
                } else {
                    Ok(RedirectOp::Out)
                }
            }
            other => bail!("syntax error: expected redirection operator, got {:?}", other),
        }
    }

    fn lex_redirect_target(&mut self, op: RedirectOp) -> Result<Option<Token>> {
        self.skip_whitespace();
        match self.chars.peek() {
            None => bail!("syntax error: missing redirection target"),
            Some(&c) if matches!(c, ';' | '&' | '|' | '>' | '<') => {
                bail!("syntax error: missing redirection target")
            }
            Some(_) => {
                let word = self.lex_word()?;
                Ok(Some(Token::Redirect(op, word.text)))
            }
        }
    }

    fn lex_word(&mut self) -> Result<Word> {
        let mut text = String::new();
        let mut is_glob = false;
        while let Some(&c) = self.chars.peek() {
            match c {
                c if c.is_whitespace() => break,
                ';' | '&' | '|' | '>' | '<' => break,
                '\'' => {
                    self.chars.next();
                    self.lex_quoted(&mut text, '\'')?;
                }
                '"' => {
                    self.chars.next();
                    self.lex_quoted(&mut text, '"')?;
                }
                '\\' => {
                    self.chars.next();
                    match self.chars.next() {
                        Some(escaped) => text.push(escaped),
                        None => text.push('\\'),
                    }
                }
                '*' | '?' => {
                    self.chars.next();
                    is_glob = true;
                    text.push(c);
                }
                _ => {
                    self.chars.next();
                    text.push(c);
                }
            }
        }
        Ok(Word { text, is_glob })
    }

    /// Quoted content is taken verbatim; no expansion happens inside quotes.
    fn lex_quoted(&mut self, text: &mut String, quote: char) -> Result<()> {
        loop {
            match self.chars.next() {
                Some(c) if c == quote => return Ok(()),
                Some(c) => text.push(c),
                None => return Err(anyhow!("syntax error: unterminated quote ({})", quote)),
            }
        }
    }
}

impl Iterator for ShLexer<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.lex_token() {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
