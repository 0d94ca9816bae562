use crate::shell::ast::{Pipeline, Seq, ShCommand, Word};
use crate::shell::lexer::{ShLexer, Token};
use anyhow::{Result, bail};

/// Recursive-descent parser over the lexer's token stream.
///
/// Grammar:
/// ```text
/// sequence    := pipeline ( seqOp pipeline )*     seqOp in {;, &, &&, ||}
/// pipeline    := ['!'] command ( '|' command )*
/// command     := word+ redirect*
/// ```
///
/// There is deliberately no precedence climbing: `;`, `&`, `&&` and `||`
/// all associate left-to-right at one level, in the order encountered.
pub struct ShParser<'a> {
    tokens: ShLexer<'a>,
    lookahead: Option<Token>,
    pipefail: bool,
}

impl<'a> ShParser<'a> {
    pub fn new(data: &'a str, pipefail: bool) -> Self {
        Self {
            tokens: ShLexer::new(data),
            lookahead: None,
            pipefail,
        }
    }

    pub fn parse(mut self) -> Result<Seq> {
        let mut lhs = Seq::Single(self.parse_pipeline()?);
        while let Some(token) = self.look()? {
            let op = match token {
                Token::Op(op) => *op,
                other => bail!("syntax error near unexpected token {:?}", other),
            };
            self.lex()?;
            if self.look()?.is_none() {
                bail!("missing operand for operator {}", op.as_str());
            }
            lhs = Seq::Group {
                left: Box::new(lhs),
                op,
                right: Box::new(Seq::Single(self.parse_pipeline()?)),
            };
        }
        Ok(lhs)
    }

    fn lex(&mut self) -> Result<Option<Token>> {
        if let Some(token) = self.lookahead.take() {
            return Ok(Some(token));
        }
        self.tokens.next().transpose()
    }

    fn look(&mut self) -> Result<Option<&Token>> {
        if self.lookahead.is_none() {
            self.lookahead = self.tokens.next().transpose()?;
        }
        Ok(self.lookahead.as_ref())
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline> {
        let mut negate = false;
        if let Some(Token::Word(word)) = self.look()? {
            if word.text == "!" {
                negate = true;
                self.lex()?;
            }
        }
        let mut commands = vec![self.parse_command()?];
        while matches!(self.look()?, Some(Token::Pipe)) {
            self.lex()?;
            commands.push(self.parse_command()?);
        }
        Ok(Pipeline {
            commands,
            negate,
            pipefail: self.pipefail,
        })
    }

    fn parse_command(&mut self) -> Result<ShCommand> {
        let mut args: Vec<Word> = Vec::new();
        let mut redirects = Vec::new();
        loop {
            match self.look()? {
                None => break,
                Some(Token::Word(_)) => {
                    if let Some(Token::Word(word)) = self.lex()? {
                        args.push(word);
                    }
                }
                Some(Token::Redirect(..)) => {
                    if args.is_empty() {
                        bail!("syntax error: empty command");
                    }
                    if let Some(Token::Redirect(op, target)) = self.lex()? {
                        redirects.push((op, target));
                    }
                }
                Some(Token::Op(_)) | Some(Token::Pipe) => break,
            }
        }
        if args.is_empty() {
            bail!("syntax error: empty command");
        }
        Ok(ShCommand { args, redirects })
    }
}

/// Parse one RUN line into its command tree.
pub fn parse_line(data: &str, pipefail: bool) -> Result<Seq> {
    ShParser::new(data, pipefail).parse()
}
