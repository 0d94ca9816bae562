/// One argument word. Glob markers (`*`, `?`) seen outside quotes tag the
/// word so expansion can be deferred to execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    pub is_glob: bool,
}

impl Word {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_glob: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOp {
    Out,       // >
    OutAppend, // >>
    In,        // <
    Err,       // 2>
    ErrAppend, // 2>>
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqOp {
    Semi,       // ;
    Background, // &
    AndIf,      // &&
    OrIf,       // ||
}

impl SeqOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeqOp::Semi => ";",
            SeqOp::Background => "&",
            SeqOp::AndIf => "&&",
            SeqOp::OrIf => "||",
        }
    }
}

/// Simple command: "grep foo input.txt > out.log"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShCommand {
    pub args: Vec<Word>,
    pub redirects: Vec<(RedirectOp, String)>,
}

/// Pipeline: "cat x | grep y". Always holds at least one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<ShCommand>,
    pub negate: bool,
    pub pipefail: bool,
}

/// Sequence tree. Left-associative; built iteratively by the parser, never
/// balanced. `;`, `&`, `&&` and `||` all bind at the same level — a known
/// deviation from POSIX precedence, carried over deliberately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seq {
    Single(Pipeline),
    Group {
        left: Box<Seq>,
        op: SeqOp,
        right: Box<Seq>,
    },
}

impl Seq {
    /// Flattened argument list of every command in the tree, in order.
    pub fn flat_args(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_args(&mut out);
        out
    }

    fn collect_args<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Seq::Single(pipeline) => {
                for cmd in &pipeline.commands {
                    for arg in &cmd.args {
                        out.push(arg.text.as_str());
                    }
                }
            }
            Seq::Group { left, right, .. } => {
                left.collect_args(out);
                right.collect_args(out);
            }
        }
    }
}
