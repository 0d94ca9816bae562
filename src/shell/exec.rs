use crate::shell::ast::{Pipeline, RedirectOp, Seq, SeqOp, ShCommand, Word};
use crate::shell::parser::parse_line;
use anyhow::{Context, Result};
use log::warn;
use std::collections::HashMap;
use std::fs::OpenOptions;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Exit code reported for a program that could not be found, matching
/// shell conventions.
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

pub struct ExecContext {
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    /// Absolute wall-clock deadline for the whole test, if a timeout is set.
    pub deadline: Option<Instant>,
    /// Let commands write to the runner's stdout/stderr instead of
    /// discarding their output.
    pub show_output: bool,
}

impl ExecContext {
    pub fn new(cwd: PathBuf, env: HashMap<String, String>) -> Self {
        Self {
            cwd,
            env,
            deadline: None,
            show_output: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.deadline = timeout.map(|t| Instant::now() + t);
        self
    }

    fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Exited(i32),
    TimedOut,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ExecOutcome::Exited(0))
    }
}

/// Parse and execute one command line. Syntax errors propagate as `Err`;
/// a failing command is a normal `Exited(nonzero)` outcome.
pub fn run_line(line: &str, pipefail: bool, ctx: &ExecContext) -> Result<ExecOutcome> {
    let tree = parse_line(line, pipefail)?;
    exec_seq(&tree, ctx)
}

fn exec_seq(seq: &Seq, ctx: &ExecContext) -> Result<ExecOutcome> {
    match seq {
        Seq::Single(pipeline) => exec_pipeline(pipeline, ctx),
        Seq::Group { left, op, right } => {
            let lhs = exec_seq(left, ctx)?;
            if lhs == ExecOutcome::TimedOut {
                return Ok(lhs);
            }
            let proceed = match op {
                // '&' is run synchronously like ';'; backgrounding is not
                // supported inside RUN lines.
                SeqOp::Semi | SeqOp::Background => true,
                SeqOp::AndIf => lhs.success(),
                SeqOp::OrIf => !lhs.success(),
            };
            if proceed { exec_seq(right, ctx) } else { Ok(lhs) }
        }
    }
}

fn exec_pipeline(pipeline: &Pipeline, ctx: &ExecContext) -> Result<ExecOutcome> {
    let mut children: Vec<Child> = Vec::new();
    let n = pipeline.commands.len();
    let mut prev_stdout = None;

    for (i, cmd) in pipeline.commands.iter().enumerate() {
        let last = i + 1 == n;
        match spawn_command(cmd, ctx, prev_stdout.take(), !last)? {
            Spawned::Child(mut child) => {
                prev_stdout = child.stdout.take();
                children.push(child);
            }
            Spawned::NotFound(program) => {
                // A missing program fails the pipeline; earlier stages are
                // reaped below rather than left running.
                warn!("command not found: {}", program);
                kill_from(&mut children);
                let code = if pipeline.negate { 0 } else { EXIT_COMMAND_NOT_FOUND };
                return Ok(ExecOutcome::Exited(code));
            }
        }
    }

    let mut codes = Vec::with_capacity(children.len());
    for i in 0..children.len() {
        let status = match ctx.remaining() {
            Some(budget) => match children[i]
                .wait_timeout(budget)
                .context("failed waiting on child process")?
            {
                Some(status) => status,
                None => {
                    kill_from(&mut children[i..]);
                    return Ok(ExecOutcome::TimedOut);
                }
            },
            None => children[i].wait().context("failed waiting on child process")?,
        };
        codes.push(status.code().unwrap_or(1));
    }

    let mut code = *codes.last().unwrap_or(&0);
    if pipeline.pipefail && code == 0 {
        if let Some(failed) = codes.iter().find(|&&c| c != 0) {
            code = *failed;
        }
    }
    if pipeline.negate {
        code = if code == 0 { 1 } else { 0 };
    }
    Ok(ExecOutcome::Exited(code))
}

fn kill_from(children: &mut [Child]) {
    for child in children {
        kill_tree(child);
        let _ = child.wait();
    }
}

/// Each spawned child leads its own process group, so signalling the group
/// takes any grandchildren it forked down with it.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    unsafe {
        libc::kill(-(child.id() as i32), libc::SIGKILL);
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

enum Spawned {
    Child(Child),
    NotFound(String),
}

fn spawn_command(
    cmd: &ShCommand,
    ctx: &ExecContext,
    piped_stdin: Option<std::process::ChildStdout>,
    pipe_stdout: bool,
) -> Result<Spawned> {
    let args = expand_args(&cmd.args, &ctx.cwd);
    let program = args[0].clone();

    if which::which_in(&program, ctx.env.get("PATH"), &ctx.cwd).is_err() {
        return Ok(Spawned::NotFound(program));
    }

    let mut command = Command::new(&program);
    command.args(&args[1..]);
    command.current_dir(&ctx.cwd);
    command.env_clear();
    command.envs(&ctx.env);
    // Own process group per child, so a timeout kill reaches grandchildren.
    #[cfg(unix)]
    command.process_group(0);

    match piped_stdin {
        Some(out) => {
            command.stdin(Stdio::from(out));
        }
        None => {
            command.stdin(Stdio::null());
        }
    }
    if pipe_stdout {
        command.stdout(Stdio::piped());
    } else if !ctx.show_output {
        command.stdout(Stdio::null());
    }
    if !ctx.show_output {
        command.stderr(Stdio::null());
    }

    for (op, target) in &cmd.redirects {
        let path = if std::path::Path::new(target).is_absolute() {
            PathBuf::from(target)
        } else {
            ctx.cwd.join(target)
        };
        let mut opts = OpenOptions::new();
        match op {
            RedirectOp::Out | RedirectOp::Err => {
                opts.write(true).create(true).truncate(true);
            }
            RedirectOp::OutAppend | RedirectOp::ErrAppend => {
                opts.write(true).create(true).append(true);
            }
            RedirectOp::In => {
                opts.read(true);
            }
        }
        let file = opts
            .open(&path)
            .with_context(|| format!("failed to open redirection target: {}", path.display()))?;
        match op {
            RedirectOp::Out | RedirectOp::OutAppend => {
                command.stdout(Stdio::from(file));
            }
            RedirectOp::Err | RedirectOp::ErrAppend => {
                command.stderr(Stdio::from(file));
            }
            RedirectOp::In => {
                command.stdin(Stdio::from(file));
            }
        }
    }

    let child = command
        .spawn()
        .with_context(|| format!("failed to spawn: {}", program))?;
    Ok(Spawned::Child(child))
}

/// Expand glob-tagged words relative to the working directory. Matches are
/// sorted for determinism; a pattern with no matches stays literal.
fn expand_args(args: &[Word], cwd: &std::path::Path) -> Vec<String> {
    let mut expanded = Vec::with_capacity(args.len());
    for arg in args {
        if !arg.is_glob {
            expanded.push(arg.text.clone());
            continue;
        }
        let pattern = cwd.join(&arg.text);
        let mut matched: Vec<String> = Vec::new();
        if let Ok(paths) = glob::glob(&pattern.to_string_lossy()) {
            for entry in paths.flatten() {
                let path = entry.strip_prefix(cwd).unwrap_or(&entry);
                matched.push(path.to_string_lossy().into_owned());
            }
        }
        if matched.is_empty() {
            expanded.push(arg.text.clone());
        } else {
            matched.sort();
            expanded.extend(matched);
        }
    }
    expanded
}
