//! Running engine executables as child processes.
//!
//! [`CommandRunner`] is the seam between the provisioner/client and the OS.
//! [`SystemCommandRunner`] spawns real processes; tests substitute a runner
//! returning canned output.

use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::error::{Error, Result};

/// Number of trailing stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// A process invocation: program, arguments and optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
}

impl EngineCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// File stem of the program, e.g. `valhalla_service`.
    pub fn tool_name(&self) -> String {
        self.program
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    /// Last lines written to stderr. The full stream goes to the log.
    pub stderr_tail: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn status(&self) -> ExitDescription {
        ExitDescription(self.exit_code)
    }
}

/// Human-readable exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitDescription(Option<i32>);

impl fmt::Display for ExitDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "termination by signal"),
        }
    }
}

/// Runs engine executables to completion.
pub trait CommandRunner: Send + Sync {
    /// Run `command`, returning its stdout once it exits.
    ///
    /// A non-zero exit is not an error at this level; callers decide.
    fn run(&self, command: &EngineCommand) -> Result<CommandOutput>;
}

/// Spawns real child processes.
///
/// Stdout is collected on the calling thread; stderr is drained line by line
/// to the log on a helper thread so a chatty tool can never fill its pipe and
/// stall.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, command: &EngineCommand) -> Result<CommandOutput> {
        let tool = command.tool_name();
        debug!(tool = %tool, program = %command.program.display(), "running engine tool");

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &command.current_dir {
            process.current_dir(dir);
        }

        let mut child = process.spawn().map_err(|source| Error::EngineLaunch {
            program: command.program.clone(),
            source,
        })?;

        let stderr = child.stderr.take();
        let drain_tool = tool.clone();
        let drain = thread::spawn(move || drain_stderr(stderr, &drain_tool));

        let mut stdout = Vec::new();
        let read = match child.stdout.take() {
            Some(mut out) => out.read_to_end(&mut stdout).map(drop),
            None => Ok(()),
        };
        if let Err(err) = read {
            abandon(&mut child, drain);
            return Err(err.into());
        }
        let status = child.wait()?;
        let stderr_tail = drain.join().unwrap_or_default();

        debug!(tool = %tool, status = %status, bytes = stdout.len(), "engine tool finished");
        Ok(CommandOutput {
            exit_code: status.code(),
            stdout,
            stderr_tail,
        })
    }
}

/// Kill and reap `child` and wait for its stderr drain to finish.
fn abandon(child: &mut Child, drain: JoinHandle<String>) {
    if let Err(err) = child.kill() {
        debug!(error = %err, "engine tool already exited");
    }
    let _ = child.wait();
    let _ = drain.join();
}

fn drain_stderr(stderr: Option<ChildStderr>, tool: &str) -> String {
    let Some(stderr) = stderr else {
        return String::new();
    };

    let mut reader = BufReader::new(stderr);
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                debug!(tool, "{line}");
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Err(err) => {
                // The pipe must stay open until EOF or the tool dies on SIGPIPE.
                debug!(tool, error = %err, "stderr unreadable, discarding the rest");
                let _ = io::copy(&mut reader, &mut io::sink());
                break;
            }
        }
    }
    Vec::from(tail).join("\n")
}

/// Program path and arguments rendered for logs.
pub(crate) fn describe(command: &EngineCommand) -> String {
    let mut rendered = display_path(&command.program);
    for arg in &command.args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}
