//! Pattern-matching command execution
//!
//! # Features
//!
//! - **Argument vectors**: commands are launched with `tokio::process::Command`,
//!   arguments are never interpolated into a local shell string
//! - **Line classification**: one output stream is read line by line and every
//!   line matching a recognizer pattern is captured
//! - **Live stderr**: when stderr is the scanned stream, each line is forwarded
//!   unmodified to this process's stderr while it is being matched
//! - **Deferred failure**: a non-zero exit status is returned, not raised; the
//!   caller decides what it means
//!
//! # Example
//!
//! ```rust,no_run
//! use package_uploader::exec::{CommandRunner, CommandSpec, OutputStream, SystemRunner};
//! use regex::Regex;
//!
//! # async fn example() -> Result<(), package_uploader::exec::CommandError> {
//! let runner = SystemRunner::new();
//! let cmd = CommandSpec::new("gem", ["push", "pkg.gem"]);
//! let patterns = [Regex::new(r"^Repushing of gem versions is not allowed\.$").unwrap()];
//! let output = runner.run_and_grep(&cmd, OutputStream::Stdout, &patterns).await?;
//! println!("exit {} matched {:?}", output.exit_code, output.matched_lines);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    /// Binary not found, permission denied, or similar spawn failure
    #[error("failed to launch {program}: {message}")]
    Launch { program: String, message: String },

    /// Reading the child's output or waiting on it failed
    #[error("I/O error while running {program}: {message}")]
    Io { program: String, message: String },
}

impl CommandError {
    pub fn program(&self) -> &str {
        match self {
            Self::Launch { program, .. } | Self::Io { program, .. } => program,
        }
    }
}

/// Which output stream of the child to scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A command line: program plus argument vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Connect stdin to /dev/null so the tool can never prompt
    pub null_stdin: bool,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            null_stdin: false,
        }
    }

    pub fn with_null_stdin(mut self) -> Self {
        self.null_stdin = true;
        self
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if self.null_stdin {
            command.stdin(Stdio::null());
        }
        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Exit code and matched lines of a scanned command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrepOutput {
    pub exit_code: i32,
    /// Matching lines, trailing newline removed
    pub matched_lines: Vec<String>,
}

/// Exit code and full stdout of a captured command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub exit_code: i32,
    pub stdout: String,
}

/// Runs external commands on behalf of the suites
///
/// Suites receive an `Arc<dyn CommandRunner>` so tests can substitute a
/// scripted implementation.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `cmd`, scanning `stream` for lines matching any of `patterns`
    async fn run_and_grep(
        &self,
        cmd: &CommandSpec,
        stream: OutputStream,
        patterns: &[Regex],
    ) -> Result<GrepOutput, CommandError>;

    /// Run `cmd` with inherited stdio and return its exit code
    async fn run(&self, cmd: &CommandSpec) -> Result<i32, CommandError>;

    /// Run `cmd`, capturing stdout; stderr is inherited
    async fn capture(&self, cmd: &CommandSpec) -> Result<CapturedOutput, CommandError>;
}

/// Strip the line terminator and test the line against every recognizer
pub fn match_line(raw: &str, patterns: &[Regex]) -> Option<String> {
    let line = raw.trim_end_matches(['\n', '\r']);
    patterns
        .iter()
        .any(|pattern| pattern.is_match(line))
        .then(|| line.to_string())
}

/// Destination for forwarded stderr lines
pub type OutputSink = Arc<Mutex<dyn AsyncWrite + Send + Unpin>>;

/// [`CommandRunner`] backed by real child processes
#[derive(Default, Clone)]
pub struct SystemRunner {
    /// `None` forwards to this process's stderr
    stderr_sink: Option<OutputSink>,
}

impl fmt::Debug for SystemRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemRunner")
            .field("custom_stderr_sink", &self.stderr_sink.is_some())
            .finish()
    }
}

impl SystemRunner {
    pub fn new() -> Self {
        Self { stderr_sink: None }
    }

    /// Forward scanned stderr to `sink` instead of this process's stderr
    pub fn with_stderr_sink(sink: OutputSink) -> Self {
        Self {
            stderr_sink: Some(sink),
        }
    }

    async fn forward(&self, bytes: &[u8]) -> std::io::Result<()> {
        match &self.stderr_sink {
            Some(sink) => {
                let mut sink = sink.lock().await;
                sink.write_all(bytes).await?;
                sink.flush().await
            }
            None => {
                let mut stderr = tokio::io::stderr();
                stderr.write_all(bytes).await?;
                stderr.flush().await
            }
        }
    }

    async fn scan<R>(
        &self,
        program: &str,
        reader: R,
        forward_to_stderr: bool,
        patterns: &[Regex],
    ) -> Result<Vec<String>, CommandError>
    where
        R: AsyncRead + Unpin,
    {
        let io_error = |e: std::io::Error| CommandError::Io {
            program: program.to_string(),
            message: e.to_string(),
        };

        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut matched = Vec::new();

        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf).await.map_err(io_error)?;
            if read == 0 {
                break;
            }

            let line = String::from_utf8_lossy(&buf);
            if let Some(hit) = match_line(&line, patterns) {
                tracing::info!(program, line = %hit, "recognized output line");
                matched.push(hit);
            } else if !forward_to_stderr {
                tracing::debug!(program, line = %line.trim_end(), "output");
            }

            if forward_to_stderr {
                self.forward(&buf).await.map_err(io_error)?;
            }
        }

        Ok(matched)
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run_and_grep(
        &self,
        cmd: &CommandSpec,
        stream: OutputStream,
        patterns: &[Regex],
    ) -> Result<GrepOutput, CommandError> {
        tracing::debug!(command = %cmd, ?stream, "running");

        let mut command = cmd.to_command();
        match stream {
            OutputStream::Stdout => command.stdout(Stdio::piped()),
            OutputStream::Stderr => command.stderr(Stdio::piped()),
        };

        let mut child = command.spawn().map_err(|e| launch_error(cmd, e))?;

        let matched_lines = match stream {
            OutputStream::Stdout => {
                let out = child.stdout.take().ok_or_else(|| missing_pipe(cmd))?;
                self.scan(&cmd.program, out, false, patterns).await?
            }
            OutputStream::Stderr => {
                let err = child.stderr.take().ok_or_else(|| missing_pipe(cmd))?;
                self.scan(&cmd.program, err, true, patterns).await?
            }
        };

        let status = child.wait().await.map_err(|e| wait_error(cmd, e))?;

        Ok(GrepOutput {
            exit_code: exit_code(status),
            matched_lines,
        })
    }

    async fn run(&self, cmd: &CommandSpec) -> Result<i32, CommandError> {
        tracing::debug!(command = %cmd, "running");

        let status = cmd
            .to_command()
            .status()
            .await
            .map_err(|e| launch_error(cmd, e))?;

        Ok(exit_code(status))
    }

    async fn capture(&self, cmd: &CommandSpec) -> Result<CapturedOutput, CommandError> {
        tracing::debug!(command = %cmd, "capturing");

        let output = cmd
            .to_command()
            .stdout(Stdio::piped())
            .output()
            .await
            .map_err(|e| launch_error(cmd, e))?;

        Ok(CapturedOutput {
            exit_code: exit_code(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

fn launch_error(cmd: &CommandSpec, e: std::io::Error) -> CommandError {
    CommandError::Launch {
        program: cmd.program.clone(),
        message: e.to_string(),
    }
}

fn wait_error(cmd: &CommandSpec, e: std::io::Error) -> CommandError {
    CommandError::Io {
        program: cmd.program.clone(),
        message: e.to_string(),
    }
}

fn missing_pipe(cmd: &CommandSpec) -> CommandError {
    CommandError::Io {
        program: cmd.program.clone(),
        message: "output pipe was not captured".to_string(),
    }
}

/// Exit code of a finished child; a signal-terminated child maps to 128 + signal
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
