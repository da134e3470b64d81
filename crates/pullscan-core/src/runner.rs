//! Narrow seam around child-process execution.
//!
//! The orchestrator only ever sees [`ProcessRunner`], so tests can script
//! exit codes without a scanner installed.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::RunError;

/// A single program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<OsString>,
    /// Working directory for the child.
    pub working_dir: PathBuf,
    /// Kill the child and fail if it runs longer than this.
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Start building an invocation of `program` in `working_dir`.
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            timeout: None,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Bound the run time.
    #[must_use]
    pub const fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// True if `flag` appears among the arguments.
    pub fn has_arg(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    /// The argument following `flag`, if any.
    pub fn arg_after(&self, flag: &str) -> Option<&OsString> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
    }
}

/// What a finished child produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` if the child was killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured stdout.
    pub stdout: Vec<u8>,
    /// Captured stderr.
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// Stdout followed by stderr, lossily decoded, for diagnostics.
    pub fn combined(&self) -> String {
        let mut out = String::from_utf8_lossy(&self.stdout).into_owned();
        out.push_str(&String::from_utf8_lossy(&self.stderr));
        out
    }
}

/// Runs programs to completion and captures their output.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `invocation` and wait for it to exit.
    ///
    /// A non-zero exit is not an error here; it is reported through
    /// [`ProcessOutput::exit_code`].
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, RunError>;
}

#[async_trait]
impl<R: ProcessRunner + ?Sized> ProcessRunner for Arc<R> {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, RunError> {
        (**self).run(invocation).await
    }
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

#[async_trait]
impl ProcessRunner for TokioRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, RunError> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let started = Instant::now();
        let output = command.output();
        let output = match invocation.timeout {
            // Dropping the pending future kills the child.
            Some(limit) => tokio::time::timeout(limit, output)
                .await
                .map_err(|_| RunError::Timeout {
                    program: invocation.program.clone(),
                    after: limit,
                })?,
            None => output.await,
        }
        .map_err(|source| RunError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        debug!(
            program = %invocation.program,
            exit_code = ?output.status.code(),
            elapsed_ms = started.elapsed().as_millis(),
            "process finished"
        );

        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
