//! External process execution.
//!
//! Every external tool (packager, installer builders, `security`, `codesign`)
//! goes through a [`ProcessRunner`], which keeps the pipeline testable and
//! gives one place for cancellation and output capture.

use crate::bundler::error::{Error, Result};
use async_trait::async_trait;
use std::{fmt, path::PathBuf, process::Stdio, time::Duration};
use tokio_util::sync::CancellationToken;

/// Fully described invocation of an external program.
#[derive(Clone, Debug)]
pub struct ProcessCommand {
    program: String,
    args: Vec<String>,
    sensitive: Vec<usize>,
    current_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl ProcessCommand {
    /// Creates a command for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            sensitive: Vec::new(),
            current_dir: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends an argument that is masked when the command is displayed.
    pub fn sensitive_arg(mut self, arg: impl Into<String>) -> Self {
        self.sensitive.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Adds an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Kills the process if it runs longer than `limit`.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Returns the program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the raw (unredacted) arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Returns the working directory.
    pub fn get_current_dir(&self) -> Option<&PathBuf> {
        self.current_dir.as_ref()
    }

    /// Returns the extra environment variables.
    pub fn get_env(&self) -> &[(String, String)] {
        &self.env
    }
}

impl fmt::Display for ProcessCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for (index, arg) in self.args.iter().enumerate() {
            if self.sensitive.contains(&index) {
                f.write_str(" ******")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Clone, Debug, Default)]
pub struct ProcessOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ProcessOutput {
    /// Output of a process that exited with `code`.
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Default::default()
        }
    }

    /// `true` when the process exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turns a non-zero exit into [`Error::Process`].
    pub fn into_result(self, command: &ProcessCommand) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::Process {
                command: command.to_string(),
                code: self.code,
                stderr: self.stderr,
            })
        }
    }
}

/// Executes external commands.
///
/// `run` resolves once the process has exited; a non-zero exit is reported
/// through [`ProcessOutput::code`], not as an error. Errors are reserved for
/// spawn failures, timeouts and cancellation.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs `command` to completion, capturing its output.
    async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput>;
}

/// Runs `command` and fails with [`Error::Process`] on a non-zero exit.
pub async fn run_checked(
    runner: &dyn ProcessRunner,
    command: &ProcessCommand,
) -> Result<ProcessOutput> {
    runner.run(command).await?.into_result(command)
}

/// [`ProcessRunner`] backed by `tokio::process`.
///
/// Processes are killed when their future is dropped or the runner's
/// cancellation token fires.
#[derive(Clone, Debug, Default)]
pub struct TokioProcessRunner {
    cancel: CancellationToken,
}

impl TokioProcessRunner {
    /// Creates a runner with its own cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ties the runner to an existing cancellation token.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput> {
        log::debug!("Running {}", command);

        let mut process = tokio::process::Command::new(&command.program);
        process
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.current_dir {
            process.current_dir(dir);
        }

        let child = process.spawn().map_err(|error| Error::CommandFailed {
            command: command.program.clone(),
            error,
        })?;

        let wait = async {
            let pending = child.wait_with_output();
            match command.timeout {
                Some(limit) => match tokio::time::timeout(limit, pending).await {
                    Ok(output) => output.map_err(Error::IoError),
                    Err(_) => Err(Error::Process {
                        command: command.to_string(),
                        code: None,
                        stderr: format!("timed out after {}s", limit.as_secs()),
                    }),
                },
                None => pending.await.map_err(Error::IoError),
            }
        };

        let output = tokio::select! {
            output = wait => output?,
            _ = self.cancel.cancelled() => {
                log::warn!("Cancelled {}", command.program);
                return Err(Error::Cancelled);
            }
        };

        let output = ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        log::debug!("{} exited with {:?}", command.program, output.code);
        Ok(output)
    }
}
