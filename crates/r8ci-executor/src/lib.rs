mod error;

pub use error::{ExecutorError, Result};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use r8ci_core::constants::timing;
use r8ci_core::model::CommandOutcome;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command as TokioCommand};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl ExecutionRequest {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            argv: argv.into_iter().map(|s| s.as_ref().to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_string(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn display(&self) -> String {
        self.argv.join(" ")
    }

    fn build_command(&self) -> Result<TokioCommand> {
        let (program, args) = self.argv.split_first().ok_or(ExecutorError::EmptyCommand)?;
        let mut cmd = TokioCommand::new(program);
        cmd.args(args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        Ok(cmd)
    }
}

/// Runs one external command to completion or until its timeout expires.
///
/// A non-zero exit is data, not an error: only failing to start the command
/// is reported through `Err`.
pub trait CommandRunner: Send + Sync {
    fn run(&self, request: &ExecutionRequest) -> Result<CommandOutcome>;
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    grace: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(timing::TERMINATE_GRACE_SECS),
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buf).await {
            tracing::debug!("Failed to read child output: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time between SIGTERM and SIGKILL for a command that overran its timeout.
    pub fn with_grace(grace: Duration) -> Self {
        Self { grace }
    }

    pub async fn run_async(&self, request: &ExecutionRequest) -> Result<CommandOutcome> {
        let mut cmd = request.build_command()?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        r8ci_core::logging::log_and_print_command(cmd.as_std());

        let mut child = cmd.spawn().map_err(|e| ExecutorError::CommandFailed {
            command: request.display(),
            source: e,
        })?;

        let group = child.id().map(|pid| Pid::from_raw(pid as i32));
        let mut stdout_task = tokio::spawn(read_all(child.stdout.take()));
        let mut stderr_task = tokio::spawn(read_all(child.stderr.take()));

        // The deadline covers the readers too: a backgrounded grandchild can
        // keep the pipes open long after the direct child exited.
        let mut status = None;
        let mut stdout = None;
        let mut stderr = None;
        let finished = {
            let run = async {
                status = Some(child.wait().await?);
                stdout = Some((&mut stdout_task).await.unwrap_or_default());
                stderr = Some((&mut stderr_task).await.unwrap_or_default());
                Ok::<(), std::io::Error>(())
            };
            match request.timeout {
                Some(limit) => tokio::time::timeout(limit, run).await.ok(),
                None => Some(run.await),
            }
        };

        let timed_out = match finished {
            Some(result) => {
                result?;
                false
            }
            None => {
                tracing::warn!(
                    "Command '{}' exceeded its timeout of {}s, terminating.",
                    request.display(),
                    request.timeout.map_or(0, |limit| limit.as_secs())
                );
                if status.is_none() {
                    self.terminate(&mut child, group).await?;
                } else if let Some(group) = group {
                    signal_group(group, Signal::SIGTERM);
                }
                true
            }
        };

        let (stdout, stderr) = tokio::join!(
            self.drain(stdout, stdout_task),
            self.drain(stderr, stderr_task)
        );
        if timed_out {
            if let Some(group) = group {
                signal_group(group, Signal::SIGKILL);
            }
        }

        Ok(CommandOutcome {
            exit_code: if timed_out {
                None
            } else {
                status.and_then(|s| s.code())
            },
            stdout,
            stderr,
            timed_out,
        })
    }

    /// Output of a reader that already finished, or whatever it yields
    /// within the grace period once the group has been signalled.
    async fn drain(&self, done: Option<String>, task: tokio::task::JoinHandle<String>) -> String {
        if let Some(output) = done {
            return output;
        }
        match tokio::time::timeout(self.grace, task).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => String::new(),
        }
    }

    async fn terminate(&self, child: &mut Child, group: Option<Pid>) -> Result<()> {
        let Some(group) = group else {
            return Ok(());
        };
        signal_group(group, Signal::SIGTERM);
        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(status) => {
                status?;
            }
            Err(_) => {
                tracing::warn!("Process group {} ignored SIGTERM, killing.", group);
                signal_group(group, Signal::SIGKILL);
                child.kill().await?;
            }
        }
        Ok(())
    }
}

fn signal_group(group: Pid, signal: Signal) {
    // ESRCH once every member is gone.
    if let Err(errno) = killpg(group, signal) {
        tracing::debug!("{} to process group {} failed: {}", signal, group, errno);
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, request: &ExecutionRequest) -> Result<CommandOutcome> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        rt.block_on(self.run_async(request))
    }
}
