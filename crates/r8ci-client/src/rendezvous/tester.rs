use super::{Observation, StateChannel};
use crate::archive::ResultArchive;
use crate::error::{ClientError, Result};
use crate::vcs::Vcs;
use r8ci_core::clock::Clock;
use r8ci_core::digest::SourceWatch;
use r8ci_core::errors::ProtocolError;
use r8ci_core::model::{CommandOutcome, CommitHash, TestCommand, TestRunStatus};
use r8ci_core::protocol::{ProtocolEvent, ProtocolState};
use r8ci_executor::{CommandRunner, ExecutionRequest};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TesterOptions {
    pub repo: PathBuf,
    pub main_branch: String,
    pub run_timeout: Duration,
    pub poll_interval: Duration,
    pub commands: Vec<TestCommand>,
    /// Files whose modification makes the worker ask for a restart.
    pub watch: SourceWatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TesterStep {
    Idle,
    Claimed(CommitHash),
    /// Work this tester had already claimed before it was restarted.
    Resumed(CommitHash),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TesterExit {
    Stopped,
    Restart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub command: TestCommand,
    pub outcome: CommandOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub status: TestRunStatus,
    pub commands: Vec<CommandReport>,
    /// The commit could not be checked out and nothing was run.
    pub skipped: bool,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = &CommandReport> {
        self.commands.iter().filter(|r| !r.outcome.success())
    }
}

pub struct Tester {
    channel: Arc<dyn StateChannel>,
    archive: ResultArchive,
    vcs: Arc<dyn Vcs>,
    runner: Arc<dyn CommandRunner>,
    clock: Arc<dyn Clock>,
    options: TesterOptions,
}

impl Tester {
    pub fn new(
        channel: Arc<dyn StateChannel>,
        archive: ResultArchive,
        vcs: Arc<dyn Vcs>,
        runner: Arc<dyn CommandRunner>,
        clock: Arc<dyn Clock>,
        options: TesterOptions,
    ) -> Self {
        Self {
            channel,
            archive,
            vcs,
            runner,
            clock,
            options,
        }
    }

    pub fn options(&self) -> &TesterOptions {
        &self.options
    }

    pub fn poll_once(&self) -> Result<TesterStep> {
        match self.channel.observe()? {
            Observation::Conflicting(markers) => {
                Err(ProtocolError::ConflictingMarkers(markers).into())
            }
            Observation::Settled(ProtocolState::Requested { commit }) => {
                let requested = ProtocolState::Requested {
                    commit: commit.clone(),
                };
                self.channel.apply(&requested, ProtocolEvent::Claim)?;
                tracing::info!("Claimed {} for testing", commit);
                Ok(TesterStep::Claimed(commit))
            }
            Observation::Settled(ProtocolState::InProgress { commit }) => {
                tracing::info!("Resuming {}, claimed before the last restart", commit);
                Ok(TesterStep::Resumed(commit))
            }
            Observation::Settled(_) => Ok(TesterStep::Idle),
        }
    }

    fn ensure_clean(&self) -> Result<()> {
        let diff = self.vcs.current_diff()?;
        if diff.trim().is_empty() {
            Ok(())
        } else {
            Err(ClientError::DirtyWorkingTree { diff })
        }
    }

    fn checkout_main(&self) -> Result<CommitHash> {
        let branch = &self.options.main_branch;
        if !self.vcs.checkout(branch)? {
            return Err(ClientError::GitFailed {
                command: format!("git checkout {}", branch),
                stderr: "checkout refused".to_string(),
            });
        }
        self.vcs.pull()?;
        let head = self.vcs.rev_parse("HEAD")?;
        tracing::info!("{} is at {}", branch, head);
        Ok(head)
    }

    /// Runs the whole test cycle for `commit` and marks it complete.
    pub fn test_commit(&self, commit: &CommitHash) -> Result<RunReport> {
        self.ensure_clean()?;
        self.checkout_main()?;
        self.ensure_clean()?;

        let report = if self.vcs.checkout(commit.as_str())? {
            self.run_commands(commit, true)
        } else {
            tracing::warn!(
                "Could not check out {}, assuming a pending Gerrit change. Recording success without running tests.",
                commit
            );
            RunReport {
                status: TestRunStatus::SUCCESS,
                commands: Vec::new(),
                skipped: true,
            }
        };

        self.archive.write_status(commit, report.status)?;

        let in_progress = ProtocolState::InProgress {
            commit: commit.clone(),
        };
        match self.channel.apply(&in_progress, ProtocolEvent::Complete) {
            Ok(_) => tracing::info!("Finished testing {}: status {}", commit, report.status),
            Err(ClientError::Protocol(ProtocolError::ConcurrentUpdate { found, .. })) => {
                tracing::warn!(
                    "Finished testing {}, but the channel was reset in the meantime ({}). Not marking it complete.",
                    commit,
                    found
                );
            }
            Err(e) => return Err(e),
        }
        Ok(report)
    }

    /// Runs every configured command in the repository. Failing commands are
    /// counted and, with `archive`, their logs are stored under `commit`.
    pub fn run_commands(&self, commit: &CommitHash, archive: bool) -> RunReport {
        let mut commands = Vec::with_capacity(self.options.commands.len());
        let mut failures = 0;

        for command in &self.options.commands {
            let request = ExecutionRequest::new(&command.argv)
                .cwd(&self.options.repo)
                .timeout(self.options.run_timeout);
            tracing::info!("Running {}", command.display());

            let outcome = match self.runner.run(&request) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Could not run {}: {}", command.display(), e);
                    CommandOutcome::launch_failure(e.to_string())
                }
            };

            if outcome.success() {
                tracing::info!("{} passed", command.display());
            } else {
                failures += 1;
                if outcome.timed_out {
                    tracing::warn!(
                        "{} timed out after {}s",
                        command.display(),
                        self.options.run_timeout.as_secs()
                    );
                } else {
                    tracing::warn!(
                        "{} failed with exit code {}",
                        command.display(),
                        outcome.exit_code_display()
                    );
                }
                if archive {
                    if let Err(e) = self.archive.archive_failure(commit, command, &outcome) {
                        tracing::error!("Could not archive logs of {}: {}", command.display(), e);
                    }
                }
            }

            commands.push(CommandReport {
                command: command.clone(),
                outcome,
            });
        }

        RunReport {
            status: TestRunStatus::from_failures(failures),
            commands,
            skipped: false,
        }
    }

    fn sources_changed(&self) -> bool {
        match self.options.watch.changed_files() {
            Ok(changed) if changed.is_empty() => false,
            Ok(changed) => {
                for path in &changed {
                    tracing::info!("{} changed", path.display());
                }
                true
            }
            Err(e) => {
                tracing::warn!("Could not check watched files: {}", e);
                false
            }
        }
    }

    pub fn run_loop(&self, stop: &AtomicBool) -> Result<TesterExit> {
        tracing::info!(
            "Watching {} (sources {})",
            self.channel.describe(),
            self.options.watch.combined_digest()
        );
        loop {
            if stop.load(Ordering::SeqCst) {
                return Ok(TesterExit::Stopped);
            }
            if self.sources_changed() {
                return Ok(TesterExit::Restart);
            }

            match self.poll_once()? {
                TesterStep::Idle => self.clock.sleep(self.options.poll_interval),
                TesterStep::Claimed(commit) | TesterStep::Resumed(commit) => {
                    if self.sources_changed() {
                        tracing::info!("Restarting before testing {}", commit);
                        return Ok(TesterExit::Restart);
                    }
                    self.test_commit(&commit)?;
                }
            }
        }
    }
}
