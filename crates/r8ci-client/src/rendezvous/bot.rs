use super::{Observation, StateChannel};
use crate::archive::ResultArchive;
use crate::error::{ClientError, Result};
use r8ci_core::clock::Clock;
use r8ci_core::errors::ProtocolError;
use r8ci_core::model::{CommitHash, MarkerName, TestRunStatus};
use r8ci_core::protocol::{ProtocolEvent, ProtocolState};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestReceipt {
    pub commit: CommitHash,
    /// Markers of an earlier run that were thrown away to make room.
    pub cleared: Vec<MarkerName>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotOutcome {
    pub commit: CommitHash,
    pub status: TestRunStatus,
    pub cleared: Vec<MarkerName>,
}

impl BotOutcome {
    pub fn exit_code(&self) -> i32 {
        if self.status.is_success() {
            0
        } else {
            1
        }
    }

    pub fn hint(&self) -> String {
        format!("r8ci print-logs {}", self.commit)
    }
}

/// The requesting side: hands one commit to the tester and waits for its status.
pub struct Bot {
    channel: Arc<dyn StateChannel>,
    archive: ResultArchive,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl Bot {
    pub fn new(
        channel: Arc<dyn StateChannel>,
        archive: ResultArchive,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            channel,
            archive,
            clock,
            poll_interval,
        }
    }

    pub fn request(&self, commit: &CommitHash) -> Result<RequestReceipt> {
        let observation = match self.channel.observe() {
            Ok(observation) => Some(observation),
            Err(ClientError::Protocol(
                e @ (ProtocolError::MalformedRecord(_) | ProtocolError::UnsupportedRecordFormat(_)),
            )) => {
                tracing::error!(
                    "Cannot read the state in {} ({}), discarding it before requesting {}.",
                    self.channel.describe(),
                    e,
                    commit
                );
                None
            }
            Err(e) => return Err(e),
        };
        let cleared = match observation {
            None => self.channel.clear()?,
            Some(observation) if !observation.is_idle() => {
                tracing::error!(
                    "Test channel is not idle ({}), clearing it before requesting {}. \
                     Results of the previous run are lost.",
                    observation,
                    commit
                );
                self.channel.clear()?
            }
            Some(_) => Vec::new(),
        };

        self.channel
            .apply(&ProtocolState::Idle, ProtocolEvent::Request(commit.clone()))?;
        tracing::info!("Requested testing of {} in {}", commit, self.channel.describe());
        Ok(RequestReceipt {
            commit: commit.clone(),
            cleared,
        })
    }

    pub fn wait_for_result(&self, commit: &CommitHash, timeout: Duration) -> Result<TestRunStatus> {
        let start = self.clock.now();
        loop {
            let observation = self.channel.observe()?;
            if let Some(completed) = observation.completed() {
                if completed != commit {
                    return Err(ProtocolError::CommitMismatch {
                        expected: commit.clone(),
                        found: completed.clone(),
                    }
                    .into());
                }
                let status = self.archive.read_status(commit)?;
                let done = match observation {
                    Observation::Settled(state) => state,
                    Observation::Conflicting(_) => ProtocolState::Done {
                        commit: commit.clone(),
                    },
                };
                self.channel
                    .apply(&done, ProtocolEvent::Acknowledge(commit.clone()))?;
                tracing::info!("Test result for {}: status {}", commit, status);
                return Ok(status);
            }

            let waited = self.clock.elapsed_since(start);
            if waited >= timeout {
                return Err(ProtocolError::BotTimeout {
                    commit: commit.clone(),
                    waited,
                }
                .into());
            }
            tracing::debug!(
                "Waiting for {} ({}s of {}s): {}",
                commit,
                waited.as_secs(),
                timeout.as_secs(),
                observation
            );
            self.clock.sleep(self.poll_interval);
        }
    }

    pub fn run(&self, commit: &CommitHash, timeout: Duration) -> Result<BotOutcome> {
        let receipt = self.request(commit)?;
        let status = self.wait_for_result(commit, timeout)?;
        Ok(BotOutcome {
            commit: receipt.commit,
            status,
            cleared: receipt.cleared,
        })
    }
}
