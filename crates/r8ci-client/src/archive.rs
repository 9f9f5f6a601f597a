use crate::error::Result;
use crate::store::{join_key, BlobStore};
use r8ci_core::constants::archive;
use r8ci_core::model::{CommandOutcome, CommitHash, TestCommand, TestRunStatus};
use std::sync::Arc;

/// Logs of one failing command as stored by the tester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedLog {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exitcode: String,
    pub timed_out: String,
}

/// Per-commit results: `<commit>/status` plus one directory per failed command.
#[derive(Clone)]
pub struct ResultArchive {
    store: Arc<dyn BlobStore>,
}

impl ResultArchive {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    fn status_key(commit: &CommitHash) -> String {
        join_key(commit.as_str(), archive::STATUS)
    }

    pub fn write_status(&self, commit: &CommitHash, status: TestRunStatus) -> Result<()> {
        let key = Self::status_key(commit);
        tracing::info!("Writing status {} to {}", status, self.store.describe(&key));
        self.store.put(&key, status.to_string().as_bytes())
    }

    pub fn read_status(&self, commit: &CommitHash) -> Result<TestRunStatus> {
        let raw = self.store.get_string(&Self::status_key(commit))?;
        Ok(raw.parse::<TestRunStatus>()?)
    }

    pub fn has_status(&self, commit: &CommitHash) -> Result<bool> {
        self.store.exists(&Self::status_key(commit))
    }

    pub fn archive_failure(
        &self,
        commit: &CommitHash,
        command: &TestCommand,
        outcome: &CommandOutcome,
    ) -> Result<()> {
        let dir = join_key(commit.as_str(), &command.sanitized_name());
        tracing::info!(
            "Archiving logs of '{}' to {}",
            command.display(),
            self.store.describe(&dir)
        );
        let exitcode = outcome.exit_code_display();
        let timed_out = if outcome.timed_out { "True" } else { "False" };
        let files: [(&str, &[u8]); 4] = [
            (archive::STDOUT, outcome.stdout.as_bytes()),
            (archive::STDERR, outcome.stderr.as_bytes()),
            (archive::EXITCODE, exitcode.as_bytes()),
            (archive::TIMED_OUT, timed_out.as_bytes()),
        ];
        for (name, bytes) in files {
            self.store.put(&join_key(&dir, name), bytes)?;
        }
        Ok(())
    }

    pub fn fetch_logs(&self, commit: &CommitHash) -> Result<Vec<ArchivedLog>> {
        let mut logs = Vec::new();
        for entry in self.store.list(&format!("{}/", commit))? {
            let Some(dir) = entry.strip_suffix('/') else {
                continue;
            };
            let command = dir.rsplit('/').next().unwrap_or(dir).to_string();
            if command == archive::FIND_MIN_XMX {
                continue;
            }
            let read = |name: &str| -> Result<String> {
                Ok(self
                    .store
                    .get_optional(&join_key(dir, name))?
                    .unwrap_or_default())
            };
            logs.push(ArchivedLog {
                stdout: read(archive::STDOUT)?,
                stderr: read(archive::STDERR)?,
                exitcode: read(archive::EXITCODE)?,
                timed_out: read(archive::TIMED_OUT)?,
                command,
            });
        }
        Ok(logs)
    }

    /// `(app, range)` pairs written by the memory bisection runs.
    pub fn min_memory_ranges(&self, commit: &CommitHash) -> Result<Vec<(String, String)>> {
        let prefix = format!("{}/{}/", commit, archive::FIND_MIN_XMX);
        let mut ranges = Vec::new();
        for key in self.store.list(&prefix)? {
            if key.ends_with('/') {
                continue;
            }
            let app = key.rsplit('/').next().unwrap_or(&key).to_string();
            ranges.push((app, self.store.get_string(&key)?));
        }
        Ok(ranges)
    }
}
