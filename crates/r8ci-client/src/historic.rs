//! Runs an action over archived build artifacts of a commit range.
//!
//! Commits are visited in [`permutation_order`], so that an interrupted run
//! still has an even spread of samples over the range.

use crate::error::Result;
use crate::store::BlobStore;
use crate::vcs::Vcs;
use r8ci_core::errors::HistoricError;
use r8ci_core::model::{ArtifactLayout, CommitHash, GitCommit};
use r8ci_core::permutation::permutation_order;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoricEvent {
    Enumerated { total: usize, available: usize },
    Started { index: usize, commit: GitCommit },
    Skipped { commit: GitCommit },
    Finished { commit: GitCommit },
}

#[derive(Debug, Default)]
pub struct HistoricOptions {
    pub max_runs: Option<usize>,
    pub event_sender: Option<Sender<HistoricEvent>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoricSummary {
    pub enumerated: usize,
    pub available: usize,
    pub visited: Vec<CommitHash>,
    pub skipped: Vec<CommitHash>,
}

pub struct HistoricScheduler {
    store: Arc<dyn BlobStore>,
    vcs: Arc<dyn Vcs>,
    layout: ArtifactLayout,
    download_path: PathBuf,
}

impl HistoricScheduler {
    pub fn new(
        store: Arc<dyn BlobStore>,
        vcs: Arc<dyn Vcs>,
        layout: ArtifactLayout,
        download_path: PathBuf,
    ) -> Self {
        Self {
            store,
            vcs,
            layout,
            download_path,
        }
    }

    /// First-parent history from `top` down to and including `bottom`.
    pub fn enumerate_commits(&self, top: &str, bottom: &str) -> Result<Vec<GitCommit>> {
        let bottom_hash = self.vcs.rev_parse(bottom)?;
        let mut commits = Vec::new();
        let mut reached_bottom = false;
        for hash in self.vcs.rev_list(top, true)? {
            let timestamp = self.vcs.commit_timestamp(&hash)?;
            let is_bottom = hash == bottom_hash;
            commits.push(GitCommit::new(hash, timestamp, &self.layout));
            if is_bottom {
                reached_bottom = true;
                break;
            }
        }
        if !reached_bottom {
            return Err(HistoricError::BottomNotFound {
                top: top.to_string(),
                bottom: bottom.to_string(),
            }
            .into());
        }
        tracing::debug!("Enumerated {} commits from {} to {}", commits.len(), top, bottom);
        Ok(commits)
    }

    /// Keeps the commits that have an artifact directory, using one listing.
    pub fn available_commits(&self, commits: Vec<GitCommit>) -> Result<Vec<GitCommit>> {
        let listed: HashSet<String> = self
            .store
            .list(&self.layout.listing_prefix())?
            .into_iter()
            .collect();
        Ok(commits
            .into_iter()
            .filter(|commit| listed.contains(commit.destination_dir()))
            .collect())
    }

    fn emit(options: &HistoricOptions, event: HistoricEvent) {
        if let Some(sender) = &options.event_sender {
            let _ = sender.send(event);
        }
    }

    pub fn run<F>(
        &self,
        top: &str,
        bottom: &str,
        options: &HistoricOptions,
        mut action: F,
    ) -> Result<HistoricSummary>
    where
        F: FnMut(&GitCommit) -> Result<()>,
    {
        let commits = self.enumerate_commits(top, bottom)?;
        let enumerated = commits.len();
        let available = self.available_commits(commits)?;
        tracing::info!(
            "{} of {} commits have a {} artifact",
            available.len(),
            enumerated,
            self.layout.artifact
        );
        Self::emit(
            options,
            HistoricEvent::Enumerated {
                total: enumerated,
                available: available.len(),
            },
        );

        let mut summary = HistoricSummary {
            enumerated,
            available: available.len(),
            ..Default::default()
        };

        let budget = options.max_runs.unwrap_or(usize::MAX);
        for index in permutation_order(available.len()) {
            if summary.visited.len() >= budget {
                tracing::info!("Reached the limit of {} runs", budget);
                break;
            }
            let commit = &available[index];

            if !self.store.exists(commit.destination())? {
                tracing::debug!("{} disappeared, skipping", commit.destination());
                summary.skipped.push(commit.git_hash().clone());
                Self::emit(options, HistoricEvent::Skipped { commit: commit.clone() });
                continue;
            }

            Self::emit(
                options,
                HistoricEvent::Started {
                    index: summary.visited.len(),
                    commit: commit.clone(),
                },
            );
            tracing::info!(
                "Downloading {} to {}",
                self.store.describe(commit.destination()),
                self.download_path.display()
            );
            self.store.download(commit.destination(), &self.download_path)?;
            action(commit)?;

            summary.visited.push(commit.git_hash().clone());
            Self::emit(options, HistoricEvent::Finished { commit: commit.clone() });
        }
        Ok(summary)
    }
}
