use crate::error::{ClientError, Result};
use r8ci_core::errors::HistoricError;
use r8ci_core::model::CommitHash;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

pub trait Vcs: Send + Sync {
    /// Summary of uncommitted changes; empty when the tree is clean.
    fn current_diff(&self) -> Result<String>;
    /// `Ok(false)` when git refused the checkout (e.g. an unknown revision).
    fn checkout(&self, rev: &str) -> Result<bool>;
    fn pull(&self) -> Result<()>;
    fn rev_parse(&self, rev: &str) -> Result<CommitHash>;
    /// Commits reachable from `from`, newest first.
    fn rev_list(&self, from: &str, first_parent: bool) -> Result<Vec<CommitHash>>;
    /// Committer time in seconds since the epoch.
    fn commit_timestamp(&self, commit: &CommitHash) -> Result<i64>;
}

pub struct GitRepo {
    path: PathBuf,
    program: String,
}

impl GitRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            program: "git".to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn git(&self, args: &[&str]) -> Result<Output> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args).current_dir(&self.path);
        r8ci_core::logging::log_and_print_command(&cmd);
        cmd.output().map_err(|e| {
            ClientError::Executor(r8ci_executor::ExecutorError::CommandFailed {
                command: format!("{} {}", self.program, args.join(" ")),
                source: e,
            })
        })
    }

    fn git_stdout(&self, args: &[&str]) -> Result<String> {
        let output = self.git(args)?;
        if !output.status.success() {
            return Err(ClientError::GitFailed {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Vcs for GitRepo {
    fn current_diff(&self) -> Result<String> {
        self.git_stdout(&["diff", "--stat", "HEAD"])
    }

    fn checkout(&self, rev: &str) -> Result<bool> {
        let output = self.git(&["checkout", rev])?;
        if !output.status.success() {
            tracing::warn!(
                "git checkout {} failed: {}",
                rev,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.status.success())
    }

    fn pull(&self) -> Result<()> {
        self.git_stdout(&["pull"])?;
        Ok(())
    }

    fn rev_parse(&self, rev: &str) -> Result<CommitHash> {
        let stdout = self.git_stdout(&["rev-parse", "--verify", rev])?;
        Ok(CommitHash::new(stdout))
    }

    fn rev_list(&self, from: &str, first_parent: bool) -> Result<Vec<CommitHash>> {
        let mut args = vec!["rev-list"];
        if first_parent {
            args.push("--first-parent");
        }
        args.push(from);
        let stdout = self.git_stdout(&args)?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(CommitHash::new)
            .collect())
    }

    fn commit_timestamp(&self, commit: &CommitHash) -> Result<i64> {
        let stdout = self.git_stdout(&[
            "show",
            "--no-patch",
            "--no-notes",
            "--pretty=%ct",
            commit.as_str(),
        ])?;
        let raw = stdout.trim();
        raw.parse::<i64>()
            .map_err(|_| ClientError::Historic(HistoricError::MalformedTimestamp(raw.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "r8ci")
            .env("GIT_AUTHOR_EMAIL", "r8ci@example.com")
            .env("GIT_COMMITTER_NAME", "r8ci")
            .env("GIT_COMMITTER_EMAIL", "r8ci@example.com")
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    fn init_repo() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        git(dir.path(), &["init", "-q", "-b", "main"]);
        for i in 0..3 {
            fs::write(dir.path().join("file.txt"), format!("v{}", i)).unwrap();
            git(dir.path(), &["add", "file.txt"]);
            git(dir.path(), &["commit", "-q", "-m", &format!("commit {}", i)]);
        }
        dir
    }

    #[test]
    fn test_rev_list_is_newest_first() {
        let dir = init_repo();
        let repo = GitRepo::new(dir.path());

        let head = repo.rev_parse("HEAD").unwrap();
        let commits = repo.rev_list("HEAD", true).unwrap();
        assert_eq!(commits.len(), 3);
        assert_eq!(commits[0], head);
        assert!(repo.commit_timestamp(&head).unwrap() > 0);
    }

    #[test]
    fn test_dirty_tree_has_diff() {
        let dir = init_repo();
        let repo = GitRepo::new(dir.path());
        assert!(repo.current_diff().unwrap().trim().is_empty());

        fs::write(dir.path().join("file.txt"), "dirty").unwrap();
        assert!(!repo.current_diff().unwrap().trim().is_empty());
    }

    #[test]
    fn test_checkout_unknown_revision_returns_false() {
        let dir = init_repo();
        let repo = GitRepo::new(dir.path());
        assert!(!repo.checkout("refs/changes/12/3412/1").unwrap());
        assert!(repo.checkout("HEAD~1").unwrap());
    }
}
