use super::{validate_key, BlobStore};
use crate::error::{ClientError, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

const NO_MATCH: &[&str] = &["No URLs matched", "matched no objects"];

/// Cloud storage accessed through the `gsutil` command line tool.
pub struct GsutilStore {
    root: String,
    program: String,
}

impl GsutilStore {
    pub fn new(root: &str, program: &str) -> Self {
        Self {
            root: root.trim_end_matches('/').to_string(),
            program: program.to_string(),
        }
    }

    fn url(&self, key: &str) -> Result<String> {
        validate_key(key)?;
        Ok(format!("{}/{}", self.root, key))
    }

    fn gsutil(&self, args: &[&str]) -> Result<Output> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        r8ci_core::logging::log_and_print_command(&cmd);
        cmd.output().map_err(|e| {
            ClientError::Executor(r8ci_executor::ExecutorError::CommandFailed {
                command: self.program.clone(),
                source: e,
            })
        })
    }

    fn checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.gsutil(args)?;
        if !output.status.success() {
            return Err(self.failure(args, &output));
        }
        Ok(output)
    }

    fn failure(&self, args: &[&str], output: &Output) -> ClientError {
        ClientError::StoreCommandFailed {
            command: format!("{} {}", self.program, args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    fn is_no_match(output: &Output) -> bool {
        let stderr = String::from_utf8_lossy(&output.stderr);
        NO_MATCH.iter().any(|needle| stderr.contains(needle))
    }
}

impl BlobStore for GsutilStore {
    fn exists(&self, key: &str) -> Result<bool> {
        let url = self.url(key)?;
        let args = ["ls", url.as_str()];
        let output = self.gsutil(&args)?;
        if output.status.success() {
            return Ok(true);
        }
        if Self::is_no_match(&output) {
            return Ok(false);
        }
        Err(self.failure(&args, &output))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let url = self.url(key)?;
        let mut tmp = tempfile::NamedTempFile::new()?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        let src = tmp.path().to_string_lossy().to_string();
        self.checked(&["cp", src.as_str(), url.as_str()])?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let url = self.url(key)?;
        let args = ["cat", url.as_str()];
        let output = self.gsutil(&args)?;
        if output.status.success() {
            return Ok(output.stdout);
        }
        if Self::is_no_match(&output) {
            return Err(ClientError::BlobNotFound(url));
        }
        Err(self.failure(&args, &output))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let url = self.url(key)?;
        let args = ["rm", url.as_str()];
        let output = self.gsutil(&args)?;
        if output.status.success() || Self::is_no_match(&output) {
            return Ok(());
        }
        Err(self.failure(&args, &output))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let url = self.url(prefix)?;
        let args = ["ls", url.as_str()];
        let output = self.gsutil(&args)?;
        if !output.status.success() {
            if Self::is_no_match(&output) {
                return Ok(Vec::new());
            }
            return Err(self.failure(&args, &output));
        }
        let root = format!("{}/", self.root);
        let keys = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| line.strip_prefix(&root).unwrap_or(line).to_string())
            .collect();
        Ok(keys)
    }

    fn describe(&self, key: &str) -> String {
        format!("{}/{}", self.root, key)
    }

    fn download(&self, key: &str, dest: &Path) -> Result<()> {
        let url = self.url(key)?;
        if let Some(parent) = dest.parent() {
            fs_err::create_dir_all(parent)?;
        }
        let dest = dest.to_string_lossy().to_string();
        self.checked(&["cp", url.as_str(), dest.as_str()])?;
        Ok(())
    }
}
