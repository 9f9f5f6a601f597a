use crate::constants::markers;
use crate::errors::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CommitHash(pub String);

impl CommitHash {
    pub fn new(hash: impl AsRef<str>) -> Self {
        Self(hash.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CommitHash {
    fn from(s: &str) -> Self {
        CommitHash::new(s)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarkerName {
    ReadyForTesting,
    Testing,
    TestingComplete,
}

impl MarkerName {
    pub const ALL: [MarkerName; 3] = [
        MarkerName::ReadyForTesting,
        MarkerName::Testing,
        MarkerName::TestingComplete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerName::ReadyForTesting => markers::READY_FOR_TESTING,
            MarkerName::Testing => markers::TESTING,
            MarkerName::TestingComplete => markers::TESTING_COMPLETE,
        }
    }
}

impl fmt::Display for MarkerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one tester run: `0` is success, anything else counts failed commands.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Default)]
pub struct TestRunStatus(pub u32);

impl TestRunStatus {
    pub const SUCCESS: TestRunStatus = TestRunStatus(0);

    pub fn from_failures(failures: usize) -> Self {
        TestRunStatus(u32::try_from(failures).unwrap_or(u32::MAX))
    }

    pub fn is_success(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TestRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TestRunStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(TestRunStatus)
            .map_err(|_| ProtocolError::MalformedStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCommand {
    pub name: String,
    pub argv: Vec<String>,
}

impl TestCommand {
    pub fn new<I, S>(name: &str, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.to_string(),
            argv: argv.into_iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    /// Directory name under which this command's logs are archived.
    pub fn sanitized_name(&self) -> String {
        let source = if self.name.is_empty() {
            self.argv.join("_")
        } else {
            self.name.clone()
        };
        source
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Outcome recorded for a command that could not be started at all.
    pub fn launch_failure(message: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: message.into(),
            timed_out: false,
        }
    }

    pub fn exit_code_display(&self) -> String {
        match self.exit_code {
            Some(code) => code.to_string(),
            None => "None".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    pub prefix: String,
    pub artifact: String,
}

impl ArtifactLayout {
    pub fn new(prefix: &str, artifact: &str) -> Self {
        Self {
            prefix: prefix.trim_matches('/').to_string(),
            artifact: artifact.to_string(),
        }
    }

    pub fn listing_prefix(&self) -> String {
        format!("{}/", self.prefix)
    }

    pub fn destination_dir_for(&self, hash: &CommitHash) -> String {
        format!("{}/{}/", self.prefix, hash)
    }

    pub fn destination_for(&self, hash: &CommitHash) -> String {
        format!("{}{}", self.destination_dir_for(hash), self.artifact)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommit {
    git_hash: CommitHash,
    destination_dir: String,
    destination: String,
    timestamp: i64,
}

impl GitCommit {
    pub fn new(git_hash: CommitHash, timestamp: i64, layout: &ArtifactLayout) -> Self {
        Self {
            destination_dir: layout.destination_dir_for(&git_hash),
            destination: layout.destination_for(&git_hash),
            git_hash,
            timestamp,
        }
    }

    pub fn git_hash(&self) -> &CommitHash {
        &self.git_hash
    }

    pub fn destination_dir(&self) -> &str {
        &self.destination_dir
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn output_label(&self) -> String {
        format!("{}_{}", self.timestamp, self.git_hash)
    }
}
