use crate::model::{CommitHash, MarkerName};
use crate::protocol::{ProtocolEvent, ProtocolState};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path '{path}': {source}")]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("{0}")]
    General(String),

    #[error("Could not determine HOME directory.")]
    HomeDirectoryNotFound,
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Cannot apply {event} while the test channel is {state}.")]
    InvalidTransition {
        state: ProtocolState,
        event: ProtocolEvent,
    },

    #[error("Expected {expected} in TESTING_COMPLETE, but found {found}. Another run finished in our slot; giving up.")]
    CommitMismatch {
        expected: CommitHash,
        found: CommitHash,
    },

    #[error("Bot timeout: no result for {commit} after {}s.", .waited.as_secs())]
    BotTimeout { commit: CommitHash, waited: Duration },

    #[error("Claimed {requested} from READY_FOR_TESTING, but it now holds {found}.")]
    ClaimMismatch {
        requested: CommitHash,
        found: CommitHash,
    },

    #[error("Conflicting markers present: {}. Delete them by hand to reset the channel.", format_markers(.0))]
    ConflictingMarkers(Vec<(MarkerName, CommitHash)>),

    #[error("Test channel changed underneath us: expected {expected}, found {found}.")]
    ConcurrentUpdate {
        expected: ProtocolState,
        found: String,
    },

    #[error("Malformed state record: {0}")]
    MalformedRecord(#[from] serde_json::Error),

    #[error("Unsupported state record format {0}.")]
    UnsupportedRecordFormat(u32),

    #[error("Malformed test status '{0}'.")]
    MalformedStatus(String),
}

#[derive(Error, Debug)]
pub enum HistoricError {
    #[error("Bottom revision {bottom} not found in the first-parent history of {top}, did you use a merge commit?")]
    BottomNotFound { top: String, bottom: String },

    #[error("Malformed commit timestamp '{0}'.")]
    MalformedTimestamp(String),
}

fn format_markers(markers: &[(MarkerName, CommitHash)]) -> String {
    markers
        .iter()
        .map(|(name, commit)| format!("{}={}", name, commit))
        .collect::<Vec<_>>()
        .join(", ")
}
