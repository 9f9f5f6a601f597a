//! State machine shared by the bot and the tester.
//!
//! The channel holds at most one unit of work. The bot moves it from `Idle`
//! to `Requested` and back from `Done` to `Idle`; the tester owns the two
//! transitions in between.

use crate::errors::ProtocolError;
use crate::model::{CommitHash, MarkerName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const RECORD_FORMAT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "payload")]
pub enum ProtocolState {
    #[default]
    Idle,
    Requested { commit: CommitHash },
    InProgress { commit: CommitHash },
    Done { commit: CommitHash },
}

impl ProtocolState {
    pub fn commit(&self) -> Option<&CommitHash> {
        match self {
            ProtocolState::Idle => None,
            ProtocolState::Requested { commit }
            | ProtocolState::InProgress { commit }
            | ProtocolState::Done { commit } => Some(commit),
        }
    }

    /// Marker blob that represents this state in the three-file layout.
    pub fn marker(&self) -> Option<MarkerName> {
        match self {
            ProtocolState::Idle => None,
            ProtocolState::Requested { .. } => Some(MarkerName::ReadyForTesting),
            ProtocolState::InProgress { .. } => Some(MarkerName::Testing),
            ProtocolState::Done { .. } => Some(MarkerName::TestingComplete),
        }
    }

    pub fn from_marker(marker: MarkerName, commit: CommitHash) -> Self {
        match marker {
            MarkerName::ReadyForTesting => ProtocolState::Requested { commit },
            MarkerName::Testing => ProtocolState::InProgress { commit },
            MarkerName::TestingComplete => ProtocolState::Done { commit },
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ProtocolState::Idle)
    }

    pub fn transition(&self, event: &ProtocolEvent) -> Result<ProtocolState, ProtocolError> {
        match (self, event) {
            (ProtocolState::Idle, ProtocolEvent::Request(commit)) => Ok(ProtocolState::Requested {
                commit: commit.clone(),
            }),
            (ProtocolState::Requested { commit }, ProtocolEvent::Claim) => {
                Ok(ProtocolState::InProgress {
                    commit: commit.clone(),
                })
            }
            (ProtocolState::InProgress { commit }, ProtocolEvent::Complete) => {
                Ok(ProtocolState::Done {
                    commit: commit.clone(),
                })
            }
            (ProtocolState::Done { commit }, ProtocolEvent::Acknowledge(expected)) => {
                if commit != expected {
                    return Err(ProtocolError::CommitMismatch {
                        expected: expected.clone(),
                        found: commit.clone(),
                    });
                }
                Ok(ProtocolState::Idle)
            }
            _ => Err(ProtocolError::InvalidTransition {
                state: self.clone(),
                event: event.clone(),
            }),
        }
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolState::Idle => write!(f, "idle"),
            ProtocolState::Requested { commit } => write!(f, "requested ({})", commit),
            ProtocolState::InProgress { commit } => write!(f, "in progress ({})", commit),
            ProtocolState::Done { commit } => write!(f, "done ({})", commit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    Request(CommitHash),
    Claim,
    Complete,
    Acknowledge(CommitHash),
}

impl fmt::Display for ProtocolEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolEvent::Request(commit) => write!(f, "request({})", commit),
            ProtocolEvent::Claim => write!(f, "claim"),
            ProtocolEvent::Complete => write!(f, "complete"),
            ProtocolEvent::Acknowledge(commit) => write!(f, "acknowledge({})", commit),
        }
    }
}

/// The persisted form of the channel in the single-record layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub format: u32,
    pub generation: u64,
    pub state: ProtocolState,
    pub updated_at: DateTime<Utc>,
}

impl StateRecord {
    pub fn initial(state: ProtocolState) -> Self {
        Self {
            format: RECORD_FORMAT,
            generation: 1,
            state,
            updated_at: Utc::now(),
        }
    }

    pub fn next(&self, state: ProtocolState) -> Self {
        Self {
            format: RECORD_FORMAT,
            generation: self.generation + 1,
            state,
            updated_at: Utc::now(),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let record: StateRecord = serde_json::from_slice(bytes)?;
        if record.format != RECORD_FORMAT {
            return Err(ProtocolError::UnsupportedRecordFormat(record.format));
        }
        Ok(record)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(hash: &str) -> CommitHash {
        CommitHash::new(hash)
    }

    #[test]
    fn test_full_cycle_returns_to_idle() {
        let commit = c("abc123");
        let state = ProtocolState::Idle
            .transition(&ProtocolEvent::Request(commit.clone()))
            .unwrap();
        assert_eq!(state.marker(), Some(MarkerName::ReadyForTesting));
        let state = state.transition(&ProtocolEvent::Claim).unwrap();
        assert_eq!(state.marker(), Some(MarkerName::Testing));
        let state = state.transition(&ProtocolEvent::Complete).unwrap();
        assert_eq!(state.marker(), Some(MarkerName::TestingComplete));
        let state = state
            .transition(&ProtocolEvent::Acknowledge(commit))
            .unwrap();
        assert!(state.is_idle());
    }

    #[test]
    fn test_acknowledge_other_commit_is_mismatch() {
        let done = ProtocolState::Done { commit: c("other") };
        let err = done
            .transition(&ProtocolEvent::Acknowledge(c("abc123")))
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::CommitMismatch { expected, found }
                if expected == c("abc123") && found == c("other")
        ));
    }

    #[test]
    fn test_out_of_order_events_are_rejected() {
        assert!(ProtocolState::Idle
            .transition(&ProtocolEvent::Claim)
            .is_err());
        let requested = ProtocolState::Requested { commit: c("a") };
        assert!(requested
            .transition(&ProtocolEvent::Request(c("b")))
            .is_err());
        assert!(requested.transition(&ProtocolEvent::Complete).is_err());
    }

    #[test]
    fn test_record_round_trip_keeps_generation() {
        let record = StateRecord::initial(ProtocolState::Requested { commit: c("a") });
        let next = record.next(ProtocolState::InProgress { commit: c("a") });
        let decoded = StateRecord::decode(&next.encode().unwrap()).unwrap();
        assert_eq!(decoded.generation, 2);
        assert_eq!(decoded.state, ProtocolState::InProgress { commit: c("a") });
    }

    #[test]
    fn test_record_rejects_unknown_format() {
        let json = r#"{"format":9,"generation":1,"state":{"type":"Idle"},"updated_at":"2024-01-01T00:00:00Z"}"#;
        assert!(StateRecord::decode(json.as_bytes()).is_err());
    }
}
