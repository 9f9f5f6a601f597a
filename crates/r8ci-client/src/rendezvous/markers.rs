use super::{Observation, StateChannel};
use crate::error::{ClientError, Result};
use crate::store::{join_key, BlobStore};
use r8ci_core::errors::ProtocolError;
use r8ci_core::model::{CommitHash, MarkerName};
use r8ci_core::protocol::{ProtocolEvent, ProtocolState};
use std::sync::Arc;

/// Three marker blobs; at most one is expected to exist at a time.
pub struct MarkerChannel {
    store: Arc<dyn BlobStore>,
    namespace: String,
}

impl MarkerChannel {
    pub fn new(store: Arc<dyn BlobStore>, namespace: &str) -> Self {
        Self {
            store,
            namespace: namespace.trim_matches('/').to_string(),
        }
    }

    fn key(&self, marker: MarkerName) -> String {
        join_key(&self.namespace, marker.as_str())
    }

    fn read_marker(&self, marker: MarkerName) -> Result<Option<CommitHash>> {
        Ok(self
            .store
            .get_optional(&self.key(marker))?
            .map(CommitHash::new))
    }

    fn write_marker(&self, marker: MarkerName, commit: &CommitHash) -> Result<()> {
        tracing::debug!("Writing {} = {}", marker, commit);
        self.store.put(&self.key(marker), commit.as_str().as_bytes())
    }

    fn delete_marker(&self, marker: MarkerName) -> Result<()> {
        tracing::debug!("Deleting {}", marker);
        self.store.delete(&self.key(marker))
    }

    fn present(&self) -> Result<Vec<(MarkerName, CommitHash)>> {
        let mut present = Vec::new();
        for marker in MarkerName::ALL {
            if let Some(commit) = self.read_marker(marker)? {
                present.push((marker, commit));
            }
        }
        Ok(present)
    }

    /// The stored marker must still hold the commit `current` refers to.
    fn expect_marker(&self, current: &ProtocolState) -> Result<CommitHash> {
        let (Some(marker), Some(expected)) = (current.marker(), current.commit()) else {
            return Err(ProtocolError::ConcurrentUpdate {
                expected: current.clone(),
                found: "idle".to_string(),
            }
            .into());
        };
        match self.read_marker(marker)? {
            Some(found) if &found == expected => Ok(found),
            Some(found) if marker == MarkerName::ReadyForTesting => {
                Err(ProtocolError::ClaimMismatch {
                    requested: expected.clone(),
                    found,
                }
                .into())
            }
            found => Err(ProtocolError::ConcurrentUpdate {
                expected: current.clone(),
                found: match found {
                    Some(commit) => format!("{} = {}", marker, commit),
                    None => format!("no {}", marker),
                },
            }
            .into()),
        }
    }
}

impl StateChannel for MarkerChannel {
    fn observe(&self) -> Result<Observation> {
        let mut present = self.present()?;
        match present.len() {
            0 => Ok(Observation::Settled(ProtocolState::Idle)),
            1 => {
                let (marker, commit) = present.remove(0);
                Ok(Observation::Settled(ProtocolState::from_marker(marker, commit)))
            }
            _ => Ok(Observation::Conflicting(present)),
        }
    }

    fn apply(&self, current: &ProtocolState, event: ProtocolEvent) -> Result<ProtocolState> {
        let next = current.transition(&event)?;
        match (current, &next) {
            (ProtocolState::Idle, ProtocolState::Requested { commit }) => {
                let present = self.present()?;
                if !present.is_empty() {
                    return Err(ClientError::Protocol(ProtocolError::ConcurrentUpdate {
                        expected: ProtocolState::Idle,
                        found: Observation::Conflicting(present).to_string(),
                    }));
                }
                self.write_marker(MarkerName::ReadyForTesting, commit)?;
            }
            (ProtocolState::Requested { .. }, ProtocolState::InProgress { commit }) => {
                self.expect_marker(current)?;
                self.write_marker(MarkerName::Testing, commit)?;
                self.delete_marker(MarkerName::ReadyForTesting)?;
            }
            (ProtocolState::InProgress { .. }, ProtocolState::Done { commit }) => {
                self.expect_marker(current)?;
                self.write_marker(MarkerName::TestingComplete, commit)?;
                self.delete_marker(MarkerName::Testing)?;
            }
            (ProtocolState::Done { .. }, ProtocolState::Idle) => {
                self.expect_marker(current)?;
                self.delete_marker(MarkerName::TestingComplete)?;
            }
            _ => {}
        }
        Ok(next)
    }

    fn clear(&self) -> Result<Vec<MarkerName>> {
        let mut cleared = Vec::new();
        for marker in MarkerName::ALL {
            if self.store.exists(&self.key(marker))? {
                self.delete_marker(marker)?;
                cleared.push(marker);
            }
        }
        Ok(cleared)
    }

    fn describe(&self) -> String {
        format!("markers under {}", self.store.describe(&self.namespace))
    }
}
