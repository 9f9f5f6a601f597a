use super::{Observation, StateChannel};
use crate::error::{ClientError, Result};
use crate::store::{join_key, BlobStore};
use r8ci_core::constants::markers;
use r8ci_core::errors::ProtocolError;
use r8ci_core::model::MarkerName;
use r8ci_core::protocol::{ProtocolEvent, ProtocolState, StateRecord};
use std::sync::Arc;

/// One versioned JSON record; `Idle` is the absence of the record.
pub struct RecordChannel {
    store: Arc<dyn BlobStore>,
    key: String,
}

impl RecordChannel {
    pub fn new(store: Arc<dyn BlobStore>, namespace: &str) -> Self {
        Self {
            key: join_key(namespace, markers::STATE),
            store,
        }
    }

    pub fn read_record(&self) -> Result<Option<StateRecord>> {
        match self.store.get(&self.key) {
            Ok(bytes) => Ok(Some(StateRecord::decode(&bytes)?)),
            Err(ClientError::BlobNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn state_of(record: &Option<StateRecord>) -> ProtocolState {
        record
            .as_ref()
            .map(|r| r.state.clone())
            .unwrap_or_default()
    }
}

impl StateChannel for RecordChannel {
    fn observe(&self) -> Result<Observation> {
        let record = self.read_record()?;
        Ok(Observation::Settled(Self::state_of(&record)))
    }

    fn apply(&self, current: &ProtocolState, event: ProtocolEvent) -> Result<ProtocolState> {
        let next = current.transition(&event)?;

        let stored = self.read_record()?;
        let stored_state = Self::state_of(&stored);
        if &stored_state != current {
            return Err(ProtocolError::ConcurrentUpdate {
                expected: current.clone(),
                found: stored_state.to_string(),
            }
            .into());
        }

        if next.is_idle() {
            tracing::debug!("Removing {}", self.describe());
            self.store.delete(&self.key)?;
        } else {
            let record = match &stored {
                Some(record) => record.next(next.clone()),
                None => StateRecord::initial(next.clone()),
            };
            tracing::debug!(
                "Writing {} (generation {}) to {}",
                next,
                record.generation,
                self.describe()
            );
            self.store.put(&self.key, &record.encode()?)?;
        }
        Ok(next)
    }

    fn clear(&self) -> Result<Vec<MarkerName>> {
        let cleared = match self.read_record() {
            Ok(record) => Self::state_of(&record).marker().into_iter().collect(),
            Err(ClientError::Protocol(e)) => {
                tracing::warn!("Discarding unreadable state record: {}", e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        self.store.delete(&self.key)?;
        Ok(cleared)
    }

    fn describe(&self) -> String {
        self.store.describe(&self.key)
    }
}
