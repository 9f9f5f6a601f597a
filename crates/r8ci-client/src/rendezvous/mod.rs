//! The bot/tester handshake over a shared blob store.

mod bot;
mod markers;
mod record;
mod tester;

pub use bot::{Bot, BotOutcome, RequestReceipt};
pub use markers::MarkerChannel;
pub use record::RecordChannel;
pub use tester::{CommandReport, RunReport, Tester, TesterExit, TesterOptions, TesterStep};

use crate::error::Result;
use crate::store::BlobStore;
use r8ci_core::config::ChannelLayout;
use r8ci_core::model::{CommitHash, MarkerName};
use r8ci_core::protocol::{ProtocolEvent, ProtocolState};
use std::sync::Arc;

/// What a party saw when it looked at the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Settled(ProtocolState),
    /// More than one marker is present, which no legal transition produces.
    Conflicting(Vec<(MarkerName, CommitHash)>),
}

impl Observation {
    pub fn state(&self) -> Option<&ProtocolState> {
        match self {
            Observation::Settled(state) => Some(state),
            Observation::Conflicting(_) => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Observation::Settled(ProtocolState::Idle))
    }

    /// Commit in TESTING_COMPLETE, if any, even among conflicting markers.
    pub fn completed(&self) -> Option<&CommitHash> {
        match self {
            Observation::Settled(ProtocolState::Done { commit }) => Some(commit),
            Observation::Settled(_) => None,
            Observation::Conflicting(markers) => markers
                .iter()
                .find(|(name, _)| *name == MarkerName::TestingComplete)
                .map(|(_, commit)| commit),
        }
    }
}

impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Observation::Settled(state) => write!(f, "{}", state),
            Observation::Conflicting(markers) => {
                let parts: Vec<String> = markers
                    .iter()
                    .map(|(name, commit)| format!("{}={}", name, commit))
                    .collect();
                write!(f, "conflicting ({})", parts.join(", "))
            }
        }
    }
}

/// Persistence of the protocol state.
///
/// `apply` validates `event` against `current` with the state machine and then
/// writes the result, refusing if the stored state no longer matches `current`.
pub trait StateChannel: Send + Sync {
    fn observe(&self) -> Result<Observation>;
    fn apply(&self, current: &ProtocolState, event: ProtocolEvent) -> Result<ProtocolState>;
    /// Remove every trace of state and report which markers were present.
    fn clear(&self) -> Result<Vec<MarkerName>>;
    fn describe(&self) -> String;
}

pub fn open_channel(
    layout: ChannelLayout,
    store: Arc<dyn BlobStore>,
    namespace: &str,
) -> Arc<dyn StateChannel> {
    match layout {
        ChannelLayout::Record => Arc::new(RecordChannel::new(store, namespace)),
        ChannelLayout::Markers => Arc::new(MarkerChannel::new(store, namespace)),
    }
}
