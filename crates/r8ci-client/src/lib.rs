pub mod archive;
pub mod error;
pub mod historic;
pub mod rendezvous;
pub mod store;
pub mod vcs;

pub use archive::{ArchivedLog, ResultArchive};
pub use error::{ClientError, Result};
pub use historic::{HistoricEvent, HistoricOptions, HistoricScheduler, HistoricSummary};
pub use rendezvous::{
    open_channel, Bot, BotOutcome, CommandReport, MarkerChannel, Observation, RecordChannel,
    RequestReceipt, RunReport, StateChannel, Tester, TesterExit, TesterOptions, TesterStep,
};
pub use store::{open_store, BlobStore, GsutilStore, LocalStore};
pub use vcs::{GitRepo, Vcs};
