use crate::error::CliError;
use r8ci_client::{
    open_channel, open_store, BlobStore, GitRepo, ResultArchive, StateChannel, Tester,
    TesterOptions,
};
use r8ci_core::clock::SystemClock;
use r8ci_core::config::Config;
use r8ci_core::digest::SourceWatch;
use r8ci_executor::ProcessRunner;
use std::path::PathBuf;
use std::sync::Arc;

pub mod historic;
pub mod print_logs;
pub mod status;
pub mod supervise;
pub mod tester;
pub mod trigger;

pub struct AppContext {
    pub config: Config,
    /// `--config` as given on the command line, passed on to worker processes.
    pub config_arg: Option<PathBuf>,
    pub verbose: u8,
}

impl AppContext {
    pub fn new(config: Config, config_arg: Option<PathBuf>, verbose: u8) -> Self {
        Self {
            config,
            config_arg,
            verbose,
        }
    }

    pub fn store(&self) -> Result<Arc<dyn BlobStore>, CliError> {
        Ok(open_store(&self.config.storage)?)
    }

    pub fn channel(&self, store: Arc<dyn BlobStore>) -> Arc<dyn StateChannel> {
        open_channel(self.config.protocol.layout, store, "")
    }

    /// The running binary, the config file and any configured extra paths.
    fn source_watch(&self) -> Result<SourceWatch, CliError> {
        let mut paths = Vec::new();
        match std::env::current_exe() {
            Ok(exe) => paths.push(exe),
            Err(e) => tracing::warn!("Cannot locate the running executable: {}", e),
        }
        if let Some(source) = &self.config.source {
            paths.push(source.clone());
        }
        paths.extend(self.config.tester.watch_paths());
        Ok(SourceWatch::snapshot(paths)?)
    }

    pub fn tester(&self) -> Result<Tester, CliError> {
        let store = self.store()?;
        let tester_config = &self.config.tester;
        let repo = tester_config.repo_path();
        let options = TesterOptions {
            repo: repo.clone(),
            main_branch: tester_config.main_branch.clone(),
            run_timeout: tester_config.run_timeout(),
            poll_interval: tester_config.poll_interval(),
            commands: tester_config.commands.clone(),
            watch: self.source_watch()?,
        };
        Ok(Tester::new(
            self.channel(store.clone()),
            ResultArchive::new(store),
            Arc::new(GitRepo::new(repo)),
            Arc::new(ProcessRunner::new()),
            Arc::new(SystemClock),
            options,
        ))
    }
}
