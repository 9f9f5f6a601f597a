use crate::constants::timing;
use crate::errors::ConfigError;
use crate::model::{ArtifactLayout, TestCommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub max_files: usize,
    pub max_age_days: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_age_days: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Gsutil,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub root: String,
    pub gsutil: String,
}

impl StorageConfig {
    fn with_root(root: &str) -> Self {
        Self {
            backend: StorageBackend::Gsutil,
            root: root.to_string(),
            gsutil: "gsutil.py".to_string(),
        }
    }

    pub fn local_root(&self) -> PathBuf {
        expand_path(&self.root)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::with_root("gs://r8-internal-test-results")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    /// One versioned JSON record under a single key.
    #[default]
    Record,
    /// READY_FOR_TESTING / TESTING / TESTING_COMPLETE blobs.
    Markers,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProtocolConfig {
    pub layout: ChannelLayout,
    pub poll_interval_secs: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            layout: ChannelLayout::Record,
            poll_interval_secs: timing::PULL_DELAY_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TesterConfig {
    pub repo: String,
    pub main_branch: String,
    pub run_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub watch_paths: Vec<String>,
    pub commands: Vec<TestCommand>,
}

impl TesterConfig {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// How long the bot waits before declaring the tester hung.
    pub fn bot_timeout(&self) -> Duration {
        self.run_timeout()
            .saturating_mul(u32::try_from(self.commands.len()).unwrap_or(u32::MAX))
    }

    pub fn repo_path(&self) -> PathBuf {
        expand_path(&self.repo)
    }

    pub fn watch_paths(&self) -> Vec<PathBuf> {
        self.watch_paths.iter().map(|p| expand_path(p)).collect()
    }
}

pub fn default_test_commands() -> Vec<TestCommand> {
    vec![
        TestCommand::new(
            "test.py",
            [
                "tools/test.py",
                "--only_internal",
                "--slow_tests",
                "--java_max_memory_size=8G",
            ],
        ),
        TestCommand::new(
            "run_on_app.py",
            [
                "tools/run_on_app.py",
                "--run-all",
                "--out=out",
                "--workers",
                "3",
            ],
        ),
    ]
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            repo: ".".to_string(),
            main_branch: "main".to_string(),
            run_timeout_secs: timing::RUN_TIMEOUT_SECS,
            poll_interval_secs: timing::PULL_DELAY_SECS,
            watch_paths: Vec::new(),
            commands: default_test_commands(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HistoricConfig {
    pub storage: StorageConfig,
    pub prefix: String,
    pub artifact: String,
    pub download_path: String,
    pub output_dir: String,
}

impl HistoricConfig {
    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(&self.prefix, &self.artifact)
    }

    pub fn download_path(&self) -> PathBuf {
        expand_path(&self.download_path)
    }

    pub fn output_dir(&self) -> PathBuf {
        expand_path(&self.output_dir)
    }
}

impl Default for HistoricConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::with_root("gs://r8-releases/raw"),
            prefix: "main".to_string(),
            artifact: "r8.jar".to_string(),
            download_path: "build/libs/r8.jar".to_string(),
            output_dir: "build/historic".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub protocol: ProtocolConfig,
    pub tester: TesterConfig,
    pub historic: HistoricConfig,
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.protocol.poll_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "protocol.poll_interval_secs must be positive".to_string(),
            ));
        }
        if self.tester.run_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "tester.run_timeout_secs must be positive".to_string(),
            ));
        }
        if self.tester.commands.is_empty() {
            return Err(ConfigError::Invalid(
                "tester.commands must list at least one test command".to_string(),
            ));
        }
        if let Some(cmd) = self.tester.commands.iter().find(|c| c.argv.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "test command '{}' has an empty argv",
                cmd.name
            )));
        }
        if self.historic.artifact.is_empty() {
            return Err(ConfigError::Invalid(
                "historic.artifact must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::PathIo {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse_config(&content)?;
    config.source = Some(path.to_path_buf());
    Ok(config)
}

/// Loads `explicit` if given, else `$XDG_CONFIG_HOME/r8ci/config.toml`, else defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        return load_from_path(path);
    }

    let xdg_dirs = xdg::BaseDirectories::with_prefix("r8ci");
    match xdg_dirs.find_config_file("config.toml") {
        Some(path) => {
            tracing::debug!("Loading configuration from {}", path.display());
            load_from_path(&path)
        }
        None => {
            tracing::debug!("No configuration file found, using defaults.");
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}
