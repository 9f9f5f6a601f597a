use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "r8ci",
    author,
    version,
    about = "Hands commits from a CI bot to a dedicated test machine.",
    long_about = "The bot side requests a commit and waits for its status; the tester side polls a shared bucket, runs the internal test suites and archives the logs of failing commands."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        long,
        global = true,
        help = "Path to a config.toml file (defaults to $XDG_CONFIG_HOME/r8ci/config.toml)"
    )]
    pub config: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase verbosity level (-v for debug, -vv for trace)")]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Request testing of a commit and wait for the result")]
    Trigger(TriggerArgs),

    #[command(
        about = "Poll for requested commits and test them",
        visible_alias = "bot",
        alias = "continuous"
    )]
    Tester(TesterArgs),

    #[command(about = "Run the tester as a child process and restart it when asked to")]
    Supervise,

    #[command(about = "Run the test commands once on the current checkout")]
    RunTests(RunTestsArgs),

    #[command(about = "Print the archived status and logs of a commit", alias = "print_logs")]
    PrintLogs(PrintLogsArgs),

    #[command(about = "Show the state of the test channel")]
    Status(StatusArgs),

    #[command(about = "Run a command over archived builds of a commit range")]
    Historic(HistoricArgs),
}

#[derive(Args)]
pub struct TriggerArgs {
    #[arg(help = "Commit hash to test")]
    pub commit: String,

    #[arg(
        long,
        help = "Seconds to wait for the result (defaults to the run timeout times the number of test commands)"
    )]
    pub timeout_secs: Option<u64>,
}

#[derive(Args)]
pub struct TesterArgs {
    #[arg(long, help = "Handle at most one request and exit")]
    pub once: bool,
}

#[derive(Args)]
pub struct RunTestsArgs {
    #[arg(long, help = "Archive the status and failure logs under the commit")]
    pub archive: bool,

    #[arg(long, help = "Commit to archive under (defaults to HEAD)")]
    pub commit: Option<String>,
}

#[derive(Args)]
pub struct PrintLogsArgs {
    #[arg(help = "Commit hash whose results to print")]
    pub commit: String,
}

#[derive(Args)]
pub struct StatusArgs {
    #[arg(long, help = "Print the state as JSON")]
    pub json: bool,
}

#[derive(Args)]
pub struct HistoricArgs {
    #[arg(long, help = "Newest commit of the range")]
    pub top: String,

    #[arg(long, help = "Oldest commit of the range, must be a first-parent ancestor of --top")]
    pub bottom: String,

    #[arg(long, help = "Stop after this many commits")]
    pub max_runs: Option<usize>,

    #[arg(
        last = true,
        required = true,
        value_name = "COMMAND",
        help = "Command to run for each commit"
    )]
    pub command: Vec<String>,
}
