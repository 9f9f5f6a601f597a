use crate::cli::{Cli, Commands};
use crate::commands::AppContext;
use crate::error::CliError;
use colored::Colorize;
use r8ci_core::{config, logging};

pub mod cli;
pub mod commands;
pub mod error;

/// Runs one subcommand and returns the process exit code.
pub fn run(cli: Cli) -> Result<i32, CliError> {
    logging::set_log_level_from_env();
    logging::apply_verbosity(cli.verbose);

    let config = config::load_config(cli.config.as_deref())?;

    let session = match &cli.command {
        Commands::Tester(_) => Some("tester"),
        Commands::Supervise => Some("supervise"),
        _ => None,
    };
    match session {
        Some(name) => {
            if let Err(e) = logging::init_session_logger(name, &config.logging) {
                eprintln!(
                    "{}",
                    format!("[ERROR] Failed to initialize session logger: {}", e).red()
                );
                logging::init_stderr_logger();
            }
        }
        None => logging::init_stderr_logger(),
    }

    let context = AppContext::new(config, cli.config.clone(), cli.verbose);

    match cli.command {
        Commands::Trigger(args) => commands::trigger::handle_trigger(args, &context),
        Commands::Tester(args) => commands::tester::handle_tester(args, &context),
        Commands::Supervise => commands::supervise::handle_supervise(&context),
        Commands::RunTests(args) => commands::run_tests::handle_run_tests(args, &context),
        Commands::PrintLogs(args) => commands::print_logs::handle_print_logs(args, &context),
        Commands::Status(args) => commands::status::handle_status(args, &context),
        Commands::Historic(args) => commands::historic::handle_historic(args, &context),
    }
}
