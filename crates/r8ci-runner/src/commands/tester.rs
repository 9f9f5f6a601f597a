use crate::cli::TesterArgs;
use crate::commands::AppContext;
use crate::error::CliError;
use r8ci_client::{TesterExit, TesterStep};
use r8ci_core::constants::exit_codes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn handle_tester(args: TesterArgs, context: &AppContext) -> Result<i32, CliError> {
    let tester = context.tester()?;

    if args.once {
        match tester.poll_once()? {
            TesterStep::Idle => println!("Nothing requested."),
            TesterStep::Claimed(commit) | TesterStep::Resumed(commit) => {
                let report = tester.test_commit(&commit)?;
                println!("{}: status {}", commit, report.status);
            }
        }
        return Ok(0);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        if handler_stop.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        tracing::warn!("Stopping after the current step. Interrupt again to exit immediately.");
    })?;

    match tester.run_loop(&stop)? {
        TesterExit::Stopped => {
            tracing::info!("Tester stopped.");
            Ok(0)
        }
        TesterExit::Restart => {
            tracing::info!(
                "Sources changed, exiting with code {} to be restarted.",
                exit_codes::RESTART
            );
            Ok(exit_codes::RESTART)
        }
    }
}
