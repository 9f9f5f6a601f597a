use crate::cli::TriggerArgs;
use crate::commands::AppContext;
use crate::error::CliError;
use colored::Colorize;
use r8ci_client::{Bot, ResultArchive};
use r8ci_core::clock::SystemClock;
use r8ci_core::model::CommitHash;
use std::sync::Arc;
use std::time::Duration;

pub fn handle_trigger(args: TriggerArgs, context: &AppContext) -> Result<i32, CliError> {
    let commit = CommitHash::new(&args.commit);
    let store = context.store()?;
    let channel = context.channel(store.clone());
    let bot = Bot::new(
        channel.clone(),
        ResultArchive::new(store),
        Arc::new(SystemClock),
        context.config.poll_interval(),
    );
    let timeout = args
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| context.config.tester.bot_timeout());

    println!(
        "- Requesting testing of {} via {} (timeout {}s)...",
        commit.to_string().cyan(),
        channel.describe(),
        timeout.as_secs()
    );
    let outcome = bot.run(&commit, timeout)?;

    if !outcome.cleared.is_empty() {
        let names: Vec<&str> = outcome.cleared.iter().map(|m| m.as_str()).collect();
        println!(
            "  {} discarded state of an earlier run: {}",
            "WARN".yellow().bold(),
            names.join(", ")
        );
    }

    if outcome.status.is_success() {
        println!("{} {} passed internal testing", "OK".green().bold(), commit);
    } else {
        println!(
            "{} {} failed internal testing (status {})",
            "FAIL".red().bold(),
            commit,
            outcome.status
        );
        println!("  To see the logs, run: {}", outcome.hint().cyan());
    }
    Ok(outcome.exit_code())
}
