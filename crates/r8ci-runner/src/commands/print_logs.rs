use crate::cli::PrintLogsArgs;
use crate::commands::AppContext;
use crate::error::CliError;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets, Attribute, Cell, Color, Table};
use r8ci_client::{ArchivedLog, ResultArchive};
use r8ci_core::model::CommitHash;

pub fn handle_print_logs(args: PrintLogsArgs, context: &AppContext) -> Result<i32, CliError> {
    let commit = CommitHash::new(&args.commit);
    let archive = ResultArchive::new(context.store()?);

    if !archive.has_status(&commit)? {
        println!(
            "No test status recorded for {} in {}",
            commit.to_string().cyan(),
            archive.store().describe(commit.as_str())
        );
        return Ok(1);
    }
    let status = archive.read_status(&commit)?;
    let label = if status.is_success() {
        "passed".green().bold()
    } else {
        "failed".red().bold()
    };
    println!("{} {} (status {})", commit.to_string().cyan(), label, status);

    let logs = archive.fetch_logs(&commit)?;
    if !logs.is_empty() {
        println!("{}", format_failures(&logs));
        for log in &logs {
            print_log(log);
        }
    }

    let ranges = archive.min_memory_ranges(&commit)?;
    if !ranges.is_empty() {
        println!("{}", "Minimum memory ranges:".bold());
        for (app, range) in ranges {
            println!("  {}: {}", app, range);
        }
    }
    Ok(0)
}

fn format_failures(logs: &[ArchivedLog]) -> String {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Failed command")
                .add_attribute(Attribute::Bold)
                .fg(Color::Cyan),
            Cell::new("Exit code")
                .add_attribute(Attribute::Bold)
                .fg(Color::Cyan),
            Cell::new("Timed out")
                .add_attribute(Attribute::Bold)
                .fg(Color::Cyan),
        ]);
    for log in logs {
        table.add_row(vec![
            Cell::new(&log.command).fg(Color::Yellow),
            Cell::new(&log.exitcode),
            Cell::new(&log.timed_out),
        ]);
    }
    table.to_string()
}

fn print_log(log: &ArchivedLog) {
    for (stream, content) in [("stdout", &log.stdout), ("stderr", &log.stderr)] {
        println!();
        println!("{}", format!("=== {} {} ===", log.command, stream).bold());
        if content.is_empty() {
            println!("{}", "(empty)".dimmed());
        } else {
            println!("{}", content);
        }
    }
}
