use crate::cli::HistoricArgs;
use crate::commands::AppContext;
use crate::error::CliError;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use r8ci_client::{open_store, GitRepo, HistoricEvent, HistoricOptions, HistoricScheduler};
use r8ci_core::constants::{env, logs};
use r8ci_core::model::GitCommit;
use r8ci_executor::{CommandRunner, ExecutionRequest, ProcessRunner};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

struct HistoricAction {
    runner: ProcessRunner,
    argv: Vec<String>,
    repo: PathBuf,
    download_path: PathBuf,
    output_dir: PathBuf,
    timeout: Duration,
}

impl HistoricAction {
    fn run(&self, commit: &GitCommit) -> r8ci_client::Result<()> {
        let out = self.output_dir.join(commit.output_label());
        fs_err::create_dir_all(&out)?;

        let request = ExecutionRequest::new(&self.argv)
            .cwd(&self.repo)
            .env(env::GIT_HASH, commit.git_hash().as_str())
            .env(env::TIMESTAMP, commit.timestamp().to_string())
            .env(env::ARTIFACT, path_string(&self.download_path))
            .env(env::OUTPUT_DIR, path_string(&out))
            .timeout(self.timeout);
        let outcome = self.runner.run(&request)?;

        fs_err::write(out.join(logs::STDOUT), &outcome.stdout)?;
        fs_err::write(out.join(logs::STDERR), &outcome.stderr)?;
        if !outcome.success() {
            tracing::warn!(
                "{} on {} exited with {}{}",
                request.display(),
                commit.git_hash(),
                outcome.exit_code_display(),
                if outcome.timed_out { " (timed out)" } else { "" }
            );
        }
        Ok(())
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

pub fn handle_historic(args: HistoricArgs, context: &AppContext) -> Result<i32, CliError> {
    let historic = &context.config.historic;
    let repo = context.config.tester.repo_path();
    let scheduler = HistoricScheduler::new(
        open_store(&historic.storage)?,
        Arc::new(GitRepo::new(repo.clone())),
        historic.layout(),
        historic.download_path(),
    );
    let action = HistoricAction {
        runner: ProcessRunner::new(),
        argv: args.command,
        repo,
        download_path: historic.download_path(),
        output_dir: historic.output_dir(),
        timeout: context.config.tester.run_timeout(),
    };

    println!(
        "- Running {} over {}..{}",
        action.argv.join(" ").cyan(),
        args.bottom,
        args.top
    );

    let (tx, rx) = mpsc::channel();
    let options = HistoricOptions {
        max_runs: args.max_runs,
        event_sender: Some(tx),
    };
    let (top, bottom) = (args.top, args.bottom);
    let worker = thread::spawn(move || {
        scheduler.run(&top, &bottom, &options, |commit| action.run(commit))
    });

    let mut pb: Option<ProgressBar> = None;
    for event in rx {
        match event {
            HistoricEvent::Enumerated { total, available } => {
                println!(
                    "- {} of {} commits have an archived build",
                    available.to_string().bold(),
                    total
                );
                let len = args.max_runs.map_or(available, |max| max.min(available));
                let new_pb = ProgressBar::new(len as u64);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                {
                    new_pb.set_style(style.progress_chars("#>-"));
                }
                pb = Some(new_pb);
            }
            HistoricEvent::Started { commit, .. } => {
                if let Some(pb) = pb.as_ref() {
                    pb.set_message(commit.git_hash().to_string());
                }
            }
            HistoricEvent::Skipped { commit } => {
                tracing::debug!("No artifact for {}", commit.git_hash());
            }
            HistoricEvent::Finished { .. } => {
                if let Some(pb) = pb.as_ref() {
                    pb.inc(1);
                }
            }
        }
    }

    let summary = worker
        .join()
        .map_err(|_| CliError::Worker("historic worker panicked".to_string()))??;
    if let Some(pb) = pb.as_ref() {
        pb.finish_with_message("done");
    }
    println!(
        "{} visited {} commits, {} skipped. Results in {}",
        "OK".green().bold(),
        summary.visited.len(),
        summary.skipped.len(),
        context.config.historic.output_dir().display()
    );
    Ok(0)
}
