use crate::commands::AppContext;
use crate::error::CliError;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use r8ci_core::constants::exit_codes;
use r8ci_core::logging::log_and_print_command;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

fn worker_command(context: &AppContext) -> Result<Command, CliError> {
    let exe = std::env::current_exe()?;
    let mut cmd = Command::new(exe);
    if let Some(config) = &context.config_arg {
        cmd.arg("--config").arg(config);
    }
    for _ in 0..context.verbose {
        cmd.arg("-v");
    }
    cmd.arg("tester");
    // Interrupts reach the worker only through the forwarded SIGTERM.
    cmd.process_group(0);
    Ok(cmd)
}

/// Keeps one tester worker running, starting a fresh one (and so a freshly
/// built binary) whenever the worker exits with the restart code.
pub fn handle_supervise(context: &AppContext) -> Result<i32, CliError> {
    let stop = Arc::new(AtomicBool::new(false));
    let worker_pid = Arc::new(AtomicI32::new(0));

    let handler_stop = stop.clone();
    let handler_pid = worker_pid.clone();
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
        let pid = handler_pid.load(Ordering::SeqCst);
        if pid > 0 {
            let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
        }
    })?;

    let mut generation = 0u32;
    loop {
        generation += 1;
        let mut cmd = worker_command(context)?;
        log_and_print_command(&cmd);
        let mut child = cmd.spawn()?;
        let pid = i32::try_from(child.id()).unwrap_or(0);
        worker_pid.store(pid, Ordering::SeqCst);
        tracing::info!("Started tester worker #{} (PID {})", generation, pid);

        let status = child.wait()?;
        worker_pid.store(0, Ordering::SeqCst);

        if stop.load(Ordering::SeqCst) {
            tracing::info!("Supervisor stopped, worker exited with {}", status);
            return Ok(0);
        }
        match status.code() {
            Some(code) if code == exit_codes::RESTART => {
                tracing::info!("Worker #{} asked for a restart", generation);
            }
            Some(0) => return Ok(0),
            Some(code) => {
                tracing::error!("Worker #{} failed with exit code {}", generation, code);
                return Ok(code);
            }
            None => {
                return Err(CliError::Worker(format!(
                    "worker #{} was killed by a signal ({})",
                    generation, status
                )));
            }
        }
    }
}
