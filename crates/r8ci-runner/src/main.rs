use clap::Parser;
use colored::Colorize;
use r8ci_runner::cli::Cli;

fn main() {
    let cli = Cli::parse();

    match r8ci_runner::run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}", format!("[ERROR] {}", e).red());
            std::process::exit(1);
        }
    }
}
