use crate::cli::StatusArgs;
use crate::commands::AppContext;
use crate::error::CliError;
use colored::Colorize;
use r8ci_client::Observation;
use r8ci_core::protocol::ProtocolState;

pub fn handle_status(args: StatusArgs, context: &AppContext) -> Result<i32, CliError> {
    let channel = context.channel(context.store()?);
    let observation = channel.observe()?;

    if args.json {
        let value = match &observation {
            Observation::Settled(state) => serde_json::json!({ "state": state }),
            Observation::Conflicting(markers) => serde_json::json!({ "conflicting": markers }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(0);
    }

    let rendered = match &observation {
        Observation::Settled(ProtocolState::Idle) => "idle".green().to_string(),
        Observation::Settled(state) => state.to_string().yellow().to_string(),
        Observation::Conflicting(_) => observation.to_string().red().bold().to_string(),
    };
    println!("{}: {}", channel.describe(), rendered);
    Ok(0)
}
