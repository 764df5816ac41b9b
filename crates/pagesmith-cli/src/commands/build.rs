use clap::Command;

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::CliError;

pub fn command() -> Command {
    Command::new("build").about("Materialize every notebook into the output directory")
}

pub fn run(session: &CliSession) -> Result<CommandResult, CliError> {
    let report = session.pipeline.run()?;
    Ok(CommandResult::Build { report })
}
