use clap::Command;

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::CliError;

pub fn command() -> Command {
    Command::new("sql").about("Print the upsert batch for the project without writing files")
}

pub fn run(session: &CliSession) -> Result<CommandResult, CliError> {
    let statements = session.pipeline.sql()?;
    Ok(CommandResult::Sql { statements })
}
