use clap::{Arg, ArgMatches, Command};
use pagesmith::RelativePath;

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};

pub fn command() -> Command {
    Command::new("inspect")
        .about("Parse one notebook and show its blocks and issues")
        .arg(
            Arg::new("file")
                .required(true)
                .value_name("FILE")
                .help("Notebook path relative to the project root"),
        )
}

pub fn run(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let raw = matches
        .get_one::<String>("file")
        .ok_or_else(|| CliError::new("missing notebook path", ExitStatus::Usage))?;
    let path = RelativePath::parse(raw)
        .map_err(|err| CliError::new(err.to_string(), ExitStatus::Usage))?;

    let source = session
        .pipeline
        .fs()
        .read_to_string(&path)
        .map_err(pagesmith::PagesmithError::from)?;
    let notebook = session.pipeline.parser().parse(path.as_str(), &source)?;
    let summary = notebook.summary();

    Ok(CommandResult::Inspect {
        notebook: Box::new(notebook),
        summary,
    })
}
