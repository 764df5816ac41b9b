use std::ffi::OsString;
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::commands;
use crate::context::{CliSession, Verbosity};
use crate::error::{CliError, ExitStatus};
use crate::formatter::{OutputFormat, emit_result};

const NAME: &str = "pagesmith";

pub fn run() -> ExitCode {
    init_tracing();
    match run_cli(std::env::args()) {
        Ok(code) => code,
        Err(err) => {
            err.print();
            err.exit_code()
        }
    }
}

/// Parses arguments, resolves the project, and dispatches to a command.
/// Returns a POSIX `sysexits`-compatible `ExitCode`.
pub fn run_cli<I, S>(args: I) -> Result<ExitCode, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let command = build_cli();
    let matches = command.try_get_matches_from(args)?;

    let verbosity = Verbosity {
        json: matches.get_flag("json"),
        verbose: matches.get_flag("verbose"),
    };
    let output = if verbosity.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // `schema` describes the file formats and needs no project.
    if let Some(("schema", _)) = matches.subcommand() {
        return emit_result(commands::schema::run(), output);
    }

    let workspace_override = matches.get_one::<String>("workspace").cloned();
    let session = CliSession::bootstrap(workspace_override, verbosity)?;
    if session.verbosity.verbose {
        tracing::info!(
            workspace = %session.workspace_paths.root().display(),
            source_dir = %session.config.source_dir,
            output_dir = %session.config.output_dir,
            table = %session.config.sql.table,
            "resolved project context"
        );
    }

    let result = dispatch(&session, &matches)?;
    emit_result(result, output)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn build_cli() -> Command {
    Command::new(NAME)
        .about("Assemble SQLPage sites from markdown notebooks")
        .arg(
            Arg::new("workspace")
                .long("workspace")
                .value_name("PATH")
                .global(true)
                .help("Project root. Defaults to the nearest ancestor with a .pagesmith folder."),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Emit JSON instead of human-readable text."),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Log the resolved project root and configuration."),
        )
        .subcommand_required(true)
        .subcommand(commands::build::command())
        .subcommand(commands::sql::command())
        .subcommand(commands::inspect::command())
        .subcommand(commands::schema::command())
}

fn dispatch(
    session: &CliSession,
    matches: &ArgMatches,
) -> Result<commands::CommandResult, CliError> {
    match matches.subcommand() {
        Some(("build", _)) => commands::build::run(session),
        Some(("sql", _)) => commands::sql::run(session),
        Some(("inspect", sub)) => commands::inspect::run(session, sub),
        _ => Err(CliError::new("missing command", ExitStatus::Usage)),
    }
}
