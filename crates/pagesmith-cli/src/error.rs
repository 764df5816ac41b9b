use std::fmt;
use std::process::ExitCode;

use clap::error::ErrorKind as ClapErrorKind;
use pagesmith::{FsError, MaterializeError, PagesmithError};

/// Process exit statuses, numbered after BSD `sysexits.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    Ok = 0,
    /// Bad arguments, no project found, or a path that leaves the project.
    Usage = 64,
    /// A notebook or output tree that cannot be used as-is.
    Data = 65,
    Software = 70,
    Io = 71,
    Config = 78,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    fn for_build_error(err: &PagesmithError) -> Self {
        match err {
            PagesmithError::Workspace(_) => ExitStatus::Usage,
            PagesmithError::Config(_)
            | PagesmithError::Materialize(MaterializeError::SourceNotFound(_)) => {
                ExitStatus::Config
            }
            PagesmithError::FrontmatterRejected(_)
            | PagesmithError::Markdown(_)
            | PagesmithError::Materialize(MaterializeError::DestinationExists(_)) => {
                ExitStatus::Data
            }
            PagesmithError::Fs(
                FsError::PathEscapesRoot { .. }
                | FsError::PathOutsideRoot { .. }
                | FsError::InvalidPath { .. },
            ) => ExitStatus::Usage,
            PagesmithError::Serialization(_) => ExitStatus::Software,
            PagesmithError::Materialize(MaterializeError::WriteFailed { .. })
            | PagesmithError::Fs(_)
            | PagesmithError::Io(_) => ExitStatus::Io,
        }
    }
}

/// A failure that ends the process: what to print on stderr and how to exit.
#[derive(Debug)]
pub struct CliError {
    message: String,
    status: ExitStatus,
}

impl CliError {
    pub fn new(message: impl Into<String>, status: ExitStatus) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }

    /// Exit without printing; clap already wrote help or version text.
    fn quiet() -> Self {
        Self::new(String::new(), ExitStatus::Ok)
    }

    pub fn status(&self) -> ExitStatus {
        self.status
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.status.code())
    }

    pub fn print(&self) {
        if self.message.is_empty() {
            return;
        }
        eprintln!("pagesmith: {}", self.message);
        if self.status == ExitStatus::Config {
            eprintln!("  check .pagesmith/config.yaml");
        }
    }
}

impl From<PagesmithError> for CliError {
    fn from(err: PagesmithError) -> Self {
        let status = ExitStatus::for_build_error(&err);
        CliError::new(err.to_string(), status)
    }
}

impl From<clap::Error> for CliError {
    fn from(err: clap::Error) -> Self {
        match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                let _ = err.print();
                CliError::quiet()
            }
            _ => CliError::new(err.to_string(), ExitStatus::Usage),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::new(err.to_string(), ExitStatus::Io)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::new(format!("could not render JSON output: {err}"), ExitStatus::Software)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}
