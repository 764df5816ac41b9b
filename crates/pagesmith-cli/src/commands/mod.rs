use pagesmith::{BuildReport, IssueSummary, Notebook};
use serde::Serialize;
use serde_json::Value;

use crate::error::ExitStatus;

pub mod build;
pub mod inspect;
pub mod schema;
pub mod sql;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandResult {
    Build {
        report: BuildReport,
    },
    Sql {
        statements: Vec<String>,
    },
    Inspect {
        notebook: Box<Notebook>,
        summary: IssueSummary,
    },
    Schema {
        frontmatter: Value,
        sql_fence: Value,
    },
}

impl CommandResult {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            CommandResult::Build { report } if report.has_rejections() => ExitStatus::Data,
            CommandResult::Inspect { summary, .. } if summary.errors > 0 => ExitStatus::Data,
            _ => ExitStatus::Ok,
        }
    }
}
