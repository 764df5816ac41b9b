use clap::Command;
use pagesmith::{PlaybookFrontmatter, SerdeSchema, SqlFenceAttrs};

use crate::commands::CommandResult;

pub fn command() -> Command {
    Command::new("schema").about("Print JSON Schemas for notebook frontmatter and sql fence attributes")
}

pub fn run() -> CommandResult {
    CommandResult::Schema {
        frontmatter: SerdeSchema::<PlaybookFrontmatter>::schema_document(),
        sql_fence: SerdeSchema::<SqlFenceAttrs>::schema_document(),
    }
}
