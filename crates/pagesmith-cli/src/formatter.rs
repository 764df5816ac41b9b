use std::process::ExitCode;

use pagesmith::{BuildReport, Notebook};
use serde_json::json;

use crate::commands::CommandResult;
use crate::error::CliError;

pub enum OutputFormat {
    Text,
    Json,
}

/// Renders a `CommandResult` as text or JSON and converts it into an exit code.
pub fn emit_result(result: CommandResult, format: OutputFormat) -> Result<ExitCode, CliError> {
    match format {
        OutputFormat::Text => print_text(&result)?,
        OutputFormat::Json => print_json(&result),
    };
    Ok(ExitCode::from(result.exit_status().code()))
}

fn print_text(result: &CommandResult) -> Result<(), CliError> {
    match result {
        CommandResult::Build { report } => print_build(report),
        CommandResult::Sql { statements } => {
            for statement in statements {
                println!("{statement}");
            }
        }
        CommandResult::Inspect { notebook, summary } => {
            print_notebook(notebook);
            println!("{summary}");
        }
        CommandResult::Schema {
            frontmatter,
            sql_fence,
        } => {
            println!("# frontmatter");
            println!("{}", serde_json::to_string_pretty(frontmatter)?);
            println!("# sql fence attributes");
            println!("{}", serde_json::to_string_pretty(sql_fence)?);
        }
    }
    Ok(())
}

fn print_build(report: &BuildReport) {
    println!(
        "Built {} documents: {} written, {} unchanged",
        report.documents.len(),
        report.written.len(),
        report.unchanged.len()
    );
    for rejected in &report.rejected {
        println!("  [REJECTED] {}: {}", rejected.path, rejected.reason);
    }
    for skipped in &report.skipped {
        let origin = skipped.origin.as_deref().unwrap_or("unknown origin");
        println!("  [SKIPPED] {} ({origin}): {}", skipped.nature, skipped.reason);
    }
    for route in &report.route_cycles {
        println!("  [CYCLE] {route}: parent chain loops; listed as a root");
    }
    for issue in &report.issues {
        println!("  {issue}");
    }
    println!("{}", report.summary);
}

fn print_notebook(notebook: &Notebook) {
    println!("{} ({} blocks)", notebook.filename, notebook.blocks.len());
    for block in &notebook.blocks {
        let lang = block.lang.as_deref().unwrap_or("-");
        let lines = match (block.start_line, block.end_line) {
            (Some(start), Some(end)) => format!("{start}-{end}"),
            _ => "?".to_string(),
        };
        let state = if block.is_section_defaults() {
            "defaults"
        } else if block.attrs_safe.is_some() {
            "valid"
        } else {
            "raw"
        };
        println!("  [{}] {lang} lines {lines} ({state})", block.index);
    }
    for issue in &notebook.issues {
        println!("  {issue}");
    }
}

fn print_json(result: &CommandResult) {
    let payload = json!(result);
    println!("{payload}");
}
