//! Upsert statements for a `path`-keyed file table.

use serde::{Deserialize, Serialize};

use super::resource::{Artifact, Classification};

pub const DEFAULT_TABLE: &str = "sqlpage_files";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SqlStrategy {
    /// `INSERT ... ON CONFLICT(path) DO UPDATE ... WHERE contents differ`.
    #[default]
    OnConflict,
    /// `DELETE` by path followed by a plain `INSERT`.
    DeleteInsert,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlOptions {
    pub table: String,
    pub strategy: SqlStrategy,
    /// Emit head/tail contents verbatim instead of upserting them as files.
    pub inline_head_tail: bool,
}

impl Default for SqlOptions {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            strategy: SqlStrategy::default(),
            inline_head_tail: true,
        }
    }
}

/// True for identifiers safe to splice unquoted: `[A-Za-z_][A-Za-z0-9_]*`,
/// optionally schema-qualified with one dot.
pub fn is_plain_identifier(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Single-quoted SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Plain identifiers pass through; anything else becomes one double-quoted
/// identifier with embedded quotes doubled.
pub fn quote_identifier(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

pub fn upsert_statement(table: &str, path: &str, contents: &str, strategy: SqlStrategy) -> String {
    let table = quote_identifier(table);
    let (path, contents) = (quote_literal(path), quote_literal(contents));
    match strategy {
        SqlStrategy::OnConflict => format!(
            "INSERT INTO {table} (path, contents, last_modified) VALUES ({path}, {contents}, CURRENT_TIMESTAMP) \
             ON CONFLICT(path) DO UPDATE SET contents = excluded.contents, last_modified = CURRENT_TIMESTAMP \
             WHERE {table}.contents <> excluded.contents;"
        ),
        SqlStrategy::DeleteInsert => format!(
            "DELETE FROM {table} WHERE path = {path};\n\
             INSERT INTO {table} (path, contents, last_modified) VALUES ({path}, {contents}, CURRENT_TIMESTAMP);"
        ),
    }
}

/// Orders artifacts into a statement batch: head first, everything else in
/// encounter order, tail last.
pub fn sql_batch<'a>(
    artifacts: impl IntoIterator<Item = &'a Artifact>,
    options: &SqlOptions,
) -> Vec<String> {
    let mut head = Vec::new();
    let mut body = Vec::new();
    let mut tail = Vec::new();

    for artifact in artifacts {
        let bucket = match artifact.classification {
            Classification::Head => &mut head,
            Classification::Tail => &mut tail,
            _ => &mut body,
        };
        let inline = options.inline_head_tail
            && matches!(
                artifact.classification,
                Classification::Head | Classification::Tail
            );
        bucket.push(if inline {
            artifact.contents.trim().to_string()
        } else {
            upsert_statement(
                &options.table,
                artifact.path.as_str(),
                &artifact.contents,
                options.strategy,
            )
        });
    }

    head.extend(body);
    head.extend(tail);
    head
}
