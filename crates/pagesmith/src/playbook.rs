//! SQLPage playbook conventions: typed `sql` fences and their conversion into
//! content units.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::materialize::{Nature, Resource, RouteMeta};
use crate::notebook::{Notebook, NotebookOptions, NotebookParser, SerdeSchema};
use crate::path::RelativePath;

pub const SQL_LANG: &str = "sql";

/// Frontmatter accepted by playbook notebooks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaybookFrontmatter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    /// Named attribute bundles fences pull in with `$preset`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub presets: Map<String, Value>,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

/// Attributes of an `sql` fence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SqlFenceAttrs {
    /// `head`, `tail`, `page`, `partial`, `shell`, `action`, `api`,
    /// `stored-procedure`, `resource`, or a custom kind.
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Shell identifier whose body is prepended to a page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteMeta>,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

fn default_kind() -> String {
    "page".to_string()
}

/// Adds the playbook frontmatter schema and the `sql` fence schema to `options`.
pub fn playbook_options(mut options: NotebookOptions) -> NotebookOptions {
    options.frontmatter_schema = Some(Arc::new(SerdeSchema::<PlaybookFrontmatter>::new()));
    options
        .registry
        .register(SQL_LANG, Arc::new(SerdeSchema::<SqlFenceAttrs>::new()));
    options
}

pub fn playbook_parser() -> NotebookParser {
    NotebookParser::new(playbook_options(NotebookOptions::default()))
}

/// Converts a parsed notebook into content units, in block order.
///
/// `sql` blocks need validated attributes; blocks that failed validation were
/// already reported as issues and are left out. Blocks in other languages become
/// plain resources when their attributes name a `path`.
pub fn resources_from_notebook(notebook: &Notebook) -> Vec<Resource> {
    let mut resources = Vec::new();
    for block in &notebook.blocks {
        if block.is_section_defaults() {
            continue;
        }
        let origin = format!("{}#{}", notebook.filename, block.index);

        if block.lang.as_deref() == Some(SQL_LANG) {
            let Some(safe) = &block.attrs_safe else {
                debug!(origin, "sql block without validated attributes");
                continue;
            };
            let Ok(attrs) = serde_json::from_value::<SqlFenceAttrs>(safe.clone()) else {
                continue;
            };
            let mut resource = Resource::new(Nature::from_kind(&attrs.kind), block.body.clone())
                .with_language(SQL_LANG)
                .with_origin(origin);
            resource.name = attrs.name;
            resource.path = attrs.path;
            resource.shell = attrs.shell;
            resource.route = attrs.route;
            resources.push(resource);
            continue;
        }

        let attrs = block.effective_attrs();
        if let Some(path) = attrs.get("path").and_then(Value::as_str) {
            let mut resource = Resource::new(Nature::Resource, block.body.clone())
                .with_path(path)
                .with_origin(origin);
            resource.language = block.lang.clone();
            resource.route = attrs
                .get("route")
                .cloned()
                .and_then(|route| serde_json::from_value(route).ok());
            resources.push(resource);
        }
    }
    resources
}

/// A stand-alone `.sql` file becomes a page at its own path.
pub fn resource_from_sql_file(path: &RelativePath, contents: &str) -> Resource {
    Resource::new(Nature::Page, contents)
        .with_path(path.as_str())
        .with_language(SQL_LANG)
        .with_origin(path.as_str())
}
