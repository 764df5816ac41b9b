//! Markdown notebooks: frontmatter, fenced blocks, and the prose around them.

pub mod fence;
pub mod frontmatter;
pub mod issue;
pub mod parser;
pub mod resolve;
pub mod schema;

use markdown::mdast::Node;
use serde::Serialize;
use serde_json::{Map, Value};

pub use issue::{Disposition, DispositionHandler, Issue, IssueKind, IssueLocation, IssueSummary};
pub use parser::{Delimiter, NotebookOptions, NotebookParser};
pub use resolve::{ResolveOptions, deep_merge, resolve};
pub use schema::{FnSchema, Schema, SchemaContext, SchemaError, SchemaRegistry, SerdeSchema};

/// Attribute value of `role` marking a block as section defaults.
pub const SECTION_DEFAULTS_ROLE: &str = "section-defaults";

/// Parsed product of one source document.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notebook {
    pub filename: String,
    #[serde(skip)]
    pub source: String,
    #[serde(skip)]
    pub mdast: Node,
    pub frontmatter: Value,
    pub blocks: Vec<FencedBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_instructions: Option<Instructions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_appendix: Option<Instructions>,
    pub issues: Vec<Issue>,
}

impl Notebook {
    pub fn summary(&self) -> IssueSummary {
        IssueSummary::from_issues(&self.issues)
    }

    pub fn blocks_with_lang<'a>(&'a self, lang: &'a str) -> impl Iterator<Item = &'a FencedBlock> {
        self.blocks
            .iter()
            .filter(move |block| block.lang.as_deref() == Some(lang))
    }
}

/// One fenced region of a notebook.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FencedBlock {
    pub index: usize,
    pub lang: Option<String>,
    pub body: String,
    pub attrs: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shebang: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<Instructions>,
    /// Schema-validated attributes; present only when a schema matched and passed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attrs_safe: Option<Value>,
}

impl FencedBlock {
    pub fn role(&self) -> Option<&str> {
        self.attrs.get("role").and_then(Value::as_str)
    }

    pub fn is_section_defaults(&self) -> bool {
        self.role() == Some(SECTION_DEFAULTS_ROLE)
    }

    /// Resolved attributes when resolution ran, raw attributes otherwise.
    pub fn effective_attrs(&self) -> &Map<String, Value> {
        self.resolved.as_ref().unwrap_or(&self.attrs)
    }
}

/// Prose context captured around fenced blocks.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Instructions {
    #[serde(skip)]
    pub nodes: Vec<Node>,
    /// Markdown source of each captured node, separated by blank lines.
    pub markdown: String,
    pub text: String,
}

impl Instructions {
    /// Builds instructions from nodes, slicing each node's markdown out of
    /// `source` by offsets. Returns `None` for an empty node list.
    ///
    /// Nodes need not be contiguous in `source`; fences between them are not
    /// part of the captured prose.
    pub fn from_nodes(nodes: &[Node], source: &str) -> Option<Self> {
        if nodes.is_empty() {
            return None;
        }
        let markdown = nodes
            .iter()
            .filter_map(|node| node.position())
            .filter_map(|position| source.get(position.start.offset..position.end.offset))
            .collect::<Vec<_>>()
            .join("\n\n");
        let text = nodes
            .iter()
            .map(plain_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        Some(Self {
            nodes: nodes.to_vec(),
            markdown,
            text,
        })
    }
}

/// Concatenates the literal text under `node`.
pub fn plain_text(node: &Node) -> String {
    fn walk(node: &Node, out: &mut String) {
        match node {
            Node::Text(t) => out.push_str(&t.value),
            Node::InlineCode(c) => out.push_str(&c.value),
            Node::Code(c) => out.push_str(&c.value),
            Node::Break(_) => out.push('\n'),
            Node::Html(_) | Node::Yaml(_) => {}
            _ => {
                if let Some(children) = node.children() {
                    for (idx, child) in children.iter().enumerate() {
                        if idx > 0 && is_block(child) {
                            out.push('\n');
                        }
                        walk(child, out);
                    }
                }
            }
        }
    }

    let mut out = String::new();
    walk(node, &mut out);
    out
}

fn is_block(node: &Node) -> bool {
    matches!(
        node,
        Node::Paragraph(_) | Node::ListItem(_) | Node::Heading(_) | Node::Code(_)
    )
}
