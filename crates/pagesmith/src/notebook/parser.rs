use std::fmt;
use std::sync::Arc;

use markdown::mdast::{Code, Node};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::fence::{parse_meta, parse_object, split_shebang};
use super::frontmatter::{header_region, parse_frontmatter};
use super::issue::{Disposition, DispositionHandler, Issue, IssueKind, IssueLocation};
use super::resolve::{ResolveOptions, merge_maps, resolve};
use super::schema::{Schema, SchemaContext, SchemaRegistry};
use super::{FencedBlock, Instructions, Notebook};
use crate::error::PagesmithError;

/// Which node resets the instruction buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Delimiter {
    /// A heading of exactly `level`; the heading opens the next buffer.
    Heading { level: u8 },
    /// A thematic break; contributes nothing itself.
    Hr,
}

impl Default for Delimiter {
    fn default() -> Self {
        Delimiter::Heading { level: 2 }
    }
}

impl Delimiter {
    /// Markdown only has headings of depth 1 through 6.
    pub fn validate(&self) -> Result<(), PagesmithError> {
        match *self {
            Delimiter::Heading { level } if !(1..=6).contains(&level) => Err(
                PagesmithError::Config(format!("heading delimiter level must be 1..=6, got {level}")),
            ),
            _ => Ok(()),
        }
    }

    fn matches(&self, node: &Node) -> bool {
        match (self, node) {
            (Delimiter::Heading { level }, Node::Heading(heading)) => heading.depth == *level,
            (Delimiter::Hr, Node::ThematicBreak(_)) => true,
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct NotebookOptions {
    pub delimiter: Delimiter,
    pub strip_shebang: bool,
    pub resolve_attrs: bool,
    pub mirror_frontmatter: bool,
    pub frontmatter_schema: Option<Arc<dyn Schema>>,
    pub registry: SchemaRegistry,
    pub handler: Option<DispositionHandler>,
}

impl Default for NotebookOptions {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::default(),
            strip_shebang: true,
            resolve_attrs: true,
            mirror_frontmatter: false,
            frontmatter_schema: None,
            registry: SchemaRegistry::default(),
            handler: None,
        }
    }
}

impl fmt::Debug for NotebookOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotebookOptions")
            .field("delimiter", &self.delimiter)
            .field("strip_shebang", &self.strip_shebang)
            .field("resolve_attrs", &self.resolve_attrs)
            .field("mirror_frontmatter", &self.mirror_frontmatter)
            .field("frontmatter_schema", &self.frontmatter_schema.is_some())
            .field("registry", &self.registry)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Markdown options used for every notebook: GFM plus YAML frontmatter.
pub fn mdast_options() -> markdown::ParseOptions {
    markdown::ParseOptions {
        constructs: markdown::Constructs {
            frontmatter: true,
            ..markdown::Constructs::gfm()
        },
        ..markdown::ParseOptions::gfm()
    }
}

/// Single-pass notebook parser.
///
/// Problems are collected as [`Issue`]s. The only one that can abort a document is a
/// `frontmatter-parse` issue whose final disposition is `error`.
#[derive(Clone, Debug, Default)]
pub struct NotebookParser {
    options: NotebookOptions,
}

impl NotebookParser {
    pub fn new(options: NotebookOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &NotebookOptions {
        &self.options
    }

    pub fn parse(&self, filename: &str, source: &str) -> Result<Notebook, PagesmithError> {
        self.options.delimiter.validate()?;
        let mdast = markdown::to_mdast(source, &mdast_options())
            .map_err(|message| PagesmithError::Markdown(format!("{filename}: {message}")))?;
        let children: &[Node] = mdast.children().map(Vec::as_slice).unwrap_or_default();

        let mut issues = Vec::new();
        let header = header_region(children);
        let frontmatter = match parse_frontmatter(
            header.yaml.map(|yaml| yaml.value.as_str()),
            self.options.frontmatter_schema.as_deref(),
        ) {
            Ok(value) => value,
            Err(failure) => {
                let location = IssueLocation {
                    start_line: header
                        .yaml
                        .and_then(|yaml| yaml.position.as_ref())
                        .map(|pos| pos.start.line),
                    end_line: header
                        .yaml
                        .and_then(|yaml| yaml.position.as_ref())
                        .map(|pos| pos.end.line),
                    ..IssueLocation::file(filename)
                };
                let issue = self.raise(
                    Issue::new(IssueKind::FrontmatterParse, failure.message, location)
                        .with_payload(failure.payload),
                );
                if issue.is_error() {
                    warn!(filename, message = %issue.message, "frontmatter rejected");
                    return Err(PagesmithError::FrontmatterRejected(Box::new(issue)));
                }
                issues.push(issue);
                Value::Object(Map::new())
            }
        };

        let body = &children[header.len..];
        let mut state = Scan {
            filename,
            source,
            frontmatter: &frontmatter,
            buffer: Vec::new(),
            pending_defaults: Map::new(),
            blocks: Vec::new(),
            issues,
            first_block: None,
            last_block: None,
        };

        for (position, node) in body.iter().enumerate() {
            match node {
                Node::Code(code) => {
                    state.first_block.get_or_insert(position);
                    state.last_block = Some(position);
                    self.emit_block(&mut state, code, node);
                }
                node if self.options.delimiter.matches(node) => {
                    state.buffer.clear();
                    state.pending_defaults.clear();
                    if let Node::Heading(_) = node {
                        state.buffer.push(node.clone());
                    }
                }
                node => state.buffer.push(node.clone()),
            }
        }

        let module_instructions = state
            .first_block
            .and_then(|first| Instructions::from_nodes(&body[..first], source));
        let module_appendix = match state.last_block {
            Some(last) => Instructions::from_nodes(&body[last + 1..], source),
            None => Instructions::from_nodes(body, source),
        };

        debug!(
            filename,
            blocks = state.blocks.len(),
            issues = state.issues.len(),
            "parsed notebook"
        );

        let Scan { blocks, issues, .. } = state;
        Ok(Notebook {
            filename: filename.to_string(),
            source: source.to_string(),
            mdast,
            frontmatter,
            blocks,
            module_instructions,
            module_appendix,
            issues,
        })
    }

    /// Parses documents lazily in input order; each item succeeds or fails on its own.
    pub fn parse_stream<I, N, S>(
        &self,
        documents: I,
    ) -> impl Iterator<Item = Result<Notebook, PagesmithError>>
    where
        I: IntoIterator<Item = (N, S)>,
        N: AsRef<str>,
        S: AsRef<str>,
    {
        documents
            .into_iter()
            .map(move |(name, source)| self.parse(name.as_ref(), source.as_ref()))
    }

    fn emit_block(&self, state: &mut Scan<'_>, code: &Code, node: &Node) {
        let index = state.blocks.len();
        let location = IssueLocation {
            start_line: code.position.as_ref().map(|pos| pos.start.line),
            end_line: code.position.as_ref().map(|pos| pos.end.line),
            block_index: Some(index),
            ..IssueLocation::file(state.filename)
        };

        let meta = parse_meta(code.meta.as_deref());
        if let Some((candidate, message)) = meta.rejected {
            let issue = self.raise(
                Issue::new(
                    IssueKind::FenceAttrsJson5Parse,
                    format!("fence attributes are not valid JSON5: {message}"),
                    location.clone(),
                )
                .with_payload(json!({ "candidate": candidate })),
            );
            state.issues.push(issue);
        }

        let (shebang, body) = if self.options.strip_shebang {
            split_shebang(&code.value)
        } else {
            (None, code.value.as_str())
        };

        let mut block = FencedBlock {
            index,
            lang: code.lang.clone(),
            body: body.trim().to_string(),
            attrs: meta.attrs,
            resolved: None,
            info: meta.info,
            start_line: location.start_line,
            end_line: location.end_line,
            shebang,
            instructions: Instructions::from_nodes(&state.buffer, state.source),
            attrs_safe: None,
        };

        if block.is_section_defaults() {
            match parse_object(&block.body) {
                Ok(defaults) => merge_maps(&mut state.pending_defaults, &defaults),
                Err(message) => {
                    let issue = self.raise(
                        Issue::new(
                            IssueKind::InstructionDefaultsParse,
                            format!("section defaults are not a valid JSON5 object: {message}"),
                            location,
                        )
                        .with_payload(json!({ "candidate": block.body })),
                    );
                    state.issues.push(issue);
                }
            }
            if self.options.resolve_attrs {
                block.resolved = Some(resolve(
                    &block.attrs,
                    state.frontmatter,
                    None,
                    &ResolveOptions {
                        mirror_frontmatter: self.options.mirror_frontmatter,
                        section_defaults: None,
                    },
                ));
            }
            state.buffer.push(node.clone());
            state.blocks.push(block);
            return;
        }

        if self.options.resolve_attrs {
            block.resolved = Some(resolve(
                &block.attrs,
                state.frontmatter,
                None,
                &ResolveOptions {
                    mirror_frontmatter: self.options.mirror_frontmatter,
                    section_defaults: Some(&state.pending_defaults),
                },
            ));
        }
        state.pending_defaults.clear();

        self.validate_block(state, &mut block, location);
        state.blocks.push(block);
    }

    fn validate_block(&self, state: &mut Scan<'_>, block: &mut FencedBlock, location: IssueLocation) {
        let lang = block.lang.as_deref().unwrap_or_default();
        let schema = self.options.registry.lookup(&SchemaContext {
            frontmatter: state.frontmatter,
            lang,
        });
        let Some(schema) = schema else {
            let message = if lang.is_empty() {
                "fenced block has no language".to_string()
            } else {
                format!("no schema registered for language {lang:?}")
            };
            state.issues.push(self.raise(
                Issue::new(IssueKind::UnknownLanguage, message, location)
                    .with_payload(json!({ "lang": block.lang })),
            ));
            return;
        };

        let candidate = Value::Object(block.effective_attrs().clone());
        match schema.validate(&candidate) {
            Ok(safe) => block.attrs_safe = Some(safe),
            Err(err) => {
                let issue = self.raise(
                    Issue::new(
                        IssueKind::FenceAttrsValidate,
                        format!("{lang} block attributes failed validation: {err}"),
                        location,
                    )
                    .with_payload(json!({ "error": err, "candidate": candidate })),
                );
                state.issues.push(issue);
            }
        }
    }

    fn raise(&self, mut issue: Issue) -> Issue {
        if let Some(handler) = &self.options.handler {
            issue.disposition = handler(&issue);
        }
        if issue.disposition == Disposition::Error {
            debug!(kind = %issue.kind, location = %issue.location, "{}", issue.message);
        }
        issue
    }
}

// Working state threaded through one parse call.
struct Scan<'a> {
    filename: &'a str,
    source: &'a str,
    frontmatter: &'a Value,
    buffer: Vec<Node>,
    pending_defaults: Map<String, Value>,
    blocks: Vec<FencedBlock>,
    issues: Vec<Issue>,
    first_block: Option<usize>,
    last_block: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::schema::{FnSchema, SchemaError, SerdeSchema};
    use schemars::JsonSchema;

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct TableAttrs {
        table: String,
    }

    fn parse(source: &str) -> Notebook {
        NotebookParser::default().parse("doc.md", source).unwrap()
    }

    fn langs(notebook: &Notebook) -> Vec<Option<&str>> {
        notebook.blocks.iter().map(|b| b.lang.as_deref()).collect()
    }

    #[test]
    fn blocks_keep_source_order_and_indices() {
        let source = "\
```json
{}
```

```sql
select 1;
```

```bash
echo hi
```

```json
[]
```

```sql
select 2;
```

```text
plain
```
";
        let notebook = parse(source);
        assert_eq!(
            langs(&notebook),
            vec![
                Some("json"),
                Some("sql"),
                Some("bash"),
                Some("json"),
                Some("sql"),
                Some("text")
            ]
        );
        let indices: Vec<_> = notebook.blocks.iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
        assert!(
            notebook
                .issues
                .iter()
                .all(|issue| issue.kind == IssueKind::UnknownLanguage
                    && issue.disposition == Disposition::Lint)
        );
    }

    #[test]
    fn failed_validation_keeps_block_without_safe_attrs() {
        let mut registry = SchemaRegistry::new();
        registry.register("sql", Arc::new(SerdeSchema::<TableAttrs>::new()));
        let parser = NotebookParser::new(NotebookOptions {
            registry,
            ..NotebookOptions::default()
        });

        let notebook = parser
            .parse(
                "doc.md",
                "```sql {table: \"users\"}\nselect 1;\n```\n\n```sql {kind: \"page\"}\nselect 2;\n```\n",
            )
            .unwrap();

        assert_eq!(notebook.blocks.len(), 2);
        assert_eq!(
            notebook.blocks[0].attrs_safe,
            Some(json!({ "table": "users" }))
        );
        assert!(notebook.blocks[1].attrs_safe.is_none());

        let validate: Vec<_> = notebook
            .issues
            .iter()
            .filter(|issue| issue.kind == IssueKind::FenceAttrsValidate)
            .collect();
        assert_eq!(validate.len(), 1);
        assert_eq!(validate[0].location.block_index, Some(1));
        assert_eq!(validate[0].disposition, Disposition::Error);
    }

    #[test]
    fn section_defaults_reach_next_block_only() {
        let source = "\
## First

```json {role: \"section-defaults\"}
{ cache: 60, layout: { shell: \"main\" } }
```

```sql {layout: {title: \"A\"}}
select 1;
```

```sql
select 2;
```

## Second

```json {role: \"section-defaults\"}
{ cache: 5 }
```

## Third

```sql
select 3;
```
";
        let notebook = parse(source);
        let resolved = |idx: usize| Value::Object(notebook.blocks[idx].resolved.clone().unwrap());

        assert!(notebook.blocks[0].is_section_defaults());
        assert_eq!(
            resolved(1),
            json!({ "cache": 60, "layout": { "shell": "main", "title": "A" } })
        );
        assert_eq!(resolved(2), json!({}));
        assert_eq!(resolved(4), json!({}));
    }

    #[test]
    fn invalid_section_defaults_are_warnings() {
        let notebook = parse("```json {role: \"section-defaults\"}\nnot json\n```\n\n```sql\nselect 1;\n```\n");
        let kinds: Vec<_> = notebook.issues.iter().map(|issue| issue.kind).collect();
        assert!(kinds.contains(&IssueKind::InstructionDefaultsParse));
        assert_eq!(notebook.blocks.len(), 2);
    }

    #[test]
    fn bad_fence_json5_falls_back_to_empty_attrs() {
        let notebook = parse("```sql note {kind: }\nselect 1;\n```\n");
        let block = &notebook.blocks[0];
        assert!(block.attrs.is_empty());
        assert_eq!(block.info.as_deref(), Some("note"));
        let issue = notebook
            .issues
            .iter()
            .find(|issue| issue.kind == IssueKind::FenceAttrsJson5Parse)
            .unwrap();
        assert_eq!(issue.disposition, Disposition::Warning);
        assert_eq!(issue.location.start_line, Some(1));
    }

    #[test]
    fn frontmatter_failure_aborts_unless_downgraded() {
        let source = "---\n- not\n- a mapping\n---\n\n```sql\nselect 1;\n```\n";
        let err = NotebookParser::default().parse("bad.md", source).unwrap_err();
        match err {
            PagesmithError::FrontmatterRejected(issue) => {
                assert_eq!(issue.kind, IssueKind::FrontmatterParse);
                assert_eq!(issue.location.filename, "bad.md");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let lenient = NotebookParser::new(NotebookOptions {
            handler: Some(Arc::new(|issue: &Issue| match issue.kind {
                IssueKind::FrontmatterParse => Disposition::Warning,
                kind => kind.default_disposition(),
            })),
            ..NotebookOptions::default()
        });
        let notebook = lenient.parse("bad.md", source).unwrap();
        assert_eq!(notebook.frontmatter, json!({}));
        assert_eq!(notebook.blocks.len(), 1);
        assert_eq!(notebook.issues[0].disposition, Disposition::Warning);
    }

    #[test]
    fn frontmatter_schema_is_applied() {
        let parser = NotebookParser::new(NotebookOptions {
            frontmatter_schema: Some(Arc::new(FnSchema(|candidate: &Value| {
                if candidate.get("siteName").is_some() {
                    Ok(candidate.clone())
                } else {
                    Err(SchemaError::new("siteName is required"))
                }
            }))),
            ..NotebookOptions::default()
        });
        assert!(parser.parse("a.md", "---\nsiteName: Demo\n---\n").is_ok());
        assert!(parser.parse("b.md", "---\nother: 1\n---\n").is_err());
    }

    #[test]
    fn instructions_accumulate_until_delimiter() {
        let source = "\
Intro paragraph.

## Setup

Create the table.

```sql
create table t (id int);
```

Then seed it.

```sql
insert into t values (1);
```

## Queries

```sql
select * from t;
```

Closing notes.
";
        let notebook = parse(source);
        let text = |idx: usize| notebook.blocks[idx].instructions.as_ref().unwrap().text.clone();

        assert_eq!(text(0), "Setup\n\nCreate the table.");
        assert_eq!(text(1), "Setup\n\nCreate the table.\n\nThen seed it.");
        assert_eq!(text(2), "Queries");
        assert_eq!(
            notebook.blocks[0].instructions.as_ref().unwrap().markdown,
            "## Setup\n\nCreate the table."
        );
        let second = &notebook.blocks[1].instructions.as_ref().unwrap().markdown;
        assert_eq!(second, "## Setup\n\nCreate the table.\n\nThen seed it.");
        assert!(!second.contains("create table"));

        let intro = notebook.module_instructions.as_ref().unwrap();
        assert_eq!(intro.text, "Intro paragraph.\n\nSetup\n\nCreate the table.");
        assert_eq!(notebook.module_appendix.as_ref().unwrap().text, "Closing notes.");
    }

    #[test]
    fn hr_delimiter_resets_without_contributing() {
        let parser = NotebookParser::new(NotebookOptions {
            delimiter: Delimiter::Hr,
            ..NotebookOptions::default()
        });
        let notebook = parser
            .parse(
                "doc.md",
                "# Title\n\nOne.\n\n```sql\nselect 1;\n```\n\n***\n\nTwo.\n\n```sql\nselect 2;\n```\n",
            )
            .unwrap();
        let text = |idx: usize| notebook.blocks[idx].instructions.as_ref().unwrap().text.clone();
        assert_eq!(text(0), "Title\n\nOne.");
        assert_eq!(text(1), "Two.");
    }

    #[test]
    fn out_of_range_heading_delimiter_is_refused() {
        let parser = NotebookParser::new(NotebookOptions {
            delimiter: Delimiter::Heading { level: 9 },
            ..NotebookOptions::default()
        });
        let err = parser.parse("doc.md", "# Title\n").unwrap_err();
        assert!(matches!(err, PagesmithError::Config(ref msg) if msg.contains("got 9")));

        assert!(Delimiter::Heading { level: 0 }.validate().is_err());
        assert!(Delimiter::Heading { level: 6 }.validate().is_ok());
        assert!(Delimiter::Hr.validate().is_ok());
    }

    #[test]
    fn documents_without_blocks_have_only_an_appendix() {
        let notebook = parse("---\ntitle: x\n---\n\nJust prose.\n");
        assert!(notebook.blocks.is_empty());
        assert!(notebook.module_instructions.is_none());
        assert_eq!(notebook.module_appendix.unwrap().text, "Just prose.");
        assert_eq!(notebook.frontmatter, json!({ "title": "x" }));
    }

    #[test]
    fn shebang_and_lines_are_captured() {
        let notebook = parse("text\n\n```sql\n#!/usr/bin/env sqlpage\nselect 1;\n```\n");
        let block = &notebook.blocks[0];
        assert_eq!(block.shebang.as_deref(), Some("#!/usr/bin/env sqlpage"));
        assert_eq!(block.body, "select 1;");
        assert_eq!(block.start_line, Some(3));
        assert_eq!(block.end_line, Some(6));
    }

    #[test]
    fn stream_isolates_fatal_documents() {
        let parser = NotebookParser::default();
        let docs = vec![
            ("a.md", "```sql\nselect 1;\n```\n"),
            ("b.md", "---\nkey: [unclosed\n---\n"),
            ("c.md", "plain\n"),
        ];
        let results: Vec<_> = parser.parse_stream(docs).collect();
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().filename, "c.md");
    }
}
