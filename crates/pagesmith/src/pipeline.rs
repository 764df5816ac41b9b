//! End-to-end build: source tree -> notebooks -> content units -> output tree.

use std::vec;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{MaterializeError, PagesmithError};
use crate::fs::{FsDriver, LocalDriver, ReactiveFs, RootedDriver};
use crate::materialize::{MaterializeOptions, Materializer, Resource, SkippedResource};
use crate::notebook::{Issue, IssueSummary, NotebookParser};
use crate::path::{AbsolutePath, RelativePath};
use crate::playbook::{playbook_options, resource_from_sql_file, resources_from_notebook};
use crate::workspace::{DOT_DIR, ProjectConfig, WorkspacePaths};

/// A source file excluded from the build: unreadable, not UTF-8, or with
/// frontmatter that failed to parse.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RejectedDocument {
    pub path: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BuildReport {
    /// Source files that contributed content, in walk order.
    pub documents: Vec<String>,
    pub rejected: Vec<RejectedDocument>,
    pub issues: Vec<Issue>,
    pub summary: IssueSummary,
    pub written: Vec<String>,
    pub unchanged: Vec<String>,
    pub skipped: Vec<SkippedResource>,
    /// Routes promoted to roots because their parent chain looped.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub route_cycles: Vec<String>,
}

impl BuildReport {
    pub fn has_rejections(&self) -> bool {
        !self.rejected.is_empty()
    }
}

struct Collected {
    documents: Vec<String>,
    rejected: Vec<RejectedDocument>,
    issues: Vec<Issue>,
    resources: Vec<Resource>,
}

impl Collected {
    fn reject(&mut self, file: &RelativePath, reason: String) {
        warn!(file = %file, reason = %reason, "rejected document");
        self.rejected.push(RejectedDocument {
            path: file.to_string(),
            reason,
        });
    }
}

pub struct Pipeline<D> {
    fs: ReactiveFs<D>,
    config: ProjectConfig,
    parser: NotebookParser,
}

impl Pipeline<LocalDriver> {
    /// Opens a pipeline over the on-disk project at `paths`.
    ///
    /// The host filesystem is addressed directly and jailed at the project root,
    /// so `../` segments that climb above it fail with `PathEscapesRoot`.
    pub fn open(paths: &WorkspacePaths, config: ProjectConfig) -> Result<Self, PagesmithError> {
        let root = paths.root().to_str().ok_or_else(|| {
            PagesmithError::Workspace(format!(
                "project root {} is not valid UTF-8",
                paths.root().display()
            ))
        })?;
        let root = AbsolutePath::parse(root)?;
        Ok(Self::new(
            ReactiveFs::new(RootedDriver::new(LocalDriver::host(), root)),
            config,
        ))
    }
}

impl<D: FsDriver> Pipeline<D> {
    pub fn new(fs: ReactiveFs<D>, config: ProjectConfig) -> Self {
        let parser = NotebookParser::new(playbook_options(config.notebook_options()));
        Self { fs, config, parser }
    }

    pub fn with_parser(mut self, parser: NotebookParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn fs(&self) -> &ReactiveFs<D> {
        &self.fs
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn parser(&self) -> &NotebookParser {
        &self.parser
    }

    /// Parses the source tree and writes every artifact beneath the output directory.
    pub fn run(&self) -> Result<BuildReport, PagesmithError> {
        let collected = self.collect()?;
        let output_dir = self.config.output_dir()?;
        let materializer = self.materializer(collected.resources);
        let written = materializer.materialize(&self.fs, &output_dir)?;

        let report = BuildReport {
            summary: IssueSummary::from_issues(&collected.issues),
            documents: collected.documents,
            rejected: collected.rejected,
            issues: collected.issues,
            written: written.written,
            unchanged: written.unchanged,
            skipped: materializer.skipped().to_vec(),
            route_cycles: materializer.routes().cycles.clone(),
        };
        info!(
            documents = report.documents.len(),
            rejected = report.rejected.len(),
            written = report.written.len(),
            unchanged = report.unchanged.len(),
            "{}",
            report.summary
        );
        Ok(report)
    }

    /// The upsert batch for the current source tree; nothing is written.
    pub fn sql(&self) -> Result<Vec<String>, PagesmithError> {
        let collected = self.collect()?;
        Ok(self
            .materializer(collected.resources)
            .sql(&self.config.sql_options()))
    }

    /// `*.md` and `*.sql` files under the source directory, sorted, skipping the
    /// project folder and the output directory.
    pub fn sources(&self) -> Result<Vec<RelativePath>, PagesmithError> {
        let source_dir = self.config.source_dir()?;
        let output_dir = self.config.output_dir()?;

        if !self.fs.stat(&source_dir)?.is_dir() {
            return Err(MaterializeError::SourceNotFound(display_dir(&source_dir)).into());
        }

        let files = self.fs.walk(&source_dir, |dir| {
            dir.file_name() != Some(DOT_DIR) && *dir != output_dir
        })?;
        Ok(files
            .into_iter()
            .filter(|file| matches!(file.extension(), Some("md") | Some("sql")))
            .collect())
    }

    fn collect(&self) -> Result<Collected, PagesmithError> {
        let source_dir = self.config.source_dir()?;
        let mut collected = Collected {
            documents: Vec::new(),
            rejected: Vec::new(),
            issues: Vec::new(),
            resources: Vec::new(),
        };

        for file in self.sources()? {
            let contents = match self.fs.read_to_string(&file) {
                Ok(contents) => contents,
                Err(err) => {
                    collected.reject(&file, err.to_string());
                    continue;
                }
            };
            if file.extension() == Some("sql") {
                let page = strip_dir(&source_dir, &file);
                collected.resources.push(resource_from_sql_file(&page, &contents));
                collected.documents.push(file.to_string());
                continue;
            }

            match self.parser.parse(file.as_str(), &contents) {
                Ok(notebook) => {
                    debug!(
                        file = %file,
                        blocks = notebook.blocks.len(),
                        issues = notebook.issues.len(),
                        "parsed notebook"
                    );
                    collected.resources.extend(resources_from_notebook(&notebook));
                    collected.issues.extend(notebook.issues);
                    collected.documents.push(file.to_string());
                }
                Err(PagesmithError::FrontmatterRejected(issue)) => {
                    collected.reject(&file, issue.message.clone());
                    collected.issues.push(*issue);
                }
                Err(other) => collected.reject(&file, other.to_string()),
            }
        }
        Ok(collected)
    }

    fn materializer(&self, resources: Vec<Resource>) -> Materializer<vec::IntoIter<Resource>> {
        Materializer::new(resources).with_options(MaterializeOptions {
            emit_auto: self.config.emit_auto,
        })
    }
}

fn display_dir(dir: &RelativePath) -> String {
    if dir.is_empty() {
        ".".to_string()
    } else {
        dir.to_string()
    }
}

// `notebooks/reports/q1.sql` under `notebooks` -> `reports/q1.sql`.
fn strip_dir(dir: &RelativePath, file: &RelativePath) -> RelativePath {
    if dir.is_empty() {
        return file.clone();
    }
    file.as_str()
        .strip_prefix(dir.as_str())
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|rest| RelativePath::parse(rest).ok())
        .unwrap_or_else(|| file.clone())
}
