use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PagesmithError;
use crate::materialize::{SqlOptions, SqlStrategy};
use crate::notebook::{Delimiter, NotebookOptions};
use crate::path::{RelativePath, RelativePolicy, parse_relative};

pub const DOT_DIR: &str = ".pagesmith";
pub const CONFIG_FILE: &str = "config.yaml";

/// Canonical locations for a pagesmith project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspacePaths {
    root: PathBuf,
    dot_dir: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: PathBuf, dot_dir: PathBuf) -> Self {
        Self { root, dot_dir }
    }

    /// Project root; every pipeline path is jailed beneath it.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `.pagesmith` folder for this project.
    pub fn dot_dir(&self) -> &Path {
        &self.dot_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.dot_dir.join(CONFIG_FILE)
    }
}

pub trait WorkspaceLocator: Send + Sync {
    fn workspace(&self) -> Result<WorkspacePaths, PagesmithError>;
}

/// Filesystem-backed locator that caches the last discovery and revalidates it.
pub struct FilesystemWorkspaceLocator {
    start: PathBuf,
    cache: Mutex<Option<WorkspacePaths>>,
}

impl FilesystemWorkspaceLocator {
    pub fn new(start: impl Into<PathBuf>) -> Self {
        Self {
            start: start.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn from_current_dir() -> Result<Self, PagesmithError> {
        Ok(Self::new(env::current_dir()?))
    }
}

impl WorkspaceLocator for FilesystemWorkspaceLocator {
    fn workspace(&self) -> Result<WorkspacePaths, PagesmithError> {
        if let Some(paths) = self.cache.lock().clone() {
            if paths.root().is_dir() && paths.dot_dir().is_dir() {
                return Ok(paths);
            }
        }

        let discovered = discover(&self.start)?;
        *self.cache.lock() = Some(discovered.clone());
        Ok(discovered)
    }
}

/// Walks up from `start` to the nearest directory holding `.pagesmith/`.
pub fn discover(start: impl AsRef<Path>) -> Result<WorkspacePaths, PagesmithError> {
    let canonical_start = normalize_start(start.as_ref())?;

    for ancestor in canonical_start.ancestors() {
        let candidate = ancestor.join(DOT_DIR);
        if candidate.is_dir() {
            debug!(root = %ancestor.display(), "discovered workspace");
            return Ok(WorkspacePaths::new(ancestor.to_path_buf(), candidate));
        }
    }

    Err(PagesmithError::Workspace(format!(
        "no {DOT_DIR} directory found from {}",
        canonical_start.display()
    )))
}

// Nearest existing directory at or above `start`, canonicalized. A file
// start resolves to its directory; a path that does not exist yet resolves
// to its closest existing ancestor.
fn normalize_start(start: &Path) -> Result<PathBuf, PagesmithError> {
    let existing = start
        .ancestors()
        .find(|candidate| !candidate.as_os_str().is_empty() && candidate.exists())
        .ok_or_else(|| {
            PagesmithError::Workspace(format!("{} has no existing ancestor", start.display()))
        })?;
    let dir = match existing.parent() {
        _ if !existing.is_file() => existing,
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(fs::canonicalize(dir)?)
}

/// Contents of `.pagesmith/config.yaml`. Every field is optional.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ProjectConfig {
    pub source_dir: String,
    pub output_dir: String,
    pub delimiter: Delimiter,
    pub strip_shebang: bool,
    pub mirror_frontmatter: bool,
    pub sql: SqlConfig,
    pub emit_auto: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            source_dir: ".".into(),
            output_dir: "dist".into(),
            delimiter: Delimiter::default(),
            strip_shebang: true,
            mirror_frontmatter: false,
            sql: SqlConfig::default(),
            emit_auto: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    pub table: String,
    pub strategy: SqlStrategy,
    pub inline_head_tail: bool,
}

impl Default for SqlConfig {
    fn default() -> Self {
        let options = SqlOptions::default();
        Self {
            table: options.table,
            strategy: options.strategy,
            inline_head_tail: options.inline_head_tail,
        }
    }
}

impl From<&SqlConfig> for SqlOptions {
    fn from(config: &SqlConfig) -> Self {
        SqlOptions {
            table: config.table.clone(),
            strategy: config.strategy,
            inline_head_tail: config.inline_head_tail,
        }
    }
}

impl ProjectConfig {
    /// Loads the config for `paths`; a missing file yields defaults.
    pub fn load(paths: &WorkspacePaths) -> Result<Self, PagesmithError> {
        let file = paths.config_file();
        if !file.is_file() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&file)?;
        Self::from_yaml(&raw).map_err(|err| err.context(file.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self, PagesmithError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self =
            serde_yaml::from_str(raw).map_err(|err| PagesmithError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PagesmithError> {
        self.source_dir()?;
        let output = self.output_dir()?;
        if output.is_empty() {
            return Err(PagesmithError::Config(
                "output_dir must not be the project root".into(),
            ));
        }
        self.delimiter.validate()?;
        if !crate::materialize::sql::is_plain_identifier(&self.sql.table) {
            return Err(PagesmithError::Config(format!(
                "sql.table {:?} is not a plain identifier",
                self.sql.table
            )));
        }
        Ok(())
    }

    pub fn source_dir(&self) -> Result<RelativePath, PagesmithError> {
        parse_config_path("source_dir", &self.source_dir)
    }

    pub fn output_dir(&self) -> Result<RelativePath, PagesmithError> {
        parse_config_path("output_dir", &self.output_dir)
    }

    pub fn sql_options(&self) -> SqlOptions {
        SqlOptions::from(&self.sql)
    }

    /// Parser options carrying this project's delimiter and block handling.
    pub fn notebook_options(&self) -> NotebookOptions {
        NotebookOptions {
            delimiter: self.delimiter,
            strip_shebang: self.strip_shebang,
            mirror_frontmatter: self.mirror_frontmatter,
            ..NotebookOptions::default()
        }
    }
}

fn parse_config_path(field: &str, value: &str) -> Result<RelativePath, PagesmithError> {
    parse_relative(value, RelativePolicy::allow_empty())
        .map_err(|err| PagesmithError::Config(format!("{field}: {err}")))
}
