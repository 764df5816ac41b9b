use std::path::PathBuf;

use pagesmith::workspace::{
    FilesystemWorkspaceLocator, ProjectConfig, WorkspaceLocator, WorkspacePaths,
};
use pagesmith::{LocalDriver, Pipeline};

use crate::error::CliError;

#[derive(Clone, Copy, Debug, Default)]
pub struct Verbosity {
    pub json: bool,
    pub verbose: bool,
}

pub struct CliSession {
    pub workspace_paths: WorkspacePaths,
    pub config: ProjectConfig,
    pub pipeline: Pipeline<LocalDriver>,
    pub verbosity: Verbosity,
}

impl CliSession {
    pub fn bootstrap(
        workspace_override: Option<String>,
        verbosity: Verbosity,
    ) -> Result<Self, CliError> {
        let locator = match workspace_override {
            Some(path) => FilesystemWorkspaceLocator::new(PathBuf::from(path)),
            None => FilesystemWorkspaceLocator::from_current_dir()?,
        };

        let workspace_paths = locator.workspace()?;
        let config = ProjectConfig::load(&workspace_paths)?;
        let pipeline = Pipeline::open(&workspace_paths, config.clone())?;

        Ok(Self {
            workspace_paths,
            config,
            pipeline,
            verbosity,
        })
    }
}
