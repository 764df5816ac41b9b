use std::fmt;

use thiserror::Error;

use crate::notebook::Issue;

/// Filesystem-layer failures shared by every driver backend.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("path {path} escapes root {root}")]
    PathEscapesRoot { path: String, root: String },
    #[error("path {path} is outside root {root}")]
    PathOutsideRoot { path: String, root: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("directory not empty: {0}")]
    NotEmpty(String),
    #[error("no such directory: {0}")]
    NoSuchDirectory(String),
    #[error("{path} is not a {expected}")]
    WrongKind { path: String, expected: &'static str },
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Failures raised while persisting materialized artifacts.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("destination exists and cannot be replaced: {0}")]
    DestinationExists(String),
    #[error("source not found: {0}")]
    SourceNotFound(String),
    #[error("write failed for {path}: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: FsError,
    },
}

/// High-level error type shared across pagesmith components.
#[derive(Debug, Error)]
pub enum PagesmithError {
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error(transparent)]
    Materialize(#[from] MaterializeError),
    #[error("frontmatter rejected for {}: {}", .0.location.filename, .0.message)]
    FrontmatterRejected(Box<Issue>),
    #[error("markdown error: {0}")]
    Markdown(String),
    #[error("workspace error: {0}")]
    Workspace(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for PagesmithError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl PagesmithError {
    pub fn context<T: fmt::Display>(self, ctx: T) -> Self {
        match self {
            PagesmithError::Markdown(msg) => PagesmithError::Markdown(format!("{ctx}: {msg}")),
            PagesmithError::Workspace(msg) => PagesmithError::Workspace(format!("{ctx}: {msg}")),
            PagesmithError::Config(msg) => PagesmithError::Config(format!("{ctx}: {msg}")),
            PagesmithError::Serialization(msg) => {
                PagesmithError::Serialization(format!("{ctx}: {msg}"))
            }
            other => other,
        }
    }
}
