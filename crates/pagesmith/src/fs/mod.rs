mod local;
mod memory;
mod reactive;
mod rooted;

use std::sync::Arc;

use serde::Serialize;

use crate::error::FsError;
use crate::path::AbsolutePath;

pub use local::LocalDriver;
pub use memory::MemoryDriver;
pub use reactive::{
    ChangeKind, EventKind, FsEvent, FsOp, OpEvent, Phase, ReactiveFs, SubscriptionId, WatchEvent,
};
pub use rooted::RootedDriver;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

/// Result of probing a path. Missing paths report `exists: false` instead of failing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Stat {
    pub exists: bool,
    pub kind: Option<EntryKind>,
    pub size: u64,
}

impl Stat {
    pub fn missing() -> Self {
        Self {
            exists: false,
            kind: None,
            size: 0,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == Some(EntryKind::File)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == Some(EntryKind::Directory)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// What a mutating call did to its destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Replaced,
    /// Nothing changed, e.g. a recursive `mkdir` on an existing directory.
    Unchanged,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WriteOptions {
    pub overwrite: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MkdirOptions {
    pub recursive: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RmOptions {
    pub recursive: bool,
}

/// Options shared by `rename` (move) and `copy`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransferOptions {
    pub overwrite: bool,
}

impl WriteOptions {
    pub fn overwrite() -> Self {
        Self { overwrite: true }
    }
}

impl MkdirOptions {
    pub fn recursive() -> Self {
        Self { recursive: true }
    }
}

impl RmOptions {
    pub fn recursive() -> Self {
        Self { recursive: true }
    }
}

/// Uniform verb set every backend implements over canonical absolute paths.
///
/// Backends must agree on error kinds so callers stay backend-agnostic:
/// `read` on a missing path is `NotFound`, collisions without `overwrite` are
/// `AlreadyExists`, a missing parent is `NoSuchDirectory`, and removing a
/// non-empty directory without `recursive` is `NotEmpty`.
pub trait FsDriver: Send + Sync {
    fn read(&self, path: &AbsolutePath) -> Result<Vec<u8>, FsError>;
    fn write(
        &self,
        path: &AbsolutePath,
        contents: &[u8],
        options: WriteOptions,
    ) -> Result<Outcome, FsError>;
    fn mkdir(&self, path: &AbsolutePath, options: MkdirOptions) -> Result<Outcome, FsError>;
    fn rm(&self, path: &AbsolutePath, options: RmOptions) -> Result<(), FsError>;
    /// Moves `from` to `to`.
    fn rename(
        &self,
        from: &AbsolutePath,
        to: &AbsolutePath,
        options: TransferOptions,
    ) -> Result<(), FsError>;
    fn copy(
        &self,
        from: &AbsolutePath,
        to: &AbsolutePath,
        options: TransferOptions,
    ) -> Result<Outcome, FsError>;
    /// Lists immediate children sorted by name.
    fn list(&self, path: &AbsolutePath) -> Result<Vec<DirEntry>, FsError>;
    fn stat(&self, path: &AbsolutePath) -> Result<Stat, FsError>;
}

impl<D> FsDriver for Arc<D>
where
    D: FsDriver + ?Sized,
{
    fn read(&self, path: &AbsolutePath) -> Result<Vec<u8>, FsError> {
        (**self).read(path)
    }

    fn write(
        &self,
        path: &AbsolutePath,
        contents: &[u8],
        options: WriteOptions,
    ) -> Result<Outcome, FsError> {
        (**self).write(path, contents, options)
    }

    fn mkdir(&self, path: &AbsolutePath, options: MkdirOptions) -> Result<Outcome, FsError> {
        (**self).mkdir(path, options)
    }

    fn rm(&self, path: &AbsolutePath, options: RmOptions) -> Result<(), FsError> {
        (**self).rm(path, options)
    }

    fn rename(
        &self,
        from: &AbsolutePath,
        to: &AbsolutePath,
        options: TransferOptions,
    ) -> Result<(), FsError> {
        (**self).rename(from, to, options)
    }

    fn copy(
        &self,
        from: &AbsolutePath,
        to: &AbsolutePath,
        options: TransferOptions,
    ) -> Result<Outcome, FsError> {
        (**self).copy(from, to, options)
    }

    fn list(&self, path: &AbsolutePath) -> Result<Vec<DirEntry>, FsError> {
        (**self).list(path)
    }

    fn stat(&self, path: &AbsolutePath) -> Result<Stat, FsError> {
        (**self).stat(path)
    }
}
