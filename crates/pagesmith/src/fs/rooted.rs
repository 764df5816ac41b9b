use tracing::warn;

use super::{
    DirEntry, FsDriver, MkdirOptions, Outcome, RmOptions, Stat, TransferOptions, WriteOptions,
};
use crate::error::FsError;
use crate::path::{AbsolutePath, RelativePath, is_inside_root, relative_to_root, to_absolute};

/// Jails a driver beneath `root`.
///
/// Every call resolves its relative path against the root and checks containment
/// before the wrapped driver sees anything, so a path that escapes fails with
/// `PathEscapesRoot` and performs no I/O.
pub struct RootedDriver<D> {
    driver: D,
    root: AbsolutePath,
}

impl<D: FsDriver> RootedDriver<D> {
    pub fn new(driver: D, root: AbsolutePath) -> Self {
        Self { driver, root }
    }

    pub fn root(&self) -> &AbsolutePath {
        &self.root
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Resolves `relative` to an absolute path inside the root.
    pub fn resolve(&self, relative: &RelativePath) -> Result<AbsolutePath, FsError> {
        let absolute = to_absolute(&self.root, relative);
        if !is_inside_root(&absolute, &self.root) {
            warn!(
                path = %relative,
                root = %self.root,
                "rejected path escaping root"
            );
            return Err(FsError::PathEscapesRoot {
                path: relative.to_string(),
                root: self.root.to_string(),
            });
        }
        Ok(absolute)
    }

    /// Maps a driver path back to its root-relative form.
    pub fn relativize(&self, absolute: &AbsolutePath) -> Result<RelativePath, FsError> {
        relative_to_root(absolute, &self.root)
    }

    pub fn read(&self, path: &RelativePath) -> Result<Vec<u8>, FsError> {
        let absolute = self.resolve(path)?;
        self.driver.read(&absolute)
    }

    pub fn write(
        &self,
        path: &RelativePath,
        contents: &[u8],
        options: WriteOptions,
    ) -> Result<Outcome, FsError> {
        let absolute = self.resolve(path)?;
        self.driver.write(&absolute, contents, options)
    }

    pub fn mkdir(&self, path: &RelativePath, options: MkdirOptions) -> Result<Outcome, FsError> {
        let absolute = self.resolve(path)?;
        self.driver.mkdir(&absolute, options)
    }

    pub fn rm(&self, path: &RelativePath, options: RmOptions) -> Result<(), FsError> {
        let absolute = self.resolve(path)?;
        self.driver.rm(&absolute, options)
    }

    pub fn rename(
        &self,
        from: &RelativePath,
        to: &RelativePath,
        options: TransferOptions,
    ) -> Result<(), FsError> {
        let (from, to) = (self.resolve(from)?, self.resolve(to)?);
        self.driver.rename(&from, &to, options)
    }

    pub fn copy(
        &self,
        from: &RelativePath,
        to: &RelativePath,
        options: TransferOptions,
    ) -> Result<Outcome, FsError> {
        let (from, to) = (self.resolve(from)?, self.resolve(to)?);
        self.driver.copy(&from, &to, options)
    }

    pub fn list(&self, path: &RelativePath) -> Result<Vec<DirEntry>, FsError> {
        let absolute = self.resolve(path)?;
        self.driver.list(&absolute)
    }

    pub fn stat(&self, path: &RelativePath) -> Result<Stat, FsError> {
        let absolute = self.resolve(path)?;
        self.driver.stat(&absolute)
    }
}
