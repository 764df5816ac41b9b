use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::{
    DirEntry, EntryKind, FsDriver, MkdirOptions, Outcome, RmOptions, Stat, TransferOptions,
    WriteOptions,
};
use crate::error::FsError;
use crate::path::AbsolutePath;

/// Thin pass-through to the host filesystem.
///
/// Canonical absolute paths are interpreted beneath `mount`, so `/a/b` maps to
/// `{mount}/a/b`. A mount of `/` addresses the host filesystem directly.
#[derive(Clone, Debug)]
pub struct LocalDriver {
    mount: PathBuf,
}

impl LocalDriver {
    pub fn new(mount: impl Into<PathBuf>) -> Self {
        Self {
            mount: mount.into(),
        }
    }

    pub fn host() -> Self {
        Self::new("/")
    }

    pub fn mount(&self) -> &Path {
        &self.mount
    }

    fn host_path(&self, path: &AbsolutePath) -> PathBuf {
        let mut host = self.mount.clone();
        for segment in path.segments() {
            host.push(segment);
        }
        host
    }

    fn kind_at(&self, path: &AbsolutePath) -> Result<Option<EntryKind>, FsError> {
        match fs::metadata(self.host_path(path)) {
            Ok(meta) if meta.is_dir() => Ok(Some(EntryKind::Directory)),
            Ok(_) => Ok(Some(EntryKind::File)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(map_io(path, err)),
        }
    }

    fn require_parent_dir(&self, path: &AbsolutePath) -> Result<(), FsError> {
        let parent = path.parent();
        match self.kind_at(&parent)? {
            Some(EntryKind::Directory) => Ok(()),
            _ => Err(FsError::NoSuchDirectory(parent.to_string())),
        }
    }

    fn prepare_transfer(
        &self,
        from: &AbsolutePath,
        to: &AbsolutePath,
        options: TransferOptions,
    ) -> Result<(EntryKind, Outcome), FsError> {
        let Some(kind) = self.kind_at(from)? else {
            return Err(FsError::NotFound(from.to_string()));
        };
        if from == to || to.as_str().starts_with(&format!("{}/", from.as_str())) {
            return Err(FsError::invalid(
                to.as_str(),
                format!("cannot transfer {from} into itself"),
            ));
        }
        let mut outcome = Outcome::Created;
        if self.kind_at(to)?.is_some() {
            if !options.overwrite {
                return Err(FsError::AlreadyExists(to.to_string()));
            }
            self.rm(to, RmOptions::recursive())?;
            outcome = Outcome::Replaced;
        }
        self.require_parent_dir(to)?;
        Ok((kind, outcome))
    }
}

fn map_io(path: &AbsolutePath, err: io::Error) -> FsError {
    match err.kind() {
        io::ErrorKind::NotFound => FsError::NotFound(path.to_string()),
        io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path.to_string()),
        io::ErrorKind::DirectoryNotEmpty => FsError::NotEmpty(path.to_string()),
        _ => FsError::Io {
            path: path.to_string(),
            source: err,
        },
    }
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir(to)?;
    let mut entries: Vec<_> = fs::read_dir(from)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());
    for entry in entries {
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

impl FsDriver for LocalDriver {
    fn read(&self, path: &AbsolutePath) -> Result<Vec<u8>, FsError> {
        match self.kind_at(path)? {
            Some(EntryKind::File) => fs::read(self.host_path(path)).map_err(|err| map_io(path, err)),
            Some(EntryKind::Directory) => Err(FsError::WrongKind {
                path: path.to_string(),
                expected: "file",
            }),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    fn write(
        &self,
        path: &AbsolutePath,
        contents: &[u8],
        options: WriteOptions,
    ) -> Result<Outcome, FsError> {
        let outcome = match self.kind_at(path)? {
            Some(EntryKind::Directory) => {
                return Err(FsError::WrongKind {
                    path: path.to_string(),
                    expected: "file",
                });
            }
            Some(EntryKind::File) if !options.overwrite => {
                return Err(FsError::AlreadyExists(path.to_string()));
            }
            Some(EntryKind::File) => Outcome::Replaced,
            None => Outcome::Created,
        };
        self.require_parent_dir(path)?;

        let mut open = fs::OpenOptions::new();
        open.write(true);
        if options.overwrite {
            open.create(true).truncate(true);
        } else {
            open.create_new(true);
        }
        let mut file = open
            .open(self.host_path(path))
            .map_err(|err| map_io(path, err))?;
        file.write_all(contents).map_err(|err| map_io(path, err))?;
        Ok(outcome)
    }

    fn mkdir(&self, path: &AbsolutePath, options: MkdirOptions) -> Result<Outcome, FsError> {
        match self.kind_at(path)? {
            Some(EntryKind::Directory) if options.recursive => return Ok(Outcome::Unchanged),
            Some(_) => return Err(FsError::AlreadyExists(path.to_string())),
            None => {}
        }
        if options.recursive {
            fs::create_dir_all(self.host_path(path)).map_err(|err| map_io(path, err))?;
        } else {
            self.require_parent_dir(path)?;
            fs::create_dir(self.host_path(path)).map_err(|err| map_io(path, err))?;
        }
        Ok(Outcome::Created)
    }

    fn rm(&self, path: &AbsolutePath, options: RmOptions) -> Result<(), FsError> {
        if path.is_root() {
            return Err(FsError::invalid(path.as_str(), "refusing to remove the root"));
        }
        let host = self.host_path(path);
        match self.kind_at(path)? {
            None => Err(FsError::NotFound(path.to_string())),
            Some(EntryKind::File) => fs::remove_file(host).map_err(|err| map_io(path, err)),
            Some(EntryKind::Directory) if options.recursive => {
                fs::remove_dir_all(host).map_err(|err| map_io(path, err))
            }
            Some(EntryKind::Directory) => {
                let has_children = fs::read_dir(&host)
                    .map_err(|err| map_io(path, err))?
                    .next()
                    .is_some();
                if has_children {
                    return Err(FsError::NotEmpty(path.to_string()));
                }
                fs::remove_dir(host).map_err(|err| map_io(path, err))
            }
        }
    }

    fn rename(
        &self,
        from: &AbsolutePath,
        to: &AbsolutePath,
        options: TransferOptions,
    ) -> Result<(), FsError> {
        self.prepare_transfer(from, to, options)?;
        fs::rename(self.host_path(from), self.host_path(to)).map_err(|err| map_io(to, err))
    }

    fn copy(
        &self,
        from: &AbsolutePath,
        to: &AbsolutePath,
        options: TransferOptions,
    ) -> Result<Outcome, FsError> {
        let (kind, outcome) = self.prepare_transfer(from, to, options)?;
        let (source, target) = (self.host_path(from), self.host_path(to));
        match kind {
            EntryKind::File => fs::copy(source, target)
                .map(|_| ())
                .map_err(|err| map_io(to, err))?,
            EntryKind::Directory => copy_tree(&source, &target).map_err(|err| map_io(to, err))?,
        }
        Ok(outcome)
    }

    fn list(&self, path: &AbsolutePath) -> Result<Vec<DirEntry>, FsError> {
        match self.kind_at(path)? {
            None => return Err(FsError::NotFound(path.to_string())),
            Some(EntryKind::File) => {
                return Err(FsError::WrongKind {
                    path: path.to_string(),
                    expected: "directory",
                });
            }
            Some(EntryKind::Directory) => {}
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(self.host_path(path)).map_err(|err| map_io(path, err))? {
            let entry = entry.map_err(|err| map_io(path, err))?;
            let file_type = entry.file_type().map_err(|err| map_io(path, err))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: if file_type.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn stat(&self, path: &AbsolutePath) -> Result<Stat, FsError> {
        match fs::metadata(self.host_path(path)) {
            Ok(meta) => Ok(Stat {
                exists: true,
                kind: Some(if meta.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                }),
                size: if meta.is_dir() { 0 } else { meta.len() },
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Stat::missing()),
            Err(err) => Err(map_io(path, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn p(path: &str) -> AbsolutePath {
        AbsolutePath::parse(path).unwrap()
    }

    #[test]
    fn write_and_read_round_trip_under_mount() {
        let temp = tempdir().unwrap();
        let driver = LocalDriver::new(temp.path());
        driver.mkdir(&p("/site"), MkdirOptions::default()).unwrap();
        driver
            .write(&p("/site/index.sql"), b"select 1;", WriteOptions::default())
            .unwrap();

        assert_eq!(driver.read(&p("/site/index.sql")).unwrap(), b"select 1;");
        assert!(temp.path().join("site").join("index.sql").is_file());
    }

    #[test]
    fn error_kinds_match_memory_backend() {
        let temp = tempdir().unwrap();
        let driver = LocalDriver::new(temp.path());

        assert!(matches!(
            driver.read(&p("/missing")).unwrap_err(),
            FsError::NotFound(_)
        ));
        assert!(matches!(
            driver
                .mkdir(&p("/a/b"), MkdirOptions::default())
                .unwrap_err(),
            FsError::NoSuchDirectory(_)
        ));

        driver.mkdir(&p("/a/b"), MkdirOptions::recursive()).unwrap();
        driver
            .write(&p("/a/b/f.txt"), b"x", WriteOptions::default())
            .unwrap();
        assert!(matches!(
            driver
                .write(&p("/a/b/f.txt"), b"y", WriteOptions::default())
                .unwrap_err(),
            FsError::AlreadyExists(_)
        ));
        assert!(matches!(
            driver.rm(&p("/a"), RmOptions::default()).unwrap_err(),
            FsError::NotEmpty(_)
        ));
        assert!(!driver.stat(&p("/nope")).unwrap().exists);
    }

    #[test]
    fn copy_directory_recursively() {
        let temp = tempdir().unwrap();
        let driver = LocalDriver::new(temp.path());
        driver.mkdir(&p("/src/nested"), MkdirOptions::recursive()).unwrap();
        driver
            .write(&p("/src/nested/a.md"), b"a", WriteOptions::default())
            .unwrap();

        driver
            .copy(&p("/src"), &p("/dst"), TransferOptions::default())
            .unwrap();
        assert_eq!(driver.read(&p("/dst/nested/a.md")).unwrap(), b"a");

        let names: Vec<_> = driver
            .list(&p("/"))
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["dst", "src"]);
    }
}
