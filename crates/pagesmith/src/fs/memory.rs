use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;

use super::{
    DirEntry, EntryKind, FsDriver, MkdirOptions, Outcome, RmOptions, Stat, TransferOptions,
    WriteOptions,
};
use crate::error::FsError;
use crate::path::AbsolutePath;

/// Process-local backend keeping directories and files in ordered maps.
pub struct MemoryDriver {
    state: Mutex<MemoryState>,
}

struct MemoryState {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        let mut dirs = BTreeSet::new();
        dirs.insert("/".to_string());
        Self {
            state: Mutex::new(MemoryState {
                dirs,
                files: BTreeMap::new(),
            }),
        }
    }
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a file, creating any missing parent directories.
    pub fn with_file(self, path: &str, contents: impl AsRef<[u8]>) -> Result<Self, FsError> {
        let path = AbsolutePath::parse(path)?;
        self.mkdir(&path.parent(), MkdirOptions::recursive())?;
        self.write(&path, contents.as_ref(), WriteOptions::overwrite())?;
        Ok(self)
    }
}

impl MemoryState {
    fn kind_of(&self, path: &str) -> Option<EntryKind> {
        if self.dirs.contains(path) {
            Some(EntryKind::Directory)
        } else if self.files.contains_key(path) {
            Some(EntryKind::File)
        } else {
            None
        }
    }

    fn require_parent_dir(&self, path: &AbsolutePath) -> Result<(), FsError> {
        let parent = path.parent();
        if self.dirs.contains(parent.as_str()) {
            Ok(())
        } else {
            Err(FsError::NoSuchDirectory(parent.to_string()))
        }
    }

    fn has_children(&self, dir: &str) -> bool {
        self.dirs.iter().any(|d| is_descendant(d.as_str(), dir))
            || self.files.keys().any(|f| is_descendant(f.as_str(), dir))
    }

    fn remove_tree(&mut self, path: &str) {
        self.files.remove(path);
        self.dirs.remove(path);
        self.files.retain(|key, _| !is_descendant(key, path));
        self.dirs.retain(|key| !is_descendant(key, path));
    }

    /// Copies `from` (file or tree) onto `to`, returning the copied entries.
    fn snapshot_tree(&self, from: &str, to: &str) -> (Vec<String>, Vec<(String, Vec<u8>)>) {
        let rebase = |key: &str| format!("{to}{}", &key[from.len()..]);
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        if self.dirs.contains(from) {
            dirs.push(to.to_string());
        }
        if let Some(bytes) = self.files.get(from) {
            files.push((to.to_string(), bytes.clone()));
        }
        for dir in self.dirs.iter().filter(|d| is_descendant(d.as_str(), from)) {
            dirs.push(rebase(dir));
        }
        for (file, bytes) in self.files.iter().filter(|(f, _)| is_descendant(f.as_str(), from)) {
            files.push((rebase(file), bytes.clone()));
        }
        (dirs, files)
    }

    fn prepare_transfer(
        &mut self,
        from: &AbsolutePath,
        to: &AbsolutePath,
        options: TransferOptions,
    ) -> Result<Outcome, FsError> {
        if self.kind_of(from.as_str()).is_none() {
            return Err(FsError::NotFound(from.to_string()));
        }
        if from == to || is_descendant(to.as_str(), from.as_str()) {
            return Err(FsError::invalid(
                to.as_str(),
                format!("cannot transfer {from} into itself"),
            ));
        }
        let mut outcome = Outcome::Created;
        if self.kind_of(to.as_str()).is_some() {
            if !options.overwrite {
                return Err(FsError::AlreadyExists(to.to_string()));
            }
            self.remove_tree(to.as_str());
            outcome = Outcome::Replaced;
        }
        self.require_parent_dir(to)?;
        Ok(outcome)
    }
}

fn is_descendant(candidate: &str, dir: &str) -> bool {
    if dir == "/" {
        return candidate != "/";
    }
    candidate.len() > dir.len() + 1
        && candidate.starts_with(dir)
        && candidate.as_bytes()[dir.len()] == b'/'
}

impl FsDriver for MemoryDriver {
    fn read(&self, path: &AbsolutePath) -> Result<Vec<u8>, FsError> {
        let state = self.state.lock();
        match state.kind_of(path.as_str()) {
            Some(EntryKind::File) => Ok(state.files[path.as_str()].clone()),
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
        let mut state = self.state.lock();
        let outcome = match state.kind_of(path.as_str()) {
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
        state.require_parent_dir(path)?;
        state.files.insert(path.to_string(), contents.to_vec());
        Ok(outcome)
    }

    fn mkdir(&self, path: &AbsolutePath, options: MkdirOptions) -> Result<Outcome, FsError> {
        let mut state = self.state.lock();
        match state.kind_of(path.as_str()) {
            Some(EntryKind::Directory) if options.recursive => return Ok(Outcome::Unchanged),
            Some(_) => return Err(FsError::AlreadyExists(path.to_string())),
            None => {}
        }

        if !options.recursive {
            state.require_parent_dir(path)?;
            state.dirs.insert(path.to_string());
            return Ok(Outcome::Created);
        }

        let mut cursor = String::new();
        for segment in path.segments() {
            cursor.push('/');
            cursor.push_str(segment);
            match state.kind_of(&cursor) {
                Some(EntryKind::Directory) => {}
                Some(EntryKind::File) => {
                    return Err(FsError::WrongKind {
                        path: cursor,
                        expected: "directory",
                    });
                }
                None => {
                    state.dirs.insert(cursor.clone());
                }
            }
        }
        Ok(Outcome::Created)
    }

    fn rm(&self, path: &AbsolutePath, options: RmOptions) -> Result<(), FsError> {
        let mut state = self.state.lock();
        if path.is_root() {
            return Err(FsError::invalid(path.as_str(), "refusing to remove the root"));
        }
        match state.kind_of(path.as_str()) {
            None => Err(FsError::NotFound(path.to_string())),
            Some(EntryKind::File) => {
                state.files.remove(path.as_str());
                Ok(())
            }
            Some(EntryKind::Directory) => {
                if !options.recursive && state.has_children(path.as_str()) {
                    return Err(FsError::NotEmpty(path.to_string()));
                }
                state.remove_tree(path.as_str());
                Ok(())
            }
        }
    }

    fn rename(
        &self,
        from: &AbsolutePath,
        to: &AbsolutePath,
        options: TransferOptions,
    ) -> Result<(), FsError> {
        let mut state = self.state.lock();
        state.prepare_transfer(from, to, options)?;
        let (dirs, files) = state.snapshot_tree(from.as_str(), to.as_str());
        state.remove_tree(from.as_str());
        state.dirs.extend(dirs);
        state.files.extend(files);
        Ok(())
    }

    fn copy(
        &self,
        from: &AbsolutePath,
        to: &AbsolutePath,
        options: TransferOptions,
    ) -> Result<Outcome, FsError> {
        let mut state = self.state.lock();
        let outcome = state.prepare_transfer(from, to, options)?;
        let (dirs, files) = state.snapshot_tree(from.as_str(), to.as_str());
        state.dirs.extend(dirs);
        state.files.extend(files);
        Ok(outcome)
    }

    fn list(&self, path: &AbsolutePath) -> Result<Vec<DirEntry>, FsError> {
        let state = self.state.lock();
        match state.kind_of(path.as_str()) {
            None => return Err(FsError::NotFound(path.to_string())),
            Some(EntryKind::File) => {
                return Err(FsError::WrongKind {
                    path: path.to_string(),
                    expected: "directory",
                });
            }
            Some(EntryKind::Directory) => {}
        }

        let prefix_len = if path.is_root() { 1 } else { path.as_str().len() + 1 };
        let immediate = |key: &str| {
            is_descendant(key, path.as_str()) && !key[prefix_len..].contains('/')
        };

        let mut entries: Vec<DirEntry> = state
            .dirs
            .iter()
            .filter(|d| immediate(d.as_str()))
            .map(|d| DirEntry {
                name: d[prefix_len..].to_string(),
                kind: EntryKind::Directory,
            })
            .chain(state.files.keys().filter(|f| immediate(f.as_str())).map(|f| DirEntry {
                name: f[prefix_len..].to_string(),
                kind: EntryKind::File,
            }))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn stat(&self, path: &AbsolutePath) -> Result<Stat, FsError> {
        let state = self.state.lock();
        Ok(match state.kind_of(path.as_str()) {
            None => Stat::missing(),
            Some(kind) => Stat {
                exists: true,
                kind: Some(kind),
                size: state
                    .files
                    .get(path.as_str())
                    .map(|bytes| bytes.len() as u64)
                    .unwrap_or(0),
            },
        })
    }
}
