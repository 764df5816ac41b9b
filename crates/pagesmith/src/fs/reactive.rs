use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::{
    DirEntry, EntryKind, FsDriver, MkdirOptions, Outcome, RmOptions, RootedDriver, Stat,
    TransferOptions, WriteOptions,
};
use crate::error::FsError;
use crate::path::{AbsolutePath, RelativePath, to_absolute};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FsOp {
    Read,
    Write,
    Mkdir,
    Rm,
    Move,
    Copy,
    List,
    Stat,
}

impl fmt::Display for FsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FsOp::Read => "read",
            FsOp::Write => "write",
            FsOp::Mkdir => "mkdir",
            FsOp::Rm => "rm",
            FsOp::Move => "move",
            FsOp::Copy => "copy",
            FsOp::List => "list",
            FsOp::Stat => "stat",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Before,
    After,
    Error,
}

/// Net effect of a mutating operation, as reported on the `watch:change` feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
    Rename,
}

/// Subscription channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    OpBefore,
    OpAfter,
    OpError,
    WatchChange,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::OpBefore,
        EventKind::OpAfter,
        EventKind::OpError,
        EventKind::WatchChange,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::OpBefore => "op:before",
            EventKind::OpAfter => "op:after",
            EventKind::OpError => "op:error",
            EventKind::WatchChange => "watch:change",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpEvent {
    pub timestamp_ms: u64,
    pub op: FsOp,
    pub phase: Phase,
    pub path: RelativePath,
    pub resolved: AbsolutePath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<RelativePath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_target: Option<AbsolutePath>,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchEvent {
    pub timestamp_ms: u64,
    pub change: ChangeKind,
    pub path: RelativePath,
    pub resolved: AbsolutePath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<RelativePath>,
    pub correlation_id: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FsEvent {
    Op(OpEvent),
    Watch(WatchEvent),
}

impl FsEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            FsEvent::Op(op) => match op.phase {
                Phase::Before => EventKind::OpBefore,
                Phase::After => EventKind::OpAfter,
                Phase::Error => EventKind::OpError,
            },
            FsEvent::Watch(_) => EventKind::WatchChange,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            FsEvent::Op(op) => &op.correlation_id,
            FsEvent::Watch(watch) => &watch.correlation_id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&FsEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: BTreeMap<EventKind, Vec<(SubscriptionId, Listener)>>,
}

/// Rooted filesystem that reports every operation to subscribers.
///
/// Each call emits `op:before`, then `op:after` or `op:error`, all sharing one
/// correlation id. Successful mutations additionally emit `watch:change`.
/// Listeners run synchronously during emission. A listener that panics unwinds
/// through the operation that triggered it; nothing is caught or deferred.
pub struct ReactiveFs<D> {
    rooted: RootedDriver<D>,
    registry: Mutex<Registry>,
}

impl<D: FsDriver> ReactiveFs<D> {
    pub fn new(rooted: RootedDriver<D>) -> Self {
        Self {
            rooted,
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn rooted(&self) -> &RootedDriver<D> {
        &self.rooted
    }

    pub fn root(&self) -> &AbsolutePath {
        self.rooted.root()
    }

    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&FsEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry
            .listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Registers one listener on every channel.
    pub fn subscribe_all<F>(&self, listener: F) -> Vec<SubscriptionId>
    where
        F: Fn(&FsEvent) + Send + Sync + 'static,
    {
        let shared: Listener = Arc::new(listener);
        EventKind::ALL
            .iter()
            .map(|kind| {
                let listener = shared.clone();
                self.subscribe(*kind, move |event| listener(event))
            })
            .collect()
    }

    /// Returns `false` when `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock();
        let mut removed = false;
        for listeners in registry.listeners.values_mut() {
            let before = listeners.len();
            listeners.retain(|(candidate, _)| *candidate != id);
            removed |= listeners.len() != before;
        }
        removed
    }

    pub fn read(&self, path: &RelativePath) -> Result<Vec<u8>, FsError> {
        self.observe(FsOp::Read, path, None, |fs| fs.read(path))
            .map(|(bytes, _)| bytes)
    }

    pub fn read_to_string(&self, path: &RelativePath) -> Result<String, FsError> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|err| FsError::Io {
            path: path.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidData, err),
        })
    }

    pub fn write(
        &self,
        path: &RelativePath,
        contents: &[u8],
        options: WriteOptions,
    ) -> Result<(), FsError> {
        let (outcome, correlation_id) =
            self.observe(FsOp::Write, path, None, |fs| fs.write(path, contents, options))?;
        self.emit_outcome(outcome, path, None, correlation_id);
        Ok(())
    }

    pub fn mkdir(&self, path: &RelativePath, options: MkdirOptions) -> Result<(), FsError> {
        let (outcome, correlation_id) =
            self.observe(FsOp::Mkdir, path, None, |fs| fs.mkdir(path, options))?;
        self.emit_outcome(outcome, path, None, correlation_id);
        Ok(())
    }

    pub fn rm(&self, path: &RelativePath, options: RmOptions) -> Result<(), FsError> {
        let ((), correlation_id) = self.observe(FsOp::Rm, path, None, |fs| fs.rm(path, options))?;
        self.emit_change(ChangeKind::Delete, path, None, correlation_id);
        Ok(())
    }

    pub fn rename(
        &self,
        from: &RelativePath,
        to: &RelativePath,
        options: TransferOptions,
    ) -> Result<(), FsError> {
        let ((), correlation_id) =
            self.observe(FsOp::Move, from, Some(to), |fs| fs.rename(from, to, options))?;
        self.emit_change(ChangeKind::Rename, to, Some(from), correlation_id);
        Ok(())
    }

    pub fn copy(
        &self,
        from: &RelativePath,
        to: &RelativePath,
        options: TransferOptions,
    ) -> Result<(), FsError> {
        let (outcome, correlation_id) =
            self.observe(FsOp::Copy, from, Some(to), |fs| fs.copy(from, to, options))?;
        self.emit_outcome(outcome, to, Some(from), correlation_id);
        Ok(())
    }

    pub fn list(&self, path: &RelativePath) -> Result<Vec<DirEntry>, FsError> {
        self.observe(FsOp::List, path, None, |fs| fs.list(path))
            .map(|(entries, _)| entries)
    }

    pub fn stat(&self, path: &RelativePath) -> Result<Stat, FsError> {
        self.observe(FsOp::Stat, path, None, |fs| fs.stat(path))
            .map(|(stat, _)| stat)
    }

    /// Lists every file beneath `dir` (depth first, sorted), skipping directories
    /// rejected by `descend`.
    pub fn walk<F>(&self, dir: &RelativePath, descend: F) -> Result<Vec<RelativePath>, FsError>
    where
        F: Fn(&RelativePath) -> bool,
    {
        let mut files = Vec::new();
        let mut pending = vec![dir.clone()];
        while let Some(current) = pending.pop() {
            let mut subdirs = Vec::new();
            for entry in self.list(&current)? {
                let child = current.join(&entry.name)?;
                match entry.kind {
                    EntryKind::File => files.push(child),
                    EntryKind::Directory if descend(&child) => subdirs.push(child),
                    EntryKind::Directory => {}
                }
            }
            pending.extend(subdirs.into_iter().rev());
        }
        files.sort();
        Ok(files)
    }

    fn observe<T>(
        &self,
        op: FsOp,
        path: &RelativePath,
        target: Option<&RelativePath>,
        call: impl FnOnce(&RootedDriver<D>) -> Result<T, FsError>,
    ) -> Result<(T, String), FsError> {
        let root = self.rooted.root();
        let correlation_id = correlation_id();
        let before = OpEvent {
            timestamp_ms: now_unix_ms(),
            op,
            phase: Phase::Before,
            path: path.clone(),
            resolved: to_absolute(root, path),
            target: target.cloned(),
            resolved_target: target.map(|target| to_absolute(root, target)),
            correlation_id: correlation_id.clone(),
            error: None,
        };
        self.emit(FsEvent::Op(before.clone()));

        match call(&self.rooted) {
            Ok(value) => {
                self.emit(FsEvent::Op(OpEvent {
                    timestamp_ms: now_unix_ms(),
                    phase: Phase::After,
                    ..before
                }));
                Ok((value, correlation_id))
            }
            Err(err) => {
                self.emit(FsEvent::Op(OpEvent {
                    timestamp_ms: now_unix_ms(),
                    phase: Phase::Error,
                    error: Some(err.to_string()),
                    ..before
                }));
                Err(err)
            }
        }
    }

    fn emit_outcome(
        &self,
        outcome: Outcome,
        path: &RelativePath,
        from: Option<&RelativePath>,
        correlation_id: String,
    ) {
        let change = match outcome {
            Outcome::Created => ChangeKind::Create,
            Outcome::Replaced => ChangeKind::Modify,
            Outcome::Unchanged => return,
        };
        self.emit_change(change, path, from, correlation_id);
    }

    fn emit_change(
        &self,
        change: ChangeKind,
        path: &RelativePath,
        from: Option<&RelativePath>,
        correlation_id: String,
    ) {
        self.emit(FsEvent::Watch(WatchEvent {
            timestamp_ms: now_unix_ms(),
            change,
            path: path.clone(),
            resolved: to_absolute(self.rooted.root(), path),
            from: from.cloned(),
            correlation_id,
        }));
    }

    fn emit(&self, event: FsEvent) {
        let kind = event.kind();
        debug!(
            event = kind.name(),
            correlation_id = event.correlation_id(),
            "fs event"
        );
        let listeners: Vec<Listener> = {
            let registry = self.registry.lock();
            registry
                .listeners
                .get(&kind)
                .map(|entries| entries.iter().map(|(_, l)| l.clone()).collect())
                .unwrap_or_default()
        };
        for listener in listeners {
            listener(&event);
        }
    }
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn correlation_id() -> String {
    let mut bytes = [0u8; 16];
    if getrandom::getrandom(&mut bytes).is_err() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        for (idx, b) in bytes.iter_mut().enumerate() {
            *b = ((now >> (idx * 8)) & 0xFF) as u8;
        }
    }

    // Version 4, RFC 4122 variant.
    bytes[6] = (bytes[6] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;

    let hex = hex::encode(bytes);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}
