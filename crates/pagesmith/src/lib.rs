pub mod error;
pub mod fs;
pub mod materialize;
pub mod notebook;
pub mod path;
pub mod pipeline;
pub mod playbook;
pub mod workspace;

pub use error::{FsError, MaterializeError, PagesmithError};
pub use fs::{
    ChangeKind, DirEntry, EntryKind, EventKind, FsDriver, FsEvent, FsOp, LocalDriver,
    MemoryDriver, MkdirOptions, OpEvent, Outcome, Phase, ReactiveFs, RmOptions, RootedDriver, Stat,
    SubscriptionId, TransferOptions, WatchEvent, WriteOptions,
};
pub use materialize::{
    Artifact, Breadcrumb, CatalogEntry, Classification, Edge, MaterializeOptions,
    MaterializeReport, Materializer, Nature, Resource, RouteMeta, RouteNode, Routes,
    SkippedResource, SqlOptions, SqlStrategy, UnknownKindHook, build_catalog, sql_batch,
    upsert_statement,
};
pub use notebook::{
    Delimiter, Disposition, FencedBlock, Instructions, Issue, IssueKind, IssueLocation,
    IssueSummary, Notebook, NotebookOptions, NotebookParser, Schema, SchemaRegistry, SerdeSchema,
};
pub use path::{
    AbsolutePath, RelativePath, RelativePolicy, is_inside_root, parse_absolute, parse_relative,
    relative_to_root, to_absolute,
};
pub use pipeline::{BuildReport, Pipeline, RejectedDocument};
pub use playbook::{
    PlaybookFrontmatter, SqlFenceAttrs, playbook_options, playbook_parser,
    resource_from_sql_file, resources_from_notebook,
};
pub use workspace::{
    FilesystemWorkspaceLocator, ProjectConfig, SqlConfig, WorkspaceLocator, WorkspacePaths,
    discover as discover_workspace,
};
