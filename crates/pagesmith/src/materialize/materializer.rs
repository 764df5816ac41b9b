use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::catalog::{CatalogEntry, build_catalog};
use super::resource::{Artifact, Classification, Nature, Resource};
use super::routes::Routes;
use super::sql::{SqlOptions, sql_batch};
use crate::error::{FsError, MaterializeError};
use crate::fs::{FsDriver, MkdirOptions, ReactiveFs, WriteOptions};
use crate::path::RelativePath;

pub const CATALOG_PATH: &str = "sql.d/auto/resource/catalog.auto.json";
pub const ROUTE_TREE_PATH: &str = "sql.d/auto/route/tree.auto.json";
pub const ROUTE_TEXT_PATH: &str = "sql.d/auto/route/tree.auto.txt";
pub const BREADCRUMBS_PATH: &str = "sql.d/auto/route/breadcrumbs.auto.json";
pub const EDGES_PATH: &str = "sql.d/auto/route/edges.auto.json";

/// Turns units of an unrecognized kind into an artifact, or drops them.
pub type UnknownKindHook = Arc<dyn Fn(&Resource) -> Option<Artifact> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaterializeOptions {
    /// Append catalog and route documents to the artifact list.
    pub emit_auto: bool,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self { emit_auto: true }
    }
}

/// A unit that could not be given an output path.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedResource {
    pub nature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub reason: String,
}

/// Outcome of writing artifacts to disk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MaterializeReport {
    pub written: Vec<String>,
    pub unchanged: Vec<String>,
}

struct Drained {
    resources: Vec<Resource>,
    artifacts: Vec<Artifact>,
    skipped: Vec<SkippedResource>,
    catalog: Vec<CatalogEntry>,
    routes: Routes,
}

/// Deterministic assembly of content units into named artifacts.
///
/// The source is drained exactly once, on first use, and every accessor reads from
/// that cached pass. Assembly runs in passes: shells, partials, head and tail first;
/// then pages (with their shell prepended), actions, APIs, procedures and plain
/// resources; then units of unknown kind through the hook.
pub struct Materializer<I> {
    source: Mutex<Option<I>>,
    drained: OnceLock<Drained>,
    options: MaterializeOptions,
    hook: Option<UnknownKindHook>,
}

impl<I> fmt::Debug for Materializer<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Materializer")
            .field("drained", &self.drained.get().is_some())
            .field("options", &self.options)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl<I> Materializer<I>
where
    I: Iterator<Item = Resource>,
{
    pub fn new<S>(source: S) -> Self
    where
        S: IntoIterator<Item = Resource, IntoIter = I>,
    {
        Self {
            source: Mutex::new(Some(source.into_iter())),
            drained: OnceLock::new(),
            options: MaterializeOptions::default(),
            hook: None,
        }
    }

    pub fn with_options(mut self, options: MaterializeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_unknown_kind_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Resource) -> Option<Artifact> + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Units in the order they were received.
    pub fn resources(&self) -> &[Resource] {
        &self.drained().resources
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.drained().artifacts
    }

    pub fn skipped(&self) -> &[SkippedResource] {
        &self.drained().skipped
    }

    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.drained().catalog
    }

    pub fn routes(&self) -> &Routes {
        &self.drained().routes
    }

    pub fn sql(&self, options: &SqlOptions) -> Vec<String> {
        sql_batch(self.artifacts(), options)
    }

    /// Writes every artifact beneath `out_dir`, leaving files whose contents already
    /// match untouched. Filesystem failures propagate.
    pub fn materialize<D: FsDriver>(
        &self,
        fs: &ReactiveFs<D>,
        out_dir: &RelativePath,
    ) -> Result<MaterializeReport, MaterializeError> {
        let mut report = MaterializeReport::default();
        for artifact in self.artifacts() {
            let target = out_dir
                .join(artifact.path.as_str())
                .map_err(|source| write_failed(artifact.path.as_str(), source))?;
            let failed = |source| write_failed(target.as_str(), source);

            let stat = fs.stat(&target).map_err(failed)?;
            if stat.is_dir() {
                return Err(MaterializeError::DestinationExists(target.to_string()));
            }
            if stat.is_file() {
                let existing = fs.read(&target).map_err(failed)?;
                if existing == artifact.contents.as_bytes() {
                    report.unchanged.push(target.to_string());
                    continue;
                }
            }

            let parent = target.parent();
            if !parent.is_empty() {
                fs.mkdir(&parent, MkdirOptions::recursive())
                    .map_err(failed)?;
            }
            fs.write(&target, artifact.contents.as_bytes(), WriteOptions::overwrite())
                .map_err(failed)?;
            report.written.push(target.to_string());
        }

        info!(
            written = report.written.len(),
            unchanged = report.unchanged.len(),
            out_dir = %out_dir,
            "materialized artifacts"
        );
        Ok(report)
    }

    fn drained(&self) -> &Drained {
        self.drained.get_or_init(|| {
            let source = self.source.lock().take();
            let resources: Vec<Resource> = source.into_iter().flatten().collect();
            debug!(resources = resources.len(), "drained content source");
            self.assemble(resources)
        })
    }

    fn assemble(&self, resources: Vec<Resource>) -> Drained {
        let mut out = Assembly::default();
        let mut shells: BTreeMap<String, String> = BTreeMap::new();

        for resource in resources.iter().filter(|r| {
            matches!(
                r.nature,
                Nature::Shell | Nature::Partial | Nature::HeadSql | Nature::TailSql
            )
        }) {
            if resource.nature == Nature::Shell {
                if let Some(id) = resource.identifier() {
                    shells.insert(id.to_string(), resource.contents.clone());
                }
            }
            out.place(resource, resource.contents.clone());
        }

        for resource in resources.iter().filter(|r| {
            matches!(
                r.nature,
                Nature::Page
                    | Nature::Action
                    | Nature::Api
                    | Nature::SqlStoredProcedure
                    | Nature::Resource
            )
        }) {
            let contents = match (&resource.nature, resource.shell.as_deref()) {
                (Nature::Page, Some(shell)) => match shells.get(shell) {
                    Some(body) => compose(body, &resource.contents),
                    None => {
                        warn!(
                            shell,
                            origin = resource.origin.as_deref().unwrap_or_default(),
                            "page references unknown shell"
                        );
                        resource.contents.clone()
                    }
                },
                _ => resource.contents.clone(),
            };
            out.place(resource, contents);
        }

        for resource in resources
            .iter()
            .filter(|r| matches!(r.nature, Nature::Custom(_)))
        {
            match self.hook.as_ref().and_then(|hook| hook(resource)) {
                Some(artifact) => out.push(artifact),
                None => debug!(kind = %resource.nature, "no artifact for unknown kind"),
            }
        }

        let catalog = build_catalog(&out.artifacts);
        let routes = Routes::build(&out.artifacts);

        if self.options.emit_auto {
            let documents = [
                (CATALOG_PATH, serde_json::to_string_pretty(&catalog), "json"),
                (ROUTE_TREE_PATH, serde_json::to_string_pretty(&routes.roots), "json"),
                (ROUTE_TEXT_PATH, Ok(routes.ascii_tree()), "text"),
                (
                    BREADCRUMBS_PATH,
                    serde_json::to_string_pretty(&routes.breadcrumbs),
                    "json",
                ),
                (EDGES_PATH, serde_json::to_string_pretty(&routes.edges), "json"),
            ];
            for (path, rendered, language) in documents {
                let (Ok(path), Ok(contents)) = (RelativePath::parse(path), rendered) else {
                    warn!(path, "failed to render generated document");
                    continue;
                };
                let mut artifact =
                    Artifact::new(path, contents, Classification::Auto, Nature::Resource);
                artifact.system_named = true;
                artifact.language = Some(language.to_string());
                out.push(artifact);
            }
        }

        debug!(
            artifacts = out.artifacts.len(),
            skipped = out.skipped.len(),
            "assembled artifacts"
        );
        Drained {
            resources,
            artifacts: out.artifacts,
            skipped: out.skipped,
            catalog,
            routes,
        }
    }
}

fn write_failed(path: &str, source: FsError) -> MaterializeError {
    MaterializeError::WriteFailed {
        path: path.to_string(),
        source,
    }
}

fn compose(shell: &str, page: &str) -> String {
    if shell.is_empty() || shell.ends_with('\n') {
        format!("{shell}{page}")
    } else {
        format!("{shell}\n{page}")
    }
}

#[derive(Default)]
struct Assembly {
    artifacts: Vec<Artifact>,
    positions: BTreeMap<RelativePath, usize>,
    counters: BTreeMap<Classification, usize>,
    skipped: Vec<SkippedResource>,
}

impl Assembly {
    fn place(&mut self, resource: &Resource, contents: String) {
        let classification = Classification::for_nature(&resource.nature);
        let counter = self.counters.entry(classification).or_insert(0);
        let sequence = format!("{:03}", *counter);
        *counter += 1;

        match output_path(resource, classification, &sequence) {
            Ok((path, system_named)) => {
                let mut artifact =
                    Artifact::new(path, contents, classification, resource.nature.clone());
                artifact.system_named = system_named;
                artifact.route = resource.route.clone();
                artifact.language = resource.language.clone();
                artifact.origin = resource.origin.clone();
                self.push(artifact);
            }
            Err(err) => {
                warn!(
                    nature = %resource.nature,
                    origin = resource.origin.as_deref().unwrap_or_default(),
                    error = %err,
                    "skipping unit with unusable output path"
                );
                self.skipped.push(SkippedResource {
                    nature: resource.nature.to_string(),
                    origin: resource.origin.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    // At most one artifact per path: a later one replaces the earlier in place.
    fn push(&mut self, artifact: Artifact) {
        match self.positions.get(&artifact.path) {
            Some(&position) => {
                warn!(path = %artifact.path, "duplicate output path; later contents win");
                self.artifacts[position] = artifact;
            }
            None => {
                self.positions
                    .insert(artifact.path.clone(), self.artifacts.len());
                self.artifacts.push(artifact);
            }
        }
    }
}

/// Output path for a unit plus whether it came from the fallback counter.
fn output_path(
    resource: &Resource,
    classification: Classification,
    sequence: &str,
) -> Result<(RelativePath, bool), FsError> {
    let path = resource
        .path
        .as_deref()
        .map(|p| p.trim_start_matches('/'))
        .filter(|p| !p.is_empty());
    let name = resource.name.as_deref().filter(|n| !n.is_empty());

    // An explicit path always wins, then the name, then the counter.
    let (candidate, system_named) = match (classification, path) {
        (Classification::Partial, _) => nested_dir("partials", path.or(name), sequence),
        (Classification::Action, _) => nested_dir("actions", path.or(name), sequence),
        (Classification::Api, _) => nested_dir("api", path.or(name), sequence),
        (
            Classification::Resource | Classification::Custom | Classification::Auto,
            Some(path),
        ) => (path.to_string(), false),
        (Classification::Resource | Classification::Custom | Classification::Auto, None) => {
            (format!("resources/{sequence}"), true)
        }
        (_, Some(path)) => (with_sql_extension(path), false),
        (Classification::Head, None) => fixed_dir("sql.d/head", name, sequence),
        (Classification::Tail, None) => fixed_dir("sql.d/tail", name, sequence),
        (Classification::Shell, None) => fixed_dir("sql.d/shell", name, sequence),
        (Classification::StoredProcedure, None) => fixed_dir("sql.d/procedure", name, sequence),
        (Classification::Page, None) => match name {
            Some(name) => (with_sql_extension(name), false),
            None => (format!("sql.d/page/{sequence}.sql"), true),
        },
    };
    Ok((RelativePath::parse(&candidate)?, system_named))
}

fn fixed_dir(dir: &str, name: Option<&str>, sequence: &str) -> (String, bool) {
    match name {
        Some(name) => (format!("{dir}/{}", with_sql_extension(name)), false),
        None => (format!("{dir}/{sequence}.sql"), true),
    }
}

fn nested_dir(dir: &str, stem: Option<&str>, sequence: &str) -> (String, bool) {
    match stem {
        Some(stem) => (format!("{dir}/{}", with_sql_extension(stem)), false),
        None => (format!("{dir}/{sequence}.sql"), true),
    }
}

fn with_sql_extension(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    if file.contains('.') {
        path.to_string()
    } else {
        format!("{path}.sql")
    }
}
