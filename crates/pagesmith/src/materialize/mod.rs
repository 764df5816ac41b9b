//! Deterministic assembly of content units into artifacts, navigation documents,
//! and SQL upserts.

pub mod catalog;
pub mod materializer;
pub mod resource;
pub mod routes;
pub mod sql;

pub use catalog::{CatalogEntry, build_catalog};
pub use materializer::{
    MaterializeOptions, MaterializeReport, Materializer, SkippedResource, UnknownKindHook,
};
pub use resource::{Artifact, Classification, Nature, Resource, RouteMeta};
pub use routes::{Breadcrumb, Edge, RouteNode, Routes};
pub use sql::{SqlOptions, SqlStrategy, sql_batch, upsert_statement};
