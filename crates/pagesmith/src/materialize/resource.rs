use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::path::RelativePath;

/// What a content unit is, which decides where it lands and how it composes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Nature {
    Page,
    Partial,
    Shell,
    HeadSql,
    TailSql,
    Action,
    Api,
    SqlStoredProcedure,
    Resource,
    /// Any other `kind`; handed to the materializer's unknown-kind hook.
    Custom(String),
}

impl Nature {
    /// Maps a fence `kind` attribute onto a nature.
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "page" => Nature::Page,
            "partial" => Nature::Partial,
            "shell" => Nature::Shell,
            "head" => Nature::HeadSql,
            "tail" => Nature::TailSql,
            "action" => Nature::Action,
            "api" => Nature::Api,
            "stored-procedure" => Nature::SqlStoredProcedure,
            "resource" => Nature::Resource,
            other => Nature::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Nature::Page => "page",
            Nature::Partial => "partial",
            Nature::Shell => "shell",
            Nature::HeadSql => "head-sql",
            Nature::TailSql => "tail-sql",
            Nature::Action => "action",
            Nature::Api => "api",
            Nature::SqlStoredProcedure => "sql-stored-procedure",
            Nature::Resource => "resource",
            Nature::Custom(kind) => kind.as_str(),
        }
    }
}

impl fmt::Display for Nature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Nature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Navigation metadata attached to a content unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteMeta {
    /// Logical route path; defaults to the artifact path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sibling_order: Option<f64>,
}

/// One typed content unit fed to the materializer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub nature: Nature,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Identifier of the shell a page wants prepended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    pub contents: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Where the unit came from, e.g. `docs/site.md#3`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl Resource {
    pub fn new(nature: Nature, contents: impl Into<String>) -> Self {
        Self {
            nature,
            name: None,
            path: None,
            shell: None,
            contents: contents.into(),
            route: None,
            language: None,
            origin: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    pub fn with_route(mut self, route: RouteMeta) -> Self {
        self.route = Some(route);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Identifier other units use to reference this one: name, then path.
    pub fn identifier(&self) -> Option<&str> {
        self.name.as_deref().or(self.path.as_deref())
    }
}

/// Output bucket of an artifact; each has its own fallback naming counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    Head,
    Tail,
    Page,
    Partial,
    Shell,
    Action,
    Api,
    StoredProcedure,
    Resource,
    Custom,
    Auto,
}

impl Classification {
    pub fn for_nature(nature: &Nature) -> Self {
        match nature {
            Nature::Page => Classification::Page,
            Nature::Partial => Classification::Partial,
            Nature::Shell => Classification::Shell,
            Nature::HeadSql => Classification::Head,
            Nature::TailSql => Classification::Tail,
            Nature::Action => Classification::Action,
            Nature::Api => Classification::Api,
            Nature::SqlStoredProcedure => Classification::StoredProcedure,
            Nature::Resource => Classification::Resource,
            Nature::Custom(_) => Classification::Custom,
        }
    }
}

/// A named output produced by the materializer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub path: RelativePath,
    pub contents: String,
    pub classification: Classification,
    pub nature: Nature,
    /// SHA-256 of `contents`, hex encoded.
    pub digest: String,
    /// Path came from a fallback counter rather than an explicit name or path.
    pub system_named: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl Artifact {
    pub fn new(
        path: RelativePath,
        contents: impl Into<String>,
        classification: Classification,
        nature: Nature,
    ) -> Self {
        let contents = contents.into();
        Self {
            digest: digest(&contents),
            path,
            contents,
            classification,
            nature,
            system_named: false,
            route: None,
            language: None,
            origin: None,
        }
    }

    /// Replaces the contents, keeping the digest in step.
    pub fn set_contents(&mut self, contents: String) {
        self.digest = digest(&contents);
        self.contents = contents;
    }
}

pub fn digest(contents: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents.as_bytes());
    hex::encode(hasher.finalize())
}
