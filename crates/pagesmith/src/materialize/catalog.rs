use serde::Serialize;

use super::resource::{Artifact, Classification, RouteMeta};

/// Marker that identifies generated documents; such paths never list themselves.
pub const AUTO_MARKER: &str = ".auto.";

/// One row of the resource catalog.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub nature: String,
    pub path: String,
    pub is_system_generated: bool,
    pub basename: String,
    pub extension: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_materialize_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_code_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteMeta>,
}

impl CatalogEntry {
    pub fn from_artifact(artifact: &Artifact) -> Self {
        let path = artifact.path.as_str();
        let basename = artifact.path.file_name().unwrap_or_default().to_string();
        let extensions = extensions_of(&basename);
        Self {
            nature: artifact.nature.to_string(),
            path: path.to_string(),
            is_system_generated: artifact.system_named
                || artifact.classification == Classification::Auto,
            extension: extensions.last().cloned().unwrap_or_default(),
            extensions: (extensions.len() > 1).then_some(extensions),
            basename,
            auto_materialize_to: artifact.origin.as_ref().map(|_| path.to_string()),
            src_code_language: artifact.language.clone(),
            route: artifact.route.clone(),
        }
    }
}

/// Builds the catalog in artifact order, leaving out generated `.auto.` documents.
pub fn build_catalog<'a>(artifacts: impl IntoIterator<Item = &'a Artifact>) -> Vec<CatalogEntry> {
    artifacts
        .into_iter()
        .filter(|artifact| !artifact.path.as_str().contains(AUTO_MARKER))
        .map(CatalogEntry::from_artifact)
        .collect()
}

// `a.b.c` -> [".b", ".c"]; a leading dot belongs to the name.
fn extensions_of(basename: &str) -> Vec<String> {
    let trimmed = basename.trim_start_matches('.');
    trimmed
        .split('.')
        .skip(1)
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{ext}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::resource::Nature;
    use crate::path::RelativePath;
    use serde_json::json;

    fn artifact(path: &str, classification: Classification, nature: Nature) -> Artifact {
        Artifact::new(RelativePath::parse(path).unwrap(), "x", classification, nature)
    }

    #[test]
    fn entries_describe_names_and_extensions() {
        let mut page = artifact("admin/index.sql", Classification::Page, Nature::Page);
        page.origin = Some("site.md#1".into());
        page.language = Some("sql".into());

        let entry = CatalogEntry::from_artifact(&page);
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "nature": "page",
                "path": "admin/index.sql",
                "isSystemGenerated": false,
                "basename": "index.sql",
                "extension": ".sql",
                "autoMaterializeTo": "admin/index.sql",
                "srcCodeLanguage": "sql"
            })
        );

        let styles = artifact("assets/site.min.css", Classification::Resource, Nature::Resource);
        let entry = CatalogEntry::from_artifact(&styles);
        assert_eq!(entry.extension, ".css");
        assert_eq!(entry.extensions, Some(vec![".min".into(), ".css".into()]));
    }

    #[test]
    fn generated_documents_are_excluded() {
        let artifacts = vec![
            artifact("index.sql", Classification::Page, Nature::Page),
            artifact(
                "sql.d/auto/resource/catalog.auto.json",
                Classification::Auto,
                Nature::Resource,
            ),
        ];
        let catalog = build_catalog(&artifacts);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].path, "index.sql");
    }

    #[test]
    fn dotfiles_keep_their_leading_dot() {
        assert!(extensions_of(".env").is_empty());
        assert_eq!(extensions_of(".env.local"), vec![".local"]);
        assert!(extensions_of("Makefile").is_empty());
    }
}
