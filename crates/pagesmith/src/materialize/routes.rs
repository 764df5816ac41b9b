//! Navigation structures derived from materialized artifacts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::Serialize;
use tracing::warn;

use super::resource::{Artifact, Classification};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteNode {
    pub path: String,
    pub segment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sibling_order: Option<f64>,
    /// Created only because descendants exist beneath it.
    pub synthesized: bool,
    /// Output paths of the artifacts grouped under this route.
    pub resources: Vec<String>,
    pub children: Vec<RouteNode>,
}

impl RouteNode {
    pub fn label(&self) -> &str {
        self.caption.as_deref().unwrap_or(&self.segment)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub path: String,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub parent: String,
    pub child: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Routes {
    pub roots: Vec<RouteNode>,
    pub breadcrumbs: BTreeMap<String, Vec<Breadcrumb>>,
    pub edges: Vec<Edge>,
    /// Routes whose `parent` chain looped back on itself; each was promoted to a root.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cycles: Vec<String>,
}

#[derive(Clone, Debug, Default)]
struct Entry {
    caption: Option<String>,
    title: Option<String>,
    description: Option<String>,
    sibling_order: Option<f64>,
    parent: Option<String>,
    synthesized: bool,
    resources: Vec<String>,
}

/// Normalizes a route path to `/a/b` form; empty input becomes `/`.
pub fn normalize_route(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    format!("/{}", segments.join("/"))
}

fn structural_parent(path: &str) -> Option<String> {
    match path.rfind('/') {
        Some(0) | None => None,
        Some(idx) => Some(path[..idx].to_string()),
    }
}

fn segment_of(path: &str) -> String {
    path.rsplit('/').next().unwrap_or_default().to_string()
}

/// Whether an artifact takes part in navigation: pages always, anything else only
/// when it carries route metadata.
pub fn is_routable(artifact: &Artifact) -> bool {
    artifact.route.is_some()
        || matches!(
            artifact.classification,
            Classification::Page | Classification::Action | Classification::Api
        )
}

impl Routes {
    pub fn build<'a>(artifacts: impl IntoIterator<Item = &'a Artifact>) -> Self {
        let mut entries: BTreeMap<String, Entry> = BTreeMap::new();

        for artifact in artifacts.into_iter().filter(|a| is_routable(a)) {
            let meta = artifact.route.clone().unwrap_or_default();
            let path = normalize_route(meta.path.as_deref().unwrap_or(artifact.path.as_str()));
            if path == "/" {
                continue;
            }
            let entry = entries.entry(path).or_default();
            entry.synthesized = false;
            entry.caption = entry.caption.take().or(meta.caption);
            entry.title = entry.title.take().or(meta.title);
            entry.description = entry.description.take().or(meta.description);
            entry.sibling_order = entry.sibling_order.or(meta.sibling_order);
            entry.parent = entry
                .parent
                .take()
                .or(meta.parent.as_deref().map(normalize_route))
                .filter(|parent| parent != "/");
            entry.resources.push(artifact.path.to_string());
        }

        // Fill in parents until every referenced route exists.
        let mut pending: Vec<String> = entries.keys().cloned().collect();
        while let Some(path) = pending.pop() {
            let Some(entry) = entries.get_mut(&path) else {
                continue;
            };
            if entry.parent.is_none() {
                entry.parent = structural_parent(&path);
            }
            if let Some(parent) = entry.parent.clone() {
                if !entries.contains_key(&parent) {
                    entries.insert(
                        parent.clone(),
                        Entry {
                            synthesized: true,
                            ..Entry::default()
                        },
                    );
                    pending.push(parent);
                }
            }
        }

        let cycles = break_cycles(&mut entries);

        let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut roots = Vec::new();
        for (path, entry) in &entries {
            match &entry.parent {
                Some(parent) => children.entry(parent.as_str()).or_default().push(path),
                None => roots.push(path.as_str()),
            }
        }
        let order = |path: &&str| {
            let key = entries.get(*path).and_then(|entry| entry.sibling_order);
            (key.is_none(), key.unwrap_or_default(), path.to_string())
        };
        let sort = |paths: &mut Vec<&str>| {
            paths.sort_by(|a, b| {
                let (a, b) = (order(a), order(b));
                a.0.cmp(&b.0)
                    .then(a.1.total_cmp(&b.1))
                    .then(a.2.cmp(&b.2))
            })
        };
        sort(&mut roots);
        for list in children.values_mut() {
            sort(list);
        }

        let mut routes = Routes {
            cycles,
            ..Routes::default()
        };
        let mut visited = BTreeSet::new();
        for root in roots {
            let node = build_node(root, &entries, &children, &mut visited, &mut routes.edges);
            routes.roots.push(node);
        }

        for path in entries.keys() {
            routes
                .breadcrumbs
                .insert(path.clone(), breadcrumbs(path, &entries));
        }
        routes
    }

    /// Renders the tree with box-drawing connectors, one route per line.
    pub fn ascii_tree(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            let _ = writeln!(out, "{}", root.path);
            render_children(&root.children, "", &mut out);
        }
        out
    }

    pub fn find(&self, path: &str) -> Option<&RouteNode> {
        fn search<'a>(nodes: &'a [RouteNode], path: &str) -> Option<&'a RouteNode> {
            nodes.iter().find_map(|node| {
                if node.path == path {
                    Some(node)
                } else {
                    search(&node.children, path)
                }
            })
        }
        search(&self.roots, &normalize_route(path))
    }
}

/// Clears the parent of the smallest path in every parent cycle so the tree
/// reaches each route. Returns the promoted paths in order.
fn break_cycles(entries: &mut BTreeMap<String, Entry>) -> Vec<String> {
    let mut promoted = Vec::new();
    let mut settled: BTreeSet<String> = BTreeSet::new();
    let starts: Vec<String> = entries.keys().cloned().collect();

    for start in starts {
        let mut trail: Vec<String> = Vec::new();
        let mut cursor = Some(start);
        while let Some(path) = cursor {
            if settled.contains(&path) {
                break;
            }
            if let Some(pos) = trail.iter().position(|seen| *seen == path) {
                if let Some(head) = trail[pos..].iter().min().cloned() {
                    warn!(
                        route = %head,
                        cycle = %trail[pos..].join(" -> "),
                        "route parent cycle; promoting to root"
                    );
                    if let Some(entry) = entries.get_mut(&head) {
                        entry.parent = None;
                    }
                    promoted.push(head);
                }
                break;
            }
            cursor = entries.get(&path).and_then(|entry| entry.parent.clone());
            trail.push(path);
        }
        settled.extend(trail);
    }
    promoted
}

fn build_node(
    path: &str,
    entries: &BTreeMap<String, Entry>,
    children: &BTreeMap<&str, Vec<&str>>,
    visited: &mut BTreeSet<String>,
    edges: &mut Vec<Edge>,
) -> RouteNode {
    visited.insert(path.to_string());
    let entry = entries.get(path).cloned().unwrap_or_default();
    let mut node = RouteNode {
        path: path.to_string(),
        segment: segment_of(path),
        caption: entry.caption,
        title: entry.title,
        description: entry.description,
        sibling_order: entry.sibling_order,
        synthesized: entry.synthesized,
        resources: entry.resources,
        children: Vec::new(),
    };
    for child in children.get(path).into_iter().flatten() {
        if visited.contains(*child) {
            continue;
        }
        edges.push(Edge {
            parent: path.to_string(),
            child: child.to_string(),
        });
        node.children
            .push(build_node(child, entries, children, visited, edges));
    }
    node
}

fn breadcrumbs(path: &str, entries: &BTreeMap<String, Entry>) -> Vec<Breadcrumb> {
    let mut trail = Vec::new();
    let mut seen = BTreeSet::from([path.to_string()]);
    let mut cursor = entries.get(path).and_then(|entry| entry.parent.clone());
    while let Some(parent) = cursor {
        if !seen.insert(parent.clone()) {
            break;
        }
        let entry = entries.get(&parent);
        trail.push(Breadcrumb {
            label: entry
                .and_then(|entry| entry.caption.clone())
                .unwrap_or_else(|| segment_of(&parent)),
            path: parent.clone(),
        });
        cursor = entry.and_then(|entry| entry.parent.clone());
    }
    trail.reverse();
    trail
}

fn render_children(children: &[RouteNode], prefix: &str, out: &mut String) {
    for (idx, child) in children.iter().enumerate() {
        let last = idx + 1 == children.len();
        let connector = if last { "└── " } else { "├── " };
        let label = match &child.caption {
            Some(caption) => format!("{} ({caption})", child.segment),
            None => child.segment.clone(),
        };
        let _ = writeln!(out, "{prefix}{connector}{label}");
        let nested = format!("{prefix}{}", if last { "    " } else { "│   " });
        render_children(&child.children, &nested, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::resource::{Nature, RouteMeta};
    use crate::path::RelativePath;

    fn page(path: &str, route: Option<RouteMeta>) -> Artifact {
        let mut artifact = Artifact::new(
            RelativePath::parse(path).unwrap(),
            "select 1;",
            Classification::Page,
            Nature::Page,
        );
        artifact.route = route;
        artifact
    }

    fn routes() -> Routes {
        let artifacts = vec![
            page(
                "admin/index.sql",
                Some(RouteMeta {
                    caption: Some("Admin".into()),
                    sibling_order: Some(2.0),
                    ..RouteMeta::default()
                }),
            ),
            page(
                "admin/users/list.sql",
                Some(RouteMeta {
                    caption: Some("Users".into()),
                    ..RouteMeta::default()
                }),
            ),
            page(
                "admin/audit.sql",
                Some(RouteMeta {
                    sibling_order: Some(1.0),
                    ..RouteMeta::default()
                }),
            ),
            page("index.sql", None),
        ];
        Routes::build(&artifacts)
    }

    #[test]
    fn synthesizes_missing_containers() {
        let routes = routes();
        let admin = routes.find("/admin").unwrap();
        assert!(admin.synthesized);
        assert!(admin.resources.is_empty());
        let users = routes.find("admin/users").unwrap();
        assert!(users.synthesized);
        assert_eq!(users.children[0].resources, vec!["admin/users/list.sql"]);
    }

    #[test]
    fn siblings_sort_by_order_then_path() {
        let routes = routes();
        let admin = routes.find("/admin").unwrap();
        let order: Vec<_> = admin.children.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(
            order,
            vec!["/admin/audit.sql", "/admin/index.sql", "/admin/users"]
        );
        let roots: Vec<_> = routes.roots.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(roots, vec!["/admin", "/index.sql"]);
    }

    #[test]
    fn breadcrumbs_and_edges_follow_parents() {
        let routes = routes();
        let trail = &routes.breadcrumbs["/admin/users/list.sql"];
        let paths: Vec<_> = trail.iter().map(|b| b.path.as_str()).collect();
        assert_eq!(paths, vec!["/admin", "/admin/users"]);
        assert_eq!(trail[1].label, "users");
        assert!(routes.breadcrumbs["/admin"].is_empty());

        assert!(routes.edges.contains(&Edge {
            parent: "/admin/users".into(),
            child: "/admin/users/list.sql".into(),
        }));
        assert_eq!(routes.edges.len(), 4);
    }

    #[test]
    fn explicit_parent_overrides_structure() {
        let artifacts = vec![page(
            "reports/q1.sql",
            Some(RouteMeta {
                parent: Some("/dashboards".into()),
                ..RouteMeta::default()
            }),
        )];
        let routes = Routes::build(&artifacts);
        let dashboards = routes.find("/dashboards").unwrap();
        assert_eq!(dashboards.children[0].path, "/reports/q1.sql");
        assert!(routes.find("/reports").is_none());
    }

    #[test]
    fn parent_cycles_are_promoted_to_roots() {
        let parent = |path: &str| {
            Some(RouteMeta {
                parent: Some(path.into()),
                ..RouteMeta::default()
            })
        };
        let artifacts = vec![
            page("a.sql", parent("/b.sql")),
            page("b.sql", parent("/a.sql")),
            page("c.sql", parent("/c.sql")),
        ];
        let routes = Routes::build(&artifacts);

        assert_eq!(routes.cycles, vec!["/a.sql", "/c.sql"]);
        let roots: Vec<_> = routes.roots.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(roots, vec!["/a.sql", "/c.sql"]);
        assert_eq!(routes.find("/a.sql").unwrap().children[0].path, "/b.sql");
        assert_eq!(
            routes.edges,
            vec![Edge {
                parent: "/a.sql".into(),
                child: "/b.sql".into(),
            }]
        );
        let trail: Vec<_> = routes.breadcrumbs["/b.sql"]
            .iter()
            .map(|b| b.path.as_str())
            .collect();
        assert_eq!(trail, vec!["/a.sql"]);
        assert!(routes.breadcrumbs["/c.sql"].is_empty());
    }

    #[test]
    fn ascii_tree_draws_connectors() {
        let tree = routes().ascii_tree();
        assert_eq!(
            tree,
            "\
/admin
├── audit.sql
├── index.sql (Admin)
└── users
    └── list.sql (Users)
/index.sql
"
        );
    }

    #[test]
    fn head_sql_is_not_routable() {
        let head = Artifact::new(
            RelativePath::parse("sql.d/head/000.sql").unwrap(),
            "",
            Classification::Head,
            Nature::HeadSql,
        );
        assert!(Routes::build([&head]).roots.is_empty());
    }
}
