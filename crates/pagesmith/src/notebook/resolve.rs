//! Attribute cascade for fenced blocks.
//!
//! Precedence, lowest to highest: `$preset` → `$spread` → `$merge` → `$fm` →
//! section defaults → the block's own attributes → optional `frontmatter` mirror.
//! Missing presets and dangling paths are skipped without complaint.

use serde_json::{Map, Value};

pub const PRESET_KEY: &str = "$preset";
pub const SPREAD_KEY: &str = "$spread";
pub const MERGE_KEY: &str = "$merge";
pub const FM_KEY: &str = "$fm";
pub const MIRROR_KEY: &str = "frontmatter";

#[derive(Clone, Copy, Debug, Default)]
pub struct ResolveOptions<'a> {
    pub mirror_frontmatter: bool,
    pub section_defaults: Option<&'a Map<String, Value>>,
}

pub fn is_directive(key: &str) -> bool {
    matches!(key, PRESET_KEY | SPREAD_KEY | MERGE_KEY | FM_KEY)
}

/// Recursively merges `overlay` into `base`. Objects merge key by key; arrays and
/// scalars from `overlay` replace whatever `base` held.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => merge_maps(base, overlay),
        (base, overlay) => *base = overlay.clone(),
    }
}

pub fn merge_maps(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match base.get_mut(key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Follows a dot-separated path (`a.b.0.c`) through objects and arrays.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    })
}

/// Computes the resolved attribute object for one block.
///
/// `presets` defaults to `frontmatter.presets` when not supplied.
pub fn resolve(
    raw: &Map<String, Value>,
    frontmatter: &Value,
    presets: Option<&Value>,
    options: &ResolveOptions<'_>,
) -> Map<String, Value> {
    let presets = presets.or_else(|| frontmatter.get("presets"));
    let mut resolved = Map::new();

    if let Some(names) = raw.get(PRESET_KEY) {
        for name in string_list(names) {
            if let Some(Value::Object(preset)) = presets.and_then(|p| p.get(name)) {
                merge_maps(&mut resolved, preset);
            }
        }
    }

    if let Some(paths) = raw.get(SPREAD_KEY) {
        for path in string_list(paths) {
            if let Some(Value::Object(found)) = lookup_path(frontmatter, path) {
                merge_maps(&mut resolved, found);
            }
        }
    }

    if let Some(entries) = raw.get(MERGE_KEY) {
        let entries = match entries {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            single => vec![single],
        };
        for entry in entries {
            if let Some(found) = merge_entry(entry, frontmatter) {
                merge_maps(&mut resolved, found);
            }
        }
    }

    if let Some(Value::String(path)) = raw.get(FM_KEY) {
        if let Some(Value::Object(found)) = lookup_path(frontmatter, path) {
            merge_maps(&mut resolved, found);
        }
    }

    if let Some(defaults) = options.section_defaults {
        merge_maps(&mut resolved, defaults);
    }

    let own: Map<String, Value> = raw
        .iter()
        .filter(|(key, _)| !is_directive(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    merge_maps(&mut resolved, &own);

    if options.mirror_frontmatter {
        resolved.insert(MIRROR_KEY.to_string(), frontmatter.clone());
    }

    resolved
}

fn merge_entry<'a>(entry: &'a Value, frontmatter: &'a Value) -> Option<&'a Map<String, Value>> {
    let Value::Object(map) = entry else {
        return None;
    };
    match map.get(FM_KEY) {
        Some(Value::String(path)) if map.len() == 1 => match lookup_path(frontmatter, path) {
            Some(Value::Object(found)) => Some(found),
            _ => None,
        },
        _ => Some(map),
    }
}

fn string_list(value: &Value) -> Vec<&str> {
    match value {
        Value::String(single) => vec![single.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn frontmatter() -> Value {
        json!({
            "siteName": "Demo",
            "presets": {
                "admin": { "shell": "admin", "route": { "parent": "/admin" } },
                "public": { "shell": "public" }
            },
            "layout": { "theme": { "color": "blue", "dense": true } },
            "seo": { "robots": "noindex" }
        })
    }

    #[test]
    fn precedence_runs_from_presets_to_own_attributes() {
        let fm = frontmatter();
        let defaults = map(json!({ "shell": "from-defaults", "cache": 60 }));
        let raw = map(json!({
            "$preset": "admin",
            "$spread": "layout",
            "$merge": [{ "extra": 1 }, { "$fm": "seo" }],
            "$fm": "layout.theme",
            "cache": 5
        }));

        let resolved = resolve(
            &raw,
            &fm,
            None,
            &ResolveOptions {
                mirror_frontmatter: false,
                section_defaults: Some(&defaults),
            },
        );

        assert_eq!(
            Value::Object(resolved),
            json!({
                "shell": "from-defaults",
                "route": { "parent": "/admin" },
                "theme": { "color": "blue", "dense": true },
                "extra": 1,
                "robots": "noindex",
                "color": "blue",
                "dense": true,
                "cache": 5
            })
        );
    }

    #[test]
    fn arrays_replace_and_objects_merge() {
        let mut base = json!({ "tags": ["a", "b"], "nested": { "x": 1, "y": 2 } });
        deep_merge(&mut base, &json!({ "tags": ["c"], "nested": { "y": 3 } }));
        assert_eq!(base, json!({ "tags": ["c"], "nested": { "x": 1, "y": 3 } }));
    }

    #[test]
    fn dangling_references_are_skipped() {
        let fm = frontmatter();
        let raw = map(json!({
            "$preset": ["missing", "public"],
            "$spread": "nope.deeper",
            "$merge": [{ "$fm": "absent" }, 7],
            "$fm": "siteName",
            "kind": "page"
        }));
        let resolved = resolve(&raw, &fm, None, &ResolveOptions::default());
        assert_eq!(
            Value::Object(resolved),
            json!({ "shell": "public", "kind": "page" })
        );
    }

    #[test]
    fn mirror_adds_frontmatter_copy() {
        let fm = frontmatter();
        let resolved = resolve(
            &map(json!({ "kind": "head" })),
            &fm,
            None,
            &ResolveOptions {
                mirror_frontmatter: true,
                section_defaults: None,
            },
        );
        assert_eq!(resolved.get("frontmatter"), Some(&fm));
    }

    #[test]
    fn lookup_path_walks_arrays() {
        let value = json!({ "a": [{ "b": "found" }] });
        assert_eq!(lookup_path(&value, "a.0.b"), Some(&json!("found")));
        assert_eq!(lookup_path(&value, "a.9.b"), None);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn leaf() -> impl Strategy<Value = Value> {
            prop_oneof![
                any::<bool>().prop_map(Value::from),
                any::<i32>().prop_map(Value::from),
                "[a-z]{0,6}".prop_map(Value::from),
            ]
        }

        fn attrs() -> impl Strategy<Value = Map<String, Value>> {
            let value = leaf().prop_recursive(3, 16, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
                    prop::collection::btree_map("[a-z]{1,4}", inner, 0..3)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            });
            prop::collection::btree_map("[a-z]{1,6}", value, 0..5)
                .prop_map(|m| m.into_iter().collect())
        }

        proptest! {
            #[test]
            fn resolving_resolved_attributes_is_a_no_op(raw in attrs(), mirror in any::<bool>()) {
                let fm = json!({ "presets": { "p": { "k": 1 } } });
                let options = ResolveOptions { mirror_frontmatter: mirror, section_defaults: None };
                let once = resolve(&raw, &fm, None, &options);
                let twice = resolve(&once, &fm, None, &options);
                prop_assert_eq!(once, twice);
            }
        }
    }
}
