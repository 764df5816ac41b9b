use serde_json::{Map, Value};

/// Result of splitting a fence meta string into attributes and free text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FenceMeta {
    pub attrs: Map<String, Value>,
    pub info: Option<String>,
    /// Raw `{...}` text that failed to parse, with the parser's message.
    pub rejected: Option<(String, String)>,
}

/// Parses a fence meta string such as `admin page {path: "admin/index", shell: "main"}`.
///
/// A trailing `{...}` segment is read as JSON5; everything before it becomes `info`.
/// Unparseable attributes leave `attrs` empty and are reported via `rejected`.
pub fn parse_meta(meta: Option<&str>) -> FenceMeta {
    let Some(meta) = meta.map(str::trim).filter(|meta| !meta.is_empty()) else {
        return FenceMeta::default();
    };

    let Some(open) = attrs_start(meta) else {
        return FenceMeta {
            info: Some(meta.to_string()),
            ..FenceMeta::default()
        };
    };

    let candidate = &meta[open..];
    let info = Some(meta[..open].trim())
        .filter(|info| !info.is_empty())
        .map(str::to_string);

    match parse_object(candidate) {
        Ok(attrs) => FenceMeta {
            attrs,
            info,
            rejected: None,
        },
        Err(message) => FenceMeta {
            attrs: Map::new(),
            info,
            rejected: Some((candidate.to_string(), message)),
        },
    }
}

/// Parses relaxed JSON that must denote an object.
pub fn parse_object(text: &str) -> Result<Map<String, Value>, String> {
    match json5::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected an object, found {}", kind_name(&other))),
        Err(err) => Err(err.to_string()),
    }
}

/// Splits a leading `#!` line off `body`.
pub fn split_shebang(body: &str) -> (Option<String>, &str) {
    if !body.starts_with("#!") {
        return (None, body);
    }
    match body.split_once('\n') {
        Some((line, rest)) => (Some(line.trim_end_matches('\r').to_string()), rest),
        None => (Some(body.to_string()), ""),
    }
}

// The trailing segment must close with `}` and open at the first unquoted `{`
// that follows whitespace or starts the string.
fn attrs_start(meta: &str) -> Option<usize> {
    if !meta.ends_with('}') {
        return None;
    }
    let mut quote: Option<char> = None;
    let mut prev_blank = true;
    for (idx, ch) in meta.char_indices() {
        match (quote, ch) {
            (Some(open), _) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '{') if prev_blank => return Some(idx),
            (None, _) => {}
        }
        prev_blank = ch.is_whitespace();
    }
    None
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splits_info_and_relaxed_attributes() {
        let meta = parse_meta(Some(r#"admin page {path: 'admin/index', shell: "main",}"#));
        assert_eq!(meta.info.as_deref(), Some("admin page"));
        assert_eq!(
            Value::Object(meta.attrs),
            json!({ "path": "admin/index", "shell": "main" })
        );
        assert!(meta.rejected.is_none());
    }

    #[test]
    fn meta_without_braces_is_all_info() {
        let meta = parse_meta(Some("  title=\"x\"  "));
        assert_eq!(meta.info.as_deref(), Some("title=\"x\""));
        assert!(meta.attrs.is_empty());
        assert_eq!(parse_meta(None), FenceMeta::default());
        assert_eq!(parse_meta(Some("   ")), FenceMeta::default());
    }

    #[test]
    fn braces_inside_quoted_info_are_not_attributes() {
        let meta = parse_meta(Some(r#"title="a {b}" {x: 1}"#));
        assert_eq!(meta.info.as_deref(), Some(r#"title="a {b}""#));
        assert_eq!(Value::Object(meta.attrs), json!({ "x": 1 }));
        assert!(meta.rejected.is_none());

        let unclosed = parse_meta(Some("caption='see {notes}"));
        assert!(unclosed.attrs.is_empty());
        assert!(unclosed.rejected.is_none());
    }

    #[test]
    fn malformed_attributes_fall_back_to_empty() {
        let meta = parse_meta(Some("{kind: }"));
        assert!(meta.attrs.is_empty());
        let (candidate, _) = meta.rejected.unwrap();
        assert_eq!(candidate, "{kind: }");
    }

    #[test]
    fn non_object_attributes_are_rejected() {
        let err = parse_object("[1, 2]").unwrap_err();
        assert!(err.contains("an array"));
    }

    #[test]
    fn shebang_is_split_from_body() {
        let (shebang, rest) = split_shebang("#!/usr/bin/env sqlpage\nselect 1;");
        assert_eq!(shebang.as_deref(), Some("#!/usr/bin/env sqlpage"));
        assert_eq!(rest, "select 1;");

        let (none, same) = split_shebang("select 1;");
        assert!(none.is_none());
        assert_eq!(same, "select 1;");
    }
}
