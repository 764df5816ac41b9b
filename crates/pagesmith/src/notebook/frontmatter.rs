use markdown::mdast::Node;
use serde_json::{Map, Value, json};

use super::schema::Schema;

/// Leading run of header-like nodes and the YAML block found inside it.
pub struct HeaderRegion<'a> {
    pub yaml: Option<&'a markdown::mdast::Yaml>,
    /// Number of top-level nodes that belong to the header.
    pub len: usize,
}

/// Scans the top of the document. Only the first YAML node counts as frontmatter;
/// the first node that is not YAML, a thematic break, raw HTML, or a definition
/// ends the header.
pub fn header_region(children: &[Node]) -> HeaderRegion<'_> {
    let mut yaml = None;
    let mut len = 0;
    for node in children {
        match node {
            Node::Yaml(block) => {
                if yaml.is_none() {
                    yaml = Some(block);
                }
            }
            Node::ThematicBreak(_) | Node::Html(_) | Node::Definition(_) => {}
            _ => break,
        }
        len += 1;
    }
    HeaderRegion { yaml, len }
}

/// Why a frontmatter block could not be accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontmatterFailure {
    pub message: String,
    pub payload: Value,
}

/// Parses YAML frontmatter into a JSON object and validates it.
///
/// Empty or `null` frontmatter becomes `{}`. Anything that is not a mapping, fails
/// to parse, or fails `schema` is reported as a failure.
pub fn parse_frontmatter(
    raw: Option<&str>,
    schema: Option<&dyn Schema>,
) -> Result<Value, FrontmatterFailure> {
    let parsed = match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => Value::Object(Map::new()),
        Some(raw) => match serde_yaml::from_str::<Value>(raw) {
            Ok(Value::Null) => Value::Object(Map::new()),
            Ok(value @ Value::Object(_)) => value,
            Ok(other) => {
                return Err(FrontmatterFailure {
                    message: "frontmatter must be a mapping".into(),
                    payload: json!({ "candidate": other }),
                });
            }
            Err(err) => {
                return Err(FrontmatterFailure {
                    message: format!("invalid YAML: {err}"),
                    payload: json!({ "raw": raw }),
                });
            }
        },
    };

    match schema {
        None => Ok(parsed),
        Some(schema) => schema.validate(&parsed).map_err(|err| FrontmatterFailure {
            message: format!("frontmatter failed validation: {err}"),
            payload: json!({ "error": err, "candidate": parsed }),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::schema::{FnSchema, SchemaError};

    fn mdast(source: &str) -> Node {
        markdown::to_mdast(source, &crate::notebook::parser::mdast_options()).unwrap()
    }

    #[test]
    fn header_region_stops_at_first_content_node() {
        let root = mdast("---\ntitle: x\n---\n\n<!-- note -->\n\n# Heading\n\ntext\n");
        let children = root.children().unwrap();
        let region = header_region(children);
        assert_eq!(region.len, 2);
        assert_eq!(region.yaml.unwrap().value, "title: x");
    }

    #[test]
    fn documents_without_yaml_have_empty_header() {
        let root = mdast("# Title\n");
        let region = header_region(root.children().unwrap());
        assert!(region.yaml.is_none());
        assert_eq!(region.len, 0);
    }

    #[test]
    fn empty_and_null_frontmatter_become_objects() {
        assert_eq!(parse_frontmatter(None, None).unwrap(), json!({}));
        assert_eq!(parse_frontmatter(Some("~"), None).unwrap(), json!({}));
        assert_eq!(
            parse_frontmatter(Some("siteName: Demo"), None).unwrap(),
            json!({ "siteName": "Demo" })
        );
    }

    #[test]
    fn scalars_and_bad_yaml_fail() {
        assert!(parse_frontmatter(Some("just text"), None).is_err());
        let failure = parse_frontmatter(Some("a: [unclosed"), None).unwrap_err();
        assert!(failure.message.starts_with("invalid YAML"));
    }

    #[test]
    fn schema_failures_carry_candidate() {
        let schema = FnSchema(|_: &Value| -> Result<Value, SchemaError> {
            Err(SchemaError::new("siteName is required"))
        });
        let failure = parse_frontmatter(Some("other: 1"), Some(&schema)).unwrap_err();
        assert!(failure.message.contains("siteName is required"));
        assert_eq!(failure.payload["candidate"], json!({ "other": 1 }));
    }
}
