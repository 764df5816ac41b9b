//! Canonical path values.
//!
//! `AbsolutePath` and `RelativePath` can only be produced by the parsing functions in
//! this module, so every value in circulation is already normalized: no `.` segments,
//! no duplicate separators, and (for absolute paths) no `..` segments at all. Drivers
//! and the rooted wrapper rely on that guarantee instead of re-validating on use.

use std::fmt;

use serde::Serialize;

use crate::error::FsError;

/// Normalized path starting at `/`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct AbsolutePath(String);

/// Normalized path relative to some root; never starts with `/`.
///
/// Leading `..` segments survive only when the value was parsed with
/// [`RelativePolicy::block_dot_dot`] disabled.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RelativePath(String);

/// Validation knobs for [`parse_relative`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelativePolicy {
    /// Reject `..` segments that climb above the path's own start.
    pub block_dot_dot: bool,
    /// Accept paths that normalize to nothing (the root itself).
    pub allow_empty: bool,
}

impl Default for RelativePolicy {
    fn default() -> Self {
        Self {
            block_dot_dot: true,
            allow_empty: false,
        }
    }
}

impl RelativePolicy {
    /// Strict policy that also accepts the empty path.
    pub fn allow_empty() -> Self {
        Self {
            allow_empty: true,
            ..Self::default()
        }
    }

    /// Accepts anything that is not absolute, deferring containment to the caller.
    pub fn permissive() -> Self {
        Self {
            block_dot_dot: false,
            allow_empty: true,
        }
    }
}

impl AbsolutePath {
    pub fn parse(input: &str) -> Result<Self, FsError> {
        parse_absolute(input)
    }

    pub fn root() -> Self {
        Self("/".into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    /// Returns the parent directory; the root is its own parent.
    pub fn parent(&self) -> AbsolutePath {
        match self.0.rfind('/') {
            Some(0) | None => AbsolutePath::root(),
            Some(idx) => AbsolutePath(self.0[..idx].to_string()),
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Appends a relative path and re-normalizes the result.
    pub fn join(&self, relative: &RelativePath) -> AbsolutePath {
        to_absolute(self, relative)
    }
}

impl RelativePath {
    /// Parses with the default (strict) policy.
    pub fn parse(input: &str) -> Result<Self, FsError> {
        parse_relative(input, RelativePolicy::default())
    }

    /// The empty path, addressing the root itself.
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Extension of the final segment, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name()?;
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }

    pub fn parent(&self) -> RelativePath {
        match self.0.rfind('/') {
            Some(idx) => RelativePath(self.0[..idx].to_string()),
            None => RelativePath::empty(),
        }
    }

    /// Appends `child` (strictly parsed) to this path.
    pub fn join(&self, child: &str) -> Result<RelativePath, FsError> {
        let combined = if self.0.is_empty() {
            child.to_string()
        } else {
            format!("{}/{}", self.0, child)
        };
        parse_relative(&combined, RelativePolicy::default())
    }
}

impl fmt::Display for AbsolutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AbsolutePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Parses and normalizes an absolute path. `..` at the root collapses onto the root.
pub fn parse_absolute(input: &str) -> Result<AbsolutePath, FsError> {
    reject_nul(input)?;
    if !input.starts_with('/') {
        return Err(FsError::invalid(input, "absolute paths must start with '/'"));
    }
    Ok(normalize_absolute(input))
}

/// Parses and normalizes a root-relative path under `policy`.
pub fn parse_relative(input: &str, policy: RelativePolicy) -> Result<RelativePath, FsError> {
    reject_nul(input)?;
    if input.starts_with('/') {
        return Err(FsError::invalid(
            input,
            "relative path resolves to an absolute path",
        ));
    }

    let mut stack: Vec<&str> = Vec::new();
    for segment in input.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                let can_pop = matches!(stack.last(), Some(last) if *last != "..");
                if can_pop {
                    stack.pop();
                } else if policy.block_dot_dot {
                    return Err(FsError::invalid(
                        input,
                        "'..' climbs above the start of the path",
                    ));
                } else {
                    stack.push("..");
                }
            }
            other => stack.push(other),
        }
    }

    if stack.is_empty() && !policy.allow_empty {
        return Err(FsError::invalid(input, "path is empty after normalization"));
    }

    Ok(RelativePath(stack.join("/")))
}

/// True when `path` equals `root` or descends from it, compared segment by segment.
///
/// Both arguments are canonical by construction, so a `/root/../etc` style bypass
/// cannot reach this comparison un-normalized.
pub fn is_inside_root(path: &AbsolutePath, root: &AbsolutePath) -> bool {
    let mut path_segments = path.segments();
    root.segments()
        .all(|expected| path_segments.next() == Some(expected))
}

/// Joins `relative` onto `root`. The result may lie outside `root` when `relative`
/// carries leading `..` segments; containment is the caller's decision.
pub fn to_absolute(root: &AbsolutePath, relative: &RelativePath) -> AbsolutePath {
    if relative.is_empty() {
        return root.clone();
    }
    normalize_absolute(&format!("{}/{}", root.0, relative.0))
}

/// Inverse of [`to_absolute`]; fails with `PathOutsideRoot` when containment does not hold.
pub fn relative_to_root(path: &AbsolutePath, root: &AbsolutePath) -> Result<RelativePath, FsError> {
    if !is_inside_root(path, root) {
        return Err(FsError::PathOutsideRoot {
            path: path.to_string(),
            root: root.to_string(),
        });
    }
    let depth = root.segments().count();
    let rest: Vec<&str> = path.segments().skip(depth).collect();
    Ok(RelativePath(rest.join("/")))
}

fn normalize_absolute(input: &str) -> AbsolutePath {
    let mut stack: Vec<&str> = Vec::new();
    for segment in input.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    AbsolutePath(format!("/{}", stack.join("/")))
}

fn reject_nul(input: &str) -> Result<(), FsError> {
    if input.contains('\0') {
        return Err(FsError::invalid(input, "path contains a NUL byte"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn abs(input: &str) -> AbsolutePath {
        parse_absolute(input).unwrap()
    }

    #[test]
    fn absolute_paths_collapse_dots_and_separators() {
        assert_eq!(abs("/a//b/./c/../d/").as_str(), "/a/b/d");
        assert_eq!(abs("/../..").as_str(), "/");
        assert_eq!(abs("/").as_str(), "/");
    }

    #[test]
    fn absolute_parse_requires_leading_slash() {
        let err = parse_absolute("a/b").unwrap_err();
        assert!(matches!(err, FsError::InvalidPath { .. }));
    }

    #[test]
    fn relative_parse_rejects_absolute_input() {
        let err = parse_relative("/etc/passwd", RelativePolicy::permissive()).unwrap_err();
        assert!(matches!(err, FsError::InvalidPath { .. }));
    }

    #[test]
    fn relative_parse_blocks_escaping_dot_dot_by_default() {
        assert!(parse_relative("../x", RelativePolicy::default()).is_err());
        assert!(parse_relative("a/../../x", RelativePolicy::default()).is_err());
        assert_eq!(
            parse_relative("a/b/../c", RelativePolicy::default())
                .unwrap()
                .as_str(),
            "a/c"
        );
    }

    #[test]
    fn relative_parse_keeps_leading_dot_dot_when_permitted() {
        let rel = parse_relative("../../etc/passwd", RelativePolicy::permissive()).unwrap();
        assert_eq!(rel.as_str(), "../../etc/passwd");
    }

    #[test]
    fn relative_parse_rejects_empty_unless_allowed() {
        assert!(parse_relative("./", RelativePolicy::default()).is_err());
        assert!(
            parse_relative("a/..", RelativePolicy::allow_empty())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn containment_is_segment_aware() {
        let root = abs("/srv/site");
        assert!(is_inside_root(&abs("/srv/site"), &root));
        assert!(is_inside_root(&abs("/srv/site/a/b"), &root));
        assert!(!is_inside_root(&abs("/srv/site2/a"), &root));
        assert!(!is_inside_root(&abs("/srv/site/../other"), &root));
        assert!(is_inside_root(&abs("/anything"), &AbsolutePath::root()));
    }

    #[test]
    fn to_absolute_can_leave_root_but_inverse_refuses() {
        let root = abs("/srv/site");
        let rel = parse_relative("../../etc/passwd", RelativePolicy::permissive()).unwrap();
        let joined = to_absolute(&root, &rel);
        assert_eq!(joined.as_str(), "/etc/passwd");
        let err = relative_to_root(&joined, &root).unwrap_err();
        assert!(matches!(err, FsError::PathOutsideRoot { .. }));
    }

    #[test]
    fn relative_helpers_split_names() {
        let rel = RelativePath::parse("docs/guide/intro.auto.json").unwrap();
        assert_eq!(rel.file_name(), Some("intro.auto.json"));
        assert_eq!(rel.extension(), Some("json"));
        assert_eq!(rel.parent().as_str(), "docs/guide");
        assert_eq!(rel.join("../x.md").unwrap().as_str(), "docs/guide/x.md");
        assert_eq!(abs("/a/b").parent().as_str(), "/a");
        assert_eq!(abs("/a").parent().as_str(), "/");
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z0-9_-][a-z0-9_.-]{0,7}"
    }

    proptest! {
        #[test]
        fn relative_round_trips_through_root(
            root in prop::collection::vec(segment(), 0..4),
            rel in prop::collection::vec(segment(), 0..5),
        ) {
            let root = parse_absolute(&format!("/{}", root.join("/"))).unwrap();
            let rel = parse_relative(&rel.join("/"), RelativePolicy::allow_empty()).unwrap();
            let absolute = to_absolute(&root, &rel);
            prop_assert!(is_inside_root(&absolute, &root));
            prop_assert_eq!(relative_to_root(&absolute, &root).unwrap(), rel);
        }
    }
}
