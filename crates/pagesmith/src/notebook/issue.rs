use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    FrontmatterParse,
    FenceAttrsJson5Parse,
    FenceAttrsValidate,
    InstructionDefaultsParse,
    UnknownLanguage,
}

impl IssueKind {
    /// Disposition applied when no handler overrides it.
    pub fn default_disposition(self) -> Disposition {
        match self {
            IssueKind::FrontmatterParse | IssueKind::FenceAttrsValidate => Disposition::Error,
            IssueKind::FenceAttrsJson5Parse | IssueKind::InstructionDefaultsParse => {
                Disposition::Warning
            }
            IssueKind::UnknownLanguage => Disposition::Lint,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::FrontmatterParse => "frontmatter-parse",
            IssueKind::FenceAttrsJson5Parse => "fence-attrs-json5-parse",
            IssueKind::FenceAttrsValidate => "fence-attrs-validate",
            IssueKind::InstructionDefaultsParse => "instruction-defaults-parse",
            IssueKind::UnknownLanguage => "unknown-language",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Error,
    Warning,
    Lint,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Disposition::Error => "error",
            Disposition::Warning => "warning",
            Disposition::Lint => "lint",
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueLocation {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_index: Option<usize>,
}

impl IssueLocation {
    pub fn file(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for IssueLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.filename)?;
        match (self.start_line, self.end_line) {
            (Some(start), Some(end)) if end != start => write!(f, ":{start}-{end}")?,
            (Some(start), _) => write!(f, ":{start}")?,
            _ => {}
        }
        if let Some(index) = self.block_index {
            write!(f, " (block {index})")?;
        }
        Ok(())
    }
}

/// One diagnostic recorded while parsing a notebook.
///
/// `payload` carries kind-specific detail: the raw validation error, the candidate
/// value that failed, or the offending text.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub message: String,
    pub location: IssueLocation,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    pub disposition: Disposition,
}

impl Issue {
    /// Builds an issue carrying its kind's default disposition.
    pub fn new(kind: IssueKind, message: impl Into<String>, location: IssueLocation) -> Self {
        Self {
            kind,
            message: message.into(),
            location,
            payload: Value::Null,
            disposition: kind.default_disposition(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_error(&self) -> bool {
        self.disposition == Disposition::Error
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.disposition, self.kind, self.location, self.message
        )
    }
}

/// Caller policy deciding the final disposition of each issue.
pub type DispositionHandler = Arc<dyn Fn(&Issue) -> Disposition + Send + Sync>;

/// Per-disposition counts rendered as `N issues (M errors, K warnings)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IssueSummary {
    pub total: usize,
    pub errors: usize,
    pub warnings: usize,
    pub lints: usize,
}

impl IssueSummary {
    pub fn from_issues<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> Self {
        let mut summary = Self::default();
        for issue in issues {
            summary.record(issue);
        }
        summary
    }

    pub fn record(&mut self, issue: &Issue) {
        self.total += 1;
        match issue.disposition {
            Disposition::Error => self.errors += 1,
            Disposition::Warning => self.warnings += 1,
            Disposition::Lint => self.lints += 1,
        }
    }
}

impl fmt::Display for IssueSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = |count: usize, word: &str| {
            if count == 1 {
                format!("{count} {word}")
            } else {
                format!("{count} {word}s")
            }
        };
        write!(
            f,
            "{} ({}, {}",
            plural(self.total, "issue"),
            plural(self.errors, "error"),
            plural(self.warnings, "warning")
        )?;
        if self.lints > 0 {
            write!(f, ", {}", plural(self.lints, "lint"))?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(kind: IssueKind) -> Issue {
        Issue::new(kind, "boom", IssueLocation::file("doc.md"))
    }

    #[test]
    fn default_dispositions_follow_kind_table() {
        assert_eq!(issue(IssueKind::FrontmatterParse).disposition, Disposition::Error);
        assert_eq!(issue(IssueKind::FenceAttrsJson5Parse).disposition, Disposition::Warning);
        assert_eq!(issue(IssueKind::FenceAttrsValidate).disposition, Disposition::Error);
        assert_eq!(
            issue(IssueKind::InstructionDefaultsParse).disposition,
            Disposition::Warning
        );
        assert_eq!(issue(IssueKind::UnknownLanguage).disposition, Disposition::Lint);
    }

    #[test]
    fn summary_renders_counts() {
        let issues = vec![
            issue(IssueKind::FenceAttrsValidate),
            issue(IssueKind::FenceAttrsJson5Parse),
            issue(IssueKind::FenceAttrsJson5Parse),
        ];
        let summary = IssueSummary::from_issues(&issues);
        assert_eq!(summary.to_string(), "3 issues (1 error, 2 warnings)");

        let mut with_lint = summary;
        with_lint.record(&issue(IssueKind::UnknownLanguage));
        assert_eq!(with_lint.to_string(), "4 issues (1 error, 2 warnings, 1 lint)");
    }

    #[test]
    fn location_display_includes_span_and_block() {
        let location = IssueLocation {
            filename: "a.md".into(),
            start_line: Some(3),
            end_line: Some(7),
            block_index: Some(1),
        };
        assert_eq!(location.to_string(), "a.md:3-7 (block 1)");
        assert_eq!(IssueLocation::file("b.md").to_string(), "b.md");
    }

    #[test]
    fn kinds_serialize_kebab_case() {
        let value = serde_json::to_value(IssueKind::FenceAttrsJson5Parse).unwrap();
        assert_eq!(value, "fence-attrs-json5-parse");
        let value = serde_json::to_value(Disposition::Lint).unwrap();
        assert_eq!(value, "lint");
    }
}
