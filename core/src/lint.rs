//! Layout linting.
//!
//! [`lint_layout`] runs toggleable style and consistency checks over a raw
//! layout mapping. Unlike [`compile_layout`](crate::compile_layout) it needs
//! no API document and reports issues in nodes the start node never reaches.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::layout::PAGINATION_KEYS;

/// Which checks [`lint_layout`] runs. All are enabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutChecks {
    pub references: bool,
    pub sub_order: bool,
    pub missing_props: bool,
    pub op_dups: bool,
    pub op_order: bool,
    pub pagination: bool,
}

impl Default for LayoutChecks {
    fn default() -> Self {
        Self {
            references: true,
            sub_order: true,
            missing_props: true,
            op_dups: true,
            op_order: true,
            pagination: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutCheck {
    References,
    SubOrder,
    MissingProps,
    OpDups,
    OpOrder,
    Pagination,
}

impl fmt::Display for LayoutCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::References => "references",
            Self::SubOrder => "sub_order",
            Self::MissingProps => "missing_props",
            Self::OpDups => "op_dups",
            Self::OpOrder => "op_order",
            Self::Pagination => "pagination",
        };
        f.write_str(name)
    }
}

/// One lint finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutIssue {
    pub check: LayoutCheck,
    /// Node (or `node.entry`) the issue is about.
    pub subject: String,
    pub message: String,
}

impl LayoutIssue {
    fn new(check: LayoutCheck, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            check,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LayoutIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.check, self.subject, self.message)
    }
}

/// Lints a raw layout mapping.
///
/// # Example
///
/// ```
/// use oas_toolkit_core::*;
/// use serde_json::json;
///
/// let raw = json!({
///     "main": {"description": "root", "operations": [
///         {"name": "zoo", "subcommandId": "zoo"},
///         {"name": "apes", "subcommandId": "apes"}
///     ]},
///     "zoo": {"description": "z", "operations": []},
///     "orphan": {"description": "o", "operations": []}
/// });
///
/// let issues = lint_layout(&raw, "main", &LayoutChecks::default());
/// let lines: Vec<String> = issues.iter().map(ToString::to_string).collect();
/// assert_eq!(lines, vec![
///     "[references] apes: referenced but not defined",
///     "[references] orphan: defined but never referenced",
///     "[sub_order] layout: orphan < zoo",
///     "[op_order] main: expected apes, zoo",
/// ]);
/// ```
pub fn lint_layout(raw: &Value, start: &str, checks: &LayoutChecks) -> Vec<LayoutIssue> {
    let empty = Map::new();
    let data = raw.as_object().unwrap_or(&empty);
    let mut issues = Vec::new();

    if checks.references {
        references(data, start, &mut issues);
    }
    if checks.sub_order {
        sub_order(data, start, &mut issues);
    }
    if checks.missing_props {
        missing_props(data, &mut issues);
    }
    if checks.op_dups {
        op_dups(data, &mut issues);
    }
    if checks.op_order {
        op_order(data, &mut issues);
    }
    if checks.pagination {
        pagination(data, &mut issues);
    }
    issues
}

fn entries(node: &Value) -> &[Value] {
    node.get("operations")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn entry_str<'v>(entry: &'v Value, key: &str) -> Option<&'v str> {
    entry.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn references(data: &Map<String, Value>, start: &str, issues: &mut Vec<LayoutIssue>) {
    let referenced: BTreeSet<&str> = data
        .values()
        .flat_map(entries)
        .filter_map(|entry| entry_str(entry, "subcommandId"))
        .collect();
    let defined: BTreeSet<&str> = data.keys().map(String::as_str).collect();

    for missing in referenced.difference(&defined) {
        issues.push(LayoutIssue::new(
            LayoutCheck::References,
            *missing,
            "referenced but not defined",
        ));
    }
    for unused in defined.difference(&referenced).filter(|id| **id != start) {
        issues.push(LayoutIssue::new(
            LayoutCheck::References,
            *unused,
            "defined but never referenced",
        ));
    }
}

fn sub_order(data: &Map<String, Value>, start: &str, issues: &mut Vec<LayoutIssue>) {
    let mut names: Vec<&str> = data.keys().map(String::as_str).collect();
    if names.is_empty() {
        return;
    }
    if names[0] == start {
        names.remove(0);
    } else {
        issues.push(LayoutIssue::new(
            LayoutCheck::SubOrder,
            "layout",
            format!("First should be {start}"),
        ));
    }

    for pair in names.windows(2) {
        if pair[1] < pair[0] {
            issues.push(LayoutIssue::new(
                LayoutCheck::SubOrder,
                "layout",
                format!("{} < {}", pair[1], pair[0]),
            ));
        }
    }
}

fn missing_props(data: &Map<String, Value>, issues: &mut Vec<LayoutIssue>) {
    for (id, node) in data {
        let mut missing = Vec::new();
        for key in ["description", "operations"] {
            if node.get(key).is_none() {
                missing.push(key.to_string());
            }
        }
        for (index, entry) in entries(node).iter().enumerate() {
            let label = entry_str(entry, "name")
                .map(str::to_string)
                .unwrap_or_else(|| format!("operation[{index}]"));
            if entry.get("name").is_none() {
                missing.push(format!("{label} name"));
            }
            if entry.get("operationId").is_none() && entry.get("subcommandId").is_none() {
                missing.push(format!("{label} operationId or subcommandId"));
            }
        }
        if !missing.is_empty() {
            issues.push(LayoutIssue::new(
                LayoutCheck::MissingProps,
                id.as_str(),
                format!("missing {}", missing.join(", ")),
            ));
        }
    }
}

fn op_dups(data: &Map<String, Value>, issues: &mut Vec<LayoutIssue>) {
    for (id, node) in data {
        let mut positions: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (index, entry) in entries(node).iter().enumerate() {
            if let Some(name) = entry_str(entry, "name") {
                positions.entry(name).or_default().push(index);
            }
        }
        let repeated: Vec<String> = positions
            .iter()
            .filter(|(_, at)| at.len() > 1)
            .map(|(name, at)| {
                let at: Vec<String> = at.iter().map(ToString::to_string).collect();
                format!("{name} at {}", at.join(", "))
            })
            .collect();
        if !repeated.is_empty() {
            issues.push(LayoutIssue::new(
                LayoutCheck::OpDups,
                id.as_str(),
                repeated.join("; "),
            ));
        }
    }
}

fn op_order(data: &Map<String, Value>, issues: &mut Vec<LayoutIssue>) {
    for (id, node) in data {
        let names: Vec<&str> = entries(node)
            .iter()
            .map(|entry| entry.get("name").and_then(Value::as_str).unwrap_or_default())
            .collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        if names != sorted {
            issues.push(LayoutIssue::new(
                LayoutCheck::OpOrder,
                id.as_str(),
                format!("expected {}", sorted.join(", ")),
            ));
        }
    }
}

fn pagination(data: &Map<String, Value>, issues: &mut Vec<LayoutIssue>) {
    let set = |spec: &Map<String, Value>, key: &str| {
        spec.get(key)
            .is_some_and(|v| !v.is_null() && v.as_str() != Some(""))
    };

    for (id, node) in data {
        for entry in entries(node) {
            let Some(spec) = entry.get("pagination").and_then(Value::as_object) else {
                continue;
            };
            let mut reasons = Vec::new();

            let unsupported: Vec<&str> = spec
                .keys()
                .map(String::as_str)
                .filter(|k| !PAGINATION_KEYS.contains(k))
                .collect();
            if !unsupported.is_empty() {
                reasons.push(format!("unsupported parameters: {}", unsupported.join(", ")));
            }
            if set(spec, "nextHeader") && set(spec, "nextProperty") {
                reasons.push("cannot have next URL in both header and body property".to_string());
            }
            if set(spec, "itemStart") && set(spec, "pageStart") {
                reasons.push("start can only be specified with page or item parameter".to_string());
            }

            if !reasons.is_empty() {
                let name = entry.get("name").and_then(Value::as_str).unwrap_or_default();
                issues.push(LayoutIssue::new(
                    LayoutCheck::Pagination,
                    format!("{id}.{name}"),
                    reasons.join("; "),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn only(check: LayoutCheck) -> LayoutChecks {
        LayoutChecks {
            references: check == LayoutCheck::References,
            sub_order: check == LayoutCheck::SubOrder,
            missing_props: check == LayoutCheck::MissingProps,
            op_dups: check == LayoutCheck::OpDups,
            op_order: check == LayoutCheck::OpOrder,
            pagination: check == LayoutCheck::Pagination,
        }
    }

    fn messages(issues: &[LayoutIssue]) -> Vec<String> {
        issues.iter().map(|i| format!("{}: {}", i.subject, i.message)).collect()
    }

    #[test]
    fn test_sub_order_requires_start_first() {
        let raw = json!({"b": {}, "main": {}, "a": {}});
        let issues = lint_layout(&raw, "main", &only(LayoutCheck::SubOrder));
        assert_eq!(
            messages(&issues),
            vec!["layout: First should be main", "layout: a < main"]
        );
    }

    #[test]
    fn test_missing_props_lists_every_gap() {
        let raw = json!({
            "main": {"operations": [{"name": "x"}, {"operationId": "y"}]}
        });
        let issues = lint_layout(&raw, "main", &only(LayoutCheck::MissingProps));
        assert_eq!(
            messages(&issues),
            vec!["main: missing description, x operationId or subcommandId, operation[1] name"]
        );
    }

    #[test]
    fn test_op_dups_reports_indices() {
        let raw = json!({
            "main": {"operations": [
                {"name": "get"}, {"name": "list"}, {"name": "get"}, {"name": "list"}, {"name": "get"}
            ]}
        });
        let issues = lint_layout(&raw, "main", &only(LayoutCheck::OpDups));
        assert_eq!(messages(&issues), vec!["main: get at 0, 2, 4; list at 1, 3"]);
    }

    #[test]
    fn test_pagination_conflicts() {
        let raw = json!({
            "main": {"operations": [{"name": "list", "pagination": {
                "nextHeader": "Link",
                "nextProperty": "next",
                "pageStart": "page",
                "itemStart": "offset",
                "cursor": "c"
            }}]}
        });
        let issues = lint_layout(&raw, "main", &only(LayoutCheck::Pagination));
        assert_eq!(
            messages(&issues),
            vec![
                "main.list: unsupported parameters: cursor; cannot have next URL in both header \
                 and body property; start can only be specified with page or item parameter"
            ]
        );
    }

    #[test]
    fn test_clean_layout_has_no_issues() {
        let raw = json!({
            "main": {"description": "root", "operations": [
                {"name": "a", "subcommandId": "alpha"},
                {"name": "b", "operationId": "b_op", "pagination": {"pageSize": "limit"}}
            ]},
            "alpha": {"description": "first", "operations": [{"name": "x", "operationId": "x_op"}]}
        });
        assert!(lint_layout(&raw, "main", &LayoutChecks::default()).is_empty());
    }

    #[test]
    fn test_checks_deserialize_with_defaults() {
        let checks: LayoutChecks = serde_json::from_value(json!({"op_order": false})).unwrap();
        assert!(!checks.op_order);
        assert!(checks.references);
    }
}
