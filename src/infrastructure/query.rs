//! Filter and sort language over JSON documents.
//!
//! Filters address top-level fields of the stored document. The in-memory
//! backend evaluates them with [`Filter::matches`]; the `PostgreSQL` backend
//! translates them to JSONB predicates. Both must agree on the semantics
//! below:
//!
//! - a missing field compares equal to `null`
//! - `Search` is a case-insensitive literal substring match, never a pattern
//! - timestamp bounds are inclusive and never match a missing or null field

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::repository::Pagination;

// =============================================================================
// Filter
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    Eq(String, Value),
    Ne(String, Value),
    /// Text field equals the value, ignoring case.
    EqIgnoreCase(String, String),
    In(String, Vec<Value>),
    /// Array field contains the value.
    Contains(String, Value),
    /// Any of the fields contains the term, ignoring case.
    Search(Vec<String>, String),
    /// Timestamp field is at or after the instant.
    After(String, DateTime<Utc>),
    /// Timestamp field is at or before the instant.
    Before(String, DateTime<Utc>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

fn to_json(value: impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl Filter {
    pub fn eq(field: &str, value: impl Serialize) -> Self {
        Self::Eq(field.to_string(), to_json(value))
    }

    pub fn ne(field: &str, value: impl Serialize) -> Self {
        Self::Ne(field.to_string(), to_json(value))
    }

    pub fn eq_ignore_case(field: &str, value: &str) -> Self {
        Self::EqIgnoreCase(field.to_string(), value.to_string())
    }

    pub fn is_in<V: Serialize>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(field.to_string(), values.into_iter().map(to_json).collect())
    }

    pub fn contains(field: &str, value: impl Serialize) -> Self {
        Self::Contains(field.to_string(), to_json(value))
    }

    pub fn search(fields: &[&str], term: &str) -> Self {
        Self::Search(
            fields.iter().map(ToString::to_string).collect(),
            term.to_string(),
        )
    }

    pub fn after(field: &str, instant: DateTime<Utc>) -> Self {
        Self::After(field.to_string(), instant)
    }

    pub fn before(field: &str, instant: DateTime<Utc>) -> Self {
        Self::Before(field.to_string(), instant)
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::All, filter) | (filter, Self::All) => filter,
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), filter) => {
                left.push(filter);
                Self::And(left)
            }
            (filter, Self::And(mut right)) => {
                right.insert(0, filter);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }

    /// Conjunction of every filter; `All` when empty.
    pub fn all_of(filters: impl IntoIterator<Item = Self>) -> Self {
        filters.into_iter().fold(Self::All, Self::and)
    }

    /// Evaluates the filter against a document.
    #[must_use]
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Self::All => true,
            Self::Eq(field, value) => field_of(document, field) == value,
            Self::Ne(field, value) => field_of(document, field) != value,
            Self::EqIgnoreCase(field, value) => field_of(document, field)
                .as_str()
                .is_some_and(|text| text.to_lowercase() == value.to_lowercase()),
            Self::In(field, values) => values.contains(field_of(document, field)),
            Self::Contains(field, value) => field_of(document, field)
                .as_array()
                .is_some_and(|items| items.contains(value)),
            Self::Search(fields, term) => {
                let needle = term.to_lowercase();
                fields.iter().any(|field| {
                    field_of(document, field)
                        .as_str()
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
                })
            }
            Self::After(field, instant) => {
                timestamp_of(document, field).is_some_and(|value| value >= *instant)
            }
            Self::Before(field, instant) => {
                timestamp_of(document, field).is_some_and(|value| value <= *instant)
            }
            Self::And(filters) => filters.iter().all(|filter| filter.matches(document)),
            Self::Or(filters) => filters.iter().any(|filter| filter.matches(document)),
            Self::Not(filter) => !filter.matches(document),
        }
    }
}

impl std::ops::Not for Filter {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self::Not(Box::new(self))
    }
}

fn field_of<'a>(document: &'a Value, field: &str) -> &'a Value {
    document.get(field).unwrap_or(&Value::Null)
}

fn timestamp_of(document: &Value, field: &str) -> Option<DateTime<Utc>> {
    field_of(document, field)
        .as_str()
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|instant| instant.with_timezone(&Utc))
}

// =============================================================================
// Sort
// =============================================================================

/// How a sort field is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKind {
    /// Case-insensitive string order.
    Text,
    /// Chronological order of RFC 3339 strings.
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One sort key. Missing values sort last when ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub kind: SortKind,
    pub direction: SortDirection,
}

impl Sort {
    #[must_use]
    pub fn new(field: &str, kind: SortKind, direction: SortDirection) -> Self {
        Self {
            field: field.to_string(),
            kind,
            direction,
        }
    }

    #[must_use]
    pub fn text(field: &str) -> Self {
        Self::new(field, SortKind::Text, SortDirection::Ascending)
    }

    #[must_use]
    pub fn newest_first(field: &str) -> Self {
        Self::new(field, SortKind::Timestamp, SortDirection::Descending)
    }

    /// Compares two documents on this key.
    #[must_use]
    pub fn compare(&self, left: &Value, right: &Value) -> Ordering {
        let ordering = match self.kind {
            SortKind::Text => compare_missing_last(
                field_of(left, &self.field).as_str().map(str::to_lowercase),
                field_of(right, &self.field).as_str().map(str::to_lowercase),
            ),
            SortKind::Timestamp => compare_missing_last(
                timestamp_of(left, &self.field),
                timestamp_of(right, &self.field),
            ),
        };
        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

fn compare_missing_last<T: Ord>(left: Option<T>, right: Option<T>) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// =============================================================================
// Query
// =============================================================================

/// Filter, ordering and page of a read.
///
/// Results are ordered by the sort keys, then by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub sort: Vec<Sort>,
    pub pagination: Pagination,
}

impl Query {
    /// Unsorted query returning every match.
    #[must_use]
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            sort: Vec::new(),
            pagination: Pagination::all(),
        }
    }

    #[must_use]
    pub fn sorted_by(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    #[must_use]
    pub const fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "title": "Quarterly Report",
            "status": "Backlog",
            "assignee": null,
            "members": ["a", "b"],
            "due_at": "2026-03-10T12:00:00Z",
            "is_deleted": false
        })
    }

    #[rstest]
    #[case(Filter::eq("status", "Backlog"), true)]
    #[case(Filter::eq("status", "Done"), false)]
    #[case(Filter::eq("assignee", Value::Null), true)]
    #[case(Filter::eq("missing", Value::Null), true)]
    #[case(Filter::ne("status", "Done"), true)]
    #[case(Filter::is_in("status", ["Done", "Backlog"]), true)]
    #[case(Filter::is_in("status", Vec::<&str>::new()), false)]
    #[case(Filter::contains("members", "b"), true)]
    #[case(Filter::contains("members", "c"), false)]
    #[case(Filter::contains("title", "Quarterly Report"), false)]
    #[case(Filter::search(&["title"], "REPORT"), true)]
    #[case(Filter::search(&["title"], "rep.*t"), false)]
    #[case(Filter::search(&["status", "title"], "back"), true)]
    #[case(Filter::eq("is_deleted", false), true)]
    #[case(Filter::eq_ignore_case("title", "quarterly REPORT"), true)]
    #[case(Filter::eq_ignore_case("title", "quarterly"), false)]
    #[case(Filter::eq_ignore_case("missing", ""), false)]
    fn test_filter_matches(#[case] filter: Filter, #[case] expected: bool) {
        assert_eq!(filter.matches(&document()), expected);
    }

    #[rstest]
    fn test_timestamp_bounds_are_inclusive() {
        let due: DateTime<Utc> = "2026-03-10T12:00:00Z".parse().unwrap();
        assert!(Filter::after("due_at", due).matches(&document()));
        assert!(Filter::before("due_at", due).matches(&document()));
        assert!(!Filter::after("due_at", due + chrono::Duration::seconds(1)).matches(&document()));
        assert!(!Filter::after("start_at", due).matches(&document()));
    }

    #[rstest]
    fn test_and_flattens_and_skips_all() {
        let filter = Filter::All
            .and(Filter::eq("a", 1))
            .and(Filter::eq("b", 2).and(Filter::eq("c", 3)));
        match filter {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
        assert_eq!(Filter::all_of([]), Filter::All);
    }

    #[rstest]
    fn test_or_and_not() {
        let filter = Filter::Or(vec![Filter::eq("status", "Done"), !Filter::eq("is_deleted", true)]);
        assert!(filter.matches(&document()));
    }

    #[rstest]
    fn test_text_sort_ignores_case_and_puts_missing_last() {
        let sort = Sort::text("name");
        let alpha = json!({"name": "alpha"});
        let bravo = json!({"name": "Bravo"});
        let missing = json!({});

        assert_eq!(sort.compare(&alpha, &bravo), Ordering::Less);
        assert_eq!(sort.compare(&bravo, &missing), Ordering::Less);
        assert_eq!(sort.compare(&missing, &missing), Ordering::Equal);
    }

    #[rstest]
    fn test_newest_first() {
        let sort = Sort::newest_first("at");
        let older = json!({"at": "2026-01-01T00:00:00Z"});
        let newer = json!({"at": "2026-02-01T00:00:00Z"});
        assert_eq!(sort.compare(&newer, &older), Ordering::Less);
    }
}
