//! Query description and row evaluation.
//!
//! A [`DocumentQuery`] is the filter / order / consistency triple a
//! [`super::DocumentStore`] executes. Stores that evaluate queries in-process
//! use [`DocumentQuery::apply`]; remote stores can render the query with
//! [`DocumentQuery::statement`].

use super::StoredDocument;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

/// Read consistency requested for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanConsistency {
    /// Serve whatever the index holds right now; recent writes may be missing.
    #[default]
    NotBounded,
    /// Wait until every write acknowledged before the query is indexed.
    RequestPlus,
}

impl ScanConsistency {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanConsistency::NotBounded => "not_bounded",
            ScanConsistency::RequestPlus => "request_plus",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Eq(String, JsonValue),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, other) => other,
            (this, Filter::All) => this,
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), other) => {
                left.push(other);
                Filter::And(left)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }

    pub fn matches(&self, content: &JsonValue) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, expected) => content.get(field) == Some(expected),
            Filter::And(filters) => filters.iter().all(|filter| filter.matches(content)),
        }
    }

    fn render(&self) -> Option<String> {
        match self {
            Filter::All => None,
            Filter::Eq(field, value) => Some(format!("{} = {}", field, value)),
            Filter::And(filters) => {
                let parts: Vec<String> = filters.iter().filter_map(Filter::render).collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(" AND "))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// What a sort clause compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortExpr {
    /// Raw JSON value of the field.
    Field(String),
    /// The field read as a point in time: integer epoch millis or an RFC 3339 string.
    Timestamp(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub expr: SortExpr,
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(expr: SortExpr) -> Self {
        Self {
            expr,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(expr: SortExpr) -> Self {
        Self {
            expr,
            direction: SortDirection::Desc,
        }
    }

    fn key(&self, content: &JsonValue) -> SortKey {
        match &self.expr {
            SortExpr::Field(field) => match content.get(field) {
                Some(value) => SortKey::Value(value.clone()),
                None => SortKey::Missing,
            },
            SortExpr::Timestamp(field) => content
                .get(field)
                .and_then(timestamp_of)
                .map(SortKey::Timestamp)
                .unwrap_or(SortKey::Missing),
        }
    }

    fn render(&self) -> String {
        let expr = match &self.expr {
            SortExpr::Field(field) => field.clone(),
            SortExpr::Timestamp(field) => format!("STR_TO_UTC({})", field),
        };
        let direction = match self.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        format!("{} {}", expr, direction)
    }
}

// Missing keys order before everything that is present.
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Missing,
    Timestamp(DateTime<Utc>),
    Value(JsonValue),
}

impl SortKey {
    fn compare(&self, other: &SortKey) -> Ordering {
        match (self, other) {
            (SortKey::Missing, SortKey::Missing) => Ordering::Equal,
            (SortKey::Missing, _) => Ordering::Less,
            (_, SortKey::Missing) => Ordering::Greater,
            (SortKey::Timestamp(a), SortKey::Timestamp(b)) => a.cmp(b),
            (SortKey::Value(a), SortKey::Value(b)) => compare_json(a, b),
            (SortKey::Timestamp(_), SortKey::Value(_)) => Ordering::Less,
            (SortKey::Value(_), SortKey::Timestamp(_)) => Ordering::Greater,
        }
    }
}

fn timestamp_of(value: &JsonValue) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::Number(number) => number
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        JsonValue::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc)),
        _ => None,
    }
}

fn type_rank(value: &JsonValue) -> u8 {
    match value {
        JsonValue::Null => 0,
        JsonValue::Bool(_) => 1,
        JsonValue::Number(_) => 2,
        JsonValue::String(_) => 3,
        JsonValue::Array(_) => 4,
        JsonValue::Object(_) => 5,
    }
}

fn compare_json(a: &JsonValue, b: &JsonValue) -> Ordering {
    match (a, b) {
        (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = x.as_f64().unwrap_or(f64::NAN);
                    let y = y.as_f64().unwrap_or(f64::NAN);
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            }
        }
        (JsonValue::String(x), JsonValue::String(y)) => x.cmp(y),
        (JsonValue::Array(x), JsonValue::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ordering = compare_json(left, right);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (JsonValue::Object(_), JsonValue::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Filter, ordering and consistency of a bulk read.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    pub filter: Filter,
    pub order: Vec<Sort>,
    pub consistency: ScanConsistency,
}

impl Default for DocumentQuery {
    fn default() -> Self {
        Self {
            filter: Filter::All,
            order: Vec::new(),
            consistency: ScanConsistency::default(),
        }
    }
}

impl DocumentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = self.filter.and(filter);
        self
    }

    pub fn order_by(mut self, sort: Sort) -> Self {
        self.order.push(sort);
        self
    }

    pub fn consistency(mut self, consistency: ScanConsistency) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn matches(&self, document: &StoredDocument) -> bool {
        self.filter.matches(&document.content)
    }

    /// Orders two rows by the sort clauses, then by identifier.
    pub fn compare(&self, a: &StoredDocument, b: &StoredDocument) -> Ordering {
        for sort in &self.order {
            let ordering = sort.key(&a.content).compare(&sort.key(&b.content));
            let ordering = match sort.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.id().cmp(b.id())
    }

    /// Filters and sorts candidate rows in memory.
    pub fn apply<I>(&self, documents: I) -> Vec<StoredDocument>
    where
        I: IntoIterator<Item = StoredDocument>,
    {
        let mut rows: Vec<StoredDocument> = documents
            .into_iter()
            .filter(|document| self.matches(document))
            .collect();
        rows.sort_by(|a, b| self.compare(a, b));
        rows
    }

    /// Renders the query as N1QL-style text, for logs and remote backends.
    pub fn statement(&self, bucket: &str) -> String {
        let mut statement = format!("SELECT META(`{0}`).id AS docId, `{0}`.* FROM `{0}`", bucket);
        if let Some(predicate) = self.filter.render() {
            statement.push_str(" WHERE ");
            statement.push_str(&predicate);
        }
        if !self.order.is_empty() {
            let order: Vec<String> = self.order.iter().map(Sort::render).collect();
            statement.push_str(" ORDER BY ");
            statement.push_str(&order.join(", "));
        }
        statement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Revision;
    use serde_json::json;

    fn row(id: &str, content: JsonValue) -> StoredDocument {
        StoredDocument::new(Revision::unversioned(id), content)
    }

    #[test]
    fn test_filter_and_flattens() {
        let filter = Filter::All
            .and(Filter::eq("type", "presentation"))
            .and(Filter::eq("title", "a"));
        assert_eq!(
            filter,
            Filter::And(vec![
                Filter::eq("type", "presentation"),
                Filter::eq("title", "a")
            ])
        );
        assert!(filter.matches(&json!({"type": "presentation", "title": "a"})));
        assert!(!filter.matches(&json!({"type": "presentation", "title": "b"})));
        assert!(!filter.matches(&json!({"title": "a"})));
    }

    #[test]
    fn test_timestamp_sort_uses_point_in_time() {
        let query = DocumentQuery::new().order_by(Sort::asc(SortExpr::Timestamp("createdAt".into())));
        let rows = query.apply(vec![
            row("late", json!({"createdAt": "2024-01-01T12:00:00+02:00"})),
            row("early", json!({"createdAt": "2024-01-01T09:30:00Z"})),
            row("millis", json!({"createdAt": 1_704_103_200_000i64})),
            row("missing", json!({})),
        ]);
        let ids: Vec<&str> = rows.iter().map(StoredDocument::id).collect();
        // 12:00+02:00 is 10:00Z, and 1704103200000 is 10:00Z on the same day.
        assert_eq!(ids, vec!["missing", "early", "late", "millis"]);
    }

    #[test]
    fn test_desc_and_id_tiebreak() {
        let query = DocumentQuery::new().order_by(Sort::desc(SortExpr::Field("upVotes".into())));
        let rows = query.apply(vec![
            row("b", json!({"upVotes": 1})),
            row("a", json!({"upVotes": 1})),
            row("c", json!({"upVotes": 7})),
        ]);
        let ids: Vec<&str> = rows.iter().map(StoredDocument::id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_statement_rendering() {
        let query = DocumentQuery::new()
            .filter(Filter::eq("type", "presentation"))
            .order_by(Sort::asc(SortExpr::Timestamp("createdAt".into())))
            .consistency(ScanConsistency::RequestPlus);
        assert_eq!(
            query.statement("default"),
            "SELECT META(`default`).id AS docId, `default`.* FROM `default` \
             WHERE type = \"presentation\" ORDER BY STR_TO_UTC(createdAt) ASC"
        );
        assert_eq!(query.consistency.as_str(), "request_plus");
    }
}
