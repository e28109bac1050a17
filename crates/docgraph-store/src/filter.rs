//! Query vocabulary shared by every engine: filters, sort specs, find options
//! and aggregation stages.
//!
//! Field paths may be dotted (`metadata.updatedAt`) to reach into nested
//! objects. A missing field never matches an equality condition.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};

use crate::Document;

// ============================================================================
// Filters
// ============================================================================

/// A single predicate over a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `field == value`
    Eq { field: String, value: Value },
    /// `field` equals any of `values`
    In { field: String, values: Vec<Value> },
    /// At least one of the sub-filters matches
    AnyOf(Vec<Filter>),
}

/// Conjunction of [`Condition`]s. The empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn is_in<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn any_of(mut self, filters: Vec<Filter>) -> Self {
        self.conditions.push(Condition::AnyOf(filters));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|c| condition_matches(c, doc))
    }
}

fn condition_matches(condition: &Condition, doc: &Document) -> bool {
    match condition {
        Condition::Eq { field, value } => get_path(doc, field).is_some_and(|v| v == value),
        Condition::In { field, values } => {
            get_path(doc, field).is_some_and(|v| values.iter().any(|candidate| candidate == v))
        }
        Condition::AnyOf(filters) => filters.iter().any(|f| f.matches(doc)),
    }
}

// ============================================================================
// Sorting and find options
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Descending,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Vec<SortSpec>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn sorted_by(mut self, spec: SortSpec) -> Self {
        self.sort.push(spec);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Stable multi-key sort. Documents lacking a sort field order before those
/// that have it (ascending).
pub(crate) fn sort_documents(docs: &mut [Document], specs: &[SortSpec]) {
    if specs.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for spec in specs {
            let ord = compare_values(get_path(a, &spec.field), get_path(b, &spec.field));
            let ord = match spec.order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Orders two optional JSON values. RFC 3339 timestamps compare as instants
/// so that differing fractional-second precision does not skew the order.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_present(a, b),
    }
}

fn compare_present(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => match (parse_instant(x), parse_instant(y)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x.cmp(y),
        },
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn parse_instant(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// One step of an aggregation pipeline, applied in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Sort(Vec<SortSpec>),
    Limit(usize),
    /// Groups by `field`, emitting `{"_id": value, "count": n}` per distinct
    /// value in first-seen order. Documents missing the field group under null.
    GroupCount { field: String },
    /// Replaces the stream with a single `{output: n}` document, also when n is 0.
    Count { output: String },
}

pub(crate) fn run_pipeline(mut docs: Vec<Document>, pipeline: &[Stage]) -> Vec<Document> {
    for stage in pipeline {
        docs = match stage {
            Stage::Match(filter) => docs.into_iter().filter(|d| filter.matches(d)).collect(),
            Stage::Sort(specs) => {
                sort_documents(&mut docs, specs);
                docs
            }
            Stage::Limit(n) => {
                docs.truncate(*n);
                docs
            }
            Stage::GroupCount { field } => group_count(&docs, field),
            Stage::Count { output } => {
                let mut out = Map::new();
                out.insert(output.clone(), Value::from(docs.len() as u64));
                vec![out]
            }
        };
    }
    docs
}

fn group_count(docs: &[Document], field: &str) -> Vec<Document> {
    let mut groups: Vec<(Value, u64)> = Vec::new();
    for doc in docs {
        let key = get_path(doc, field).cloned().unwrap_or(Value::Null);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, n)) => *n += 1,
            None => groups.push((key, 1)),
        }
    }
    groups
        .into_iter()
        .map(|(key, count)| {
            let mut out = Map::new();
            out.insert("_id".to_string(), key);
            out.insert("count".to_string(), Value::from(count));
            out
        })
        .collect()
}

// ============================================================================
// Field paths
// ============================================================================

/// Resolves a dotted path inside a document.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Sets a dotted path, creating intermediate objects as needed. Returns false
/// when an intermediate segment exists but is not an object.
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> bool {
    let mut parts: Vec<&str> = path.split('.').collect();
    let Some(last) = parts.pop() else {
        return false;
    };
    let mut current = doc;
    for part in parts {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(next) = entry.as_object_mut() else {
            return false;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_conjunction_and_disjunction() {
        let d = doc(json!({"userId": "u1", "fromEntityId": "a", "toEntityId": "b"}));

        assert!(Filter::new().matches(&d));
        assert!(Filter::new().eq("userId", "u1").matches(&d));
        assert!(!Filter::new().eq("userId", "u2").matches(&d));

        let touching_b = Filter::new().eq("userId", "u1").any_of(vec![
            Filter::new().eq("fromEntityId", "b"),
            Filter::new().eq("toEntityId", "b"),
        ]);
        assert!(touching_b.matches(&d));

        let touching_c = Filter::new().any_of(vec![
            Filter::new().eq("fromEntityId", "c"),
            Filter::new().eq("toEntityId", "c"),
        ]);
        assert!(!touching_c.matches(&d));
        assert!(Filter::new().is_in("toEntityId", ["x", "b"]).matches(&d));
    }

    #[test]
    fn test_missing_field_never_equals() {
        let d = doc(json!({"a": 1}));
        assert!(!Filter::new().eq("b", Value::Null).matches(&d));
    }

    #[test]
    fn test_dotted_paths() {
        let mut d = doc(json!({"metadata": {"createdAt": "x"}}));
        assert_eq!(get_path(&d, "metadata.createdAt"), Some(&json!("x")));
        assert!(set_path(&mut d, "metadata.updatedAt", json!("y")));
        assert!(set_path(&mut d, "extra.deep.value", json!(3)));
        assert_eq!(get_path(&d, "extra.deep.value"), Some(&json!(3)));
        assert_eq!(get_path(&d, "metadata.createdAt"), Some(&json!("x")));
    }

    #[test]
    fn test_timestamps_compare_as_instants() {
        let whole = json!("2026-01-01T00:00:05Z");
        let frac = json!("2026-01-01T00:00:05.500Z");
        assert_eq!(compare_values(Some(&whole), Some(&frac)), Ordering::Less);
    }

    #[test]
    fn test_pipeline_group_sort_limit() {
        let docs = vec![
            doc(json!({"t": "person", "n": 3})),
            doc(json!({"t": "place", "n": 1})),
            doc(json!({"t": "person", "n": 2})),
        ];

        let groups = run_pipeline(
            docs.clone(),
            &[Stage::GroupCount {
                field: "t".to_string(),
            }],
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0]["_id"], json!("person"));
        assert_eq!(groups[0]["count"], json!(2));

        let top = run_pipeline(
            docs.clone(),
            &[Stage::Sort(vec![SortSpec::descending("n")]), Stage::Limit(2)],
        );
        assert_eq!(top.len(), 2);
        assert_eq!(top[0]["n"], json!(3));
        assert_eq!(top[1]["n"], json!(2));

        let counted = run_pipeline(
            docs,
            &[
                Stage::Match(Filter::new().eq("t", "nothing")),
                Stage::Count {
                    output: "total".to_string(),
                },
            ],
        );
        assert_eq!(counted[0]["total"], json!(0));
    }
}
