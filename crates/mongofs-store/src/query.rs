//! Query matcher
//!
//! A query maps dotted field paths to constraints:
//!
//! ```json
//! { "field1": "value1", "field2.field3": { "$gt": 32, "$lte": 100 } }
//! ```
//!
//! A plain value is an equality constraint; an object whose keys all start
//! with `$` is a set of comparison operators. All clauses must hold.

use crate::types::{as_integer, type_name, Document};
use mongofs_common::{MongoFsError, Result};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "$eq" => Ok(Self::Eq),
            "$ne" => Ok(Self::Ne),
            "$gt" => Ok(Self::Gt),
            "$gte" => Ok(Self::Gte),
            "$lt" => Ok(Self::Lt),
            "$lte" => Ok(Self::Lte),
            _ => Err(MongoFsError::Validation(format!(
                "unsupported query operator: {}",
                name
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
        }
    }

    /// Apply the operator to a resolved field value.
    ///
    /// Everything except `$eq` needs mutually comparable operands; when
    /// they are not, the constraint does not hold.
    pub fn evaluate(&self, field: &Value, operand: &Value) -> bool {
        let ordered = |accept: fn(Ordering) -> bool| {
            compare_values(field, operand).map(accept).unwrap_or(false)
        };

        match self {
            Self::Eq => values_equal(field, operand),
            Self::Ne => ordered(Ordering::is_ne),
            Self::Gt => ordered(Ordering::is_gt),
            Self::Gte => ordered(Ordering::is_ge),
            Self::Lt => ordered(Ordering::is_lt),
            Self::Lte => ordered(Ordering::is_le),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Equals(Value),
    Operators(Vec<(Operator, Value)>),
}

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    path: Vec<String>,
    condition: Condition,
}

impl Clause {
    fn matches(&self, doc: &Document) -> bool {
        let Some(field) = resolve_path(doc, &self.path) else {
            return false;
        };

        match &self.condition {
            Condition::Equals(expected) => values_equal(field, expected),
            Condition::Operators(ops) => ops.iter().all(|(op, operand)| op.evaluate(field, operand)),
        }
    }
}

/// A parsed query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    clauses: Vec<Clause>,
}

impl Query {
    /// The empty query, which matches every document
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse a query object
    ///
    /// # Errors
    /// Returns a validation error if the query is not an object, names an
    /// unsupported operator, mixes operators with plain fields in one
    /// clause, or has an empty path segment.
    pub fn parse(query: &Value) -> Result<Self> {
        let map = match query {
            Value::Object(map) => map,
            other => {
                return Err(MongoFsError::Validation(format!(
                    "query must be an object, got {}",
                    type_name(other)
                )))
            }
        };

        let mut clauses = Vec::with_capacity(map.len());
        for (key, value) in map {
            clauses.push(Clause {
                path: parse_path(key)?,
                condition: parse_condition(key, value)?,
            });
        }

        Ok(Self { clauses })
    }

    /// Parse an optional query; absent and `null` both mean "match all"
    pub fn parse_optional(query: Option<&Value>) -> Result<Self> {
        match query {
            None | Some(Value::Null) => Ok(Self::all()),
            Some(value) => Self::parse(value),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Test a document against every clause
    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|clause| clause.matches(doc))
    }
}

fn parse_path(key: &str) -> Result<Vec<String>> {
    if key.starts_with('$') {
        return Err(MongoFsError::Validation(format!(
            "unsupported top-level operator: {}",
            key
        )));
    }

    let path: Vec<String> = key.split('.').map(str::to_string).collect();
    if path.iter().any(String::is_empty) {
        return Err(MongoFsError::Validation(format!(
            "invalid field path: '{}'",
            key
        )));
    }
    Ok(path)
}

fn parse_condition(key: &str, value: &Value) -> Result<Condition> {
    let Value::Object(map) = value else {
        return Ok(Condition::Equals(value.clone()));
    };

    let operator_keys = map.keys().filter(|k| k.starts_with('$')).count();
    if operator_keys == 0 {
        return Ok(Condition::Equals(value.clone()));
    }
    if operator_keys != map.len() {
        return Err(MongoFsError::Validation(format!(
            "clause for '{}' mixes operators and fields",
            key
        )));
    }

    let ops = map
        .iter()
        .map(|(name, operand)| Ok((Operator::parse(name)?, operand.clone())))
        .collect::<Result<Vec<_>>>()?;
    Ok(Condition::Operators(ops))
}

/// Resolve a dotted path by descending nested objects.
///
/// Returns `None` when a segment is missing or an intermediate value is not
/// an object.
pub fn resolve_path<'a, S: AsRef<str>>(doc: &'a Document, path: &[S]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = doc.get(first.as_ref())?;
    for segment in rest {
        current = current.as_object()?.get(segment.as_ref())?;
    }
    Some(current)
}

/// Strict equality, with numbers compared by exact value (`33 == 33.0`,
/// but `2^53 != 2^53 + 1`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (as_integer(x), as_integer(y)) {
            (Some(ix), Some(iy)) => ix == iy,
            (None, None) => x.as_f64() == y.as_f64(),
            _ => false,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).map(|y| values_equal(x, y)).unwrap_or(false))
        }
        _ => a == b,
    }
}

/// Order two values when they are mutually comparable.
///
/// Numbers compare numerically, strings lexicographically; every other
/// pairing is incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (as_integer(x), as_integer(y)) {
            (Some(ix), Some(iy)) => Some(ix.cmp(&iy)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::into_document;
    use serde_json::json;

    fn item(field1: &str, field3: i64, field4: &str) -> Document {
        into_document(json!({
            "field1": field1,
            "field2": { "field3": field3, "field4": field4 }
        }))
        .unwrap()
    }

    fn matches(query: Value, doc: &Document) -> bool {
        Query::parse(&query).unwrap().matches(doc)
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let doc = item("value1", 10, "value4");
        assert!(Query::all().matches(&doc));
        assert!(matches(json!({}), &doc));
        assert!(Query::parse_optional(None).unwrap().matches(&doc));
        assert!(Query::parse_optional(Some(&Value::Null)).unwrap().is_empty());
    }

    #[test]
    fn test_literal_equality() {
        let doc = item("value1", 10, "value4");
        assert!(matches(json!({"field1": "value1"}), &doc));
        assert!(!matches(json!({"field1": "value2"}), &doc));
        assert!(matches(json!({"field2.field3": 10}), &doc));
        assert!(matches(json!({"field2.field3": 10.0}), &doc));
        assert!(!matches(json!({"field2.field3": "10"}), &doc));
    }

    #[test]
    fn test_embedded_document_equality() {
        let doc = item("value1", 10, "value4");
        assert!(matches(json!({"field2": {"field4": "value4", "field3": 10}}), &doc));
        assert!(!matches(json!({"field2": {"field3": 10}}), &doc));
    }

    #[test]
    fn test_missing_path_is_no_match() {
        let doc = item("value1", 10, "value4");
        assert!(!matches(json!({"nope": 1}), &doc));
        assert!(!matches(json!({"field2.nope.deeper": 1}), &doc));
        // descending through a scalar
        assert!(!matches(json!({"field1.length": 6}), &doc));
        assert!(!matches(json!({"nope": {"$ne": 1}}), &doc));
    }

    #[test]
    fn test_comparison_operators() {
        let doc = item("value1", 33, "value4");
        assert!(matches(json!({"field2.field3": {"$gt": 32}}), &doc));
        assert!(!matches(json!({"field2.field3": {"$gt": 33}}), &doc));
        assert!(matches(json!({"field2.field3": {"$gte": 33}}), &doc));
        assert!(matches(json!({"field2.field3": {"$lt": 33.5}}), &doc));
        assert!(!matches(json!({"field2.field3": {"$lt": 33}}), &doc));
        assert!(matches(json!({"field2.field3": {"$lte": 33}}), &doc));
        assert!(matches(json!({"field2.field3": {"$ne": 34}}), &doc));
        assert!(!matches(json!({"field2.field3": {"$ne": 33}}), &doc));
        assert!(matches(json!({"field2.field3": {"$eq": 33}}), &doc));
    }

    #[test]
    fn test_operators_in_one_clause_are_anded() {
        let doc = item("value1", 20, "value4");
        assert!(matches(json!({"field2.field3": {"$gt": 10, "$lt": 30}}), &doc));
        assert!(!matches(json!({"field2.field3": {"$gt": 10, "$lt": 15}}), &doc));
    }

    #[test]
    fn test_string_comparison_is_lexicographic() {
        let doc = item("value1", 20, "value4");
        assert!(matches(json!({"field1": {"$gt": "value0"}}), &doc));
        assert!(matches(json!({"field1": {"$lt": "value2"}}), &doc));
    }

    #[test]
    fn test_incomparable_types_do_not_match() {
        let doc = item("value1", 20, "value4");
        assert!(!matches(json!({"field1": {"$gt": 5}}), &doc));
        assert!(!matches(json!({"field2.field3": {"$lt": "zzz"}}), &doc));
        assert!(!matches(json!({"field2.field3": {"$ne": "20"}}), &doc));
        assert!(!matches(json!({"field2": {"$gt": 1}}), &doc));
    }

    #[test]
    fn test_clauses_are_anded() {
        let doc = item("value1", 20, "value4");
        assert!(matches(json!({"field1": "value1", "field2.field3": {"$gte": 20}}), &doc));
        assert!(!matches(json!({"field1": "value1", "field2.field3": {"$gt": 20}}), &doc));
    }

    #[test]
    fn test_matching_does_not_mutate() {
        let doc = item("value1", 20, "value4");
        let before = doc.clone();
        matches(json!({"field2.field3": {"$gt": 1}, "missing.path": 1}), &doc);
        assert_eq!(doc, before);
    }

    #[test]
    fn test_malformed_queries() {
        let bad = [
            json!([1, 2]),
            json!("field1"),
            json!({"field1": {"$regex": "v.*"}}),
            json!({"field2": {"$gt": 1, "field3": 2}}),
            json!({"$or": [{"a": 1}]}),
            json!({"field2..field3": 1}),
            json!({"": 1}),
        ];
        for query in bad {
            let err = Query::parse(&query).unwrap_err();
            assert!(matches!(err, MongoFsError::Validation(_)), "query {} should fail", query);
        }
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let doc = into_document(json!({"n": 9007199254740993u64})).unwrap();
        assert!(!matches(json!({"n": 9007199254740992u64}), &doc));
        assert!(!matches(json!({"n": 9007199254740992.0}), &doc));
        assert!(matches(json!({"n": 9007199254740993u64}), &doc));
        assert!(matches(json!({"n": {"$gt": 9007199254740992u64}}), &doc));
        assert!(matches(json!({"n": {"$ne": 9007199254740992u64}}), &doc));
        assert!(!values_equal(&json!(i64::MAX), &json!(i64::MAX as f64)));
        assert!(!values_equal(&json!(1), &json!(1.5)));
        assert!(values_equal(&json!(-2), &json!(-2.0)));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(1), &json!(2)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!(u64::MAX), &json!(1)), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!(-1), &json!(u64::MAX)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!("b"), &json!("a")), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!(true), &json!(false)), None);
        assert_eq!(compare_values(&json!(null), &json!(null)), None);
    }

    #[test]
    fn test_resolve_path() {
        let doc = item("value1", 20, "value4");
        assert_eq!(resolve_path(&doc, &["field2", "field4"]), Some(&json!("value4")));
        assert_eq!(resolve_path(&doc, &["field2", "field9"]), None);
        let empty: [&str; 0] = [];
        assert_eq!(resolve_path(&doc, &empty), None);
    }
}
