//! Document store data types

use bson::oid::ObjectId;
use mongofs_common::{MongoFsError, Result};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the identifier field carried by every stored document
pub const ID_FIELD: &str = "_id";

/// Maximum allowed length for database and collection names
const MAX_NAME_LENGTH: usize = 120;

/// A stored document: field name to value, key order preserved
pub type Document = Map<String, Value>;

/// Seed data: database name -> collection name -> documents
pub type SeedData = BTreeMap<String, BTreeMap<String, Vec<Value>>>;

/// Index key of a document inside its collection.
///
/// Two ids get the same key exactly when the query matcher considers them
/// equal: integral numbers are written as integers (`1.0` keys as `1`) and
/// object fields are sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn from_id(id: &Value) -> Self {
        let mut key = String::new();
        write_canonical(&mut key, id);
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Number(n) => match as_integer(n) {
            Some(i) => out.push_str(&i.to_string()),
            None => out.push_str(&n.to_string()),
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (field, item)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, &Value::String(field.clone()));
                out.push(':');
                write_canonical(out, item);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Exact integer value of a number, if it has one.
///
/// Integral floats within range count (`2.0` is `2`); fractional floats do
/// not.
pub fn as_integer(n: &Number) -> Option<i128> {
    if let Some(i) = n.as_i64() {
        return Some(i128::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Some(i128::from(u));
    }
    let f = n.as_f64()?;
    // 2^127; every integral f64 below it converts exactly
    const LIMIT: f64 = 170_141_183_460_469_231_731_687_303_715_884_105_728.0;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < LIMIT {
        Some(f as i128)
    } else {
        None
    }
}

/// Generate a fresh identifier (24-char hex ObjectId string)
pub fn generate_id() -> Value {
    Value::String(ObjectId::new().to_hex())
}

/// Returns the document identifier, treating an explicit `null` as absent
pub fn document_id(doc: &Document) -> Option<&Value> {
    doc.get(ID_FIELD).filter(|id| !id.is_null())
}

/// Accept a value as a document: only JSON objects qualify
pub fn into_document(value: Value) -> Result<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(MongoFsError::Validation(format!(
            "document must be an object, got {}",
            type_name(&other)
        ))),
    }
}

/// Return a copy of `doc` whose first field is `_id = id`
pub fn with_id_first(id: Value, doc: Document) -> Document {
    let mut stored = Document::with_capacity(doc.len() + 1);
    stored.insert(ID_FIELD.to_string(), id);
    for (field, value) in doc {
        if field != ID_FIELD {
            stored.insert(field, value);
        }
    }
    stored
}

/// JSON type name used in error messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate a database or collection name
///
/// Names must be non-empty, at most 120 bytes, and must not contain
/// null bytes, `$`, `/` or `\`.
pub fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MongoFsError::Validation(format!("{} name cannot be empty", what)));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(MongoFsError::Validation(format!(
            "{} name exceeds maximum length of {} characters: '{}'",
            what, MAX_NAME_LENGTH, name
        )));
    }

    if let Some(c) = name.chars().find(|c| matches!(c, '\0' | '$' | '/' | '\\')) {
        return Err(MongoFsError::Validation(format!(
            "{} name cannot contain {:?}: '{}'",
            what, c, name
        )));
    }

    Ok(())
}
