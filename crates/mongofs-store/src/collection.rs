//! Collection interface
//!
//! MongoDB-like operations on one named collection, built from the
//! storage primitives of [`Database`] and the [`Query`] matcher.

use crate::engine::Database;
use crate::query::Query;
use crate::types::{document_id, into_document, validate_name, Document};
use mongofs_common::{MongoFsError, Result};
use serde_json::Value;
use std::sync::Arc;

/// Handle on a named collection within a database
#[derive(Debug, Clone)]
pub struct Collection {
    database: Arc<Database>,
    name: String,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    /// All documents matching `query`, in insertion order.
    ///
    /// An omitted or empty query returns every document.
    pub fn find(&self, query: Option<&Value>) -> Result<Vec<Document>> {
        let query = Query::parse_optional(query)?;
        Ok(self
            .database
            .scan(&self.name)
            .filter(|doc| query.matches(doc))
            .collect())
    }

    /// First document matching `query` in insertion order
    pub fn find_one(&self, query: Option<&Value>) -> Result<Option<Document>> {
        let query = Query::parse_optional(query)?;
        Ok(self.database.scan(&self.name).find(|doc| query.matches(doc)))
    }

    /// Number of documents matching `query`
    pub fn count(&self, query: Option<&Value>) -> Result<usize> {
        let query = Query::parse_optional(query)?;
        if query.is_empty() {
            return Ok(self.database.count(&self.name));
        }
        Ok(self
            .database
            .scan(&self.name)
            .filter(|doc| query.matches(doc))
            .count())
    }

    /// Insert a document and return it as stored, `_id` included
    ///
    /// # Errors
    /// - `Validation` if `document` is not an object
    /// - `DuplicateId` if its `_id` is already taken
    pub fn insert(&self, document: Value) -> Result<Document> {
        let doc = into_document(document)?;
        self.database.insert(&self.name, doc)
    }

    /// Replace the stored document carrying the same `_id`.
    ///
    /// This is a full replace, not a merge: fields missing from `document`
    /// are dropped.
    ///
    /// # Errors
    /// - `Validation` if `document` is not an object
    /// - `NotFound` if it has no `_id` or no stored document has that `_id`
    pub fn update(&self, document: Value) -> Result<Document> {
        let doc = into_document(document)?;
        let id = document_id(&doc)
            .cloned()
            .ok_or_else(|| MongoFsError::NotFound("document to update has no _id".to_string()))?;
        self.database.replace(&self.name, &id, doc)
    }

    /// Remove every document matching `query`, returns the count removed.
    ///
    /// Removing nothing is not an error.
    pub fn remove(&self, query: Option<&Value>) -> Result<usize> {
        let query = Query::parse_optional(query)?;
        Ok(self
            .database
            .remove_where(&self.name, |doc| query.matches(doc)))
    }

    /// Drop the whole collection, returns whether it existed
    pub fn drop(&self) -> bool {
        self.database.drop_collection(&self.name)
    }
}

impl Database {
    /// Collection interface for `name`
    ///
    /// # Errors
    /// `Validation` if the collection name is invalid.
    pub fn collection(self: &Arc<Self>, name: &str) -> Result<Collection> {
        validate_name("collection", name)?;
        Ok(Collection {
            database: Arc::clone(self),
            name: name.to_string(),
        })
    }
}
