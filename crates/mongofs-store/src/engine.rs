//! In-memory document storage engine
//!
//! `Storage` holds databases, a `Database` holds named collections, and each
//! collection keeps its documents in insertion order behind its own
//! `RwLock`: writes to one collection are serialized, reads take a snapshot
//! and never block each other.

use crate::types::{
    document_id, generate_id, validate_name, with_id_first, Document, DocumentKey, SeedData,
    ID_FIELD,
};
use indexmap::IndexMap;
use mongofs_common::{MongoFsError, Result};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Documents of a single collection, keyed by identifier, in insertion order
#[derive(Debug, Default)]
pub struct CollectionData {
    docs: RwLock<IndexMap<DocumentKey, Arc<Document>>>,
}

impl CollectionData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document, assigning `_id` when absent
    pub fn insert(&self, doc: Document) -> Result<Document> {
        let id = document_id(&doc).cloned().unwrap_or_else(generate_id);
        let key = DocumentKey::from_id(&id);
        let stored = with_id_first(id, doc);

        let mut guard = self.docs.write();
        if guard.contains_key(&key) {
            return Err(MongoFsError::DuplicateId(format!(
                "a document with _id {} already exists",
                key
            )));
        }
        guard.insert(key, Arc::new(stored.clone()));
        Ok(stored)
    }

    /// Snapshot of every document, in insertion order
    pub fn scan(&self) -> Scan {
        let snapshot: Vec<Arc<Document>> = self.docs.read().values().cloned().collect();
        Scan {
            inner: snapshot.into_iter(),
        }
    }

    /// Remove every document matching `predicate`, returns count removed
    pub fn remove_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&Document) -> bool,
    {
        let mut guard = self.docs.write();
        let before = guard.len();
        guard.retain(|_, doc| !predicate(doc.as_ref()));
        before - guard.len()
    }

    /// Replace the document with identifier `id`, keeping its position and
    /// its stored `_id`
    pub fn replace(&self, id: &Value, doc: Document) -> Result<Document> {
        let key = DocumentKey::from_id(id);

        let mut guard = self.docs.write();
        match guard.get_mut(&key) {
            Some(slot) => {
                let stored_id = slot.get(ID_FIELD).cloned().unwrap_or_else(|| id.clone());
                let stored = with_id_first(stored_id, doc);
                *slot = Arc::new(stored.clone());
                Ok(stored)
            }
            None => Err(MongoFsError::NotFound(format!(
                "no document with _id {}",
                key
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }
}

/// Lazy iterator over a collection snapshot.
///
/// The snapshot is fixed when the scan starts; later writes are not
/// observed. Call `scan` again for a fresh snapshot.
#[derive(Debug)]
pub struct Scan {
    inner: std::vec::IntoIter<Arc<Document>>,
}

impl Scan {
    fn empty() -> Self {
        Self {
            inner: Vec::new().into_iter(),
        }
    }
}

impl Iterator for Scan {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        self.inner.next().map(|doc| doc.as_ref().clone())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Scan {}

/// A named set of collections
#[derive(Debug)]
pub struct Database {
    name: String,
    collections: RwLock<HashMap<String, Arc<CollectionData>>>,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Existing collection, if any
    fn existing(&self, collection: &str) -> Option<Arc<CollectionData>> {
        self.collections.read().get(collection).cloned()
    }

    /// Collection, created on first reference
    fn get_or_create(&self, collection: &str) -> Arc<CollectionData> {
        if let Some(data) = self.existing(collection) {
            return data;
        }
        let mut guard = self.collections.write();
        guard
            .entry(collection.to_string())
            .or_insert_with(|| {
                debug!(database = %self.name, collection, "Creating collection");
                Arc::new(CollectionData::new())
            })
            .clone()
    }

    /// Insert a document into `collection`
    ///
    /// # Errors
    /// `DuplicateId` if the supplied `_id` is already present.
    pub fn insert(&self, collection: &str, doc: Document) -> Result<Document> {
        let stored = self.get_or_create(collection).insert(doc)?;
        trace!(database = %self.name, collection, id = %stored["_id"], "Inserted document");
        Ok(stored)
    }

    /// Snapshot scan of `collection`; an unknown collection scans as empty
    pub fn scan(&self, collection: &str) -> Scan {
        self.existing(collection)
            .map(|data| data.scan())
            .unwrap_or_else(Scan::empty)
    }

    /// Remove every matching document of `collection`
    pub fn remove_where<F>(&self, collection: &str, predicate: F) -> usize
    where
        F: FnMut(&Document) -> bool,
    {
        let removed = self
            .existing(collection)
            .map(|data| data.remove_where(predicate))
            .unwrap_or(0);
        trace!(database = %self.name, collection, removed, "Removed documents");
        removed
    }

    /// Replace the document with identifier `id` in `collection`
    ///
    /// # Errors
    /// `NotFound` if no such document exists.
    pub fn replace(&self, collection: &str, id: &Value, doc: Document) -> Result<Document> {
        match self.existing(collection) {
            Some(data) => data.replace(id, doc),
            None => Err(MongoFsError::NotFound(format!(
                "collection '{}' has no document with _id {}",
                collection, id
            ))),
        }
    }

    /// Number of documents in `collection`
    pub fn count(&self, collection: &str) -> usize {
        self.existing(collection).map(|data| data.len()).unwrap_or(0)
    }

    /// Names of all collections, sorted
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop a collection, returns whether it existed
    pub fn drop_collection(&self, collection: &str) -> bool {
        self.collections.write().remove(collection).is_some()
    }

    fn document_count(&self) -> usize {
        self.collections.read().values().map(|data| data.len()).sum()
    }
}

/// Counters reported by the `info` command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub databases: usize,
    pub collections: usize,
    pub documents: usize,
}

/// All databases of one server instance
#[derive(Debug, Default)]
pub struct Storage {
    databases: RwLock<HashMap<String, Arc<Database>>>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build storage pre-populated with seed documents.
    ///
    /// Loading is all-or-nothing: the storage is only returned once every
    /// seed document has been inserted.
    pub fn from_seed(seed: &SeedData) -> Result<Self> {
        let storage = Self::new();
        for (db_name, collections) in seed {
            let db = storage.database(db_name)?;
            for (collection, docs) in collections {
                validate_name("collection", collection)?;
                for value in docs {
                    let doc = crate::types::into_document(value.clone()).map_err(|e| {
                        MongoFsError::Validation(format!(
                            "seed data for {}.{}: {}",
                            db_name,
                            collection,
                            e.message()
                        ))
                    })?;
                    db.insert(collection, doc)?;
                }
                debug!(database = %db_name, collection = %collection, count = docs.len(), "Loaded seed documents");
            }
        }
        Ok(storage)
    }

    /// Database by name, created on first reference
    pub fn database(&self, name: &str) -> Result<Arc<Database>> {
        if let Some(db) = self.databases.read().get(name) {
            return Ok(db.clone());
        }
        validate_name("database", name)?;

        let mut guard = self.databases.write();
        Ok(guard
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(database = %name, "Creating database");
                Arc::new(Database::new(name))
            })
            .clone())
    }

    /// Database by name, without creating it
    pub fn get_database(&self, name: &str) -> Option<Arc<Database>> {
        self.databases.read().get(name).cloned()
    }

    /// Drop a database and all its collections, returns whether it existed
    pub fn drop_database(&self, name: &str) -> bool {
        let dropped = self.databases.write().remove(name).is_some();
        if dropped {
            debug!(database = %name, "Dropped database");
        }
        dropped
    }

    /// Names of all databases, sorted
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn stats(&self) -> StorageStats {
        let guard = self.databases.read();
        StorageStats {
            databases: guard.len(),
            collections: guard.values().map(|db| db.collections.read().len()).sum(),
            documents: guard.values().map(|db| db.document_count()).sum(),
        }
    }
}
