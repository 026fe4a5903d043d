//! In-memory document store for mongofs
//!
//! # Features
//! - Databases and collections created on first reference
//! - Insertion-ordered collections with unique `_id` per collection
//! - Dotted-path queries with `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`
//! - Snapshot reads that never block each other

pub mod collection;
pub mod engine;
pub mod query;
pub mod types;

pub use collection::Collection;
pub use engine::{Database, Scan, Storage, StorageStats};
pub use mongofs_common::{MongoFsError, Result};
pub use query::Query;
pub use types::{Document, SeedData, ID_FIELD};
