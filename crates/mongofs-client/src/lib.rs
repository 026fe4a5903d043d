//! TCP client for the mongofs mock server
//!
//! ```no_run
//! use mongofs_client::Client;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), mongofs_client::ClientError> {
//! let client = Client::connect("mongodb://127.0.0.1:27027/fakedb").await?;
//! let items = client.collection("items");
//! let stored = items.insert(json!({"field1": "value1"})).await?;
//! let found = items.find_one(Some(json!({"_id": stored["_id"]}))).await?;
//! assert!(found.is_some());
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

mod client;

pub use client::{Client, ClientError, Collection, ConnectionString, Document};
pub use mongofs_common::{ErrorKind, MongoFsError};

// Re-export protocol types for advanced usage
pub use mongofs_common::protocol::{Command, ProtocolError, Status};
