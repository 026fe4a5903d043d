//! In-memory mock document database server
//!
//! Start a throwaway server, seeded from config, that speaks the mongofs
//! wire protocol:
//!
//! ```no_run
//! use mongofs_server::{MockServer, ServerConfig};
//! use serde_json::json;
//!
//! # async fn run() -> mongofs_server::Result<()> {
//! let server = MockServer::with_config(
//!     ServerConfig::new()
//!         .port(0)
//!         .seed("fakedb", "items", vec![json!({"field1": "value1"})]),
//! )?;
//! let addr = server.start().await?;
//! println!("listening on {}", addr);
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod server;

pub use config::{LogLevel, ServerConfig, DEFAULT_PORT};
pub use mongofs_common::{MongoFsError, Result};
pub use server::{MockServer, ServerState};
