//! Common utilities for mongofs
//!
//! This crate provides the error type and the wire protocol shared by the
//! server and the client.

pub mod error;
pub mod protocol;

pub use error::{ErrorKind, MongoFsError, Result};
pub use protocol::{Command, ErrorBody, ProtocolError, RequestBody, Status};
