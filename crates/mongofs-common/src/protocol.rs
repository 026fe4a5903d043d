//! Wire protocol implementation
//!
//! Binary framing shared by the server and the client.
//!
//! Request:  `command(1) | payload_len(4, BE) | payload`
//! Response: `status(1)  | payload_len(4, BE) | payload`
//!
//! Payloads are JSON: requests carry a [`RequestBody`], successful responses
//! carry the operation result and error responses carry an [`ErrorBody`].

use crate::error::{ErrorKind, MongoFsError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol error types
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid command: {0}")]
    InvalidCommand(u8),

    #[error("Invalid status: {0}")]
    InvalidStatus(u8),

    #[error("Payload too large: {0} bytes (max 64MB)")]
    PayloadTooLarge(u32),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::InvalidPayload(err.to_string())
    }
}

impl From<ProtocolError> for MongoFsError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => MongoFsError::Connection(e.to_string()),
            other => MongoFsError::Protocol(other.to_string()),
        }
    }
}

/// Command codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping = 0x01,
    Find = 0x02,
    FindOne = 0x03,
    Insert = 0x04,
    Update = 0x05,
    Remove = 0x06,
    Count = 0x07,
    DropDatabase = 0x08,
    Info = 0x09,
    DropCollection = 0x0A,
}

impl Command {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Find => "find",
            Command::FindOne => "findOne",
            Command::Insert => "insert",
            Command::Update => "update",
            Command::Remove => "remove",
            Command::Count => "count",
            Command::DropDatabase => "dropDatabase",
            Command::Info => "info",
            Command::DropCollection => "dropCollection",
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(Command::Ping),
            0x02 => Ok(Command::Find),
            0x03 => Ok(Command::FindOne),
            0x04 => Ok(Command::Insert),
            0x05 => Ok(Command::Update),
            0x06 => Ok(Command::Remove),
            0x07 => Ok(Command::Count),
            0x08 => Ok(Command::DropDatabase),
            0x09 => Ok(Command::Info),
            0x0A => Ok(Command::DropCollection),
            _ => Err(ProtocolError::InvalidCommand(byte)),
        }
    }
}

/// Response status codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok = 0x00,
    Null = 0x01,
    Error = 0x02,
}

impl TryFrom<u8> for Status {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            0x00 => Ok(Status::Ok),
            0x01 => Ok(Status::Null),
            0x02 => Ok(Status::Error),
            _ => Err(ProtocolError::InvalidStatus(byte)),
        }
    }
}

pub const HEADER_LEN: usize = 5;
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024; // 64MB

/// Body of every request except `Ping` and `Info`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Value>,
}

impl RequestBody {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    pub fn query(mut self, query: Option<Value>) -> Self {
        self.query = query;
        self
    }

    pub fn document(mut self, document: Value) -> Self {
        self.document = Some(document);
        self
    }

    /// The collection name, required by every collection-level command
    pub fn require_collection(&self) -> Result<&str, MongoFsError> {
        self.collection
            .as_deref()
            .ok_or_else(|| MongoFsError::Validation("request is missing a collection".to_string()))
    }

    /// The document, required by insert and update
    pub fn require_document(&self) -> Result<&Value, MongoFsError> {
        self.document
            .as_ref()
            .ok_or_else(|| MongoFsError::Validation("request is missing a document".to_string()))
    }
}

/// Payload of an `Error` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl From<&MongoFsError> for ErrorBody {
    fn from(err: &MongoFsError) -> Self {
        Self {
            kind: err.kind().as_str().to_string(),
            message: err.message().to_string(),
        }
    }
}

impl ErrorBody {
    /// Rebuild the typed error; unknown kinds map to `Internal`
    pub fn into_error(self) -> MongoFsError {
        let kind = self.kind.parse().unwrap_or(ErrorKind::Internal);
        kind.into_error(self.message)
    }
}

/// Encode a request frame
pub fn encode_request(cmd: Command, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.push(cmd as u8);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Write a response to bytes
pub fn write_response(status: Status, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.push(status as u8);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Encode an error response
pub fn write_error(err: &MongoFsError) -> Vec<u8> {
    // ErrorBody only holds strings, serialization cannot fail
    let payload = serde_json::to_vec(&ErrorBody::from(err)).unwrap_or_default();
    write_response(Status::Error, &payload)
}

/// Read one frame (`code | len | payload`) from an async stream.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly before a new
/// frame started.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<(u8, Vec<u8>)>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let n = reader.read(&mut header).await?;
    if n == 0 {
        return Ok(None);
    }
    if n < HEADER_LEN {
        reader.read_exact(&mut header[n..]).await?;
    }

    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge(len));
    }

    let mut payload = vec![0u8; len as usize];
    if len > 0 {
        reader.read_exact(&mut payload).await?;
    }

    Ok(Some((header[0], payload)))
}

/// Write a pre-encoded frame and flush it
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::io::Builder;

    #[test]
    fn test_request_framing() {
        let frame = encode_request(Command::Ping, &[]);
        assert_eq!(frame, vec![0x01, 0, 0, 0, 0]);

        let frame = encode_request(Command::DropCollection, b"{}");
        assert_eq!(frame, vec![0x0A, 0, 0, 0, 2, b'{', b'}']);
    }

    #[test]
    fn test_command_codes() {
        for code in 0x01..=0x0A {
            let cmd = Command::try_from(code).unwrap();
            assert_eq!(cmd as u8, code);
        }
        assert!(matches!(Command::try_from(0x00), Err(ProtocolError::InvalidCommand(0))));
        assert!(matches!(Command::try_from(0xFF), Err(ProtocolError::InvalidCommand(0xFF))));
        assert!(matches!(Status::try_from(0x03), Err(ProtocolError::InvalidStatus(3))));
    }

    #[test]
    fn test_request_body_skips_empty_fields() {
        let body = RequestBody::new("fakedb").collection("items");
        let encoded = serde_json::to_value(&body).unwrap();
        assert_eq!(encoded, json!({"database": "fakedb", "collection": "items"}));

        let decoded: RequestBody = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, body);
        assert!(decoded.require_document().is_err());
    }

    #[test]
    fn test_error_body_rebuilds_typed_error() {
        let err = MongoFsError::DuplicateId("\"x\"".to_string());
        let frame = write_error(&err);
        assert_eq!(frame[0], Status::Error as u8);

        let body: ErrorBody = serde_json::from_slice(&frame[HEADER_LEN..]).unwrap();
        assert_eq!(body.kind, "duplicate_id");
        assert_eq!(body.into_error(), err);
    }

    #[test]
    fn test_error_body_unknown_kind() {
        let body = ErrorBody {
            kind: "mystery".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(body.into_error(), MongoFsError::Internal("boom".to_string()));
    }

    #[tokio::test]
    async fn test_read_frame_from_stream() {
        let mut data = encode_request(Command::Count, b"{}");
        data.extend(encode_request(Command::Ping, &[]));
        let mut reader = data.as_slice();

        let (code, payload) = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(Command::try_from(code).unwrap(), Command::Count);
        assert_eq!(payload, b"{}");

        let (code, payload) = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(Command::try_from(code).unwrap(), Command::Ping);
        assert!(payload.is_empty());

        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_across_partial_reads() {
        let frame = encode_request(Command::Find, b"{\"database\":\"db\"}");
        let mut reader = Builder::new()
            .read(&frame[..2])
            .read(&frame[2..7])
            .read(&frame[7..])
            .build();

        let (code, payload) = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(code, Command::Find as u8);
        assert_eq!(payload, b"{\"database\":\"db\"}");
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_payload_too_large() {
        let mut header = vec![Command::Insert as u8];
        header.extend_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_be_bytes());
        let mut reader = Builder::new().read(&header).build();

        assert!(matches!(
            read_frame(&mut reader).await,
            Err(ProtocolError::PayloadTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_read_frame_truncated_header() {
        let mut reader = Builder::new().read(&[0x02, 0]).build();
        assert!(matches!(read_frame(&mut reader).await, Err(ProtocolError::Io(_))));
    }

    #[tokio::test]
    async fn test_write_frame() {
        let frame = write_response(Status::Ok, b"PONG");
        let mut writer = Builder::new().write(&frame).build();
        write_frame(&mut writer, &frame).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_frame_truncated_payload() {
        let mut data = write_response(Status::Ok, b"[1,2,3]");
        data.truncate(data.len() - 2);
        let mut reader = data.as_slice();
        assert!(matches!(read_frame(&mut reader).await, Err(ProtocolError::Io(_))));
    }
}
