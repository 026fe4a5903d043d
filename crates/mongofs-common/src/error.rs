//! Error types for mongofs

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Result type alias for mongofs operations
pub type Result<T> = std::result::Result<T, MongoFsError>;

/// Unified error type for all mongofs operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MongoFsError {
    /// Malformed document or query shape
    #[error("Validation error: {0}")]
    Validation(String),

    /// Update or lookup target absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Identifier collision on insert
    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Already initialized: {0}")]
    AlreadyInitialized(String),

    #[error("Not running: {0}")]
    NotRunning(String),

    /// Transport-level failure reaching the server
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable error kind, used to carry errors across the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    DuplicateId,
    AlreadyInitialized,
    NotRunning,
    Connection,
    Protocol,
    Config,
    Internal,
}

impl ErrorKind {
    /// Returns the kind as a string slice.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::DuplicateId => "duplicate_id",
            Self::AlreadyInitialized => "already_initialized",
            Self::NotRunning => "not_running",
            Self::Connection => "connection",
            Self::Protocol => "protocol",
            Self::Config => "config",
            Self::Internal => "internal",
        }
    }

    /// Build an error of this kind with the given message
    pub fn into_error(self, message: impl Into<String>) -> MongoFsError {
        let message = message.into();
        match self {
            Self::Validation => MongoFsError::Validation(message),
            Self::NotFound => MongoFsError::NotFound(message),
            Self::DuplicateId => MongoFsError::DuplicateId(message),
            Self::AlreadyInitialized => MongoFsError::AlreadyInitialized(message),
            Self::NotRunning => MongoFsError::NotRunning(message),
            Self::Connection => MongoFsError::Connection(message),
            Self::Protocol => MongoFsError::Protocol(message),
            Self::Config => MongoFsError::Config(message),
            Self::Internal => MongoFsError::Internal(message),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "validation" => Ok(Self::Validation),
            "not_found" => Ok(Self::NotFound),
            "duplicate_id" => Ok(Self::DuplicateId),
            "already_initialized" => Ok(Self::AlreadyInitialized),
            "not_running" => Ok(Self::NotRunning),
            "connection" => Ok(Self::Connection),
            "protocol" => Ok(Self::Protocol),
            "config" => Ok(Self::Config),
            "internal" => Ok(Self::Internal),
            _ => Err(format!("Invalid error kind: {}", s)),
        }
    }
}

impl MongoFsError {
    /// Returns the stable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DuplicateId(_) => ErrorKind::DuplicateId,
            Self::AlreadyInitialized(_) => ErrorKind::AlreadyInitialized,
            Self::NotRunning(_) => ErrorKind::NotRunning,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Config(_) => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(m)
            | Self::NotFound(m)
            | Self::DuplicateId(m)
            | Self::AlreadyInitialized(m)
            | Self::NotRunning(m)
            | Self::Connection(m)
            | Self::Protocol(m)
            | Self::Config(m)
            | Self::Internal(m) => m,
        }
    }

    /// Returns true if this error was caused by the request contents
    /// rather than by the server or the transport
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MongoFsError::Validation(_) | MongoFsError::NotFound(_) | MongoFsError::DuplicateId(_)
        )
    }
}

impl From<serde_json::Error> for MongoFsError {
    fn from(err: serde_json::Error) -> Self {
        MongoFsError::Protocol(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for MongoFsError {
    fn from(err: std::io::Error) -> Self {
        MongoFsError::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let err = MongoFsError::Validation("document must be an object".to_string());
        assert_eq!(err.to_string(), "Validation error: document must be an object");
    }

    #[test]
    fn test_error_display_not_found() {
        let err = MongoFsError::NotFound("no document with _id 1".to_string());
        assert_eq!(err.to_string(), "Not found: no document with _id 1");
    }

    #[test]
    fn test_error_display_duplicate_id() {
        let err = MongoFsError::DuplicateId("\"abc\"".to_string());
        assert_eq!(err.to_string(), "Duplicate id: \"abc\"");
    }

    #[test]
    fn test_error_display_connection() {
        let err = MongoFsError::Connection("refused".to_string());
        assert_eq!(err.to_string(), "Connection error: refused");
    }

    #[test]
    fn test_kind_round_trip() {
        let kinds = [
            ErrorKind::Validation,
            ErrorKind::NotFound,
            ErrorKind::DuplicateId,
            ErrorKind::AlreadyInitialized,
            ErrorKind::NotRunning,
            ErrorKind::Connection,
            ErrorKind::Protocol,
            ErrorKind::Config,
            ErrorKind::Internal,
        ];
        for kind in kinds {
            let parsed: ErrorKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
            assert_eq!(kind.into_error("msg").kind(), kind);
        }
    }

    #[test]
    fn test_unknown_kind() {
        assert!("teapot".parse::<ErrorKind>().is_err());
    }

    #[test]
    fn test_message_strips_prefix() {
        let err = ErrorKind::NotFound.into_error("missing");
        assert_eq!(err.message(), "missing");
    }

    #[test]
    fn test_is_client_error() {
        assert!(MongoFsError::Validation("x".to_string()).is_client_error());
        assert!(MongoFsError::NotFound("x".to_string()).is_client_error());
        assert!(MongoFsError::DuplicateId("x".to_string()).is_client_error());
        assert!(!MongoFsError::Connection("x".to_string()).is_client_error());
        assert!(!MongoFsError::NotRunning("x".to_string()).is_client_error());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
        let err: MongoFsError = json_err.into();
        assert!(matches!(err, MongoFsError::Protocol(_)));
    }
}
