//! Mock server configuration

use mongofs_common::{MongoFsError, Result};
use mongofs_store::types::{type_name, validate_name};
use mongofs_store::SeedData;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Default listening port
pub const DEFAULT_PORT: u16 = 27027;

/// Log verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Matching `tracing` level
    pub fn as_tracing(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

/// Configuration for a mock server
///
/// Recognized keys (camelCase in config files): `host`, `port`, `mocks`,
/// `logLevel`, `colors`, `fork`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Interface to bind to
    pub host: String,

    /// Listening port (0 picks a free port)
    pub port: u16,

    /// Seed documents: database -> collection -> documents
    pub mocks: SeedData,

    /// Log verbosity
    pub log_level: LogLevel,

    /// Colored log output
    pub colors: bool,

    /// Run the server in an isolated process.
    ///
    /// Accepted for compatibility; the server always runs in-process.
    pub fork: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            mocks: SeedData::new(),
            log_level: LogLevel::default(),
            colors: true,
            fork: false,
        }
    }
}

impl ServerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config file; `.yaml`/`.yml` are read as YAML, anything else as JSON
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_file(path.as_ref())
    }

    /// Set the bind host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the listening port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Replace the seed data
    pub fn mocks(mut self, mocks: SeedData) -> Self {
        self.mocks = mocks;
        self
    }

    /// Load seed data from a JSON or YAML file
    pub fn mocks_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.mocks = load_file(path.as_ref())?;
        Ok(self)
    }

    /// Add seed documents for one collection
    pub fn seed(
        mut self,
        database: impl Into<String>,
        collection: impl Into<String>,
        documents: Vec<Value>,
    ) -> Self {
        self.mocks
            .entry(database.into())
            .or_default()
            .entry(collection.into())
            .or_default()
            .extend(documents);
        self
    }

    /// Set the log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Enable or disable colored log output
    pub fn colors(mut self, enabled: bool) -> Self {
        self.colors = enabled;
        self
    }

    /// Set the fork flag
    pub fn fork(mut self, enabled: bool) -> Self {
        self.fork = enabled;
        self
    }

    /// `host:port` string to bind to
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check the configuration before it is used
    ///
    /// # Errors
    /// Returns a config error if the host is empty, or if a seed database,
    /// collection or document is malformed.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(MongoFsError::Config("host cannot be empty".to_string()));
        }

        for (database, collections) in &self.mocks {
            validate_name("database", database).map_err(invalid_mocks)?;
            for (collection, documents) in collections {
                validate_name("collection", collection).map_err(invalid_mocks)?;
                if let Some((index, doc)) = documents.iter().enumerate().find(|(_, d)| !d.is_object()) {
                    return Err(MongoFsError::Config(format!(
                        "mocks.{}.{}[{}] must be an object, got {}",
                        database,
                        collection,
                        index,
                        type_name(doc)
                    )));
                }
            }
        }

        Ok(())
    }

    /// Number of seed documents across all databases
    pub fn seed_count(&self) -> usize {
        self.mocks
            .values()
            .flat_map(|collections| collections.values())
            .map(Vec::len)
            .sum()
    }
}

fn invalid_mocks(err: MongoFsError) -> MongoFsError {
    MongoFsError::Config(format!("invalid mocks: {}", err.message()))
}

fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        MongoFsError::Config(format!("failed to read {}: {}", path.display(), e))
    })?;

    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );

    if is_yaml {
        serde_yaml::from_str(&text).map_err(|e| {
            MongoFsError::Config(format!("invalid YAML in {}: {}", path.display(), e))
        })
    } else {
        serde_json::from_str(&text).map_err(|e| {
            MongoFsError::Config(format!("invalid JSON in {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.address(), "127.0.0.1:27027");
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(!config.fork);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::new()
            .host("0.0.0.0")
            .port(0)
            .log_level(LogLevel::Debug)
            .colors(false)
            .fork(true)
            .seed("fakedb", "items", vec![json!({"a": 1})])
            .seed("fakedb", "items", vec![json!({"a": 2})]);

        assert_eq!(config.address(), "0.0.0.0:0");
        assert_eq!(config.seed_count(), 2);
        assert!(config.fork);
    }

    #[test]
    fn test_deserialize_camel_case() {
        let config: ServerConfig = serde_json::from_value(json!({
            "port": 27028,
            "logLevel": "debug",
            "fork": true,
            "mocks": { "fakedb": { "items": [{"field1": "value1"}] } }
        }))
        .unwrap();

        assert_eq!(config.port, 27028);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.seed_count(), 1);
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("TRACE".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Error.as_tracing(), tracing::Level::ERROR);
    }

    #[test]
    fn test_validate_rejects_bad_mocks() {
        let config = ServerConfig::new().seed("fakedb", "items", vec![json!([1, 2])]);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, MongoFsError::Config(_)));
        assert!(err.to_string().contains("mocks.fakedb.items[0]"));

        let config = ServerConfig::new().seed("bad/db", "items", vec![]);
        assert!(config.validate().is_err());

        let config = ServerConfig::new().host(" ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"port": 0, "logLevel": "trace", "colors": false}}"#).unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 0);
        assert_eq!(config.log_level, LogLevel::Trace);
        assert!(!config.colors);
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "port: 27100").unwrap();
        writeln!(file, "mocks:").unwrap();
        writeln!(file, "  fakedb:").unwrap();
        writeln!(file, "    items:").unwrap();
        writeln!(file, "      - field1: value1").unwrap();
        writeln!(file, "        field2: {{ field3: 33 }}").unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 27100);
        assert_eq!(config.mocks["fakedb"]["items"][0]["field2"]["field3"], json!(33));
    }

    #[test]
    fn test_mocks_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"fakedb": {{"items": [{{"a": 1}}, {{"a": 2}}]}}}}"#).unwrap();

        let config = ServerConfig::new().mocks_file(file.path()).unwrap();
        assert_eq!(config.seed_count(), 2);
    }

    #[test]
    fn test_from_file_errors() {
        let err = ServerConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, MongoFsError::Config(_)));

        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            ServerConfig::from_file(file.path()),
            Err(MongoFsError::Config(_))
        ));
    }
}
