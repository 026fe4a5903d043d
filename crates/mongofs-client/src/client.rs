//! mongofs client implementation

use mongofs_common::protocol::{
    encode_request, read_frame, write_frame, Command, ErrorBody, ProtocolError, RequestBody,
    Status,
};
use mongofs_common::{ErrorKind, MongoFsError};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// Port assumed when the connection string omits one
const DEFAULT_PORT: u16 = 27027;

/// A stored document
pub type Document = Map<String, Value>;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error reported by the server, rebuilt from its wire kind
    #[error("Server error: {0}")]
    Server(#[from] MongoFsError),

    #[error("Invalid connection string: {0}")]
    InvalidUri(String),

    #[error("Connection closed")]
    Closed,
}

impl ClientError {
    /// Kind of a server-reported error
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Server(e) => Some(e.kind()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(ErrorKind::NotFound)
    }

    pub fn is_duplicate_id(&self) -> bool {
        self.kind() == Some(ErrorKind::DuplicateId)
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == Some(ErrorKind::Validation)
    }
}

impl From<ClientError> for MongoFsError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Server(e) => e,
            ClientError::Protocol(e) => e.into(),
            ClientError::Connection(e) => MongoFsError::Connection(e.to_string()),
            ClientError::InvalidUri(msg) => MongoFsError::Config(msg),
            ClientError::Closed => MongoFsError::Connection("connection closed".to_string()),
        }
    }
}

/// Parsed `scheme://host:port/database` connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl ConnectionString {
    /// `host:port` to dial
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for ConnectionString {
    type Err = ClientError;

    /// Parse a connection string.
    ///
    /// - `mongodb://127.0.0.1:27027/fakedb` → database "fakedb"
    /// - `127.0.0.1:27027/fakedb` → scheme defaults to `mongodb`
    /// - `mongodb://localhost/fakedb` → port defaults to 27027
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let with_scheme = if s.contains("://") {
            s.to_string()
        } else {
            format!("mongodb://{}", s)
        };
        let url = Url::parse(&with_scheme)
            .map_err(|e| ClientError::InvalidUri(format!("{}: {}", s, e)))?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ClientError::InvalidUri(format!("{}: missing host", s)))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let database = url.path().trim_matches('/');
        if database.is_empty() {
            return Err(ClientError::InvalidUri(format!("{}: missing database name", s)));
        }
        if database.contains('/') {
            return Err(ClientError::InvalidUri(format!(
                "{}: database name cannot contain '/'",
                s
            )));
        }

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            database: database.to_string(),
        })
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}/{}", self.scheme, self.host, self.port, self.database)
    }
}

/// Socket plus a marker for a request whose response was never read
struct Connection {
    stream: TcpStream,
    in_flight: bool,
}

/// Connection to a mongofs server, bound to one database.
///
/// Requests on one client are answered in the order they are sent. If a
/// request future is dropped before its response arrives, the connection
/// can no longer pair requests with responses and every later request fails
/// with [`ClientError::Closed`].
pub struct Client {
    conn: Mutex<Connection>,
    target: ConnectionString,
}

impl Client {
    /// Connect using a `mongodb://host:port/database` connection string
    pub async fn connect(uri: &str) -> Result<Self, ClientError> {
        let target: ConnectionString = uri.parse()?;
        let stream = TcpStream::connect(target.address()).await?;
        stream.set_nodelay(true)?;
        debug!(address = %target.address(), database = %target.database, "Connected");
        Ok(Self {
            conn: Mutex::new(Connection {
                stream,
                in_flight: false,
            }),
            target,
        })
    }

    /// Name of the database this client is bound to
    pub fn database(&self) -> &str {
        &self.target.database
    }

    pub fn connection_string(&self) -> &ConnectionString {
        &self.target
    }

    /// Handle on a collection of this client's database
    pub fn collection(&self, name: impl Into<String>) -> Collection<'_> {
        Collection {
            client: self,
            name: name.into(),
        }
    }

    /// Send a request and read the response
    async fn request(&self, cmd: Command, payload: &[u8]) -> Result<(Status, Vec<u8>), ClientError> {
        let frame = encode_request(cmd, payload);

        let mut conn = self.conn.lock().await;
        if conn.in_flight {
            return Err(ClientError::Closed);
        }
        conn.in_flight = true;
        write_frame(&mut conn.stream, &frame).await?;
        let (code, payload) = read_frame(&mut conn.stream)
            .await?
            .ok_or(ClientError::Closed)?;
        conn.in_flight = false;
        drop(conn);

        let status = Status::try_from(code)?;
        if status == Status::Error {
            let body: ErrorBody = serde_json::from_slice(&payload).map_err(ProtocolError::from)?;
            return Err(ClientError::Server(body.into_error()));
        }

        Ok((status, payload))
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        cmd: Command,
        body: &RequestBody,
    ) -> Result<Option<T>, ClientError> {
        let payload = serde_json::to_vec(body).map_err(ProtocolError::from)?;
        let (status, response) = self.request(cmd, &payload).await?;
        if status == Status::Null {
            return Ok(None);
        }
        let value = serde_json::from_slice(&response).map_err(ProtocolError::from)?;
        Ok(Some(value))
    }

    /// Ping the server
    pub async fn ping(&self) -> Result<String, ClientError> {
        let (_, payload) = self.request(Command::Ping, &[]).await?;
        Ok(String::from_utf8_lossy(&payload).to_string())
    }

    /// Server version and storage counters
    pub async fn info(&self) -> Result<Value, ClientError> {
        let (_, payload) = self.request(Command::Info, &[]).await?;
        Ok(serde_json::from_slice(&payload).map_err(ProtocolError::from)?)
    }

    /// Drop this client's database, returns whether it existed
    pub async fn drop_database(&self) -> Result<bool, ClientError> {
        let body = RequestBody::new(self.database());
        Ok(self
            .request_json(Command::DropDatabase, &body)
            .await?
            .unwrap_or(false))
    }

    /// Close the connection
    pub async fn disconnect(self) -> Result<(), ClientError> {
        let mut conn = self.conn.into_inner();
        conn.stream.shutdown().await?;
        debug!(address = %self.target.address(), "Disconnected");
        Ok(())
    }
}

/// Request surface for one collection
pub struct Collection<'a> {
    client: &'a Client,
    name: String,
}

impl Collection<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn body(&self) -> RequestBody {
        RequestBody::new(self.client.database()).collection(self.name.as_str())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        cmd: Command,
        body: RequestBody,
    ) -> Result<T, ClientError> {
        self.client
            .request_json(cmd, &body)
            .await?
            .ok_or_else(|| ProtocolError::InvalidPayload(format!("empty {} response", cmd.name())).into())
    }

    /// All documents matching `query`; `None` matches everything
    pub async fn find(&self, query: Option<Value>) -> Result<Vec<Document>, ClientError> {
        self.call(Command::Find, self.body().query(query)).await
    }

    /// First document matching `query`
    pub async fn find_one(&self, query: Option<Value>) -> Result<Option<Document>, ClientError> {
        self.client
            .request_json(Command::FindOne, &self.body().query(query))
            .await
    }

    /// Insert a document, returns it with its `_id`
    pub async fn insert(&self, document: Value) -> Result<Document, ClientError> {
        self.call(Command::Insert, self.body().document(document)).await
    }

    /// Replace the stored document with the same `_id`
    pub async fn update(&self, document: Value) -> Result<Document, ClientError> {
        self.call(Command::Update, self.body().document(document)).await
    }

    /// Remove matching documents, returns how many were removed
    pub async fn remove(&self, query: Option<Value>) -> Result<usize, ClientError> {
        self.call(Command::Remove, self.body().query(query)).await
    }

    pub async fn count(&self, query: Option<Value>) -> Result<usize, ClientError> {
        self.call(Command::Count, self.body().query(query)).await
    }

    /// Drop the collection, returns whether it existed
    pub async fn drop(&self) -> Result<bool, ClientError> {
        self.call(Command::DropCollection, self.body()).await
    }
}
