//! Mock server lifecycle and TCP request handling
//!
//! A [`MockServer`] moves through `Stopped -> Starting -> Running ->
//! Stopping -> Stopped`. Each instance owns its own storage and listener,
//! so several servers can run side by side in one test process.

use crate::config::ServerConfig;
use mongofs_common::protocol::{
    read_frame, write_error, write_frame, write_response, Command, ProtocolError, RequestBody,
    Status,
};
use mongofs_common::{MongoFsError, Result};
use mongofs_store::{Collection, Storage};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        write!(f, "{}", name)
    }
}

/// State visible without waiting on start/stop
#[derive(Debug, Default)]
struct Live {
    state: ServerState,
    addr: Option<SocketAddr>,
    storage: Option<Arc<Storage>>,
}

/// Tasks owned by a running server
struct Handles {
    shutdown: CancellationToken,
    accept_task: JoinHandle<()>,
    connections: TaskTracker,
}

/// In-memory mock document database server
pub struct MockServer {
    config: RwLock<ServerConfig>,
    live: RwLock<Live>,
    /// Serializes start and stop
    handles: Mutex<Option<Handles>>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    /// Create a stopped server with the default configuration
    pub fn new() -> Self {
        Self {
            config: RwLock::new(ServerConfig::default()),
            live: RwLock::new(Live::default()),
            handles: Mutex::new(None),
        }
    }

    /// Create a stopped server with `config`
    pub fn with_config(config: ServerConfig) -> Result<Self> {
        let server = Self::new();
        server.init(config)?;
        Ok(server)
    }

    /// Validate and store the configuration used by the next `start`
    ///
    /// # Errors
    /// - `AlreadyInitialized` unless the server is stopped
    /// - `Config` if the configuration is invalid
    pub fn init(&self, config: ServerConfig) -> Result<()> {
        let state = self.state();
        if state != ServerState::Stopped {
            return Err(MongoFsError::AlreadyInitialized(format!(
                "cannot change configuration while {}",
                state
            )));
        }
        config.validate()?;
        debug!(address = %config.address(), seeds = config.seed_count(), "Server configured");
        *self.config.write() = config;
        Ok(())
    }

    /// Current configuration
    pub fn config(&self) -> ServerConfig {
        self.config.read().clone()
    }

    pub fn state(&self) -> ServerState {
        self.live.read().state
    }

    /// True only while `Running`
    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    /// Bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.live.read().addr
    }

    /// Live storage while running
    pub fn storage(&self) -> Option<Arc<Storage>> {
        self.live.read().storage.clone()
    }

    /// Connection string for `database` on this server
    ///
    /// # Errors
    /// `NotRunning` if the server has no listener.
    pub fn connection_string(&self, database: &str) -> Result<String> {
        let addr = self
            .local_addr()
            .ok_or_else(|| MongoFsError::NotRunning("server has no listener".to_string()))?;
        Ok(format!("mongodb://{}/{}", addr, database))
    }

    /// Start the server; resolves once it accepts connections.
    ///
    /// Seed data is loaded before the listener is bound. Calling `start` on
    /// a running server returns its address without binding again.
    ///
    /// # Errors
    /// Seed or bind failures; the server is left `Stopped`.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut handles = self.handles.lock().await;
        if handles.is_some() {
            if let Some(addr) = self.local_addr() {
                debug!(%addr, "Server already running");
                return Ok(addr);
            }
        }

        self.set_state(ServerState::Starting);
        let config = self.config();
        info!(address = %config.address(), "Starting mock server");

        match self.launch(&config).await {
            Ok((addr, storage, launched)) => {
                *handles = Some(launched);
                {
                    let mut live = self.live.write();
                    live.addr = Some(addr);
                    live.storage = Some(storage);
                    live.state = ServerState::Running;
                }
                info!(%addr, "Mock server running");
                Ok(addr)
            }
            Err(e) => {
                self.set_state(ServerState::Stopped);
                error!(error = %e, "Mock server failed to start");
                Err(e)
            }
        }
    }

    async fn launch(&self, config: &ServerConfig) -> Result<(SocketAddr, Arc<Storage>, Handles)> {
        if config.fork {
            warn!("fork is not supported, running in-process");
        }

        let storage = Arc::new(Storage::from_seed(&config.mocks)?);
        debug!(documents = config.seed_count(), "Seed data loaded");

        let listener = TcpListener::bind(config.address()).await.map_err(|e| {
            MongoFsError::Connection(format!("failed to bind {}: {}", config.address(), e))
        })?;
        let addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let connections = TaskTracker::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            storage.clone(),
            shutdown.clone(),
            connections.clone(),
        ));

        Ok((
            addr,
            storage,
            Handles {
                shutdown,
                accept_task,
                connections,
            },
        ))
    }

    /// Stop the server: close the listener and every connection, then
    /// discard all in-memory data. Stopping a stopped server does nothing.
    pub async fn stop(&self) -> Result<()> {
        let mut handles = self.handles.lock().await;
        let Some(running) = handles.take() else {
            debug!("Server already stopped");
            return Ok(());
        };

        self.set_state(ServerState::Stopping);
        info!("Stopping mock server");

        running.shutdown.cancel();
        let accept_result = running.accept_task.await;
        running.connections.close();
        running.connections.wait().await;

        {
            let mut live = self.live.write();
            live.addr = None;
            live.storage = None;
            live.state = ServerState::Stopped;
        }
        info!("Mock server stopped");

        accept_result.map_err(|e| MongoFsError::Internal(format!("accept loop failed: {}", e)))
    }

    fn set_state(&self, state: ServerState) {
        self.live.write().state = state;
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(running) = self.handles.get_mut().as_ref() {
            running.shutdown.cancel();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    storage: Arc<Storage>,
    shutdown: CancellationToken,
    connections: TaskTracker,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer_addr)) => {
                    let storage = storage.clone();
                    let shutdown = shutdown.clone();
                    connections.spawn(async move {
                        debug!(%peer_addr, "New connection");
                        if let Err(e) = handle_connection(socket, storage, shutdown).await {
                            warn!(%peer_addr, error = %e, "Connection error");
                        }
                        debug!(%peer_addr, "Connection closed");
                    });
                }
                Err(e) => warn!(error = %e, "Failed to accept connection"),
            },
        }
    }
    debug!("Accept loop stopped");
}

async fn handle_connection(
    mut socket: TcpStream,
    storage: Arc<Storage>,
    shutdown: CancellationToken,
) -> std::result::Result<(), ProtocolError> {
    socket.set_nodelay(true)?;
    let (mut reader, mut writer) = socket.split();

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            frame = read_frame(&mut reader) => frame?,
        };
        let Some((code, payload)) = frame else {
            return Ok(());
        };

        let response = process_request(code, &payload, &storage);
        write_frame(&mut writer, &response).await?;
    }
}

/// Execute one request and encode its response frame
pub(crate) fn process_request(code: u8, payload: &[u8], storage: &Storage) -> Vec<u8> {
    let cmd = match Command::try_from(code) {
        Ok(cmd) => cmd,
        Err(e) => return write_error(&e.into()),
    };
    trace!(command = cmd.name(), bytes = payload.len(), "Request");

    match execute(cmd, payload, storage) {
        Ok(response) => response,
        Err(e) => {
            if e.is_client_error() {
                debug!(command = cmd.name(), error = %e, "Request rejected");
            } else {
                warn!(command = cmd.name(), error = %e, "Request failed");
            }
            write_error(&e)
        }
    }
}

fn execute(cmd: Command, payload: &[u8], storage: &Storage) -> Result<Vec<u8>> {
    match cmd {
        Command::Ping => Ok(write_response(Status::Ok, b"PONG")),
        Command::Info => ok_json(&json!({
            "version": env!("CARGO_PKG_VERSION"),
            "databases": describe(storage),
            "stats": storage.stats(),
        })),
        Command::DropDatabase => {
            let body = parse_body(payload)?;
            ok_json(&storage.drop_database(&body.database))
        }
        Command::Find => {
            let (body, collection) = open_collection(payload, storage)?;
            ok_json(&collection.find(body.query.as_ref())?)
        }
        Command::FindOne => {
            let (body, collection) = open_collection(payload, storage)?;
            match collection.find_one(body.query.as_ref())? {
                Some(doc) => ok_json(&doc),
                None => Ok(write_response(Status::Null, &[])),
            }
        }
        Command::Insert => {
            let (body, collection) = open_collection(payload, storage)?;
            ok_json(&collection.insert(body.require_document()?.clone())?)
        }
        Command::Update => {
            let (body, collection) = open_collection(payload, storage)?;
            ok_json(&collection.update(body.require_document()?.clone())?)
        }
        Command::Remove => {
            let (body, collection) = open_collection(payload, storage)?;
            ok_json(&collection.remove(body.query.as_ref())?)
        }
        Command::Count => {
            let (body, collection) = open_collection(payload, storage)?;
            ok_json(&collection.count(body.query.as_ref())?)
        }
        Command::DropCollection => {
            let (_, collection) = open_collection(payload, storage)?;
            ok_json(&collection.drop())
        }
    }
}

/// Document count per collection, per database
fn describe(storage: &Storage) -> Map<String, Value> {
    storage
        .database_names()
        .into_iter()
        .filter_map(|name| storage.get_database(&name))
        .map(|db| {
            let collections: Map<String, Value> = db
                .collection_names()
                .into_iter()
                .map(|name| {
                    let count = db.count(&name);
                    (name, Value::from(count))
                })
                .collect();
            (db.name().to_string(), Value::Object(collections))
        })
        .collect()
}

fn parse_body(payload: &[u8]) -> Result<RequestBody> {
    serde_json::from_slice(payload)
        .map_err(|e| MongoFsError::Validation(format!("malformed request body: {}", e)))
}

fn open_collection(payload: &[u8], storage: &Storage) -> Result<(RequestBody, Collection)> {
    let body = parse_body(payload)?;
    let collection = storage
        .database(&body.database)?
        .collection(body.require_collection()?)?;
    Ok((body, collection))
}

fn ok_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(write_response(Status::Ok, &serde_json::to_vec(value)?))
}
