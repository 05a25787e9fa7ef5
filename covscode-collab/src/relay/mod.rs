//! Reference relay: session broker plus OT document service on one port.
//!
//! ```text
//!   ws://host:port/websocket ──► broker   (rooms per repository)
//!   ws://host:port/sharedb   ──► ot       (documents, versions, fan-out)
//!   anything else            ──► 404 during the upgrade
//! ```
//!
//! Everything is in memory. A repository lives while it has members; its
//! documents live as long as the relay does.

pub mod broker;
pub mod ot;
pub mod room;

use std::net::SocketAddr;
use std::sync::Arc;

use covscode_core::doc::DocSnapshot;
use covscode_core::Participant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

use ot::DocStore;
use room::RepoRooms;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Broadcast channel capacity per repository
    pub broadcast_capacity: usize,
    /// Past ops kept per document for transforming late submits
    pub history_limit: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            broadcast_capacity: 256,
            history_limit: ot::DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Relay statistics.
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub active_rooms: usize,
}

/// Something the relay accepted, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayActivity {
    /// An op landed at `version`
    Op { collection: String, doc: String, version: u64 },
    /// A control-channel action arrived
    Action { repo_id: String, action_type: String, path: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Broker,
    Documents,
}

impl Endpoint {
    fn from_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "/websocket" => Some(Self::Broker),
            "/sharedb" => Some(Self::Documents),
            _ => None,
        }
    }
}

pub(crate) struct RelayState {
    config: RelayConfig,
    pub(crate) rooms: RepoRooms,
    pub(crate) docs: DocStore,
    stats: RwLock<RelayStats>,
    activity: parking_lot::Mutex<Vec<RelayActivity>>,
}

impl RelayState {
    pub(crate) async fn count_message(&self, bytes: usize) {
        let mut s = self.stats.write().await;
        s.total_messages += 1;
        s.total_bytes += bytes as u64;
    }

    pub(crate) fn record(&self, activity: RelayActivity) {
        self.activity.lock().push(activity);
    }

    pub(crate) async fn refresh_room_count(&self) {
        let count = self.rooms.room_count().await;
        self.stats.write().await.active_rooms = count;
    }
}

/// The relay server. Clones share state.
#[derive(Clone)]
pub struct RelayServer {
    state: Arc<RelayState>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        let rooms = RepoRooms::new(config.broadcast_capacity);
        let docs = DocStore::with_history_limit(config.history_limit);
        Self {
            state: Arc::new(RelayState {
                config,
                rooms,
                docs,
                stats: RwLock::new(RelayStats::default()),
                activity: parking_lot::Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RelayConfig::default())
    }

    pub fn bind_addr(bind_addr: impl Into<String>) -> Self {
        Self::new(RelayConfig {
            bind_addr: bind_addr.into(),
            ..RelayConfig::default()
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.state.config
    }

    /// Bind and serve until the listener fails.
    pub async fn run(&self) -> Result<(), BoxError> {
        let listener = TcpListener::bind(&self.state.config.bind_addr).await?;
        log::info!("Relay listening on {}", self.state.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), BoxError> {
        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let state = self.state.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, state).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    pub async fn stats(&self) -> RelayStats {
        self.state.stats.read().await.clone()
    }

    /// Everything accepted so far, oldest first.
    pub fn activity(&self) -> Vec<RelayActivity> {
        self.state.activity.lock().clone()
    }

    pub fn doc_snapshot(&self, collection: &str, doc: &str) -> Option<DocSnapshot> {
        self.state.docs.snapshot(collection, doc)
    }

    /// Members of a live repository in join order.
    pub async fn repo_members(&self, repo_id: &str) -> Vec<Participant> {
        match self.state.rooms.get(repo_id).await {
            Some(room) => room.members().await,
            None => Vec::new(),
        }
    }

    pub async fn active_repos(&self) -> Vec<String> {
        self.state.rooms.active_repos().await
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, state: Arc<RelayState>) -> Result<(), BoxError> {
    let mut endpoint = None;
    let route = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let path = request.uri().path();
        match Endpoint::from_path(path) {
            Some(found) => {
                endpoint = Some(found);
                Ok(response)
            }
            None => {
                log::warn!("Refusing upgrade from {addr} to {path}");
                let mut refusal = ErrorResponse::new(Some(format!("no endpoint at {path}")));
                *refusal.status_mut() = StatusCode::NOT_FOUND;
                Err(refusal)
            }
        }
    };
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, route).await?;
    let Some(endpoint) = endpoint else {
        return Ok(());
    };

    {
        let mut s = state.stats.write().await;
        s.total_connections += 1;
        s.active_connections += 1;
    }

    let result = match endpoint {
        Endpoint::Broker => broker::serve(ws_stream, addr, state.clone()).await,
        Endpoint::Documents => ot::serve(ws_stream, addr, state.clone()).await,
    };

    {
        let mut s = state.stats.write().await;
        s.active_connections = s.active_connections.saturating_sub(1);
    }
    result
}
