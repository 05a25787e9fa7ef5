//! Transport connections to the collaboration server.
//!
//! Two independently-lifecycled WebSocket connections:
//! ```text
//!                 ┌──────────────────────┐
//! RepoSession ──► │ ControlConnection    │ ── {server}/websocket ── session broker
//!      │          │  (Message / Action)  │
//!      │          └──────────────────────┘
//!      │          ┌──────────────────────┐
//!      └────────► │ DocConnection        │ ── {server}/sharedb ──── OT document service
//!                 │  (DocFrame, per-key  │
//!                 │   SharedDoc handles) │
//!                 └──────────────────────┘
//! ```
//!
//! Both sit on [`socket::Socket`], a state machine over [`ReadyState`].

pub mod socket;
pub mod control;
pub mod doc_channel;

use covscode_core::{Message, ProtocolError};

pub use control::ControlConnection;
pub use doc_channel::DocConnection;
pub use socket::{FrameHandler, Socket, SocketSender};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Closed,
    Connecting,
    Open,
    Closing,
}

/// Events emitted by the control connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A decoded inbound frame
    Message(Message),
    /// Send-while-closed, undecodable frame, or socket failure
    Error(TransportError),
    /// The socket closed; `requested` is true for a local `close()`
    Close { requested: bool },
}

/// Transport errors.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    Connect(String),
    /// The connection is not open
    NotOpen,
    /// The connection is mid-transition and cannot honour the request
    NotReady(ReadyState),
    Send(String),
    Decode(ProtocolError),
    Socket(String),
    CloseTimeout,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(e) => write!(f, "Connect error: {e}"),
            Self::NotOpen => write!(f, "Connection is not open"),
            Self::NotReady(state) => write!(f, "Connection not ready: {state:?}"),
            Self::Send(e) => write!(f, "Send error: {e}"),
            Self::Decode(e) => write!(f, "Decode error: {e}"),
            Self::Socket(e) => write!(f, "Socket error: {e}"),
            Self::CloseTimeout => write!(f, "Close handshake timed out"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<ProtocolError> for TransportError {
    fn from(e: ProtocolError) -> Self {
        Self::Decode(e)
    }
}
