//! # covscode-collab: Client session and sync core for shared repositories
//!
//! Joins a local workspace to a remote repository session: one control
//! connection for session and file-tree actions, one document connection
//! for operational-transform sync of file text and cursors.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  WorkspaceEvent  ┌────────────────┐
//! │ host / watcher   │ ───────────────► │ RepoSession    │
//! └──────────────────┘                  │ (coordinator)  │
//!                                       └──┬──────────┬──┘
//!                ControlConnection ◄───────┘          └──► DocConnection
//!                 /websocket (actions)                    /sharedb (ops)
//!                        │                                     │
//!                        ▼                                     ▼
//!                ┌────────────────┐                  ┌──────────────────┐
//!                │ relay::broker  │                  │ relay::ot        │
//!                │ rooms, roster  │                  │ versions, fan-out│
//!                └────────────────┘                  └──────────────────┘
//!
//!   ClientFile ── SharedDoc "file/<path>"     PresenceState ── SharedDoc "cursor"
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Session settings and endpoint URLs
//! - [`signal`]: One-shot handshake signals with timeouts
//! - [`transport`]: WebSocket lifecycle, control and document connections
//! - [`shared_doc`]: Client-side OT document: inflight/pending ops, remote transform
//! - [`registry`]: (repo, path) → shared document, last seen versions
//! - [`host`]: Traits the embedding editor implements
//! - [`workspace`]: Filesystem workspace with zip archive support
//! - [`editor`]: Open buffer or on-disk file, behind one handle
//! - [`file`]: Per-file sync: local edits out, remote ops in
//! - [`presence`]: Shared cursors
//! - [`session`]: Session lifecycle and action dispatch
//! - [`watcher`]: Local workspace events into session calls
//! - [`ui`]: Log-backed UI for headless use
//! - [`relay`]: Minimal in-memory relay for tests and local use

pub mod config;
pub mod signal;
pub mod transport;
pub mod shared_doc;
pub mod registry;
pub mod host;
pub mod workspace;
pub mod editor;
pub mod file;
pub mod presence;
pub mod error;
pub mod session;
pub mod watcher;
pub mod ui;
pub mod relay;

// Re-exports for convenience
pub use config::{ConfigError, SessionConfig, SessionMode};
pub use signal::{signal, Signal, SignalError, SignalWaiter};
pub use transport::{ControlConnection, DocConnection, ReadyState, TransportError, TransportEvent};
pub use shared_doc::{DocError, OpBatch, OpOrigin, SharedDoc};
pub use registry::DocRegistry;
pub use host::{HostError, NodeKind, NoopUi, SessionUi, TextBuffer, Workspace};
pub use workspace::LocalWorkspace;
pub use editor::FileEditor;
pub use file::{ClientFile, SyncOutcome, TextChange, TextChangeEvent};
pub use presence::{CursorColor, CursorInfo, CursorPosition, PresenceState};
pub use error::SessionError;
pub use session::{RepoSession, SessionPhase};
pub use watcher::{WorkspaceEvent, WorkspaceWatcher};
pub use ui::LogUi;
pub use relay::{RelayActivity, RelayConfig, RelayServer, RelayStats};
