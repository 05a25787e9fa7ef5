//! WebSocket state machine shared by both connections.
//!
//! ```text
//!            connect()               handshake ok
//!  Closed ──────────────► Connecting ────────────► Open
//!    ▲                        │ failure              │ close()
//!    │◄───────────────────────┘                      ▼
//!    └──────────────────────────────────────────── Closing
//!                 close frame answered / timeout
//! ```
//!
//! Once open, a writer task drains an unbounded outgoing queue and a reader
//! task hands every text frame to the connection's [`FrameHandler`], in wire
//! order. The reader owns the return to `Closed`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use covscode_core::ProtocolError;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::{ReadyState, TransportError};

/// Receives everything the reader task observes.
///
/// Called from the reader task; implementations must not block.
pub trait FrameHandler: Send + Sync + 'static {
    fn on_frame(&self, text: String);
    fn on_error(&self, error: TransportError);
    fn on_close(&self, requested: bool);
}

enum Outgoing {
    Text(String),
    Close,
}

/// Cloneable handle onto the outgoing queue of the current socket.
#[derive(Clone)]
pub struct SocketSender {
    slot: Arc<Mutex<Option<mpsc::UnboundedSender<Outgoing>>>>,
}

impl SocketSender {
    /// A sender attached to no socket. Every send fails with `NotOpen`.
    pub fn detached() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.slot.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub fn send_text(&self, text: String) -> Result<(), TransportError> {
        match self.slot.lock().as_ref() {
            Some(tx) => tx.send(Outgoing::Text(text)).map_err(|_| TransportError::NotOpen),
            None => Err(TransportError::NotOpen),
        }
    }
}

/// One reconnectable WebSocket endpoint.
pub struct Socket {
    url: String,
    state: Arc<watch::Sender<ReadyState>>,
    sender: SocketSender,
    /// Bumped per connection; a reader from an older one must not touch state
    generation: Arc<AtomicU64>,
    close_requested: Arc<AtomicBool>,
    close_timeout: Duration,
}

impl Socket {
    pub fn new(url: impl Into<String>, close_timeout: Duration) -> Self {
        let (state, _) = watch::channel(ReadyState::Closed);
        Self {
            url: url.into(),
            state: Arc::new(state),
            sender: SocketSender::detached(),
            generation: Arc::new(AtomicU64::new(0)),
            close_requested: Arc::new(AtomicBool::new(false)),
            close_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.state.borrow()
    }

    pub fn sender(&self) -> SocketSender {
        self.sender.clone()
    }

    /// Open the socket.
    ///
    /// Ok immediately when already open. While another connect is in flight,
    /// waits for it and reports its outcome. While closing, refuses with
    /// `NotReady(Closing)`.
    pub async fn connect(&self, handler: Arc<dyn FrameHandler>) -> Result<(), TransportError> {
        let mut observed = ReadyState::Closed;
        self.state.send_if_modified(|state| {
            observed = *state;
            if *state == ReadyState::Closed {
                *state = ReadyState::Connecting;
                true
            } else {
                false
            }
        });

        match observed {
            ReadyState::Open => return Ok(()),
            ReadyState::Closing => return Err(TransportError::NotReady(ReadyState::Closing)),
            ReadyState::Connecting => return self.wait_for_connect().await,
            ReadyState::Closed => {}
        }

        log::debug!("Connecting to {}", self.url);
        let ws_stream = match tokio_tungstenite::connect_async(self.url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                self.state.send_replace(ReadyState::Closed);
                log::warn!("Failed to connect to {}: {e}", self.url);
                return Err(TransportError::Connect(e.to_string()));
            }
        };

        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outgoing>();
        *self.sender.slot.lock() = Some(out_tx);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.close_requested.store(false, Ordering::SeqCst);
        self.state.send_replace(ReadyState::Open);
        log::info!("Connected to {}", self.url);

        // Writer task: forward outgoing queue to the WebSocket
        let url = self.url.clone();
        tokio::spawn(async move {
            while let Some(cmd) = out_rx.recv().await {
                match cmd {
                    Outgoing::Text(text) => {
                        if let Err(e) = ws_writer.send(WsMessage::Text(text.into())).await {
                            log::warn!("Write to {url} failed: {e}");
                            break;
                        }
                    }
                    Outgoing::Close => {
                        if let Err(e) = ws_writer.send(WsMessage::Close(None)).await {
                            log::debug!("Close frame to {url} not sent: {e}");
                        }
                        break;
                    }
                }
            }
        });

        // Reader task: hand frames to the handler until the socket ends
        let state = self.state.clone();
        let slot = self.sender.slot.clone();
        let current = self.generation.clone();
        let close_requested = self.close_requested.clone();
        let url = self.url.clone();
        tokio::spawn(async move {
            let mut failure = None;
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => handler.on_frame(text.as_str().to_owned()),
                    Ok(WsMessage::Binary(data)) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => handler.on_frame(text),
                        Err(_) => handler.on_error(TransportError::Decode(
                            ProtocolError::DeserializationError("binary frame is not UTF-8".into()),
                        )),
                    },
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        failure = Some(e.to_string());
                        break;
                    }
                }
            }

            if current.load(Ordering::SeqCst) != generation {
                log::debug!("Superseded connection to {url} finished");
                return;
            }
            slot.lock().take();
            state.send_replace(ReadyState::Closed);

            let requested = close_requested.swap(false, Ordering::SeqCst);
            if let Some(e) = failure {
                if !requested {
                    handler.on_error(TransportError::Socket(e));
                }
            }
            log::info!("Connection to {url} closed (requested: {requested})");
            handler.on_close(requested);
        });

        Ok(())
    }

    async fn wait_for_connect(&self) -> Result<(), TransportError> {
        let mut rx = self.state.subscribe();
        let settled = match rx.wait_for(|s| *s != ReadyState::Connecting).await {
            Ok(state) => *state,
            Err(_) => ReadyState::Closed,
        };
        if settled == ReadyState::Open {
            Ok(())
        } else {
            Err(TransportError::Connect(format!("in-flight connect to {} failed", self.url)))
        }
    }

    /// Close the socket.
    ///
    /// Ok immediately when already closed. While another close is in flight,
    /// waits for it. While connecting, refuses with `NotReady(Connecting)`.
    pub async fn close(&self) -> Result<(), TransportError> {
        let mut observed = ReadyState::Closed;
        self.state.send_if_modified(|state| {
            observed = *state;
            if *state == ReadyState::Open {
                *state = ReadyState::Closing;
                true
            } else {
                false
            }
        });

        match observed {
            ReadyState::Closed => return Ok(()),
            ReadyState::Connecting => return Err(TransportError::NotReady(ReadyState::Connecting)),
            ReadyState::Closing => return self.wait_for_closed().await,
            ReadyState::Open => {}
        }

        self.close_requested.store(true, Ordering::SeqCst);
        let queued = self
            .sender
            .slot
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(Outgoing::Close).is_ok());
        if !queued {
            self.force_closed();
            return Ok(());
        }
        self.wait_for_closed().await
    }

    async fn wait_for_closed(&self) -> Result<(), TransportError> {
        let mut rx = self.state.subscribe();
        let closed = tokio::time::timeout(
            self.close_timeout,
            rx.wait_for(|s| *s == ReadyState::Closed),
        )
        .await
        .is_ok();

        if closed {
            Ok(())
        } else {
            log::warn!("Close handshake with {} timed out", self.url);
            self.force_closed();
            Err(TransportError::CloseTimeout)
        }
    }

    fn force_closed(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.sender.slot.lock().take();
        self.close_requested.store(false, Ordering::SeqCst);
        self.state.send_replace(ReadyState::Closed);
    }

    /// Queue a text frame. Fails with `NotOpen` unless the socket is open.
    pub fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.ready_state() != ReadyState::Open {
            return Err(TransportError::NotOpen);
        }
        self.sender.send_text(text)
    }
}
