//! Control channel: session broker messages over `{server}/websocket`.
//!
//! Inbound frames are decoded into [`Message`]s and queued as
//! [`TransportEvent`]s in wire order. Nothing here ever raises into the
//! caller: decode failures, send-while-closed and socket drops all become
//! `Error`/`Close` events for the session to judge.

use std::sync::Arc;
use std::time::Duration;

use covscode_core::{Message, Payload};
use tokio::sync::mpsc;

use super::socket::{FrameHandler, Socket};
use super::{ReadyState, TransportError, TransportEvent};
use crate::config;

struct ControlHandler {
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl ControlHandler {
    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            log::trace!("Control event dropped: no receiver");
        }
    }
}

impl FrameHandler for ControlHandler {
    fn on_frame(&self, text: String) {
        match Message::decode(&text) {
            Ok(message) => {
                log::trace!("Control frame: {}", message.kind_name());
                self.emit(TransportEvent::Message(message));
            }
            Err(e) => {
                log::warn!("Undecodable control frame: {e}");
                self.emit(TransportEvent::Error(TransportError::Decode(e)));
            }
        }
    }

    fn on_error(&self, error: TransportError) {
        self.emit(TransportEvent::Error(error));
    }

    fn on_close(&self, requested: bool) {
        self.emit(TransportEvent::Close { requested });
    }
}

/// The control connection.
pub struct ControlConnection {
    socket: Socket,
    handler: Arc<ControlHandler>,
    event_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl ControlConnection {
    pub fn new(server_address: &str, close_timeout: Duration) -> Self {
        let (events, event_rx) = mpsc::unbounded_channel();
        Self {
            socket: Socket::new(config::control_url(server_address), close_timeout),
            handler: Arc::new(ControlHandler { events }),
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.event_rx.take()
    }

    pub async fn connect(&self) -> Result<(), TransportError> {
        self.socket.connect(self.handler.clone()).await
    }

    pub async fn close(&self) -> Result<(), TransportError> {
        self.socket.close().await
    }

    pub fn ready_state(&self) -> ReadyState {
        self.socket.ready_state()
    }

    pub fn url(&self) -> &str {
        self.socket.url()
    }

    /// Send an action (wrapped in a successful envelope) or a message.
    ///
    /// Never fails: problems are reported as `Error` events.
    pub fn send_data(&self, payload: impl Into<Payload>) {
        let payload = payload.into();
        if self.socket.ready_state() != ReadyState::Open {
            log::warn!("Dropping outbound payload: control connection is {:?}", self.socket.ready_state());
            self.handler.emit(TransportEvent::Error(TransportError::NotOpen));
            return;
        }

        let text = match payload.encode() {
            Ok(text) => text,
            Err(e) => {
                log::error!("Failed to encode outbound payload: {e}");
                self.handler.emit(TransportEvent::Error(TransportError::Decode(e)));
                return;
            }
        };

        if let Err(e) = self.socket.send_text(text) {
            self.handler.emit(TransportEvent::Error(e));
        }
    }

    /// One-shot reachability check of a server's control endpoint.
    pub async fn probe(server_address: &str, limit: Duration) -> Result<(), TransportError> {
        let url = config::control_url(server_address);
        match tokio::time::timeout(limit, tokio_tungstenite::connect_async(url.as_str())).await {
            Ok(Ok((mut ws_stream, _))) => {
                if let Err(e) = ws_stream.close(None).await {
                    log::debug!("Probe close for {url} failed: {e}");
                }
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::Connect(e.to_string())),
            Err(_) => Err(TransportError::Connect(format!("probe of {url} timed out"))),
        }
    }
}
