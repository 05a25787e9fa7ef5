//! Document channel: OT frames over `{server}/sharedb`.
//!
//! One socket carries every document of the session. Inbound frames name
//! their document by collection and id; the router hands each to the
//! matching [`SharedDoc`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use covscode_core::{DocFrame, DocKey};
use parking_lot::Mutex;

use super::socket::{FrameHandler, Socket};
use super::{ReadyState, TransportError};
use crate::config;
use crate::shared_doc::SharedDoc;

#[derive(Default)]
struct DocRouter {
    docs: Mutex<HashMap<DocKey, Arc<SharedDoc>>>,
}

impl DocRouter {
    fn lookup(&self, key: &DocKey) -> Option<Arc<SharedDoc>> {
        self.docs.lock().get(key).cloned()
    }

    fn all(&self) -> Vec<Arc<SharedDoc>> {
        self.docs.lock().values().cloned().collect()
    }
}

impl FrameHandler for DocRouter {
    fn on_frame(&self, text: String) {
        let frame = match DocFrame::decode(&text) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Undecodable document frame: {e}");
                return;
            }
        };
        let Some(key) = frame.key() else {
            log::debug!("Document frame names no known document");
            return;
        };
        match self.lookup(&key) {
            Some(doc) => doc.handle_frame(frame),
            None => log::debug!("Frame for unopened document {key}"),
        }
    }

    fn on_error(&self, error: TransportError) {
        log::warn!("Document connection error: {error}");
    }

    fn on_close(&self, requested: bool) {
        if !requested {
            log::warn!("Document connection dropped");
        }
        for doc in self.all() {
            doc.connection_lost();
        }
    }
}

/// The document connection and its open documents.
pub struct DocConnection {
    socket: Socket,
    router: Arc<DocRouter>,
    local_user: String,
}

impl DocConnection {
    pub fn new(server_address: &str, close_timeout: Duration, local_user: impl Into<String>) -> Self {
        Self {
            socket: Socket::new(config::doc_url(server_address), close_timeout),
            router: Arc::new(DocRouter::default()),
            local_user: local_user.into(),
        }
    }

    pub async fn connect(&self) -> Result<(), TransportError> {
        self.socket.connect(self.router.clone()).await
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

    /// Handle for `key`, created on first use.
    pub fn get(&self, key: &DocKey) -> Arc<SharedDoc> {
        self.router
            .docs
            .lock()
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(SharedDoc::new(key.clone(), self.local_user.clone(), self.socket.sender()))
            })
            .clone()
    }

    /// Stop routing frames to `key`.
    pub fn forget(&self, key: &DocKey) -> Option<Arc<SharedDoc>> {
        self.router.docs.lock().remove(key)
    }

    /// Drop every handle.
    pub fn clear(&self) {
        self.router.docs.lock().clear();
    }

    pub fn open_docs(&self) -> usize {
        self.router.docs.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_url() {
        let conn = DocConnection::new("ws://127.0.0.1:9090", Duration::from_secs(1), "alice");
        assert_eq!(conn.url(), "ws://127.0.0.1:9090/sharedb");
        assert_eq!(conn.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn test_get_returns_same_handle() {
        let conn = DocConnection::new("ws://127.0.0.1:9090", Duration::from_secs(1), "alice");
        let key = DocKey::file("r1", "a.txt");
        let a = conn.get(&key);
        let b = conn.get(&key);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(conn.open_docs(), 1);

        conn.get(&DocKey::presence("r1"));
        assert_eq!(conn.open_docs(), 2);

        assert!(conn.forget(&key).is_some());
        assert!(!Arc::ptr_eq(&a, &conn.get(&key)));
    }

    #[test]
    fn test_router_dispatches_by_key() {
        let conn = DocConnection::new("ws://127.0.0.1:9090", Duration::from_secs(1), "alice");
        let doc = conn.get(&DocKey::file("r1", "a.txt"));

        conn.router.on_frame(
            r#"{"a":"s","c":"r1","d":"file/a.txt","data":{"v":3,"type":"http://sharejs.org/types/JSONv0","data":{"content":"hi"}}}"#.into(),
        );
        conn.router.on_frame(r#"{"a":"s","c":"r1","d":"file/other.txt","data":{"v":1}}"#.into());
        conn.router.on_frame("not json".into());

        assert_eq!(doc.version(), 3);
        assert_eq!(doc.content().as_deref(), Some("hi"));
        assert!(doc.is_subscribed());

        conn.router.on_close(false);
        assert!(!doc.is_subscribed());
    }
}
