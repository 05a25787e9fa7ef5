//! In-memory OT document service behind `/sharedb`.
//!
//! ```text
//!   { a:"op", v, seq, op }  ──►  transform against history[v..]  (incoming op wins ties)
//!                                apply, version += 1
//!   { a:"ack", v, seq }     ◄──  submitter
//!   { a:"op", v, op, source } ─► every other subscriber, in version order
//! ```
//!
//! All replies and fan-out for a document are queued while its table entry
//! is locked, so every subscriber sees versions in order.
//!
//! Each document keeps at most `history_limit` past ops. An op based on a
//! version older than that is refused with `ERR_OP_VERSION` and the client
//! refetches.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use covscode_core::doc::{CreateData, DocFrame, DocSnapshot, FrameError};
use covscode_core::op::{self, Op, Side};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use super::{BoxError, RelayActivity, RelayState};

pub const ERR_DOC_ALREADY_CREATED: &str = "ERR_DOC_ALREADY_CREATED";
pub const ERR_DOC_DOES_NOT_EXIST: &str = "ERR_DOC_DOES_NOT_EXIST";
pub const ERR_OP_VERSION: &str = "ERR_OP_VERSION";
pub const ERR_OP_INVALID: &str = "ERR_OP_INVALID";

/// Past ops kept per document unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// Queue of encoded frames for one connection.
pub type Outbox = mpsc::UnboundedSender<String>;

struct StoredDoc {
    version: u64,
    doc_type: Option<String>,
    data: Value,
    /// Version of `history[0]`
    base: u64,
    history: Vec<Op>,
    subscribers: HashMap<Uuid, Outbox>,
}

impl StoredDoc {
    fn missing() -> Self {
        Self {
            version: 0,
            doc_type: None,
            data: Value::Null,
            base: 0,
            history: Vec::new(),
            subscribers: HashMap::new(),
        }
    }

    fn snapshot(&self) -> DocSnapshot {
        DocSnapshot {
            v: self.version,
            doc_type: self.doc_type.clone(),
            data: self.doc_type.as_ref().map(|_| self.data.clone()),
        }
    }

    /// Forget the oldest ops beyond `limit`.
    fn trim_history(&mut self, limit: usize) {
        let excess = self.history.len().saturating_sub(limit);
        if excess > 0 {
            self.history.drain(..excess);
            self.base += excess as u64;
        }
    }

    fn fan_out(&self, except: Uuid, frame: &DocFrame) {
        let Some(text) = encode(frame) else {
            return;
        };
        for (conn, outbox) in &self.subscribers {
            if *conn != except && outbox.send(text.clone()).is_err() {
                log::debug!("Subscriber {conn} gone before fan-out");
            }
        }
    }
}

fn encode(frame: &DocFrame) -> Option<String> {
    match frame.encode() {
        Ok(text) => Some(text),
        Err(e) => {
            log::error!("Failed to encode document frame: {e}");
            None
        }
    }
}

fn reply(outbox: &Outbox, frame: &DocFrame) {
    if let Some(text) = encode(frame) {
        if outbox.send(text).is_err() {
            log::debug!("Reply dropped: connection gone");
        }
    }
}

fn ack_error(c: String, d: String, v: u64, seq: u64, code: &str, message: String) -> DocFrame {
    DocFrame::Ack {
        c,
        d,
        v,
        seq,
        error: Some(FrameError::new(code, message)),
    }
}

/// Every document the relay knows, keyed by (collection, name).
pub struct DocStore {
    docs: Mutex<HashMap<(String, String), StoredDoc>>,
    history_limit: usize,
}

impl Default for DocStore {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl DocStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
            history_limit,
        }
    }

    /// Serve one client frame. Replies go to `outbox`; accepted ops are
    /// reported back for the activity log.
    pub fn handle(&self, conn: Uuid, outbox: &Outbox, frame: DocFrame) -> Option<RelayActivity> {
        let mut docs = self.docs.lock();
        match frame {
            DocFrame::Fetch { c, d, .. } => {
                let data = docs
                    .get(&(c.clone(), d.clone()))
                    .map_or_else(DocSnapshot::missing, StoredDoc::snapshot);
                reply(outbox, &DocFrame::Fetch { c, d, data: Some(data), error: None });
                None
            }
            DocFrame::Subscribe { c, d, .. } => {
                let doc = docs.entry((c.clone(), d.clone())).or_insert_with(StoredDoc::missing);
                doc.subscribers.insert(conn, outbox.clone());
                reply(outbox, &DocFrame::Subscribe { c, d, data: Some(doc.snapshot()), error: None });
                None
            }
            DocFrame::Op { c, d, seq: Some(seq), create: Some(create), .. } => {
                let doc = docs.entry((c.clone(), d.clone())).or_insert_with(StoredDoc::missing);
                Self::create(conn, outbox, doc, c, d, seq, create);
                None
            }
            DocFrame::Op { c, d, v, seq: Some(seq), op: Some(op), source, .. } => {
                let doc = docs.entry((c.clone(), d.clone())).or_insert_with(StoredDoc::missing);
                let activity = Self::submit(conn, outbox, doc, c, d, v, seq, op, source);
                doc.trim_history(self.history_limit);
                activity
            }
            DocFrame::Op { c, d, .. } => {
                log::debug!("Ignoring op frame without seq or payload for {c}/{d}");
                None
            }
            DocFrame::Ack { .. } => None,
        }
    }

    fn create(conn: Uuid, outbox: &Outbox, doc: &mut StoredDoc, c: String, d: String, seq: u64, create: CreateData) {
        if doc.doc_type.is_some() {
            let message = format!("{c}/{d} already exists");
            reply(outbox, &ack_error(c, d, doc.version, seq, ERR_DOC_ALREADY_CREATED, message));
            return;
        }

        doc.doc_type = Some(create.doc_type.clone());
        doc.data = create.data.clone();
        doc.version = 1;
        doc.base = 1;
        doc.history.clear();
        log::debug!("Created {c}/{d}");

        reply(outbox, &DocFrame::Ack { c: c.clone(), d: d.clone(), v: 0, seq, error: None });
        doc.fan_out(
            conn,
            &DocFrame::Op { c, d, v: 0, seq: None, op: None, create: Some(create), source: None },
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn submit(
        conn: Uuid,
        outbox: &Outbox,
        doc: &mut StoredDoc,
        c: String,
        d: String,
        v: u64,
        seq: u64,
        op: Op,
        source: Option<String>,
    ) -> Option<RelayActivity> {
        if doc.doc_type.is_none() {
            let message = format!("{c}/{d} does not exist");
            reply(outbox, &ack_error(c, d, doc.version, seq, ERR_DOC_DOES_NOT_EXIST, message));
            return None;
        }
        if v > doc.version || v < doc.base {
            let message = format!("op at v{v}, document at v{}", doc.version);
            reply(outbox, &ack_error(c, d, doc.version, seq, ERR_OP_VERSION, message));
            return None;
        }

        let mut op = op;
        let missed = (v - doc.base) as usize;
        for past in &doc.history[missed..] {
            op = op::transform(&op, past, Side::Left);
        }

        let mut data = doc.data.clone();
        if let Err(e) = op::apply(&mut data, &op) {
            reply(outbox, &ack_error(c, d, doc.version, seq, ERR_OP_INVALID, e.to_string()));
            return None;
        }

        let landed = doc.version;
        doc.data = data;
        doc.version += 1;
        doc.history.push(op.clone());

        reply(outbox, &DocFrame::Ack { c: c.clone(), d: d.clone(), v: landed, seq, error: None });
        doc.fan_out(
            conn,
            &DocFrame::Op {
                c: c.clone(),
                d: d.clone(),
                v: landed,
                seq: None,
                op: Some(op),
                create: None,
                source,
            },
        );
        Some(RelayActivity::Op { collection: c, doc: d, version: landed })
    }

    /// Forget every subscription held by `conn`.
    pub fn drop_connection(&self, conn: &Uuid) {
        for doc in self.docs.lock().values_mut() {
            doc.subscribers.remove(conn);
        }
    }

    pub fn snapshot(&self, collection: &str, doc: &str) -> Option<DocSnapshot> {
        self.docs
            .lock()
            .get(&(collection.to_string(), doc.to_string()))
            .map(StoredDoc::snapshot)
    }

    /// Documents that have been created.
    pub fn doc_count(&self) -> usize {
        self.docs.lock().values().filter(|d| d.doc_type.is_some()).count()
    }
}

pub(crate) async fn serve(
    ws_stream: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    state: Arc<RelayState>,
) -> Result<(), BoxError> {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let conn = Uuid::new_v4();
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<String>();
    log::info!("Document connection {addr} open");

    let outcome: Result<(), BoxError> = async {
        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            state.count_message(text.len()).await;
                            match DocFrame::decode(text.as_str()) {
                                Ok(frame) => {
                                    if let Some(activity) = state.docs.handle(conn, &outbox, frame) {
                                        state.record(activity);
                                    }
                                }
                                Err(e) => log::warn!("Undecodable document frame from {addr}: {e}"),
                            }
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            ws_sender.send(WsMessage::Pong(data)).await?;
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            log::info!("Document connection {addr} closed");
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            log::warn!("Document connection {addr} failed: {e}");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                out = outbox_rx.recv() => {
                    match out {
                        Some(text) => ws_sender.send(WsMessage::Text(text.into())).await?,
                        None => return Ok(()),
                    }
                }
            }
        }
    }
    .await;

    state.docs.drop_connection(&conn);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use covscode_core::doc::JSON0_TYPE;
    use covscode_core::{DocKey, OpComponent};
    use serde_json::json;

    fn key() -> DocKey {
        DocKey::file("r1", "a.txt")
    }

    fn connection() -> (Uuid, Outbox, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Uuid::new_v4(), tx, rx)
    }

    fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> DocFrame {
        DocFrame::decode(&rx.try_recv().unwrap()).unwrap()
    }

    fn created(store: &DocStore, conn: Uuid, outbox: &Outbox, rx: &mut mpsc::UnboundedReceiver<String>) {
        store.handle(conn, outbox, DocFrame::create(&key(), 1, json!({ "content": "hello" })));
        assert!(matches!(next(rx), DocFrame::Ack { v: 0, seq: 1, error: None, .. }));
    }

    #[test]
    fn test_fetch_missing_document() {
        let store = DocStore::new();
        let (conn, outbox, mut rx) = connection();

        store.handle(conn, &outbox, DocFrame::fetch(&key()));
        match next(&mut rx) {
            DocFrame::Fetch { data: Some(snapshot), .. } => assert_eq!(snapshot, DocSnapshot::missing()),
            other => panic!("Expected fetch reply, got {other:?}"),
        }
        assert_eq!(store.doc_count(), 0);
    }

    #[test]
    fn test_create_once() {
        let store = DocStore::new();
        let (conn, outbox, mut rx) = connection();
        created(&store, conn, &outbox, &mut rx);

        store.handle(conn, &outbox, DocFrame::create(&key(), 2, json!({ "content": "late" })));
        match next(&mut rx) {
            DocFrame::Ack { error: Some(e), .. } => assert_eq!(e.code, ERR_DOC_ALREADY_CREATED),
            other => panic!("Expected rejection, got {other:?}"),
        }

        let snapshot = store.snapshot("r1", "file/a.txt").unwrap();
        assert_eq!(snapshot.v, 1);
        assert_eq!(snapshot.doc_type.as_deref(), Some(JSON0_TYPE));
        assert_eq!(snapshot.data, Some(json!({ "content": "hello" })));
    }

    #[test]
    fn test_submit_acks_and_fans_out() {
        let store = DocStore::new();
        let (alice, alice_out, mut alice_rx) = connection();
        let (bob, bob_out, mut bob_rx) = connection();
        created(&store, alice, &alice_out, &mut alice_rx);
        store.handle(bob, &bob_out, DocFrame::subscribe(&key()));
        assert!(matches!(next(&mut bob_rx), DocFrame::Subscribe { .. }));

        let op = vec![OpComponent::text_insert("content", 0, "X")];
        let activity = store.handle(alice, &alice_out, DocFrame::submit(&key(), 1, 2, op.clone(), Some("alice".into())));

        assert_eq!(
            activity,
            Some(RelayActivity::Op { collection: "r1".into(), doc: "file/a.txt".into(), version: 1 })
        );
        assert!(matches!(next(&mut alice_rx), DocFrame::Ack { v: 1, seq: 2, error: None, .. }));
        match next(&mut bob_rx) {
            DocFrame::Op { v: 1, op: Some(received), source, seq: None, .. } => {
                assert_eq!(received, op);
                assert_eq!(source.as_deref(), Some("alice"));
            }
            other => panic!("Expected broadcast op, got {other:?}"),
        }
        assert!(alice_rx.try_recv().is_err());
    }

    #[test]
    fn test_concurrent_submit_is_transformed() {
        let store = DocStore::new();
        let (alice, alice_out, mut alice_rx) = connection();
        let (bob, bob_out, mut bob_rx) = connection();
        created(&store, alice, &alice_out, &mut alice_rx);

        // Both edit v1 "hello"
        let first = vec![OpComponent::text_insert("content", 0, "A")];
        store.handle(alice, &alice_out, DocFrame::submit(&key(), 1, 2, first, None));
        let second = vec![OpComponent::text_insert("content", 5, "!")];
        store.handle(bob, &bob_out, DocFrame::submit(&key(), 1, 1, second, None));

        assert!(matches!(next(&mut bob_rx), DocFrame::Ack { v: 2, error: None, .. }));
        let snapshot = store.snapshot("r1", "file/a.txt").unwrap();
        assert_eq!(snapshot.data, Some(json!({ "content": "Ahello!" })));
        assert_eq!(snapshot.v, 3);
    }

    #[test]
    fn test_submit_errors() {
        let store = DocStore::new();
        let (conn, outbox, mut rx) = connection();
        let op = vec![OpComponent::text_insert("content", 0, "X")];

        store.handle(conn, &outbox, DocFrame::submit(&key(), 0, 1, op.clone(), None));
        match next(&mut rx) {
            DocFrame::Ack { error: Some(e), .. } => assert_eq!(e.code, ERR_DOC_DOES_NOT_EXIST),
            other => panic!("Expected rejection, got {other:?}"),
        }

        created(&store, conn, &outbox, &mut rx);
        store.handle(conn, &outbox, DocFrame::submit(&key(), 7, 2, op, None));
        match next(&mut rx) {
            DocFrame::Ack { error: Some(e), .. } => assert_eq!(e.code, ERR_OP_VERSION),
            other => panic!("Expected rejection, got {other:?}"),
        }

        let bad = vec![OpComponent::text_delete("content", 0, "nope")];
        store.handle(conn, &outbox, DocFrame::submit(&key(), 1, 3, bad, None));
        match next(&mut rx) {
            DocFrame::Ack { error: Some(e), .. } => assert_eq!(e.code, ERR_OP_INVALID),
            other => panic!("Expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_history_is_capped() {
        let store = DocStore::with_history_limit(2);
        let (conn, outbox, mut rx) = connection();
        created(&store, conn, &outbox, &mut rx);

        for (seq, v) in (2..6).zip(1..5) {
            let op = vec![OpComponent::text_insert("content", 0, "X")];
            store.handle(conn, &outbox, DocFrame::submit(&key(), v, seq, op, None));
            assert!(matches!(next(&mut rx), DocFrame::Ack { error: None, .. }));
        }
        assert_eq!(store.snapshot("r1", "file/a.txt").unwrap().v, 5);

        // Only ops landed at v3 and v4 are kept
        let stale = vec![OpComponent::text_insert("content", 0, "Y")];
        store.handle(conn, &outbox, DocFrame::submit(&key(), 2, 6, stale.clone(), None));
        match next(&mut rx) {
            DocFrame::Ack { error: Some(e), .. } => assert_eq!(e.code, ERR_OP_VERSION),
            other => panic!("Expected rejection, got {other:?}"),
        }

        store.handle(conn, &outbox, DocFrame::submit(&key(), 3, 7, stale, None));
        assert!(matches!(next(&mut rx), DocFrame::Ack { v: 5, error: None, .. }));
        let snapshot = store.snapshot("r1", "file/a.txt").unwrap();
        assert_eq!(snapshot.data, Some(json!({ "content": "YXXXXhello" })));
    }

    #[test]
    fn test_dropped_connection_gets_nothing() {
        let store = DocStore::new();
        let (alice, alice_out, mut alice_rx) = connection();
        let (bob, bob_out, mut bob_rx) = connection();
        created(&store, alice, &alice_out, &mut alice_rx);
        store.handle(bob, &bob_out, DocFrame::subscribe(&key()));
        let _ = next(&mut bob_rx);

        store.drop_connection(&bob);
        let op = vec![OpComponent::text_insert("content", 0, "X")];
        store.handle(alice, &alice_out, DocFrame::submit(&key(), 1, 2, op, None));
        assert!(bob_rx.try_recv().is_err());
    }
}
