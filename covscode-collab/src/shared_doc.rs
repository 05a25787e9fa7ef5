//! Client-side handle on one shared OT document.
//!
//! ```text
//!   submit_op(op) ──► apply locally ──► OpBatch{LocalEcho} ──► listeners
//!        │
//!        ▼  one op in flight at a time, the rest queued
//!   { a:"op", v, seq, op }  ─────────► server
//!                        ◄───────────  { a:"ack", v, seq }     → version = v + 1
//!                        ◄───────────  { a:"op", v, op, source } (remote)
//!                                        │ transform in-flight + queued ops
//!                                        ▼
//!                            apply ──► OpBatch{Remote | SystemInternal}
//! ```
//!
//! A remote op older than the local version is a duplicate and ignored.
//! One from the future means ops were missed: queued ops are failed and the
//! snapshot is fetched again. A rejected op triggers the same resync.

use std::collections::VecDeque;

use covscode_core::doc::{CreateData, DocFrame, DocKey, DocSnapshot, FrameError, JSON0_TYPE};
use covscode_core::op::{self, Op, OpError};
use covscode_core::ProtocolError;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};

use crate::transport::{SocketSender, TransportError};

/// Buffered op batches per listener before it starts lagging.
pub const BATCH_CAPACITY: usize = 256;

const ALREADY_CREATED: &str = "ERR_DOC_ALREADY_CREATED";

/// Where an op batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOrigin {
    /// This process submitted it under the local user id
    LocalEcho,
    /// Another participant submitted it
    Remote,
    /// Submitted without a source: presence bookkeeping, resyncs
    SystemInternal,
}

impl OpOrigin {
    /// Origin of an op submitted by this process.
    pub fn of_local(source: Option<&str>, local_user: &str) -> Self {
        match source {
            Some(s) if s == local_user => Self::LocalEcho,
            Some(s) if !s.is_empty() => Self::Remote,
            _ => Self::SystemInternal,
        }
    }

    /// Origin of an op that arrived from the server.
    pub fn of_remote(source: Option<&str>) -> Self {
        match source {
            Some(s) if !s.is_empty() => Self::Remote,
            _ => Self::SystemInternal,
        }
    }
}

/// One applied op, as seen by listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct OpBatch {
    /// Document version once this op is acknowledged
    pub version: u64,
    pub op: Op,
    pub origin: OpOrigin,
    pub source: Option<String>,
}

struct PendingOp {
    seq: u64,
    op: Op,
    source: Option<String>,
    done: Option<oneshot::Sender<Result<u64, DocError>>>,
}

impl PendingOp {
    fn finish(mut self, result: Result<u64, DocError>) {
        if let Some(done) = self.done.take() {
            let _ = done.send(result);
        }
    }
}

type Waiter = oneshot::Sender<Result<(), DocError>>;

struct DocState {
    version: u64,
    doc_type: Option<String>,
    data: Value,
    subscribed: bool,
    next_seq: u64,
    fetch_waiters: Vec<Waiter>,
    subscribe_waiters: Vec<Waiter>,
    create: Option<(u64, Waiter)>,
    inflight: Option<PendingOp>,
    pending: VecDeque<PendingOp>,
    resyncing: bool,
}

impl DocState {
    fn new() -> Self {
        Self {
            version: 0,
            doc_type: None,
            data: Value::Null,
            subscribed: false,
            next_seq: 0,
            fetch_waiters: Vec::new(),
            subscribe_waiters: Vec::new(),
            create: None,
            inflight: None,
            pending: VecDeque::new(),
            resyncing: false,
        }
    }

    fn queued(&self) -> usize {
        self.pending.len() + usize::from(self.inflight.is_some())
    }
}

/// A shared document keyed by [`DocKey`].
pub struct SharedDoc {
    key: DocKey,
    local_user: String,
    sender: SocketSender,
    state: Mutex<DocState>,
    batches: broadcast::Sender<OpBatch>,
}

impl SharedDoc {
    pub fn new(key: DocKey, local_user: impl Into<String>, sender: SocketSender) -> Self {
        let (batches, _) = broadcast::channel(BATCH_CAPACITY);
        Self {
            key,
            local_user: local_user.into(),
            sender,
            state: Mutex::new(DocState::new()),
            batches,
        }
    }

    /// A handle bound to no connection. Network calls fail with `NotOpen`.
    pub fn detached(key: DocKey, local_user: impl Into<String>) -> Self {
        Self::new(key, local_user, SocketSender::detached())
    }

    pub fn key(&self) -> &DocKey {
        &self.key
    }

    /// Last version acknowledged by the server.
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// `None` until the document exists server-side.
    pub fn doc_type(&self) -> Option<String> {
        self.state.lock().doc_type.clone()
    }

    pub fn is_created(&self) -> bool {
        self.state.lock().doc_type.is_some()
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.lock().subscribed
    }

    /// Ops submitted but not yet acknowledged.
    pub fn pending_ops(&self) -> usize {
        self.state.lock().queued()
    }

    pub fn data(&self) -> Value {
        self.state.lock().data.clone()
    }

    /// The `content` string of a file document.
    pub fn content(&self) -> Option<String> {
        self.state
            .lock()
            .data
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    /// Subscribe to applied op batches.
    pub fn op_batches(&self) -> broadcast::Receiver<OpBatch> {
        self.batches.subscribe()
    }

    // ─── Requests ───────────────────────────────────────────────────

    /// Fetch the current snapshot.
    pub async fn fetch(&self) -> Result<(), DocError> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().fetch_waiters.push(tx);
        self.send_frame(&DocFrame::fetch(&self.key))?;
        rx.await.unwrap_or(Err(DocError::ConnectionLost))
    }

    /// Subscribe to remote ops; the reply carries a fresh snapshot.
    pub async fn subscribe(&self) -> Result<(), DocError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut st = self.state.lock();
            if st.subscribed {
                return Ok(());
            }
            st.subscribe_waiters.push(tx);
        }
        self.send_frame(&DocFrame::subscribe(&self.key))?;
        rx.await.unwrap_or(Err(DocError::ConnectionLost))
    }

    /// Create the document with `data` as its initial contents.
    ///
    /// Ok without a round trip when the document already exists.
    pub async fn create(&self, data: Value) -> Result<(), DocError> {
        let rx = {
            let mut st = self.state.lock();
            if st.doc_type.is_some() {
                return Ok(());
            }
            st.next_seq += 1;
            let seq = st.next_seq;
            let text = DocFrame::create(&self.key, seq, data.clone()).encode()?;
            self.sender.send_text(text)?;

            let (tx, rx) = oneshot::channel();
            st.create = Some((seq, tx));
            st.doc_type = Some(JSON0_TYPE.to_string());
            st.data = data;
            rx
        };
        rx.await.unwrap_or(Err(DocError::ConnectionLost))
    }

    /// Apply `op` locally, send it, and wait for the acknowledgement.
    ///
    /// Returns the acknowledged version. Listeners see the batch at once,
    /// before the round trip.
    pub async fn submit_op(&self, op: Op, source: Option<String>) -> Result<u64, DocError> {
        if op.is_empty() {
            return Ok(self.version());
        }
        if !self.sender.is_open() {
            return Err(DocError::Transport(TransportError::NotOpen));
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut st = self.state.lock();
            if st.doc_type.is_none() {
                return Err(DocError::NotCreated(self.key.to_string()));
            }
            op::apply(&mut st.data, &op)?;

            let version = st.version + st.queued() as u64 + 1;
            st.pending.push_back(PendingOp {
                seq: 0,
                op: op.clone(),
                source: source.clone(),
                done: Some(tx),
            });
            self.flush_locked(&mut st);

            let origin = OpOrigin::of_local(source.as_deref(), &self.local_user);
            let _ = self.batches.send(OpBatch { version, op, origin, source });
        }
        rx.await.unwrap_or(Err(DocError::ConnectionLost))
    }

    fn send_frame(&self, frame: &DocFrame) -> Result<(), DocError> {
        let text = frame.encode()?;
        self.sender.send_text(text)?;
        Ok(())
    }

    /// Send the next queued op if nothing is in flight.
    fn flush_locked(&self, st: &mut DocState) {
        if st.inflight.is_some() || st.resyncing {
            return;
        }
        let Some(mut next) = st.pending.pop_front() else {
            return;
        };

        st.next_seq += 1;
        next.seq = st.next_seq;
        let frame = DocFrame::submit(&self.key, st.version, next.seq, next.op.clone(), next.source.clone());
        match self.send_frame(&frame) {
            Ok(()) => st.inflight = Some(next),
            Err(e) => {
                log::warn!("Submit to {} failed: {e}", self.key);
                next.finish(Err(e.clone()));
                for queued in st.pending.drain(..) {
                    queued.finish(Err(e.clone()));
                }
            }
        }
    }

    // ─── Inbound ────────────────────────────────────────────────────

    /// Route one inbound frame for this document.
    pub(crate) fn handle_frame(&self, frame: DocFrame) {
        let mut st = self.state.lock();
        match frame {
            DocFrame::Fetch { data, error, .. } => {
                let result = self.absorb_snapshot(&mut st, data, error);
                for waiter in st.fetch_waiters.drain(..) {
                    let _ = waiter.send(result.clone());
                }
            }
            DocFrame::Subscribe { data, error, .. } => {
                let result = self.absorb_snapshot(&mut st, data, error);
                if result.is_ok() {
                    st.subscribed = true;
                }
                for waiter in st.subscribe_waiters.drain(..) {
                    let _ = waiter.send(result.clone());
                }
            }
            DocFrame::Op { v, op: Some(op), seq: None, source, .. } => {
                self.apply_remote(&mut st, v, op, source);
            }
            DocFrame::Op { v, create: Some(create), seq: None, .. } => {
                self.apply_remote_create(&mut st, v, create);
            }
            DocFrame::Op { .. } => {
                log::debug!("Ignoring op frame without payload for {}", self.key);
            }
            DocFrame::Ack { v, seq, error, .. } => self.handle_ack(&mut st, v, seq, error),
        }
    }

    fn absorb_snapshot(
        &self,
        st: &mut DocState,
        data: Option<DocSnapshot>,
        error: Option<FrameError>,
    ) -> Result<(), DocError> {
        if let Some(e) = error {
            return Err(DocError::Rejected(e));
        }
        let snapshot = data.ok_or_else(|| {
            DocError::Rejected(FrameError::new("ERR_NO_SNAPSHOT", "reply carried no snapshot"))
        })?;

        let idle = st.inflight.is_none() && st.pending.is_empty() && st.create.is_none();
        if !(idle || st.resyncing) {
            log::debug!("Snapshot v{} for {} not applied: local ops pending", snapshot.v, self.key);
            return Ok(());
        }

        st.version = snapshot.v;
        st.doc_type = snapshot.doc_type;
        st.data = snapshot.data.unwrap_or(Value::Null);

        if st.resyncing {
            st.resyncing = false;
            log::info!("Resynced {} at v{}", self.key, st.version);
            let _ = self.batches.send(OpBatch {
                version: st.version,
                op: Vec::new(),
                origin: OpOrigin::SystemInternal,
                source: None,
            });
        }
        Ok(())
    }

    fn apply_remote(&self, st: &mut DocState, v: u64, op: Op, source: Option<String>) {
        if st.resyncing {
            return;
        }
        if v < st.version {
            log::trace!("Duplicate op v{v} for {} (at v{})", self.key, st.version);
            return;
        }
        if v > st.version {
            log::warn!("Missed ops for {}: got v{v} at v{}", self.key, st.version);
            self.begin_resync_locked(st, DocError::Desync(self.key.to_string()));
            return;
        }

        let mut incoming = op;
        if let Some(inflight) = st.inflight.as_mut() {
            let (mine, theirs) = op::transform_x(&inflight.op, &incoming);
            inflight.op = mine;
            incoming = theirs;
        }
        for queued in st.pending.iter_mut() {
            let (mine, theirs) = op::transform_x(&queued.op, &incoming);
            queued.op = mine;
            incoming = theirs;
        }

        if let Err(e) = op::apply(&mut st.data, &incoming) {
            log::warn!("Remote op for {} does not apply: {e}", self.key);
            self.begin_resync_locked(st, DocError::Op(e));
            return;
        }
        st.version += 1;

        let origin = OpOrigin::of_remote(source.as_deref());
        let _ = self.batches.send(OpBatch {
            version: st.version,
            op: incoming,
            origin,
            source,
        });
    }

    fn apply_remote_create(&self, st: &mut DocState, v: u64, create: CreateData) {
        if st.resyncing || st.doc_type.is_some() {
            return;
        }
        if v != st.version {
            self.begin_resync_locked(st, DocError::Desync(self.key.to_string()));
            return;
        }
        st.doc_type = Some(create.doc_type);
        st.data = create.data;
        st.version = v + 1;
        let _ = self.batches.send(OpBatch {
            version: st.version,
            op: Vec::new(),
            origin: OpOrigin::SystemInternal,
            source: None,
        });
    }

    fn handle_ack(&self, st: &mut DocState, v: u64, seq: u64, error: Option<FrameError>) {
        if st.create.as_ref().is_some_and(|(create_seq, _)| *create_seq == seq) {
            let Some((_, waiter)) = st.create.take() else {
                return;
            };
            let result = match error {
                None => {
                    st.version = v + 1;
                    Ok(())
                }
                Some(e) if e.code == ALREADY_CREATED => {
                    // Someone else won the race; take their snapshot.
                    self.begin_resync_locked(st, DocError::Desync(self.key.to_string()));
                    Ok(())
                }
                Some(e) => {
                    st.doc_type = None;
                    st.data = Value::Null;
                    Err(DocError::Rejected(e))
                }
            };
            let _ = waiter.send(result);
            self.flush_locked(st);
            return;
        }

        match st.inflight.take() {
            Some(inflight) if inflight.seq == seq => match error {
                None => {
                    st.version = v + 1;
                    inflight.finish(Ok(st.version));
                    self.flush_locked(st);
                }
                Some(e) => {
                    log::warn!("Op {seq} on {} rejected: {e}", self.key);
                    inflight.finish(Err(DocError::Rejected(e)));
                    self.begin_resync_locked(st, DocError::Desync(self.key.to_string()));
                }
            },
            other => {
                st.inflight = other;
                log::debug!("Unexpected ack seq {seq} for {}", self.key);
            }
        }
    }

    /// Drop local ops and refetch the authoritative snapshot.
    fn begin_resync_locked(&self, st: &mut DocState, reason: DocError) {
        if let Some(inflight) = st.inflight.take() {
            inflight.finish(Err(reason.clone()));
        }
        for queued in st.pending.drain(..) {
            queued.finish(Err(reason.clone()));
        }
        st.resyncing = true;
        if let Err(e) = self.send_frame(&DocFrame::fetch(&self.key)) {
            log::warn!("Resync fetch for {} not sent: {e}", self.key);
            st.resyncing = false;
        }
    }

    /// Fail everything waiting on the server; the handle stays usable.
    pub(crate) fn connection_lost(&self) {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        for waiter in st.fetch_waiters.drain(..).chain(st.subscribe_waiters.drain(..)) {
            let _ = waiter.send(Err(DocError::ConnectionLost));
        }
        if let Some((_, waiter)) = st.create.take() {
            let _ = waiter.send(Err(DocError::ConnectionLost));
        }
        if let Some(inflight) = st.inflight.take() {
            inflight.finish(Err(DocError::ConnectionLost));
        }
        for queued in st.pending.drain(..) {
            queued.finish(Err(DocError::ConnectionLost));
        }
        st.subscribed = false;
        st.resyncing = false;
    }
}

/// Document errors.
#[derive(Debug, Clone, PartialEq)]
pub enum DocError {
    /// Ops against a document the server has not created
    NotCreated(String),
    Op(OpError),
    Rejected(FrameError),
    /// Local state diverged from the server and is being refetched
    Desync(String),
    Transport(TransportError),
    ConnectionLost,
}

impl std::fmt::Display for DocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotCreated(key) => write!(f, "Document {key} does not exist"),
            Self::Op(e) => write!(f, "{e}"),
            Self::Rejected(e) => write!(f, "Document request rejected: {e}"),
            Self::Desync(key) => write!(f, "Document {key} out of sync, refetching"),
            Self::Transport(e) => write!(f, "{e}"),
            Self::ConnectionLost => write!(f, "Document connection lost"),
        }
    }
}

impl std::error::Error for DocError {}

impl From<OpError> for DocError {
    fn from(e: OpError) -> Self {
        Self::Op(e)
    }
}

impl From<TransportError> for DocError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<ProtocolError> for DocError {
    fn from(e: ProtocolError) -> Self {
        Self::Transport(TransportError::Decode(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covscode_core::OpComponent;
    use serde_json::json;

    fn file_key() -> DocKey {
        DocKey::file("r1", "a.txt")
    }

    fn subscribed_doc(content: &str, v: u64) -> SharedDoc {
        let doc = SharedDoc::detached(file_key(), "alice");
        doc.handle_frame(DocFrame::Subscribe {
            c: "r1".into(),
            d: "file/a.txt".into(),
            data: Some(DocSnapshot {
                v,
                doc_type: Some(JSON0_TYPE.into()),
                data: Some(json!({ "content": content })),
            }),
            error: None,
        });
        doc
    }

    fn remote_op(v: u64, op: Op, source: Option<&str>) -> DocFrame {
        DocFrame::Op {
            c: "r1".into(),
            d: "file/a.txt".into(),
            v,
            seq: None,
            op: Some(op),
            create: None,
            source: source.map(str::to_owned),
        }
    }

    #[test]
    fn test_origin_classification() {
        assert_eq!(OpOrigin::of_local(Some("alice"), "alice"), OpOrigin::LocalEcho);
        assert_eq!(OpOrigin::of_local(None, "alice"), OpOrigin::SystemInternal);
        assert_eq!(OpOrigin::of_local(Some(""), "alice"), OpOrigin::SystemInternal);
        assert_eq!(OpOrigin::of_remote(Some("bob")), OpOrigin::Remote);
        assert_eq!(OpOrigin::of_remote(None), OpOrigin::SystemInternal);
    }

    #[test]
    fn test_snapshot_absorbed() {
        let doc = subscribed_doc("hello", 4);
        assert!(doc.is_subscribed());
        assert!(doc.is_created());
        assert_eq!(doc.version(), 4);
        assert_eq!(doc.content().as_deref(), Some("hello"));
    }

    #[test]
    fn test_remote_op_applied_and_broadcast() {
        let doc = subscribed_doc("hello", 4);
        let mut batches = doc.op_batches();

        doc.handle_frame(remote_op(4, vec![OpComponent::text_insert("content", 0, "X")], Some("bob")));

        assert_eq!(doc.content().as_deref(), Some("Xhello"));
        assert_eq!(doc.version(), 5);
        let batch = batches.try_recv().unwrap();
        assert_eq!(batch.origin, OpOrigin::Remote);
        assert_eq!(batch.version, 5);
        assert_eq!(batch.source.as_deref(), Some("bob"));
    }

    #[test]
    fn test_duplicate_remote_op_ignored() {
        let doc = subscribed_doc("hello", 4);
        doc.handle_frame(remote_op(3, vec![OpComponent::text_insert("content", 0, "X")], Some("bob")));
        assert_eq!(doc.content().as_deref(), Some("hello"));
        assert_eq!(doc.version(), 4);
    }

    #[test]
    fn test_remote_op_without_source_is_system() {
        let doc = subscribed_doc("hello", 0);
        let mut batches = doc.op_batches();
        doc.handle_frame(remote_op(0, vec![OpComponent::text_delete("content", 0, "h")], None));
        assert_eq!(batches.try_recv().unwrap().origin, OpOrigin::SystemInternal);
    }

    #[test]
    fn test_future_op_starts_resync() {
        let doc = subscribed_doc("hello", 4);
        doc.handle_frame(remote_op(9, vec![OpComponent::text_insert("content", 0, "X")], Some("bob")));
        // Not applied; the detached sender cannot send the refetch.
        assert_eq!(doc.content().as_deref(), Some("hello"));
        assert_eq!(doc.version(), 4);
    }

    #[tokio::test]
    async fn test_submit_detached_fails_fast() {
        let doc = subscribed_doc("hello", 0);
        let result = doc
            .submit_op(vec![OpComponent::text_insert("content", 0, "X")], Some("alice".into()))
            .await;
        assert_eq!(result, Err(DocError::Transport(TransportError::NotOpen)));
        assert_eq!(doc.content().as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_fetch_detached_fails_fast() {
        let doc = SharedDoc::detached(file_key(), "alice");
        assert_eq!(doc.fetch().await, Err(DocError::Transport(TransportError::NotOpen)));
    }

    #[tokio::test]
    async fn test_empty_submit_is_noop() {
        let doc = subscribed_doc("hello", 2);
        assert_eq!(doc.submit_op(Vec::new(), None).await, Ok(2));
    }

    #[test]
    fn test_snapshot_errors_reach_waiters() {
        let doc = SharedDoc::detached(file_key(), "alice");
        let (tx, mut rx) = oneshot::channel();
        doc.state.lock().fetch_waiters.push(tx);
        doc.handle_frame(DocFrame::Fetch {
            c: "r1".into(),
            d: "file/a.txt".into(),
            data: None,
            error: Some(FrameError::new("ERR_FORBIDDEN", "no")),
        });
        assert!(matches!(rx.try_recv(), Ok(Err(DocError::Rejected(_)))));
    }

    #[test]
    fn test_connection_lost_fails_waiters() {
        let doc = SharedDoc::detached(file_key(), "alice");
        let (tx, mut rx) = oneshot::channel();
        doc.state.lock().subscribe_waiters.push(tx);
        doc.connection_lost();
        assert_eq!(rx.try_recv(), Ok(Err(DocError::ConnectionLost)));
        assert!(!doc.is_subscribed());
    }
}
