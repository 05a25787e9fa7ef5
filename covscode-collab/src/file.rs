//! File synchronization unit: one tracked file and its shared document.
//!
//! ```text
//!  editor change ──► file_content_update() ──► translate_changes() ──► submit_op()
//!                        (per-file lock)                                   │
//!                                                                          ▼
//!  editor rewrite ◄── apply_op_batch() ◄── op batch listener ◄──── SharedDoc
//! ```
//!
//! The unit keeps its own copy of the pre-edit text. Change ranges from the
//! editor are resolved against that copy, not against the document, which
//! may already hold remote edits the editor has not seen.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use covscode_core::{DocKey, Op, OpComponent, Participant};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::editor::FileEditor;
use crate::registry::DocRegistry;
use crate::shared_doc::{DocError, OpBatch, OpOrigin, SharedDoc};

/// Field of a file document holding its text.
pub const CONTENT_FIELD: &str = "content";

/// Version-origin entries kept per file.
const VERSION_HISTORY: usize = 1024;

// ───────────────────────────────────────────────────────────────────
// Change events
// ───────────────────────────────────────────────────────────────────

/// One contiguous edit reported by the editor, in characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChange {
    pub range_offset: usize,
    pub range_length: usize,
    pub text: String,
}

impl TextChange {
    pub fn new(range_offset: usize, range_length: usize, text: impl Into<String>) -> Self {
        Self {
            range_offset,
            range_length,
            text: text.into(),
        }
    }
}

/// An editor change notification for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChangeEvent {
    pub path: String,
    pub changes: Vec<TextChange>,
    /// Caret offset captured when the change fired
    pub caret: Option<usize>,
}

impl TextChangeEvent {
    pub fn new(path: impl Into<String>, changes: Vec<TextChange>) -> Self {
        Self {
            path: path.into(),
            changes,
            caret: None,
        }
    }

    pub fn with_caret(mut self, caret: usize) -> Self {
        self.caret = Some(caret);
        self
    }
}

/// What `file_content_update` did.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    NoChanges,
    /// No live document for this file
    NoDocument,
    /// The editor already matched the document; nothing submitted
    AlreadyConverged,
    /// An external refresh was in flight; the flag was cleared instead
    SuppressedByRefresh,
    Submitted { op: Op, version: u64 },
    Failed(String),
}

/// What `apply_op_batch` did to the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Rewritten,
    Unchanged,
    /// The document has no text to show
    Skipped,
}

// ───────────────────────────────────────────────────────────────────
// Translation
// ───────────────────────────────────────────────────────────────────

fn char_slice(s: &str, start: usize, len: usize) -> Option<&str> {
    let mut indices = s.char_indices().map(|(i, _)| i).chain(std::iter::once(s.len()));
    let begin = indices.nth(start)?;
    if len == 0 {
        return Some(&s[begin..begin]);
    }
    let end = indices.nth(len - 1)?;
    Some(&s[begin..end])
}

fn splice(s: &mut String, offset: usize, remove: usize, insert: &str) {
    let start = s.char_indices().nth(offset).map_or(s.len(), |(i, _)| i);
    let end = s[start..]
        .char_indices()
        .nth(remove)
        .map_or(s.len(), |(i, _)| start + i);
    s.replace_range(start..end, insert);
}

/// Turn editor changes into one ordered op against `baseline`.
///
/// Offsets in `changes` refer to `baseline`, whatever order they arrive in.
/// They are applied from the highest offset down so that no change shifts
/// another. A deletion carries the removed text, a pure insertion lands at
/// `caret`, and a replacement becomes a deletion followed by an insertion at
/// the same offset. Returns the op and the text it produces.
pub fn translate_changes(baseline: &str, changes: &[TextChange], caret: usize) -> (Op, String) {
    let mut working = baseline.to_string();
    let mut op = Vec::new();

    let mut ordered: Vec<&TextChange> = changes.iter().collect();
    ordered.sort_by(|a, b| b.range_offset.cmp(&a.range_offset));

    for change in ordered {
        let removing = change.range_length > 0;
        let inserting = !change.text.is_empty();

        let deleted = if removing {
            match char_slice(&working, change.range_offset, change.range_length) {
                Some(text) => Some(text.to_string()),
                None => {
                    log::warn!(
                        "Change range {}+{} outside tracked text ({} chars)",
                        change.range_offset,
                        change.range_length,
                        working.chars().count()
                    );
                    continue;
                }
            }
        } else {
            None
        };

        match (deleted, inserting) {
            (Some(text), false) => {
                splice(&mut working, change.range_offset, change.range_length, "");
                op.push(OpComponent::text_delete(CONTENT_FIELD, change.range_offset, text));
            }
            (None, true) => {
                let at = caret.min(working.chars().count());
                splice(&mut working, at, 0, &change.text);
                op.push(OpComponent::text_insert(CONTENT_FIELD, at, change.text.as_str()));
            }
            (Some(text), true) => {
                splice(&mut working, change.range_offset, change.range_length, &change.text);
                op.push(OpComponent::text_delete(CONTENT_FIELD, change.range_offset, text));
                op.push(OpComponent::text_insert(CONTENT_FIELD, change.range_offset, change.text.as_str()));
            }
            (None, false) => {}
        }
    }
    (op, working)
}

// ───────────────────────────────────────────────────────────────────
// ClientFile
// ───────────────────────────────────────────────────────────────────

struct SyncState {
    /// Text as of the last translated or applied change
    content: String,
}

/// A tracked file.
pub struct ClientFile {
    path: String,
    repo_id: String,
    local_user_id: String,
    registry: Arc<DocRegistry>,
    editor: Mutex<FileEditor>,
    sync: tokio::sync::Mutex<SyncState>,
    open_users: Mutex<HashMap<String, Participant>>,
    version_origins: Mutex<BTreeMap<u64, bool>>,
    refreshing: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ClientFile {
    pub fn new(
        local_user: &Participant,
        editor: FileEditor,
        registry: Arc<DocRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            path: editor.path().to_string(),
            repo_id: local_user.repo_id.clone(),
            local_user_id: local_user.user_id.clone(),
            registry,
            editor: Mutex::new(editor),
            sync: tokio::sync::Mutex::new(SyncState { content: String::new() }),
            open_users: Mutex::new(HashMap::new()),
            version_origins: Mutex::new(BTreeMap::new()),
            refreshing: AtomicBool::new(false),
            listener: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> String {
        self.editor.lock().name().to_string()
    }

    pub fn key(&self) -> DocKey {
        DocKey::file(self.repo_id.as_str(), self.path.as_str())
    }

    pub fn editor(&self) -> FileEditor {
        self.editor.lock().clone()
    }

    pub fn is_open(&self) -> bool {
        self.editor.lock().is_open()
    }

    /// Swap the editor backing (open buffer vs. disk).
    pub fn rebind(&self, editor: FileEditor) {
        *self.editor.lock() = editor;
    }

    pub fn document(&self) -> Option<Arc<SharedDoc>> {
        self.registry.get(&self.key())
    }

    /// The pre-edit text the unit translates against.
    pub async fn tracked_content(&self) -> String {
        self.sync.lock().await.content.clone()
    }

    // ─── Open users ─────────────────────────────────────────────────

    pub fn add_open_user(&self, user: &Participant) {
        let key = user.site_id().unwrap_or(&user.user_id).to_string();
        self.open_users.lock().insert(key, user.clone());
    }

    pub fn remove_open_user(&self, user: &Participant) -> bool {
        let key = user.site_id().unwrap_or(&user.user_id);
        self.open_users.lock().remove(key).is_some()
    }

    pub fn open_users(&self) -> Vec<Participant> {
        self.open_users.lock().values().cloned().collect()
    }

    // ─── Versions ───────────────────────────────────────────────────

    fn record_origin(&self, version: u64, local: bool) {
        let mut origins = self.version_origins.lock();
        origins.insert(version, local);
        while origins.len() > VERSION_HISTORY {
            origins.pop_first();
        }
    }

    /// Whether `version` was produced by this process. `None` if unseen.
    pub fn was_local(&self, version: u64) -> Option<bool> {
        self.version_origins.lock().get(&version).copied()
    }

    // ─── Refresh flag ───────────────────────────────────────────────

    /// Mark an external refresh of the buffer as in flight.
    ///
    /// The next change event is taken to be that refresh and is not
    /// submitted.
    pub fn begin_refresh(&self) {
        self.refreshing.store(true, Ordering::SeqCst);
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    // ─── Document lifecycle ─────────────────────────────────────────

    /// Fetch, create if missing, subscribe, and attach to `doc`.
    ///
    /// A missing document is seeded with the current local text; an
    /// existing one wins and its text is pushed into the editor.
    pub async fn create_doc(self: &Arc<Self>, doc: Arc<SharedDoc>) -> Result<(), DocError> {
        let batches = doc.op_batches();
        doc.fetch().await?;

        if !doc.is_created() {
            let local = match self.editor().current_content().await {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("Seeding {} with empty text: {e}", self.path);
                    String::new()
                }
            };
            log::debug!("Creating document for {}", self.path);
            doc.create(json!({ CONTENT_FIELD: local })).await?;
        }

        let first = !doc.is_subscribed();
        doc.subscribe().await?;

        {
            let mut sync = self.sync.lock().await;
            if let Some(content) = doc.content() {
                if first {
                    let editor = self.editor();
                    match editor.current_content().await {
                        Ok(current) if current == content => {}
                        _ => {
                            if let Err(e) = editor.rewrite(&content).await {
                                log::warn!("Initial rewrite of {} failed: {e}", self.path);
                            }
                        }
                    }
                }
                sync.content = content;
            }
        }

        self.registry.add_doc(doc.clone());
        self.attach_listener(doc, batches);
        Ok(())
    }

    fn attach_listener(self: &Arc<Self>, doc: Arc<SharedDoc>, mut batches: tokio::sync::broadcast::Receiver<OpBatch>) {
        let file: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                let batch = match batches.recv().await {
                    Ok(batch) => batch,
                    Err(RecvError::Lagged(missed)) => {
                        log::warn!("Op listener for {} lagged by {missed} batches", doc.key());
                        OpBatch {
                            version: doc.version(),
                            op: Vec::new(),
                            origin: OpOrigin::SystemInternal,
                            source: None,
                        }
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(file) = file.upgrade() else {
                    break;
                };
                file.apply_op_batch(&doc, &batch).await;
            }
        });

        if let Some(previous) = self.listener.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop listening for op batches.
    pub fn detach(&self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
    }

    /// Reflect one op batch in the editor.
    pub async fn apply_op_batch(&self, doc: &SharedDoc, batch: &OpBatch) -> BatchOutcome {
        let mut sync = self.sync.lock().await;

        match batch.origin {
            OpOrigin::LocalEcho => {
                self.registry.record_version(doc.key(), batch.version);
                self.record_origin(batch.version, true);
            }
            OpOrigin::Remote | OpOrigin::SystemInternal => self.record_origin(batch.version, false),
        }

        let Some(content) = doc.content() else {
            return BatchOutcome::Skipped;
        };
        let editor = self.editor();
        let current = match editor.current_content().await {
            Ok(current) => current,
            Err(e) => {
                log::warn!("Cannot read {} to apply batch: {e}", self.path);
                return BatchOutcome::Skipped;
            }
        };

        let outcome = if current == content {
            BatchOutcome::Unchanged
        } else {
            if batch.origin == OpOrigin::LocalEcho {
                log::debug!("Editor for {} drifted from its own echo; resyncing", self.path);
            }
            if let Err(e) = editor.rewrite(&content).await {
                log::warn!("Rewrite of {} failed: {e}", self.path);
                return BatchOutcome::Skipped;
            }
            BatchOutcome::Rewritten
        };
        sync.content = content;
        outcome
    }

    // ─── Local edits ────────────────────────────────────────────────

    /// Translate an editor change into an op and submit it.
    pub async fn file_content_update(&self, event: &TextChangeEvent) -> SyncOutcome {
        if event.changes.is_empty() {
            return SyncOutcome::NoChanges;
        }

        let mut sync = self.sync.lock().await;

        let Some(doc) = self.document() else {
            log::warn!("Edit to {} dropped: no live document", self.path);
            return SyncOutcome::NoDocument;
        };
        let editor = self.editor();
        let current = match editor.current_content().await {
            Ok(current) => current,
            Err(e) => return SyncOutcome::Failed(e.to_string()),
        };
        let shared = doc.content().unwrap_or_default();

        if current == shared {
            sync.content = current;
            self.refreshing.store(false, Ordering::SeqCst);
            return SyncOutcome::AlreadyConverged;
        }

        let caret = event
            .caret
            .or_else(|| editor.caret_offset())
            .or_else(|| event.changes.first().map(|c| c.range_offset))
            .unwrap_or(0);
        let (op, _) = translate_changes(&sync.content, &event.changes, caret);
        sync.content = current.clone();

        if self.refreshing.swap(false, Ordering::SeqCst) {
            log::debug!("Change to {} is an external refresh; not submitted", self.path);
            return SyncOutcome::SuppressedByRefresh;
        }

        match doc.submit_op(op.clone(), Some(self.local_user_id.clone())).await {
            Ok(version) => {
                self.registry.record_version(doc.key(), version);
                self.record_origin(version, true);
                SyncOutcome::Submitted { op, version }
            }
            Err(DocError::Op(e)) => {
                // Lost a race with a peer: drop the edit and show the shared text
                log::warn!("Edit to {} no longer applies ({e}); dropped", self.path);
                sync.content = shared.clone();
                if let Err(e) = editor.rewrite(&shared).await {
                    log::warn!("Rewrite of {} failed: {e}", self.path);
                }
                SyncOutcome::Failed(e.to_string())
            }
            Err(e) => {
                log::warn!("Submit for {} failed: {e}", self.path);
                SyncOutcome::Failed(e.to_string())
            }
        }
    }

    /// Delete the whole tracked text from the shared document.
    ///
    /// Ok(None) when there is no document or it is already empty.
    pub async fn clear_shared_content(&self) -> Result<Option<u64>, DocError> {
        let mut sync = self.sync.lock().await;
        let Some(doc) = self.document() else {
            return Ok(None);
        };
        let content = doc.content().unwrap_or_default();
        if content.is_empty() {
            return Ok(None);
        }

        let op = vec![OpComponent::text_delete(CONTENT_FIELD, 0, content)];
        let version = doc.submit_op(op, Some(self.local_user_id.clone())).await?;
        self.registry.record_version(doc.key(), version);
        self.record_origin(version, true);
        sync.content.clear();
        Ok(Some(version))
    }
}

impl Drop for ClientFile {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for ClientFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFile")
            .field("path", &self.path)
            .field("repo_id", &self.repo_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostError, TextBuffer, Workspace};
    use crate::workspace::LocalWorkspace;
    use async_trait::async_trait;
    use covscode_core::doc::{DocFrame, DocSnapshot, JSON0_TYPE};
    use covscode_core::op;
    use std::sync::atomic::AtomicUsize;

    struct Buffer {
        path: String,
        text: Mutex<String>,
        caret: usize,
        rewrites: AtomicUsize,
    }

    impl Buffer {
        fn new(path: &str, text: &str) -> Arc<Self> {
            Arc::new(Self {
                path: path.into(),
                text: Mutex::new(text.into()),
                caret: 0,
                rewrites: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TextBuffer for Buffer {
        fn path(&self) -> &str {
            &self.path
        }
        fn text(&self) -> String {
            self.text.lock().clone()
        }
        fn caret_offset(&self) -> usize {
            self.caret
        }
        async fn rewrite(&self, content: &str) -> Result<(), HostError> {
            self.rewrites.fetch_add(1, Ordering::SeqCst);
            *self.text.lock() = content.to_string();
            Ok(())
        }
    }

    fn subscribed(path: &str, content: &str) -> Arc<SharedDoc> {
        let doc = Arc::new(SharedDoc::detached(DocKey::file("r1", path), "alice"));
        doc.handle_frame(DocFrame::Subscribe {
            c: "r1".into(),
            d: format!("file/{path}"),
            data: Some(DocSnapshot {
                v: 3,
                doc_type: Some(JSON0_TYPE.into()),
                data: Some(json!({ "content": content })),
            }),
            error: None,
        });
        doc
    }

    fn setup(editor_text: &str, doc_text: Option<&str>) -> (Arc<ClientFile>, Arc<Buffer>, Arc<DocRegistry>) {
        let registry = Arc::new(DocRegistry::new());
        let buffer = Buffer::new("a.txt", editor_text);
        let workspace: Arc<dyn Workspace> = Arc::new(LocalWorkspace::new("/nonexistent"));
        let me = Participant::with_site("alice", "s1", "r1");
        let file = ClientFile::new(&me, FileEditor::open(buffer.clone(), workspace), registry.clone());
        if let Some(text) = doc_text {
            registry.add_doc(subscribed("a.txt", text));
        }
        (file, buffer, registry)
    }

    #[test]
    fn test_deletion_carries_removed_text() {
        let (op, result) = translate_changes("hello world", &[TextChange::new(5, 6, "")], 0);
        assert_eq!(op, vec![OpComponent::text_delete("content", 5, " world")]);
        assert_eq!(result, "hello");

        let mut doc = json!({ "content": "hello world" });
        op::apply(&mut doc, &op).unwrap();
        assert_eq!(doc["content"], "hello");
    }

    #[test]
    fn test_insertion_uses_caret() {
        let (op, result) = translate_changes("hello", &[TextChange::new(0, 0, "X")], 5);
        assert_eq!(op, vec![OpComponent::text_insert("content", 5, "X")]);
        assert_eq!(result, "helloX");
    }

    #[test]
    fn test_replacement_is_delete_then_insert() {
        let (op, result) = translate_changes("hello world", &[TextChange::new(6, 5, "there")], 0);
        assert_eq!(
            op,
            vec![
                OpComponent::text_delete("content", 6, "world"),
                OpComponent::text_insert("content", 6, "there"),
            ]
        );
        assert_eq!(result, "hello there");
    }

    #[test]
    fn test_change_offsets_refer_to_pre_edit_text() {
        let ascending = [TextChange::new(0, 1, "J"), TextChange::new(6, 5, "")];
        let descending = [TextChange::new(6, 5, ""), TextChange::new(0, 1, "J")];

        let (op, result) = translate_changes("hello world", &ascending, 0);
        assert_eq!(result, "Jello ");
        assert_eq!(op, translate_changes("hello world", &descending, 0).0);
        assert_eq!(op[0], OpComponent::text_delete("content", 6, "world"));

        let mut doc = json!({ "content": "hello world" });
        op::apply(&mut doc, &op).unwrap();
        assert_eq!(doc["content"], "Jello ");
    }

    #[test]
    fn test_out_of_range_change_skipped() {
        let (op, result) = translate_changes("abc", &[TextChange::new(2, 5, "")], 0);
        assert!(op.is_empty());
        assert_eq!(result, "abc");
    }

    #[test]
    fn test_multibyte_offsets_are_chars() {
        let (op, result) = translate_changes("héllo", &[TextChange::new(1, 1, "")], 0);
        assert_eq!(op, vec![OpComponent::text_delete("content", 1, "é")]);
        assert_eq!(result, "hllo");
    }

    #[tokio::test]
    async fn test_empty_event_is_noop() {
        let (file, _, _) = setup("hello", Some("hello"));
        let outcome = file.file_content_update(&TextChangeEvent::new("a.txt", Vec::new())).await;
        assert_eq!(outcome, SyncOutcome::NoChanges);
    }

    #[tokio::test]
    async fn test_edit_without_document_aborts() {
        let (file, _, _) = setup("hello!", None);
        let event = TextChangeEvent::new("a.txt", vec![TextChange::new(5, 0, "!")]);
        assert_eq!(file.file_content_update(&event).await, SyncOutcome::NoDocument);
    }

    #[tokio::test]
    async fn test_converged_content_submits_nothing() {
        let (file, _, registry) = setup("Xhello", Some("Xhello"));
        let event = TextChangeEvent::new("a.txt", vec![TextChange::new(0, 0, "X")]);

        assert_eq!(file.file_content_update(&event).await, SyncOutcome::AlreadyConverged);
        assert_eq!(file.tracked_content().await, "Xhello");
        assert_eq!(registry.get_last_version(&file.key()), None);
    }

    #[tokio::test]
    async fn test_refresh_suppresses_submit() {
        let (file, _, _) = setup("hello!", Some("hello"));
        file.begin_refresh();
        let event = TextChangeEvent::new("a.txt", vec![TextChange::new(5, 0, "!")]).with_caret(5);

        assert_eq!(file.file_content_update(&event).await, SyncOutcome::SuppressedByRefresh);
        assert!(!file.is_refreshing());
        assert_eq!(file.tracked_content().await, "hello!");
    }

    #[tokio::test]
    async fn test_submit_failure_reported() {
        let (file, _, _) = setup("hello!", Some("hello"));
        let event = TextChangeEvent::new("a.txt", vec![TextChange::new(5, 0, "!")]).with_caret(5);
        assert!(matches!(file.file_content_update(&event).await, SyncOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_local_echo_records_version_without_rewrite() {
        let (file, buffer, registry) = setup("hello", Some("hello"));
        let doc = registry.get_doc("r1", "a.txt").unwrap();
        let batch = OpBatch {
            version: 4,
            op: Vec::new(),
            origin: OpOrigin::LocalEcho,
            source: Some("alice".into()),
        };

        assert_eq!(file.apply_op_batch(&doc, &batch).await, BatchOutcome::Unchanged);
        assert_eq!(buffer.rewrites.load(Ordering::SeqCst), 0);
        assert_eq!(registry.get_last_version(doc.key()), Some(4));
        assert_eq!(file.was_local(4), Some(true));
    }

    #[tokio::test]
    async fn test_remote_batch_rewrites_editor() {
        let (file, buffer, registry) = setup("hello", Some("Xhello"));
        let doc = registry.get_doc("r1", "a.txt").unwrap();
        let batch = OpBatch {
            version: 4,
            op: vec![OpComponent::text_insert("content", 0, "X")],
            origin: OpOrigin::Remote,
            source: Some("bob".into()),
        };

        assert_eq!(file.apply_op_batch(&doc, &batch).await, BatchOutcome::Rewritten);
        assert_eq!(buffer.text(), "Xhello");
        assert_eq!(file.tracked_content().await, "Xhello");
        assert_eq!(file.was_local(4), Some(false));
        assert_eq!(registry.get_last_version(doc.key()), None);
    }

    #[tokio::test]
    async fn test_clear_without_document() {
        let (file, _, _) = setup("hello", None);
        assert_eq!(file.clear_shared_content().await, Ok(None));
    }

    #[test]
    fn test_open_users_keyed_by_site() {
        let (file, _, _) = setup("", None);
        file.add_open_user(&Participant::with_site("bob", "s2", "r1"));
        file.add_open_user(&Participant::with_site("bob", "s3", "r1"));
        file.add_open_user(&Participant::with_site("bob", "s2", "r1"));
        assert_eq!(file.open_users().len(), 2);
        assert!(file.remove_open_user(&Participant::with_site("bob", "s2", "r1")));
        assert!(!file.remove_open_user(&Participant::with_site("bob", "s2", "r1")));
    }
}
