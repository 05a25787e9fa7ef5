//! Local workspace and editor events, turned into session calls.
//!
//! ```text
//!   host watcher / editor ──► WorkspaceEvent ──► WorkspaceWatcher::handle()
//!                                                  │ (watcher lock)
//!        WillDelete ── clear shared text of doomed files
//!        Deleted    ── on_local_node_delete per file, then the folder
//!        Created / Renamed ── stat, broadcast NodeCreate / NodeRename
//!        editor events ── open / close / change / cursor / redraw
//! ```
//!
//! A delete arrives twice: once before the files go (so their documents can
//! still be found and emptied) and once after.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use covscode_core::Action;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::editor::file_name;
use crate::file::TextChangeEvent;
use crate::host::{NodeKind, TextBuffer};
use crate::session::RepoSession;

/// One local notification.
#[derive(Clone)]
pub enum WorkspaceEvent {
    /// A file or folder is about to be deleted
    WillDelete { path: String },
    Deleted { path: String },
    Created { path: String },
    Renamed { old_path: String, new_path: String },
    EditorOpened(Arc<dyn TextBuffer>),
    EditorClosed { path: String },
    TextChanged(TextChangeEvent),
    SelectionChanged { path: String, offset: usize },
    VisibleEditorsChanged,
}

impl std::fmt::Debug for WorkspaceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WillDelete { path } => write!(f, "WillDelete({path})"),
            Self::Deleted { path } => write!(f, "Deleted({path})"),
            Self::Created { path } => write!(f, "Created({path})"),
            Self::Renamed { old_path, new_path } => write!(f, "Renamed({old_path} -> {new_path})"),
            Self::EditorOpened(buffer) => write!(f, "EditorOpened({})", buffer.path()),
            Self::EditorClosed { path } => write!(f, "EditorClosed({path})"),
            Self::TextChanged(event) => write!(f, "TextChanged({}, {} changes)", event.path, event.changes.len()),
            Self::SelectionChanged { path, offset } => write!(f, "SelectionChanged({path}@{offset})"),
            Self::VisibleEditorsChanged => write!(f, "VisibleEditorsChanged"),
        }
    }
}

struct PendingDelete {
    kind: NodeKind,
    /// Files under a doomed folder, deepest first
    files: Vec<String>,
}

#[derive(Default)]
struct WatcherState {
    pending_deletes: HashMap<String, PendingDelete>,
}

/// Serializes local notifications into the session.
pub struct WorkspaceWatcher {
    session: Weak<RepoSession>,
    lock: tokio::sync::Mutex<WatcherState>,
}

impl WorkspaceWatcher {
    pub fn new(session: Weak<RepoSession>) -> Self {
        Self {
            session,
            lock: tokio::sync::Mutex::new(WatcherState::default()),
        }
    }

    /// Drain `events` until the sender side is dropped.
    pub fn spawn_event_loop(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<WorkspaceEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                log::trace!("Workspace event {event:?}");
                self.handle(event).await;
            }
        })
    }

    pub async fn handle(&self, event: WorkspaceEvent) {
        let Some(session) = self.session.upgrade() else {
            log::debug!("Workspace event after session ended: {event:?}");
            return;
        };
        let mut state = self.lock.lock().await;

        match event {
            WorkspaceEvent::WillDelete { path } => self.before_delete(&session, &mut state, path).await,
            WorkspaceEvent::Deleted { path } => self.after_delete(&session, &mut state, path).await,
            WorkspaceEvent::Created { path } => {
                let Some(kind) = session.workspace().stat(&path).await else {
                    log::debug!("Created {path} vanished before it could be shared");
                    return;
                };
                session.broadcast(Action::node_create(
                    session.local_user(),
                    path.as_str(),
                    file_name(&path),
                    kind.is_file(),
                ));
            }
            WorkspaceEvent::Renamed { old_path, new_path } => {
                let Some(kind) = session.workspace().stat(&new_path).await else {
                    log::debug!("Renamed {new_path} vanished before it could be shared");
                    return;
                };
                session.broadcast(Action::node_rename(
                    session.local_user(),
                    old_path.as_str(),
                    file_name(&old_path),
                    kind.is_file(),
                    file_name(&new_path),
                ));
            }
            WorkspaceEvent::EditorOpened(buffer) => session.on_local_file_open(buffer).await,
            WorkspaceEvent::EditorClosed { path } => session.on_local_file_close(&path).await,
            WorkspaceEvent::TextChanged(event) => {
                let caret = match event.caret {
                    Some(caret) => Some(caret),
                    None => session.file(&event.path).await.and_then(|f| f.editor().caret_offset()),
                };
                if let Some(caret) = caret {
                    session.on_local_cursor_move(&event.path, caret).await;
                }
                if let Some(outcome) = session.on_local_file_change(&event).await {
                    log::trace!("Change to {}: {outcome:?}", event.path);
                }
            }
            WorkspaceEvent::SelectionChanged { path, offset } => {
                session.on_local_cursor_move(&path, offset).await;
            }
            WorkspaceEvent::VisibleEditorsChanged => session.redraw_cursors(),
        }
    }

    async fn before_delete(&self, session: &RepoSession, state: &mut WatcherState, path: String) {
        let Some(kind) = session.workspace().stat(&path).await else {
            log::debug!("Pending delete of missing {path}");
            return;
        };

        let files = match kind {
            NodeKind::File => vec![path.clone()],
            NodeKind::Folder => match session.workspace().list_files(&path).await {
                Ok(files) => files,
                Err(e) => {
                    log::warn!("Cannot enumerate {path} before delete: {e}");
                    Vec::new()
                }
            },
        };

        for file_path in &files {
            let Some(file) = session.file(file_path).await else {
                continue;
            };
            match file.clear_shared_content().await {
                Ok(Some(version)) => log::debug!("Cleared shared text of {file_path} at v{version}"),
                Ok(None) => {}
                Err(e) => log::warn!("Clearing shared text of {file_path} failed: {e}"),
            }
        }

        let files = if kind == NodeKind::Folder { files } else { Vec::new() };
        state.pending_deletes.insert(path, PendingDelete { kind, files });
    }

    async fn after_delete(&self, session: &RepoSession, state: &mut WatcherState, path: String) {
        let name = file_name(&path).to_string();
        match state.pending_deletes.remove(&path) {
            Some(PendingDelete { kind: NodeKind::Folder, files }) => {
                for file_path in &files {
                    session.on_local_node_delete(file_path, file_name(file_path), true).await;
                }
                session.on_local_node_delete(&path, &name, false).await;
            }
            Some(PendingDelete { kind: NodeKind::File, .. }) => {
                session.on_local_node_delete(&path, &name, true).await;
            }
            None => {
                // No pre-delete notice: tracked paths are files, the rest folders
                let is_file = session.file(&path).await.is_some();
                session.on_local_node_delete(&path, &name, is_file).await;
            }
        }
    }
}
