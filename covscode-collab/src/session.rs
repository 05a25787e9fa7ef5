//! Repository session coordinator.
//!
//! ```text
//!                        connect_repo()
//!   Disconnected ──► Connecting ──────────────► Active ──► Closing ──► Disconnected
//!        ▲               │  control + docs connect     close_repo()        │
//!        │               │  wait SiteIdMessage                             │
//!        │               │  Create: SessionInit(archive)                   │
//!        │               │  Join:   SessionJoin, wait ZippedDataMessage    │
//!        └───────────────┴──── failure / control connection lost ◄────────┘
//! ```
//!
//! One dispatcher task drains control events in wire order. Every inbound
//! message is handled under the repository lock, which also guards every
//! local handler that touches the roster or the file table.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use covscode_core::{Action, ActionEnvelope, ActionKind, DocKey, Message, Participant, ZippedDataMessage};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{SessionConfig, SessionMode};
use crate::editor::FileEditor;
use crate::error::SessionError;
use crate::file::{ClientFile, SyncOutcome, TextChangeEvent};
use crate::host::{HostError, SessionUi, TextBuffer, Workspace};
use crate::presence::{cursor_removal_op, cursor_update_op, empty_presence, CursorInfo, PresenceState};
use crate::registry::DocRegistry;
use crate::shared_doc::{DocError, SharedDoc};
use crate::signal::{signal, Signal, SignalError, SignalWaiter};
use crate::transport::{ControlConnection, DocConnection, ReadyState, TransportError, TransportEvent};
use crate::watcher::{WorkspaceEvent, WorkspaceWatcher};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    Active,
    Closing,
}

struct RepoState {
    /// Ordered by join time
    roster: Vec<Participant>,
    files: HashMap<String, Arc<ClientFile>>,
}

type SnapshotResult = Result<(), HostError>;

#[derive(Default)]
struct Handshake {
    site_id: Option<Signal<String>>,
    snapshot: Option<Signal<SnapshotResult>>,
}

struct ListenerSet {
    watcher: Arc<WorkspaceWatcher>,
    sender: mpsc::UnboundedSender<WorkspaceEvent>,
    task: JoinHandle<()>,
}

/// A participant's session in one repository.
pub struct RepoSession {
    me: Weak<RepoSession>,
    config: SessionConfig,
    local: Mutex<Participant>,
    phase: Mutex<SessionPhase>,
    control: ControlConnection,
    control_events: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    docs: DocConnection,
    registry: Arc<DocRegistry>,
    workspace: Arc<dyn Workspace>,
    ui: Arc<dyn SessionUi>,
    repo: tokio::sync::Mutex<RepoState>,
    handshake: Mutex<Handshake>,
    presence: Mutex<PresenceState>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    presence_listener: Mutex<Option<JoinHandle<()>>>,
    listeners: Mutex<Option<ListenerSet>>,
}

impl RepoSession {
    pub fn new(
        config: SessionConfig,
        workspace: Arc<dyn Workspace>,
        ui: Arc<dyn SessionUi>,
    ) -> Result<Arc<Self>, SessionError> {
        config.validate()?;
        let mut control = ControlConnection::new(&config.server_address, config.close_timeout());
        let control_events = control.take_event_rx();
        let docs = DocConnection::new(&config.server_address, config.close_timeout(), config.user_id.clone());
        let local = Participant::new(config.user_id.clone(), config.repo_id.clone());

        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            config,
            local: Mutex::new(local),
            phase: Mutex::new(SessionPhase::Disconnected),
            control,
            control_events: Mutex::new(control_events),
            docs,
            registry: Arc::new(DocRegistry::new()),
            workspace,
            ui,
            repo: tokio::sync::Mutex::new(RepoState {
                roster: Vec::new(),
                files: HashMap::new(),
            }),
            handshake: Mutex::new(Handshake::default()),
            presence: Mutex::new(PresenceState::new()),
            dispatcher: Mutex::new(None),
            presence_listener: Mutex::new(None),
            listeners: Mutex::new(None),
        }))
    }

    // ───── Accessors ─────

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: SessionPhase) {
        *self.phase.lock() = phase;
    }

    /// The local participant; carries a site id once assigned.
    pub fn local_user(&self) -> Participant {
        self.local.lock().clone()
    }

    pub async fn roster(&self) -> Vec<Participant> {
        self.repo.lock().await.roster.clone()
    }

    pub async fn file(&self, path: &str) -> Option<Arc<ClientFile>> {
        self.repo.lock().await.files.get(path).cloned()
    }

    pub async fn tracked_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.repo.lock().await.files.keys().cloned().collect();
        paths.sort_unstable();
        paths
    }

    pub fn presence_cursors(&self) -> Vec<CursorInfo> {
        self.presence.lock().cursors().to_vec()
    }

    pub fn registry(&self) -> &Arc<DocRegistry> {
        &self.registry
    }

    pub fn workspace(&self) -> &Arc<dyn Workspace> {
        &self.workspace
    }

    pub fn ui(&self) -> &Arc<dyn SessionUi> {
        &self.ui
    }

    /// Feed for local workspace events while the session is active.
    pub fn events(&self) -> Option<mpsc::UnboundedSender<WorkspaceEvent>> {
        self.listeners.lock().as_ref().map(|set| set.sender.clone())
    }

    pub fn watcher(&self) -> Option<Arc<WorkspaceWatcher>> {
        self.listeners.lock().as_ref().map(|set| set.watcher.clone())
    }

    // ───── Connect ─────

    /// Enter the repository: create it from the local tree or join it.
    pub async fn connect_repo(&self) -> Result<(), SessionError> {
        {
            let mut phase = self.phase.lock();
            match *phase {
                SessionPhase::Disconnected => *phase = SessionPhase::Connecting,
                other => return Err(SessionError::InvalidPhase(other)),
            }
        }
        self.ui.start_progress();

        let result = match self.establish().await {
            Ok(()) if self.control.ready_state() != ReadyState::Open => {
                Err(SessionError::Transport(TransportError::NotOpen))
            }
            other => other,
        };
        match result {
            Ok(()) => {
                self.set_phase(SessionPhase::Active);
                log::info!("Session active in {} as {}", self.config.repo_id, self.local_user().label());
                Ok(())
            }
            Err(e) => {
                log::warn!("Connect to {} failed: {e}", self.config.repo_id);
                self.ui.clean_progress();
                self.fail_handshake("connect abandoned");
                self.shutdown_transports().await;
                self.teardown_local().await;
                self.set_phase(SessionPhase::Disconnected);
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<(), SessionError> {
        self.ensure_dispatcher();
        self.local.lock().site_id = None;
        let mode = self.config.mode;
        let (site_waiter, snapshot_waiter) = self.arm_handshake(mode);
        let limit = self.config.handshake_timeout();

        self.control.connect().await?;
        self.docs.connect().await?;
        let site_id = site_waiter.wait_timeout(limit).await?;
        log::debug!("Assigned site id {site_id}");
        let local = self.local_user();

        match mode {
            SessionMode::Create => {
                let roster = vec![local.clone()];
                self.repo.lock().await.roster = roster.clone();
                let archive = self.workspace.archive().await?;
                log::info!("Publishing {} ({} byte archive)", self.config.repo_id, archive.len());
                self.control.send_data(Action::session_init(local.clone(), archive));
                self.ui.finish_init(&local, &roster);
            }
            SessionMode::Join => {
                let Some(snapshot) = snapshot_waiter else {
                    return Err(SessionError::Handshake(SignalError::Abandoned));
                };
                self.control.send_data(Action::session_join(local.clone()));
                snapshot.wait_timeout(limit).await??;
                let roster = self.roster().await;
                self.ui.finish_init(&local, &roster);
            }
        }

        self.attach_listeners();
        if let Err(e) = self.attach_presence().await {
            log::warn!("Presence document for {} unavailable: {e}", self.config.repo_id);
        }
        Ok(())
    }

    /// Fresh handshake signals for one connect attempt.
    fn arm_handshake(&self, mode: SessionMode) -> (SignalWaiter<String>, Option<SignalWaiter<SnapshotResult>>) {
        let (site_signal, site_waiter) = signal();
        let mut handshake = self.handshake.lock();
        handshake.site_id = Some(site_signal);
        match mode {
            SessionMode::Create => {
                handshake.snapshot = None;
                (site_waiter, None)
            }
            SessionMode::Join => {
                let (snapshot_signal, snapshot_waiter) = signal();
                handshake.snapshot = Some(snapshot_signal);
                (site_waiter, Some(snapshot_waiter))
            }
        }
    }

    fn fail_handshake(&self, reason: &str) {
        let (site_id, snapshot) = {
            let mut handshake = self.handshake.lock();
            (handshake.site_id.take(), handshake.snapshot.take())
        };
        if let Some(signal) = site_id {
            signal.fail(reason);
        }
        if let Some(signal) = snapshot {
            signal.fail(reason);
        }
    }

    fn ensure_dispatcher(&self) {
        let mut slot = self.dispatcher.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let Some(mut events) = self.control_events.lock().take() else {
            return;
        };

        let me = self.me.clone();
        *slot = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(session) = me.upgrade() else {
                    break;
                };
                session.on_transport_event(event).await;
            }
            log::debug!("Control dispatcher finished");
        }));
    }

    async fn on_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Message(message) => self.on_message(message).await,
            TransportEvent::Error(TransportError::Decode(e)) => {
                log::warn!("Dropping undecodable control frame: {e}");
            }
            TransportEvent::Error(TransportError::NotOpen) => {
                log::debug!("Control send attempted while closed");
            }
            TransportEvent::Error(e) => {
                log::warn!("Control connection error: {e}");
                if self.phase() == SessionPhase::Active && self.control.ready_state() == ReadyState::Open {
                    self.ui.notify_error(&e.to_string());
                }
            }
            TransportEvent::Close { requested: true } => {
                log::debug!("Control connection closed on request");
            }
            TransportEvent::Close { requested: false } => {
                self.on_transport_lost("control connection closed by the server").await;
            }
        }
    }

    /// The control connection dropped: tear everything down, no reconnect.
    async fn on_transport_lost(&self, reason: &str) {
        self.fail_handshake(reason);
        {
            let mut phase = self.phase.lock();
            if *phase != SessionPhase::Active {
                return;
            }
            *phase = SessionPhase::Closing;
        }

        log::warn!("Session in {} lost: {reason}", self.config.repo_id);
        self.shutdown_transports().await;
        self.teardown_local().await;
        self.ui.local_leave();
        self.ui.notify_error(&format!("Disconnected: {reason}"));
        self.set_phase(SessionPhase::Disconnected);
    }

    // ───── Inbound ─────

    /// Handle one control message. Never fails; problems are logged or
    /// shown through the UI.
    pub async fn on_message(&self, message: Message) {
        let mut repo = self.repo.lock().await;
        match message {
            Message::SiteIdentity(identity) => self.on_site_identity(identity.site_id),
            Message::ZippedSnapshot(snapshot) => self.on_snapshot(&mut repo, snapshot).await,
            Message::Envelope(envelope) => self.on_envelope(&mut repo, envelope).await,
        }
    }

    fn on_site_identity(&self, site_id: String) {
        let Some(signal) = self.handshake.lock().site_id.take() else {
            log::warn!("Unexpected site id {site_id}: no connect in progress");
            return;
        };
        {
            let mut local = self.local.lock();
            if local.site_id.is_none() {
                local.site_id = Some(site_id.clone());
            }
        }
        signal.resolve(site_id);
    }

    async fn on_snapshot(&self, repo: &mut RepoState, snapshot: ZippedDataMessage) {
        let Some(signal) = self.handshake.lock().snapshot.take() else {
            log::warn!("Unexpected snapshot of {}: not joining", snapshot.repo_id);
            return;
        };

        log::info!(
            "Snapshot of {}: {} participants, {} byte archive",
            snapshot.repo_id,
            snapshot.users.len(),
            snapshot.data.len()
        );
        repo.roster = snapshot.users;
        let result = self.workspace.unarchive(&snapshot.data).await;
        if let Err(e) = &result {
            log::error!("Unpacking {} failed: {e}", snapshot.repo_id);
        }
        signal.resolve(result);
    }

    async fn on_envelope(&self, repo: &mut RepoState, envelope: ActionEnvelope) {
        let local = self.local_user();
        let action = envelope.data;

        if !envelope.is_successful {
            let reason = format!(
                "{} rejected: {}",
                action.wire_name(),
                envelope
                    .error_message
                    .or(envelope.error_code)
                    .unwrap_or_else(|| "no reason given".to_string())
            );
            log::warn!("{reason}");
            self.ui.notify_error(&reason);
            let own = action.client_user.as_ref().map_or(true, |user| user.same_site(&local));
            if own && action.kind == ActionKind::SessionJoin {
                if let Some(signal) = self.handshake.lock().snapshot.take() {
                    signal.fail(reason);
                }
            }
            return;
        }

        let Some(user) = action.client_user else {
            log::debug!("{} without a participant ignored", action.kind.wire_name());
            return;
        };
        if user.same_site(&local) {
            log::trace!("Ignoring echo of own {}", action.kind.wire_name());
            return;
        }

        match action.kind {
            ActionKind::SessionInit { .. } => {
                log::debug!("SessionInit from {} is server-internal; ignored", user.label());
            }
            ActionKind::SessionJoin => {
                if !repo.roster.iter().any(|p| p.same_site(&user)) {
                    repo.roster.push(user.clone());
                }
                log::info!("{} joined {}", user.label(), self.config.repo_id);
                self.ui.user_joined(&user, &repo.roster);
            }
            ActionKind::SessionLeave => {
                let before = repo.roster.len();
                repo.roster.retain(|p| !p.same_site(&user));
                for file in repo.files.values() {
                    file.remove_open_user(&user);
                }
                if self.presence.lock().remove(&user) {
                    self.render_cursors();
                }
                if repo.roster.len() != before {
                    log::info!("{} left {}", user.label(), self.config.repo_id);
                    self.ui.user_left(&user, &repo.roster);
                } else {
                    log::debug!("Leave from {} who was not in the roster", user.label());
                }
            }
            ActionKind::NodeCreate { path, is_file, .. } => {
                match self.workspace.create_node(&path, is_file).await {
                    Ok(()) => self.ui.node_created(&path, &user, is_file),
                    Err(e) => self.report(&format!("Cannot create {path}: {e}")),
                }
            }
            ActionKind::NodeDelete { path, is_file, .. } => {
                self.untrack(repo, &path);
                match self.workspace.delete_node(&path, is_file).await {
                    Ok(()) => self.ui.node_deleted(&path, &user, is_file),
                    Err(e) => self.report(&format!("Cannot delete {path}: {e}")),
                }
            }
            ActionKind::NodeRename { path, is_file, new_name, .. } => {
                match self.workspace.rename_node(&path, &new_name).await {
                    Ok(()) => self.ui.node_renamed(&path, &new_name, &user, is_file),
                    Err(e) => self.report(&format!("Cannot rename {path}: {e}")),
                }
            }
            ActionKind::FileClose { path, .. } => {
                if let Some(file) = repo.files.get(&path) {
                    file.remove_open_user(&user);
                }
                self.ui.file_closed(&path, &user);
            }
            ActionKind::FileOpen { path, .. } => {
                if let Some(file) = repo.files.get(&path) {
                    file.add_open_user(&user);
                } else {
                    let editor = FileEditor::closed(path.clone(), self.workspace.clone());
                    let file = ClientFile::new(&local, editor, self.registry.clone());
                    file.add_open_user(&user);
                    repo.files.insert(path.clone(), file.clone());

                    let doc = self.docs.get(&file.key());
                    match file.create_doc(doc.clone()).await {
                        Ok(()) => self.registry.set_last_version(&doc),
                        Err(e) => log::warn!("Document for {path} not attached: {e}"),
                    }
                }
                self.ui.file_opened(&path, &user);
            }
        }
    }

    fn report(&self, message: &str) {
        log::warn!("{message}");
        self.ui.notify_error(message);
    }

    /// Drop `path` and anything under it from the file table.
    fn untrack(&self, repo: &mut RepoState, path: &str) -> usize {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let doomed: Vec<String> = repo
            .files
            .keys()
            .filter(|p| p.as_str() == path || p.starts_with(&prefix))
            .cloned()
            .collect();

        for p in &doomed {
            if let Some(file) = repo.files.remove(p) {
                file.detach();
                self.registry.remove_doc(&self.config.repo_id, p);
                self.docs.forget(&file.key());
                log::debug!("Stopped tracking {p}");
            }
        }
        doomed.len()
    }

    // ───── Outbound ─────

    /// Send an action to the other participants.
    pub fn broadcast(&self, action: Action) {
        self.control.send_data(action);
    }

    /// The local user opened `buffer` in an editor.
    pub async fn on_local_file_open(&self, buffer: Arc<dyn TextBuffer>) {
        let path = buffer.path().to_string();
        let editor = FileEditor::open(buffer, self.workspace.clone());
        let local = self.local_user();

        let mut repo = self.repo.lock().await;
        let file = match repo.files.get(&path) {
            Some(file) => {
                file.rebind(editor);
                file.clone()
            }
            None => {
                let file = ClientFile::new(&local, editor, self.registry.clone());
                repo.files.insert(path.clone(), file.clone());
                file
            }
        };

        if file.document().is_none() {
            let doc = self.docs.get(&file.key());
            if let Err(e) = file.create_doc(doc).await {
                log::warn!("Document for {path} not attached: {e}");
            }
        }
        self.broadcast(Action::file_open(local, path.as_str(), file.name()));
    }

    /// The local user closed the editor for `path`.
    pub async fn on_local_file_close(&self, path: &str) {
        let repo = self.repo.lock().await;
        let Some(file) = repo.files.get(path) else {
            log::trace!("Close of untracked {path}");
            return;
        };
        if !file.is_open() {
            return;
        }
        file.rebind(FileEditor::closed(path, self.workspace.clone()));
        self.broadcast(Action::file_close(self.local_user(), path, file.name()));
    }

    /// Route an editor change to its file. `None` when the file is untracked.
    pub async fn on_local_file_change(&self, event: &TextChangeEvent) -> Option<SyncOutcome> {
        let file = self.file(&event.path).await;
        let Some(file) = file else {
            log::trace!("Change to untracked {}", event.path);
            return None;
        };
        Some(file.file_content_update(event).await)
    }

    /// Publish the local caret and redraw.
    pub async fn on_local_cursor_move(&self, path: &str, offset: usize) {
        let local = self.local_user();
        let Some(doc) = self.registry.get_repo_doc(&local.repo_id) else {
            log::trace!("Cursor move before the presence document is ready");
            return;
        };

        let info = CursorInfo::new(local.clone(), path, offset);
        match cursor_update_op(&doc.data(), &info) {
            Ok(op) => {
                if let Err(e) = doc.submit_op(op, None).await {
                    log::warn!("Cursor update for {path} failed: {e}");
                }
            }
            Err(e) => {
                log::debug!("Cursor move not shared: {e}");
                return;
            }
        }

        if let Err(e) = self.presence.lock().update(&local, path, offset) {
            log::debug!("Local cursor not tracked: {e}");
        }
        self.render_cursors();
    }

    /// A local file or folder is gone.
    pub async fn on_local_node_delete(&self, path: &str, name: &str, is_file: bool) {
        {
            let mut repo = self.repo.lock().await;
            self.untrack(&mut repo, path);
        }
        self.broadcast(Action::node_delete(self.local_user(), path, name, is_file));
    }

    /// Ask the UI to draw the current cursors again.
    pub fn redraw_cursors(&self) {
        self.render_cursors();
    }

    fn render_cursors(&self) {
        let cursors = self.presence_cursors();
        self.ui.render_cursors(&cursors);
    }

    // ───── Presence document ─────

    async fn attach_presence(&self) -> Result<(), DocError> {
        let doc = self.docs.get(&DocKey::presence(self.config.repo_id.as_str()));
        let mut batches = doc.op_batches();

        doc.fetch().await?;
        if !doc.is_created() {
            doc.create(empty_presence()).await?;
        }
        doc.subscribe().await?;
        self.registry.add_repo_doc(doc.clone());
        self.presence.lock().rebuild(&doc.data());
        self.render_cursors();

        let me = self.me.clone();
        let listening: Arc<SharedDoc> = doc.clone();
        let handle = tokio::spawn(async move {
            loop {
                match batches.recv().await {
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => log::debug!("Presence listener lagged by {missed}"),
                    Err(RecvError::Closed) => break,
                }
                let Some(session) = me.upgrade() else {
                    break;
                };
                session.presence.lock().rebuild(&listening.data());
                session.render_cursors();
            }
        });
        if let Some(previous) = self.presence_listener.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    // ───── Local listeners ─────

    fn attach_listeners(&self) {
        self.detach_listeners();
        let watcher = Arc::new(WorkspaceWatcher::new(self.me.clone()));
        let (sender, events) = mpsc::unbounded_channel();
        let task = watcher.clone().spawn_event_loop(events);
        *self.listeners.lock() = Some(ListenerSet { watcher, sender, task });
    }

    fn detach_listeners(&self) {
        if let Some(set) = self.listeners.lock().take() {
            set.task.abort();
        }
    }

    // ───── Close ─────

    /// Leave the repository cleanly.
    ///
    /// Ok without doing anything when already disconnected.
    pub async fn close_repo(&self) -> Result<(), SessionError> {
        {
            let mut phase = self.phase.lock();
            match *phase {
                SessionPhase::Active => *phase = SessionPhase::Closing,
                SessionPhase::Disconnected => return Ok(()),
                other => return Err(SessionError::InvalidPhase(other)),
            }
        }
        let local = self.local_user();
        log::info!("Leaving {}", self.config.repo_id);

        let open: Vec<String> = {
            let repo = self.repo.lock().await;
            let mut open: Vec<String> = repo
                .files
                .values()
                .filter(|f| f.is_open())
                .map(|f| f.path().to_string())
                .collect();
            open.sort_unstable();
            open
        };
        for path in &open {
            self.on_local_file_close(path).await;
        }

        {
            let mut repo = self.repo.lock().await;
            repo.roster.clear();
            for (_, file) in repo.files.drain() {
                file.detach();
            }
        }

        if let (Some(site_id), Some(doc)) = (local.site_id(), self.registry.get_repo_doc(&local.repo_id)) {
            if let Some(op) = cursor_removal_op(&doc.data(), site_id) {
                if let Err(e) = doc.submit_op(op, None).await {
                    log::warn!("Removing own cursor failed: {e}");
                }
            }
        }

        self.broadcast(Action::session_leave(local));
        self.shutdown_transports().await;
        self.ui.local_leave();
        self.teardown_local().await;
        self.set_phase(SessionPhase::Disconnected);
        Ok(())
    }

    async fn shutdown_transports(&self) {
        if let Err(e) = self.docs.close().await {
            log::debug!("Document connection close: {e}");
        }
        if let Err(e) = self.control.close().await {
            log::debug!("Control connection close: {e}");
        }
    }

    async fn teardown_local(&self) {
        {
            let mut repo = self.repo.lock().await;
            repo.roster.clear();
            for (_, file) in repo.files.drain() {
                file.detach();
            }
        }
        self.detach_listeners();
        if let Some(handle) = self.presence_listener.lock().take() {
            handle.abort();
        }
        self.registry.clear();
        self.docs.clear();
        self.presence.lock().reset();
    }
}

impl Drop for RepoSession {
    fn drop(&mut self) {
        if let Some(task) = self.dispatcher.get_mut().take() {
            task.abort();
        }
        if let Some(task) = self.presence_listener.get_mut().take() {
            task.abort();
        }
        if let Some(set) = self.listeners.get_mut().take() {
            set.task.abort();
        }
    }
}

impl std::fmt::Debug for RepoSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoSession")
            .field("repo_id", &self.config.repo_id)
            .field("phase", &self.phase())
            .finish()
    }
}
