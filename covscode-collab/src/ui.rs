//! A [`SessionUi`] that reports through the `log` facade.

use covscode_core::Participant;
use parking_lot::Mutex;

use crate::host::SessionUi;
use crate::presence::CursorInfo;

/// Status line shown once a session is initialised.
pub fn status_text(local: &Participant) -> String {
    format!(
        "RepoId: {}, SiteId: {}",
        local.repo_id,
        local.site_id().unwrap_or("-")
    )
}

/// Headless UI for the session binary.
#[derive(Debug, Default)]
pub struct LogUi {
    status: Mutex<Option<String>>,
}

impl LogUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<String> {
        self.status.lock().clone()
    }
}

impl SessionUi for LogUi {
    fn start_progress(&self) {
        log::info!("Connecting...");
    }

    fn clean_progress(&self) {
        log::debug!("Connect attempt finished");
    }

    fn finish_init(&self, local: &Participant, roster: &[Participant]) {
        let status = status_text(local);
        log::info!("{status} ({} participants)", roster.len());
        *self.status.lock() = Some(status);
    }

    fn local_leave(&self) {
        log::info!("Left the repository");
        self.status.lock().take();
    }

    fn user_joined(&self, user: &Participant, roster: &[Participant]) {
        log::info!("{} joined, {} participants", user.label(), roster.len());
    }

    fn user_left(&self, user: &Participant, roster: &[Participant]) {
        log::info!("{} left, {} participants", user.label(), roster.len());
    }

    fn file_opened(&self, path: &str, user: &Participant) {
        log::info!("{} opened {path}", user.label());
    }

    fn file_closed(&self, path: &str, user: &Participant) {
        log::info!("{} closed {path}", user.label());
    }

    fn node_created(&self, path: &str, user: &Participant, is_file: bool) {
        let kind = if is_file { "file" } else { "folder" };
        log::info!("{} created {kind} {path}", user.label());
    }

    fn node_deleted(&self, path: &str, user: &Participant, _is_file: bool) {
        log::info!("{} deleted {path}", user.label());
    }

    fn node_renamed(&self, path: &str, new_name: &str, user: &Participant, _is_file: bool) {
        log::info!("{} renamed {path} to {new_name}", user.label());
    }

    fn render_cursors(&self, cursors: &[CursorInfo]) {
        for cursor in cursors {
            log::trace!(
                "Cursor {} at {}:{}",
                cursor.user.label(),
                cursor.cursor_position.file_path,
                cursor.cursor_position.position
            );
        }
    }

    fn notify_error(&self, message: &str) {
        log::error!("{message}");
    }
}
