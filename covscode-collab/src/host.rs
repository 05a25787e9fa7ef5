//! Collaborator surfaces the session drives but does not implement.
//!
//! ```text
//!              ┌──────────────┐
//!              │ RepoSession  │
//!              └──┬────┬────┬─┘
//!      rewrite()  │    │    │  notifications
//!   ┌─────────────▼┐ ┌─▼────▼──────┐ ┌───────────┐
//!   │ TextBuffer   │ │ Workspace   │ │ SessionUi │
//!   │ (open file)  │ │ (fs + zip)  │ │           │
//!   └──────────────┘ └─────────────┘ └───────────┘
//! ```
//!
//! Paths crossing these traits are workspace-relative with `/` separators.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use covscode_core::Participant;

use crate::presence::CursorInfo;

/// An editor buffer for a file the local user has open.
#[async_trait]
pub trait TextBuffer: Send + Sync {
    /// Workspace-relative path
    fn path(&self) -> &str;

    /// Current buffer contents.
    fn text(&self) -> String;

    /// Character offset of the primary caret.
    fn caret_offset(&self) -> usize;

    /// Replace the whole buffer.
    async fn rewrite(&self, content: &str) -> Result<(), HostError>;
}

/// File or folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Folder,
}

impl NodeKind {
    pub fn is_file(self) -> bool {
        self == Self::File
    }
}

/// The local repository tree.
#[async_trait]
pub trait Workspace: Send + Sync {
    fn root(&self) -> &Path;

    /// `absolute` relative to the root, `/`-separated.
    fn relative_path(&self, absolute: &Path) -> String {
        let relative = absolute.strip_prefix(self.root()).unwrap_or(absolute);
        relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    fn absolute_path(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root().to_path_buf(), |path, part| path.join(part))
    }

    /// `None` when nothing exists at `relative`.
    async fn stat(&self, relative: &str) -> Option<NodeKind>;

    async fn read_file(&self, relative: &str) -> Result<String, HostError>;

    async fn write_file(&self, relative: &str, content: &str) -> Result<(), HostError>;

    /// Create a folder (with parents) or an empty file.
    async fn create_node(&self, relative: &str, is_file: bool) -> Result<(), HostError>;

    async fn delete_node(&self, relative: &str, is_file: bool) -> Result<(), HostError>;

    /// Rename within the same parent folder.
    async fn rename_node(&self, relative: &str, new_name: &str) -> Result<(), HostError>;

    /// Every file under the folder `relative`, deepest path first.
    async fn list_files(&self, relative: &str) -> Result<Vec<String>, HostError>;

    /// Zip the whole tree.
    async fn archive(&self) -> Result<Vec<u8>, HostError>;

    /// Unpack a zip over the tree, overwriting existing files.
    async fn unarchive(&self, data: &[u8]) -> Result<(), HostError>;
}

/// User-facing notifications. Every method defaults to doing nothing.
#[allow(unused_variables)]
pub trait SessionUi: Send + Sync {
    fn start_progress(&self) {}
    fn clean_progress(&self) {}
    fn finish_init(&self, local: &Participant, roster: &[Participant]) {}
    fn local_leave(&self) {}
    fn user_joined(&self, user: &Participant, roster: &[Participant]) {}
    fn user_left(&self, user: &Participant, roster: &[Participant]) {}
    fn file_opened(&self, path: &str, user: &Participant) {}
    fn file_closed(&self, path: &str, user: &Participant) {}
    fn node_created(&self, path: &str, user: &Participant, is_file: bool) {}
    fn node_deleted(&self, path: &str, user: &Participant, is_file: bool) {}
    fn node_renamed(&self, path: &str, new_name: &str, user: &Participant, is_file: bool) {}
    /// Redraw remote cursors in visible editors.
    fn render_cursors(&self, cursors: &[CursorInfo]) {}
    fn notify_error(&self, message: &str) {}
}

/// A [`SessionUi`] that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUi;

impl SessionUi for NoopUi {}

/// Host surface errors.
#[derive(Debug, Clone, PartialEq)]
pub enum HostError {
    Io(String),
    Archive(String),
    /// A path escaping the workspace or naming nothing
    InvalidPath(String),
    Editor(String),
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Archive(e) => write!(f, "Archive error: {e}"),
            Self::InvalidPath(p) => write!(f, "Invalid path: {p}"),
            Self::Editor(e) => write!(f, "Editor error: {e}"),
        }
    }
}

impl std::error::Error for HostError {}

impl From<std::io::Error> for HostError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<zip::result::ZipError> for HostError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}

impl From<walkdir::Error> for HostError {
    fn from(e: walkdir::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<tokio::task::JoinError> for HostError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Io(format!("blocking task failed: {e}"))
    }
}
