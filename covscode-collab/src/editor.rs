//! Per-file editor binding: an open buffer, or the file on disk.

use std::sync::Arc;

use crate::host::{HostError, TextBuffer, Workspace};

/// Where a file's live text lives.
#[derive(Clone)]
pub enum EditorBacking {
    /// Open in an editor
    Open(Arc<dyn TextBuffer>),
    /// Not open; reads and rewrites go to disk
    Closed,
}

/// Editor surface of one tracked file.
#[derive(Clone)]
pub struct FileEditor {
    path: String,
    name: String,
    backing: EditorBacking,
    workspace: Arc<dyn Workspace>,
}

impl FileEditor {
    pub fn open(buffer: Arc<dyn TextBuffer>, workspace: Arc<dyn Workspace>) -> Self {
        let path = buffer.path().to_string();
        Self {
            name: file_name(&path).to_string(),
            path,
            backing: EditorBacking::Open(buffer),
            workspace,
        }
    }

    pub fn closed(path: impl Into<String>, workspace: Arc<dyn Workspace>) -> Self {
        let path = path.into();
        Self {
            name: file_name(&path).to_string(),
            path,
            backing: EditorBacking::Closed,
            workspace,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        matches!(self.backing, EditorBacking::Open(_))
    }

    pub fn buffer(&self) -> Option<&Arc<dyn TextBuffer>> {
        match &self.backing {
            EditorBacking::Open(buffer) => Some(buffer),
            EditorBacking::Closed => None,
        }
    }

    /// Caret of the open buffer.
    pub fn caret_offset(&self) -> Option<usize> {
        self.buffer().map(|b| b.caret_offset())
    }

    pub async fn current_content(&self) -> Result<String, HostError> {
        match &self.backing {
            EditorBacking::Open(buffer) => Ok(buffer.text()),
            EditorBacking::Closed => self.workspace.read_file(&self.path).await,
        }
    }

    pub async fn rewrite(&self, content: &str) -> Result<(), HostError> {
        match &self.backing {
            EditorBacking::Open(buffer) => buffer.rewrite(content).await,
            EditorBacking::Closed => self.workspace.write_file(&self.path, content).await,
        }
    }
}

impl std::fmt::Debug for FileEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEditor")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Last segment of a `/`-separated path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').find(|s| !s.is_empty()).unwrap_or(path)
}
