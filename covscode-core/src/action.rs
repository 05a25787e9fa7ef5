//! Session and file-tree actions.
//!
//! Wire format (JSON, discriminated by `actionType`):
//! ```text
//! {
//!   "actionType": "NodeRenameAction",
//!   "clientUser": { "userId": "...", "siteId": "...", "repoId": "..." },
//!   "time": "2024-05-01T12:00:00.000Z",
//!   "path": "src/a.txt", "name": "a.txt", "isFile": true, "newName": "b.txt"
//! }
//! ```
//!
//! File and node actions always carry a path; a rename always carries both
//! names. The type makes the path-less shapes unrepresentable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::encoding::binary_string;
use crate::identity::Participant;

/// An action plus the participant who performed it and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_user: Option<Participant>,
    pub time: DateTime<Utc>,
}

/// Action variants, one per `actionType` wire string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "actionType")]
pub enum ActionKind {
    /// Repository creation; carries the archived workspace. Server-internal.
    #[serde(rename = "SessionInitAction")]
    SessionInit {
        #[serde(with = "binary_string", default)]
        content: Vec<u8>,
    },
    #[serde(rename = "SessionJoinAction")]
    SessionJoin,
    #[serde(rename = "SessionLeaveAction")]
    SessionLeave,
    #[serde(rename = "FileOpenAction")]
    FileOpen { path: String, name: String },
    #[serde(rename = "FileCloseAction")]
    FileClose { path: String, name: String },
    #[serde(rename = "NodeCreateAction", rename_all = "camelCase")]
    NodeCreate {
        path: String,
        name: String,
        is_file: bool,
        #[serde(default)]
        content: String,
    },
    #[serde(rename = "NodeDeleteAction", rename_all = "camelCase")]
    NodeDelete {
        path: String,
        name: String,
        is_file: bool,
    },
    #[serde(rename = "NodeRenameAction", rename_all = "camelCase")]
    NodeRename {
        path: String,
        name: String,
        is_file: bool,
        new_name: String,
    },
}

impl ActionKind {
    /// The `actionType` wire string.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::SessionInit { .. } => "SessionInitAction",
            Self::SessionJoin => "SessionJoinAction",
            Self::SessionLeave => "SessionLeaveAction",
            Self::FileOpen { .. } => "FileOpenAction",
            Self::FileClose { .. } => "FileCloseAction",
            Self::NodeCreate { .. } => "NodeCreateAction",
            Self::NodeDelete { .. } => "NodeDeleteAction",
            Self::NodeRename { .. } => "NodeRenameAction",
        }
    }

    /// Workspace-relative path for file and node actions.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::FileOpen { path, .. }
            | Self::FileClose { path, .. }
            | Self::NodeCreate { path, .. }
            | Self::NodeDelete { path, .. }
            | Self::NodeRename { path, .. } => Some(path),
            Self::SessionInit { .. } | Self::SessionJoin | Self::SessionLeave => None,
        }
    }
}

impl Action {
    /// Create an action stamped with the current time.
    pub fn new(kind: ActionKind, client_user: Participant) -> Self {
        Self {
            kind,
            client_user: Some(client_user),
            time: Utc::now(),
        }
    }

    pub fn session_init(user: Participant, archive: Vec<u8>) -> Self {
        Self::new(ActionKind::SessionInit { content: archive }, user)
    }

    pub fn session_join(user: Participant) -> Self {
        Self::new(ActionKind::SessionJoin, user)
    }

    pub fn session_leave(user: Participant) -> Self {
        Self::new(ActionKind::SessionLeave, user)
    }

    pub fn file_open(user: Participant, path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(
            ActionKind::FileOpen { path: path.into(), name: name.into() },
            user,
        )
    }

    pub fn file_close(user: Participant, path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(
            ActionKind::FileClose { path: path.into(), name: name.into() },
            user,
        )
    }

    pub fn node_create(
        user: Participant,
        path: impl Into<String>,
        name: impl Into<String>,
        is_file: bool,
    ) -> Self {
        Self::new(
            ActionKind::NodeCreate {
                path: path.into(),
                name: name.into(),
                is_file,
                content: String::new(),
            },
            user,
        )
    }

    pub fn node_delete(
        user: Participant,
        path: impl Into<String>,
        name: impl Into<String>,
        is_file: bool,
    ) -> Self {
        Self::new(
            ActionKind::NodeDelete { path: path.into(), name: name.into(), is_file },
            user,
        )
    }

    pub fn node_rename(
        user: Participant,
        path: impl Into<String>,
        name: impl Into<String>,
        is_file: bool,
        new_name: impl Into<String>,
    ) -> Self {
        Self::new(
            ActionKind::NodeRename {
                path: path.into(),
                name: name.into(),
                is_file,
                new_name: new_name.into(),
            },
            user,
        )
    }

    pub fn wire_name(&self) -> &'static str {
        self.kind.wire_name()
    }

    /// Site id of the acting participant, if known.
    pub fn site_id(&self) -> Option<&str> {
        self.client_user.as_ref().and_then(|u| u.site_id())
    }
}
