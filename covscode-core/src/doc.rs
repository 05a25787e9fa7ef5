//! Shared-document keys and document-channel frames.
//!
//! Frames are JSON objects discriminated by `a`:
//! ```text
//! client → server                          server → client
//! { a:"f",  c, d }                         { a:"f",  c, d, data:{v,type,data} | error }
//! { a:"s",  c, d }                         { a:"s",  c, d, data:{v,type,data} | error }
//! { a:"op", c, d, v, seq, create:{..} }    { a:"ack", c, d, v, seq, error? }
//! { a:"op", c, d, v, seq, op:[..], source } { a:"op", c, d, v, op:[..], source }
//! ```
//! `c` is the repository id, `d` names the document inside it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::ProtocolError;
use crate::op::Op;

/// Type name for json0 documents.
pub const JSON0_TYPE: &str = "http://sharejs.org/types/JSONv0";

const PRESENCE_DOC: &str = "cursor";
const FILE_PREFIX: &str = "file/";

/// What a shared document holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocTarget {
    /// Contents of one workspace-relative file
    File(String),
    /// Cursor map of every participant in the repository
    Presence,
}

/// Structured document key: no string concatenation, no collisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocKey {
    pub repo_id: String,
    pub target: DocTarget,
}

impl DocKey {
    pub fn file(repo_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            target: DocTarget::File(path.into()),
        }
    }

    pub fn presence(repo_id: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            target: DocTarget::Presence,
        }
    }

    /// Document name inside the repository collection.
    pub fn doc_name(&self) -> String {
        match &self.target {
            DocTarget::File(path) => format!("{FILE_PREFIX}{path}"),
            DocTarget::Presence => PRESENCE_DOC.to_string(),
        }
    }

    /// Rebuild a key from frame fields.
    pub fn from_wire(collection: &str, doc: &str) -> Option<Self> {
        let target = if doc == PRESENCE_DOC {
            DocTarget::Presence
        } else {
            DocTarget::File(doc.strip_prefix(FILE_PREFIX)?.to_string())
        };
        Some(Self {
            repo_id: collection.to_string(),
            target,
        })
    }

    pub fn path(&self) -> Option<&str> {
        match &self.target {
            DocTarget::File(path) => Some(path),
            DocTarget::Presence => None,
        }
    }
}

impl std::fmt::Display for DocKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.repo_id, self.doc_name())
    }
}

/// Document state as served by the document service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocSnapshot {
    pub v: u64,
    /// `None` when the document has never been created.
    #[serde(rename = "type", default)]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl DocSnapshot {
    pub fn missing() -> Self {
        Self { v: 0, doc_type: None, data: None }
    }
}

/// Initial type and contents for a document being created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateData {
    #[serde(rename = "type")]
    pub doc_type: String,
    pub data: Value,
}

/// Error carried by a reply frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameError {
    pub code: String,
    pub message: String,
}

impl FrameError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// One frame on the document channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "a")]
pub enum DocFrame {
    #[serde(rename = "f")]
    Fetch {
        c: String,
        d: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<DocSnapshot>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<FrameError>,
    },
    #[serde(rename = "s")]
    Subscribe {
        c: String,
        d: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<DocSnapshot>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<FrameError>,
    },
    /// Submitted op or create (with `seq`), or a broadcast op (without).
    #[serde(rename = "op")]
    Op {
        c: String,
        d: String,
        v: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        op: Option<Op>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        create: Option<CreateData>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    /// Reply to a submitted op or create. `v` is the version it landed at.
    #[serde(rename = "ack")]
    Ack {
        c: String,
        d: String,
        v: u64,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<FrameError>,
    },
}

impl DocFrame {
    pub fn fetch(key: &DocKey) -> Self {
        Self::Fetch { c: key.repo_id.clone(), d: key.doc_name(), data: None, error: None }
    }

    pub fn subscribe(key: &DocKey) -> Self {
        Self::Subscribe { c: key.repo_id.clone(), d: key.doc_name(), data: None, error: None }
    }

    pub fn submit(key: &DocKey, v: u64, seq: u64, op: Op, source: Option<String>) -> Self {
        Self::Op {
            c: key.repo_id.clone(),
            d: key.doc_name(),
            v,
            seq: Some(seq),
            op: Some(op),
            create: None,
            source,
        }
    }

    pub fn create(key: &DocKey, seq: u64, data: Value) -> Self {
        Self::Op {
            c: key.repo_id.clone(),
            d: key.doc_name(),
            v: 0,
            seq: Some(seq),
            op: None,
            create: Some(CreateData { doc_type: JSON0_TYPE.to_string(), data }),
            source: None,
        }
    }

    /// The document this frame is about.
    pub fn key(&self) -> Option<DocKey> {
        let (c, d) = match self {
            Self::Fetch { c, d, .. }
            | Self::Subscribe { c, d, .. }
            | Self::Op { c, d, .. }
            | Self::Ack { c, d, .. } => (c, d),
        };
        DocKey::from_wire(c, d)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::OpComponent;
    use serde_json::json;

    #[test]
    fn test_key_wire_names() {
        assert_eq!(DocKey::file("r1", "src/a.txt").doc_name(), "file/src/a.txt");
        assert_eq!(DocKey::presence("r1").doc_name(), "cursor");
    }

    #[test]
    fn test_key_from_wire() {
        assert_eq!(DocKey::from_wire("r1", "file/a.txt"), Some(DocKey::file("r1", "a.txt")));
        assert_eq!(DocKey::from_wire("r1", "cursor"), Some(DocKey::presence("r1")));
        assert_eq!(DocKey::from_wire("r1", "elsewhere"), None);
    }

    #[test]
    fn test_file_named_cursor_does_not_collide() {
        let file = DocKey::file("r1", "cursor");
        assert_ne!(file, DocKey::presence("r1"));
        assert_eq!(DocKey::from_wire("r1", &file.doc_name()), Some(file));
    }

    #[test]
    fn test_submit_frame_shape() {
        let key = DocKey::file("r1", "a.txt");
        let frame = DocFrame::submit(
            &key,
            3,
            7,
            vec![OpComponent::text_insert("content", 0, "X")],
            Some("alice".into()),
        );
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({
                "a": "op", "c": "r1", "d": "file/a.txt", "v": 3, "seq": 7,
                "op": [{ "p": ["content", 0], "si": "X" }],
                "source": "alice"
            })
        );
    }

    #[test]
    fn test_decode_missing_snapshot() {
        let frame = DocFrame::decode(r#"{"a":"f","c":"r1","d":"cursor","data":{"v":0,"type":null}}"#).unwrap();
        match frame {
            DocFrame::Fetch { data: Some(snapshot), error: None, .. } => {
                assert_eq!(snapshot, DocSnapshot::missing());
            }
            other => panic!("Expected Fetch, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_ack_with_error() {
        let frame = DocFrame::decode(
            r#"{"a":"ack","c":"r1","d":"file/x","v":0,"seq":1,"error":{"code":"ERR_OP_VERSION","message":"too new"}}"#,
        )
        .unwrap();
        assert_eq!(frame.key(), Some(DocKey::file("r1", "x")));
        match frame {
            DocFrame::Ack { error: Some(e), .. } => assert_eq!(e.code, "ERR_OP_VERSION"),
            other => panic!("Expected Ack, got {other:?}"),
        }
    }

    #[test]
    fn test_create_frame_carries_type() {
        let frame = DocFrame::create(&DocKey::presence("r1"), 1, json!({ "cursor": {} }));
        let value = serde_json::to_value(frame).unwrap();
        assert_eq!(value["create"]["type"], JSON0_TYPE);
        assert_eq!(value["v"], 0);
        assert!(value.get("op").is_none());
    }
}
